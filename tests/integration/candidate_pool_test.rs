//! Scenario 6 ("MaintainCandidatePool").

use super::fixtures;
use std::collections::HashSet;

#[tokio::test]
async fn maintain_candidate_pool_promotes_exactly_the_deficit() {
    let graph = fixtures::five_node_graph(3);
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let promoted = store.maintain_candidate_pool(HashSet::new()).await.unwrap();
    assert_eq!(promoted.len(), 2);

    let stats = store.get_master_candidate_stats(HashSet::new()).await.unwrap();
    assert_eq!(stats, (3, 3, 5));
}

#[tokio::test]
async fn maintain_candidate_pool_is_a_no_op_once_satisfied() {
    let graph = fixtures::five_node_graph(3);
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    store.maintain_candidate_pool(HashSet::new()).await.unwrap();
    let second_round = store.maintain_candidate_pool(HashSet::new()).await.unwrap();
    assert!(second_round.is_empty());
}
