//! Scenario 1 ("Bootstrap"): a freshly-written single-node, single-group
//! cluster verifies clean and its ssconf snapshot names the master node.

use super::fixtures;
use clusterconf::constants::ssconf_keys;

#[tokio::test]
async fn bootstrap_graph_verifies_empty() {
    let graph = fixtures::bootstrap_graph();
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let findings = store
        .run_shared(|g| Ok(clusterconf::verify::verify(g)))
        .await
        .unwrap();
    assert!(findings.is_empty(), "unexpected findings: {findings:?}");
}

#[tokio::test]
async fn ssconf_master_node_matches_the_bootstrapped_node() {
    let graph = fixtures::bootstrap_graph();
    let expected_name = graph
        .nodes
        .get(&graph.cluster.master_node)
        .unwrap()
        .name
        .clone();
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let values = store.get_ssconf_values().await.unwrap();
    assert_eq!(values[ssconf_keys::SS_MASTER_NODE], expected_name);
}
