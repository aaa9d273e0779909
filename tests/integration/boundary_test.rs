//! Boundary behaviors from spec §8 not already covered by the scenario
//! tests: the last-group guard on `RemoveNodeGroup` and the optimistic
//! concurrency check in `Update`.

use super::fixtures;
use clusterconf::store::UpdateTarget;
use clusterconf::ClusterConfigError;

#[tokio::test]
async fn remove_nodegroup_fails_when_it_is_the_last_one() {
    let graph = fixtures::bootstrap_graph();
    let only_group = *graph.nodegroups.keys().next().unwrap();
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let err = store.remove_nodegroup(only_group).await.unwrap_err();
    assert!(matches!(err, ClusterConfigError::Configuration(_)));
}

#[tokio::test]
async fn remove_nodegroup_succeeds_once_a_second_empty_group_exists() {
    let graph = fixtures::bootstrap_graph();
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let second_group = store.add_nodegroup("spare".to_string()).await.unwrap();
    store.remove_nodegroup(second_group).await.unwrap();

    let detached = store.get_detached_config().await.unwrap();
    assert!(!detached.graph().nodegroups.contains_key(&second_group));
}

#[tokio::test]
async fn update_with_stale_serial_no_is_a_conflict() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let mut stale = store.get_detached_config().await.unwrap().graph().nodes[&primary].clone();
    assert_eq!(stale.serial_no, 1);

    // A concurrent mutation (moving the node to a freshly created group)
    // bumps its serial out from under us.
    let other_group = store.add_nodegroup("spare".to_string()).await.unwrap();
    store
        .assign_group_nodes(other_group, vec![primary])
        .await
        .unwrap();

    stale.name = "renamed-stale".to_string();
    let err = store
        .update(UpdateTarget::Node(stale))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterConfigError::Configuration(_)));

    let detached = store.get_detached_config().await.unwrap();
    assert_eq!(detached.graph().nodes[&primary].name, "node1.example.com");
}

#[tokio::test]
async fn update_with_matching_serial_no_succeeds_and_bumps_it() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let mut current = store.get_detached_config().await.unwrap().graph().nodes[&primary].clone();
    current.name = "renamed-live".to_string();
    store.update(UpdateTarget::Node(current)).await.unwrap();

    let detached = store.get_detached_config().await.unwrap();
    let updated = &detached.graph().nodes[&primary];
    assert_eq!(updated.name, "renamed-live");
    assert_eq!(updated.serial_no, 2);
}
