//! Invariants 2, 3, and 5 from spec §8: JSON round-trip identity, serial
//! bumping on mutation, and `NodeGroup::members` derivation.

use crate::fixtures;
use clusterconf::entities::Node;
use proptest::prelude::*;
use std::collections::BTreeMap;
use uuid::Uuid;

proptest! {
    #![proptest_config(ProptestConfig { cases: 24, ..ProptestConfig::default() })]

    /// Invariant 2: `FromDict(ToDict(g)) = g` on the public schema, for a
    /// graph whose `NodeGroup::members` already reflects `Node::group`
    /// (true of every graph the store ever hands back, since `Load` and
    /// every mutator maintain it).
    #[test]
    fn to_value_from_value_round_trips_to_a_fixed_point(
        extra_node_names in prop::collection::vec("[a-z][a-z0-9]{2,10}", 0..5),
    ) {
        let mut graph = fixtures::two_node_graph();
        let group = graph.cluster.master_node;
        let group = graph.nodes[&group].group;
        for (i, name) in extra_node_names.iter().enumerate() {
            let node = Node {
                uuid: Uuid::new_v4(),
                name: format!("{name}-{i}"),
                primary_ip: format!("10.1.0.{}", i + 1),
                secondary_ip: format!("10.1.0.{}", i + 1),
                group,
                master_candidate: false,
                drained: false,
                offline: false,
                master_capable: true,
                vm_capable: true,
                ndparams: BTreeMap::new(),
                serial_no: 1,
                ctime: 0.0,
                mtime: 0.0,
            };
            graph.nodes.insert(node.uuid, node);
        }
        graph.rebuild_group_members();

        let value1 = graph.to_value().unwrap();
        let reloaded = clusterconf::ConfigData::from_value(value1.clone()).unwrap();
        let value2 = reloaded.to_value().unwrap();
        prop_assert_eq!(value1, value2);
    }

    /// Invariant 3 + 5: `AddNode` bumps the node's serial (to 1, freshly
    /// created), bumps the cluster serial, and leaves
    /// `ng.members = {n | nodes[n].group = ng.uuid}`.
    #[test]
    fn add_node_bumps_cluster_serial_and_keeps_group_membership_exact(
        node_names in prop::collection::vec("[a-z][a-z0-9]{2,10}", 1..6),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let graph = fixtures::two_node_graph();
            let group = graph.nodes[&graph.cluster.master_node].group;
            let cluster_serial_before = graph.cluster.serial_no;
            let (mut store, _dir) = fixtures::offline_store_for(&graph);

            for (i, name) in node_names.iter().enumerate() {
                let node = Node {
                    uuid: Uuid::nil(),
                    name: format!("{name}-{i}"),
                    primary_ip: format!("10.2.0.{}", i + 1),
                    secondary_ip: format!("10.2.0.{}", i + 1),
                    group,
                    master_candidate: false,
                    drained: false,
                    offline: false,
                    master_capable: true,
                    vm_capable: true,
                    ndparams: BTreeMap::new(),
                    serial_no: 0,
                    ctime: 0.0,
                    mtime: 0.0,
                };
                store.add_node(node).await.unwrap();
            }

            let detached = store.get_detached_config().await.unwrap();
            let g = detached.graph();
            prop_assert!(g.cluster.serial_no >= cluster_serial_before + node_names.len() as u64);

            let ng = &g.nodegroups[&group];
            let mut expected: Vec<Uuid> = g
                .nodes
                .values()
                .filter(|n| n.group == group)
                .map(|n| n.uuid)
                .collect();
            expected.sort();
            let mut actual = ng.members.clone();
            actual.sort();
            prop_assert_eq!(actual, expected);

            for node in g.nodes.values() {
                if node.group == group {
                    prop_assert_eq!(node.serial_no, 1);
                }
            }
            Ok(())
        })?;
    }
}
