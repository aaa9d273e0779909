//! Invariant 6: `AllocatePort` drains `tcpudp_port_pool` before ever
//! touching `highest_used_port`, and never hands out a port at or past
//! `LAST_DRBD_PORT`.

use crate::fixtures;
use clusterconf::constants::LAST_DRBD_PORT;
use proptest::prelude::*;
use std::collections::BTreeSet;

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, ..ProptestConfig::default() })]

    #[test]
    fn pool_entries_are_drained_before_incrementing_highest_used_port(
        mut pool in prop::collection::btree_set(100u16..65000, 0..8),
        highest_used_port in 0u16..100,
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let mut graph = fixtures::two_node_graph();
            graph.cluster.highest_used_port = highest_used_port;
            graph.cluster.tcpudp_port_pool = pool.clone();
            let (mut store, _dir) = fixtures::offline_store_for(&graph);

            let expected_pool_draws = pool.len();
            let mut seen_from_pool = BTreeSet::new();
            for _ in 0..expected_pool_draws {
                let port = store.allocate_port().await.unwrap();
                prop_assert!(pool.remove(&port), "allocated port {port} was not in the original pool");
                seen_from_pool.insert(port);
                prop_assert!(port < LAST_DRBD_PORT);
            }
            prop_assert_eq!(seen_from_pool.len(), expected_pool_draws);

            // Pool now exhausted: the next allocation must come from
            // highest_used_port + 1.
            let detached = store.get_detached_config().await.unwrap();
            let hup_before = detached.graph().cluster.highest_used_port;
            let port = store.allocate_port().await.unwrap();
            prop_assert_eq!(port, hup_before + 1);
            prop_assert!(port < LAST_DRBD_PORT);
            Ok(())
        })?;
    }
}
