//! Scenario 2 ("Add instance with two disks"), scenario 3 ("Insert at
//! index 0"), scenario 4 ("Duplicate MAC"), and the `AddInstanceDisk`
//! boundary behaviors from spec §8.

use super::fixtures;
use clusterconf::entities::disk::{DiskDevType, LogicalId};
use clusterconf::entities::{AdminState, Disk, Instance, Nic};
use clusterconf::ClusterConfigError;
use uuid::Uuid;

fn plain_disk(vg: &str, lv: &str) -> Disk {
    Disk {
        uuid: Uuid::nil(),
        dev_type: DiskDevType::Plain,
        logical_id: LogicalId::Plain {
            vg: vg.to_string(),
            lv: lv.to_string(),
        },
        children: vec![],
        iv_name: String::new(),
        size: 1024,
        mode: "rw".to_string(),
        name: None,
        nodes: Default::default(),
        serial_no: 0,
        ctime: 0.0,
        mtime: 0.0,
    }
}

fn instance_with_mac(name: &str, primary_node: Uuid, mac: &str) -> Instance {
    Instance {
        uuid: Uuid::nil(),
        name: name.to_string(),
        primary_node,
        disks: vec![],
        nics: vec![Nic {
            mac: mac.to_string(),
            ip: None,
            network: None,
            nicparams: Default::default(),
        }],
        disk_template: "plain".to_string(),
        beparams: Default::default(),
        hvparams: Default::default(),
        hypervisor: "fake".to_string(),
        admin_state: AdminState::Down,
        admin_state_source: Default::default(),
        disks_active: true,
        network_port: None,
        os: "noop".to_string(),
        osparams: Default::default(),
        serial_no: 0,
        ctime: 0.0,
        mtime: 0.0,
    }
}

#[tokio::test]
async fn add_instance_with_two_disks_renumbers_iv_names_and_bumps_serials() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let cluster_serial_before = graph.cluster.serial_no;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let inst = instance_with_mac("alpha", primary, "aa:00:00:00:00:01");
    let inst_uuid = store.add_instance(inst).await.unwrap();

    let d0 = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "alpha-disk0"), None)
        .await
        .unwrap();
    let d1 = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "alpha-disk1"), None)
        .await
        .unwrap();

    let detached = store.get_detached_config().await.unwrap();
    let g = detached.graph();
    let stored = g.instances.get(&inst_uuid).unwrap();
    assert_eq!(stored.disks, vec![d0, d1]);
    assert_eq!(g.disks[&d0].iv_name, "disk/0");
    assert_eq!(g.disks[&d1].iv_name, "disk/1");
    assert_eq!(stored.serial_no, 3);
    assert!(g.cluster.serial_no >= cluster_serial_before + 3);
}

#[tokio::test]
async fn insert_at_index_zero_reorders_and_renumbers() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let inst_uuid = store
        .add_instance(instance_with_mac("alpha", primary, "aa:00:00:00:00:01"))
        .await
        .unwrap();
    let d0 = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d0"), None)
        .await
        .unwrap();
    let d1 = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d1"), None)
        .await
        .unwrap();
    let d2 = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d2"), Some(0))
        .await
        .unwrap();

    let detached = store.get_detached_config().await.unwrap();
    let g = detached.graph();
    let stored = g.instances.get(&inst_uuid).unwrap();
    assert_eq!(stored.disks, vec![d2, d0, d1]);
    assert_eq!(g.disks[&d2].iv_name, "disk/0");
    assert_eq!(g.disks[&d0].iv_name, "disk/1");
    assert_eq!(g.disks[&d1].iv_name, "disk/2");
}

#[tokio::test]
async fn append_index_equal_to_len_is_valid_but_out_of_range_is_not() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let inst_uuid = store
        .add_instance(instance_with_mac("alpha", primary, "aa:00:00:00:00:01"))
        .await
        .unwrap();
    store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d0"), Some(0))
        .await
        .unwrap();

    // idx == len(disks) is valid (append).
    store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d1"), Some(1))
        .await
        .unwrap();

    // idx == len(disks) + 1 is out of range.
    let err = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d2"), Some(3))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterConfigError::OpPrereq { .. }));

    // idx == -1 is invalid; only `None` means append.
    let err = store
        .add_instance_disk(inst_uuid, plain_disk("xenvg", "d3"), Some(-1))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterConfigError::OpPrereq { .. }));
}

#[tokio::test]
async fn duplicate_mac_is_rejected_and_leaves_graph_unchanged() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    store
        .add_instance(instance_with_mac("alpha", primary, "aa:00:00:00:00:01"))
        .await
        .unwrap();

    let before = store.get_detached_config().await.unwrap();
    let instance_count_before = before.graph().instances.len();

    let err = store
        .add_instance(instance_with_mac("beta", primary, "aa:00:00:00:00:01"))
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterConfigError::Configuration(_)));

    let after = store.get_detached_config().await.unwrap();
    assert_eq!(after.graph().instances.len(), instance_count_before);
    assert!(after.graph().instance_by_name("beta").is_none());
}
