//! Scenario 5 ("Rename instance renames file-disk path").

use super::fixtures;
use clusterconf::entities::disk::{DiskDevType, LogicalId};
use clusterconf::entities::{AdminState, Disk, Instance, Nic};
use uuid::Uuid;

fn file_disk(path: &str) -> Disk {
    Disk {
        uuid: Uuid::nil(),
        dev_type: DiskDevType::File,
        logical_id: LogicalId::File {
            driver: "loop".to_string(),
            path: path.to_string(),
        },
        children: vec![],
        iv_name: String::new(),
        size: 2048,
        mode: "rw".to_string(),
        name: None,
        nodes: Default::default(),
        serial_no: 0,
        ctime: 0.0,
        mtime: 0.0,
    }
}

#[tokio::test]
async fn renaming_an_instance_rewrites_its_file_disk_path() {
    let graph = fixtures::two_node_graph();
    let primary = graph.cluster.master_node;
    let (mut store, _dir) = fixtures::offline_store_for(&graph);

    let inst = Instance {
        uuid: Uuid::nil(),
        name: "alpha".to_string(),
        primary_node: primary,
        disks: vec![],
        nics: vec![Nic {
            mac: "aa:00:00:00:00:01".to_string(),
            ip: None,
            network: None,
            nicparams: Default::default(),
        }],
        disk_template: "file".to_string(),
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
    };
    let inst_uuid = store.add_instance(inst).await.unwrap();
    let disk_uuid = store
        .add_instance_disk(inst_uuid, file_disk("/srv/vm/alpha/disk0"), None)
        .await
        .unwrap();

    store
        .rename_instance(inst_uuid, "beta".to_string())
        .await
        .unwrap();

    let detached = store.get_detached_config().await.unwrap();
    let g = detached.graph();
    assert_eq!(g.instances[&inst_uuid].name, "beta");
    match &g.disks[&disk_uuid].logical_id {
        LogicalId::File { path, .. } => assert_eq!(path, "/srv/vm/beta/disk0"),
        other => panic!("expected a File logical_id, got {other:?}"),
    }
}
