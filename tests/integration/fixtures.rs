//! Shared graph builders and an on-disk offline store harness, the
//! integration-test equivalent of `store::test_support` (which is
//! crate-private and so not reachable from here).

use clusterconf::entities::{Cluster, IpFamily, Node, NodeGroup};
use clusterconf::{ConfigData, ConfigStore, RuntimeConfig};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tempfile::TempDir;
use uuid::Uuid;

pub fn bare_cluster(master_node: Uuid) -> Cluster {
    let mut enabled_disk_templates = BTreeSet::new();
    enabled_disk_templates.insert("plain".to_string());
    enabled_disk_templates.insert("drbd8".to_string());
    enabled_disk_templates.insert("file".to_string());

    Cluster {
        uuid: Uuid::new_v4(),
        cluster_name: "test.cluster".into(),
        master_node,
        master_ip: "10.0.0.254".into(),
        master_netdev: "eth0".into(),
        master_netmask: 24,
        primary_ip_family: IpFamily::Ipv4,
        mac_prefix: "aa:00:00".into(),
        highest_used_port: 0,
        tcpudp_port_pool: BTreeSet::new(),
        volume_group_name: Some("xenvg".into()),
        file_storage_dir: "/srv/vm".into(),
        shared_file_storage_dir: String::new(),
        gluster_storage_dir: String::new(),
        enabled_hypervisors: vec!["fake".into()],
        hvparams: BTreeMap::new(),
        beparams: BTreeMap::new(),
        nicparams: BTreeMap::new(),
        ndparams: BTreeMap::new(),
        diskparams: BTreeMap::new(),
        ipolicy: BTreeMap::new(),
        enabled_disk_templates,
        candidate_pool_size: 1,
        candidate_certs: BTreeMap::new(),
        compression_tools: vec![],
        install_image: String::new(),
        zeroing_image: String::new(),
        instance_communication_network: None,
        default_iallocator: None,
        default_iallocator_params: BTreeMap::new(),
        drbd_usermode_helper: None,
        uid_pool: vec![],
        maintain_node_health: false,
        enabled_user_shutdown: false,
        use_external_mip_script: false,
        rsahostkeypub: Some("ssh-rsa AAAA".into()),
        dsahostkeypub: None,
        os_hvp: BTreeMap::new(),
        osparams: BTreeMap::new(),
        osparams_private_cluster: BTreeMap::new(),
        reserved_lvs: BTreeSet::new(),
        prealloc_wipe_disks: false,
        serial_no: 1,
        ctime: 0.0,
        mtime: 0.0,
        tags: BTreeSet::new(),
    }
}

pub fn bare_node(name: &str, primary_ip: &str, group: Uuid, candidate: bool) -> Node {
    Node {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        primary_ip: primary_ip.to_string(),
        secondary_ip: primary_ip.to_string(),
        group,
        master_candidate: candidate,
        drained: false,
        offline: false,
        master_capable: true,
        vm_capable: true,
        ndparams: BTreeMap::new(),
        serial_no: 1,
        ctime: 0.0,
        mtime: 0.0,
    }
}

/// A single-node, single-group cluster, the offline equivalent of spec
/// scenario 1 ("Bootstrap").
pub fn bootstrap_graph() -> ConfigData {
    let group_uuid = Uuid::new_v4();
    let node = bare_node("node1.example.com", "10.0.0.1", group_uuid, true);
    let node_uuid = node.uuid;

    let mut nodes = HashMap::new();
    nodes.insert(node_uuid, node);

    let mut default_group = NodeGroup::new(group_uuid, "default".into());
    default_group.members = vec![node_uuid];
    let mut nodegroups = HashMap::new();
    nodegroups.insert(group_uuid, default_group);

    ConfigData {
        version: clusterconf::constants::CONFIG_VERSION,
        cluster: bare_cluster(node_uuid),
        nodes,
        instances: HashMap::new(),
        disks: HashMap::new(),
        nodegroups,
        networks: HashMap::new(),
        serial_no: 1,
        mtime: 0.0,
    }
}

/// Two nodes in one group, both master-capable, only the first a
/// candidate -- the starting point for instance/disk scenarios.
pub fn two_node_graph() -> ConfigData {
    let group_uuid = Uuid::new_v4();
    let n1 = bare_node("node1.example.com", "10.0.0.1", group_uuid, true);
    let n2 = bare_node("node2.example.com", "10.0.0.2", group_uuid, false);
    let node_uuid = n1.uuid;
    let n2_uuid = n2.uuid;

    let mut nodes = HashMap::new();
    nodes.insert(n1.uuid, n1);
    nodes.insert(n2.uuid, n2);

    let mut default_group = NodeGroup::new(group_uuid, "default".into());
    default_group.members = vec![node_uuid, n2_uuid];
    let mut nodegroups = HashMap::new();
    nodegroups.insert(group_uuid, default_group);

    ConfigData {
        version: clusterconf::constants::CONFIG_VERSION,
        cluster: bare_cluster(node_uuid),
        nodes,
        instances: HashMap::new(),
        disks: HashMap::new(),
        nodegroups,
        networks: HashMap::new(),
        serial_no: 1,
        mtime: 0.0,
    }
}

/// Five master-capable, non-drained, online nodes in one group, only one
/// a candidate -- spec scenario 6 ("MaintainCandidatePool").
pub fn five_node_graph(candidate_pool_size: usize) -> ConfigData {
    let group_uuid = Uuid::new_v4();
    let mut nodes = HashMap::new();
    let mut members = Vec::new();
    let mut master_uuid = None;
    for i in 0..5 {
        let node = bare_node(
            &format!("node{i}.example.com"),
            &format!("10.0.0.{}", i + 1),
            group_uuid,
            i == 0,
        );
        if i == 0 {
            master_uuid = Some(node.uuid);
        }
        members.push(node.uuid);
        nodes.insert(node.uuid, node);
    }

    let mut default_group = NodeGroup::new(group_uuid, "default".into());
    default_group.members = members;
    let mut nodegroups = HashMap::new();
    nodegroups.insert(group_uuid, default_group);

    let mut cluster = bare_cluster(master_uuid.unwrap());
    cluster.candidate_pool_size = candidate_pool_size;

    ConfigData {
        version: clusterconf::constants::CONFIG_VERSION,
        cluster,
        nodes,
        instances: HashMap::new(),
        disks: HashMap::new(),
        nodegroups,
        networks: HashMap::new(),
        serial_no: 1,
        mtime: 0.0,
    }
}

/// Serializes `graph` to a fresh temp-directory config file and hands
/// back an offline [`ConfigStore`] pointed at it, mirroring how
/// `clusterconf-tool` sets one up.
pub fn offline_store_for(graph: &ConfigData) -> (ConfigStore, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.data");
    let value = graph.to_value().expect("serialize bootstrap graph");
    std::fs::write(&path, serde_json::to_vec_pretty(&value).unwrap()).expect("write config file");

    let runtime = RuntimeConfig {
        config_path: path.to_string_lossy().to_string(),
        offline: true,
        my_hostname: String::new(),
        accept_foreign: true,
        poll_jitter_ms: 10,
    };
    (ConfigStore::new(&runtime, "integration-test"), dir)
}
