//! Compile-time constants shared across the config core.

/// The config schema version this build understands. Bumped whenever the
/// on-disk/on-wire dict shape changes in a way `UpgradeConfig` cannot paper
/// over transparently.
pub const CONFIG_VERSION: u32 = 2_200_000;

/// First port ever handed out for DRBD device communication.
pub const FIRST_DRBD_PORT: u16 = 11_000;

/// One past the last port `AllocatePort` is allowed to hand out.
pub const LAST_DRBD_PORT: u16 = 14_999;

/// Name given to the node group created by the upgrade path when a config
/// has none (pre-group-aware configs, or a freshly bootstrapped cluster).
pub const INITIAL_NODE_GROUP_NAME: &str = "default";

/// Prefix used for the per-hypervisor `ssconf` parameter keys
/// (`SS_HVPARAMS_PREF + hypervisor_name`).
pub const SS_HVPARAMS_PREF: &str = "hvparams_";

/// Well-known keys for [`crate::ssconf::SsconfValues`].
pub mod ssconf_keys {
    pub const SS_CLUSTER_NAME: &str = "cluster_name";
    pub const SS_CLUSTER_TAGS: &str = "cluster_tags";
    pub const SS_MASTER_IP: &str = "master_ip";
    pub const SS_MASTER_NETDEV: &str = "master_netdev";
    pub const SS_MASTER_NETMASK: &str = "master_netmask";
    pub const SS_MASTER_NODE: &str = "master_node";
    pub const SS_MASTER_CANDIDATES: &str = "master_candidates";
    pub const SS_MASTER_CANDIDATES_IPS: &str = "master_candidates_ips";
    pub const SS_MASTER_CANDIDATES_CERTS: &str = "master_candidates_certs";
    pub const SS_NODE_LIST: &str = "node_list";
    pub const SS_NODE_PRIMARY_IPS: &str = "node_primary_ips";
    pub const SS_NODE_SECONDARY_IPS: &str = "node_secondary_ips";
    pub const SS_NODE_VM_CAPABLE: &str = "node_vm_capable";
    pub const SS_OFFLINE_NODES: &str = "offline_nodes";
    pub const SS_ONLINE_NODES: &str = "online_nodes";
    pub const SS_PRIMARY_IP_FAMILY: &str = "primary_ip_family";
    pub const SS_INSTANCE_LIST: &str = "instance_list";
    pub const SS_RELEASE_VERSION: &str = "release_version";
    pub const SS_HYPERVISOR_LIST: &str = "hypervisor_list";
    pub const SS_MAINTAIN_NODE_HEALTH: &str = "maintain_node_health";
    pub const SS_UID_POOL: &str = "uid_pool";
    pub const SS_NODEGROUPS: &str = "nodegroups";
    pub const SS_NETWORKS: &str = "networks";
    pub const SS_FILE_STORAGE_DIR: &str = "file_storage_dir";
    pub const SS_SHARED_FILE_STORAGE_DIR: &str = "shared_file_storage_dir";
    pub const SS_ENABLED_USER_SHUTDOWN: &str = "enabled_user_shutdown";
}

/// The release version string reported in `ssconf`, analogous to
/// `CARGO_PKG_VERSION` on the teacher's server binary.
pub const RELEASE_VERSION: &str = env!("CARGO_PKG_VERSION");
