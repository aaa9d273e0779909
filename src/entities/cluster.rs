// src/entities/cluster.rs

//! The singleton `Cluster` entity: cluster-wide parameters inherited by
//! every node, group and instance unless overridden.

use super::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Address family for the cluster's primary IPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IpFamily {
    Ipv4,
    Ipv6,
}

impl Default for IpFamily {
    fn default() -> Self {
        IpFamily::Ipv4
    }
}

/// Per-disk-template parameter overrides, and every other "map hv/template
/// -> map k -> v" shaped field in the original design: kept as loosely
/// typed JSON values since the core never interprets their contents, only
/// stores, inherits, and round-trips them.
pub type ParamMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(default)]
    pub uuid: Uuid,
    pub cluster_name: String,
    pub master_node: Uuid,
    pub master_ip: String,
    pub master_netdev: String,
    pub master_netmask: u8,
    #[serde(default)]
    pub primary_ip_family: IpFamily,
    pub mac_prefix: String,
    #[serde(default)]
    pub highest_used_port: u16,
    #[serde(default)]
    pub tcpudp_port_pool: BTreeSet<u16>,
    pub volume_group_name: Option<String>,
    #[serde(default)]
    pub file_storage_dir: String,
    #[serde(default)]
    pub shared_file_storage_dir: String,
    #[serde(default)]
    pub gluster_storage_dir: String,
    #[serde(default)]
    pub enabled_hypervisors: Vec<String>,
    #[serde(default)]
    pub hvparams: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub beparams: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub nicparams: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub ndparams: ParamMap,
    #[serde(default)]
    pub diskparams: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub ipolicy: ParamMap,
    #[serde(default)]
    pub enabled_disk_templates: BTreeSet<String>,
    #[serde(default = "default_candidate_pool_size")]
    pub candidate_pool_size: usize,
    #[serde(default)]
    pub candidate_certs: BTreeMap<Uuid, String>,
    #[serde(default)]
    pub compression_tools: Vec<String>,
    #[serde(default)]
    pub install_image: String,
    #[serde(default)]
    pub zeroing_image: String,
    #[serde(default)]
    pub instance_communication_network: Option<String>,
    #[serde(default)]
    pub default_iallocator: Option<String>,
    #[serde(default)]
    pub default_iallocator_params: ParamMap,
    #[serde(default)]
    pub drbd_usermode_helper: Option<String>,
    #[serde(default)]
    pub uid_pool: Vec<(u32, u32)>,
    #[serde(default)]
    pub maintain_node_health: bool,
    #[serde(default)]
    pub enabled_user_shutdown: bool,
    #[serde(default)]
    pub use_external_mip_script: bool,
    #[serde(default)]
    pub rsahostkeypub: Option<String>,
    #[serde(default)]
    pub dsahostkeypub: Option<String>,
    /// Per-OS parameter overrides (`os_hvp`), (`osparams`), the names the
    /// cluster never interprets but must round-trip faithfully.
    #[serde(default)]
    pub os_hvp: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub osparams: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub osparams_private_cluster: BTreeMap<String, ParamMap>,
    #[serde(default)]
    pub reserved_lvs: BTreeSet<String>,
    #[serde(default)]
    pub prealloc_wipe_disks: bool,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub ctime: f64,
    #[serde(default)]
    pub mtime: f64,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

fn default_candidate_pool_size() -> usize {
    10
}

impl Cluster {
    pub fn bump_serial(&mut self, now: f64) {
        self.serial_no += 1;
        self.mtime = now;
    }
}

impl Entity for Cluster {
    fn to_public_dict(&self) -> crate::error::Result<Value> {
        let mut v = serde_json::to_value(self)?;
        if let Some(obj) = v.as_object_mut() {
            const SENTINEL: &str = "<redacted>";
            if obj.get("rsahostkeypub").is_some_and(|x| !x.is_null()) {
                obj.insert("rsahostkeypub".into(), Value::String(SENTINEL.into()));
            }
            if obj.get("dsahostkeypub").is_some_and(|x| !x.is_null()) {
                obj.insert("dsahostkeypub".into(), Value::String(SENTINEL.into()));
            }
        }
        Ok(v)
    }

    fn upgrade_config(&mut self) -> bool {
        let mut changed = false;
        if self.candidate_pool_size == 0 {
            self.candidate_pool_size = default_candidate_pool_size();
            changed = true;
        }
        if self.install_image.is_empty() {
            self.install_image = String::new();
        }
        changed
    }

    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.cluster_name.trim().is_empty() {
            errs.push("cluster: cluster_name must not be empty".to_string());
        }
        if self.mac_prefix.trim().is_empty() {
            errs.push("cluster: mac_prefix must not be empty".to_string());
        }
        errs
    }
}
