// src/entities/instance.rs

use super::cluster::ParamMap;
use super::Entity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdminState {
    Up,
    Down,
    Offline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdminStateSource {
    Admin,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nic {
    pub mac: String,
    #[serde(default)]
    pub ip: Option<String>,
    #[serde(default)]
    pub network: Option<Uuid>,
    #[serde(default)]
    pub nicparams: ParamMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub uuid: Uuid,
    pub name: String,
    pub primary_node: Uuid,
    #[serde(default)]
    pub disks: Vec<Uuid>,
    #[serde(default)]
    pub nics: Vec<Nic>,
    pub disk_template: String,
    #[serde(default)]
    pub beparams: ParamMap,
    #[serde(default)]
    pub hvparams: ParamMap,
    pub hypervisor: String,
    #[serde(default)]
    pub admin_state: AdminState,
    #[serde(default)]
    pub admin_state_source: AdminStateSource,
    #[serde(default = "default_true")]
    pub disks_active: bool,
    #[serde(default)]
    pub network_port: Option<u16>,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub osparams: ParamMap,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub ctime: f64,
    #[serde(default)]
    pub mtime: f64,
}

impl Default for AdminState {
    fn default() -> Self {
        AdminState::Down
    }
}

impl Default for AdminStateSource {
    fn default() -> Self {
        AdminStateSource::Admin
    }
}

fn default_true() -> bool {
    true
}

impl Instance {
    pub fn bump_serial(&mut self, now: f64) {
        self.serial_no += 1;
        self.mtime = now;
    }

    /// Renumbers `iv_name` is not done here (disks live in the global disk
    /// table, not inline) -- see `store::renumber_iv_names`.
    pub fn mac_addresses(&self) -> impl Iterator<Item = &str> {
        self.nics.iter().map(|n| n.mac.as_str())
    }
}

impl Entity for Instance {
    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if self.name.trim().is_empty() {
            errs.push(format!("instance {}: name must not be empty", self.uuid));
        }
        for nic in &self.nics {
            if nic.mac.trim().is_empty() {
                errs.push(format!("instance {}: NIC with empty MAC", self.name));
            }
        }
        errs
    }
}
