// src/entities/node.rs

use super::{Entity, cluster::ParamMap};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub uuid: Uuid,
    pub name: String,
    pub primary_ip: String,
    pub secondary_ip: String,
    pub group: Uuid,
    #[serde(default)]
    pub master_candidate: bool,
    #[serde(default)]
    pub drained: bool,
    #[serde(default)]
    pub offline: bool,
    #[serde(default = "default_true")]
    pub master_capable: bool,
    #[serde(default = "default_true")]
    pub vm_capable: bool,
    #[serde(default)]
    pub ndparams: ParamMap,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub ctime: f64,
    #[serde(default)]
    pub mtime: f64,
}

fn default_true() -> bool {
    true
}

impl Node {
    /// True iff the node is eligible for candidate promotion: master
    /// capable, not drained, not offline.
    pub fn promotable(&self) -> bool {
        self.master_capable && !self.drained && !self.offline
    }

    pub fn bump_serial(&mut self, now: f64) {
        self.serial_no += 1;
        self.mtime = now;
    }
}

impl Entity for Node {
    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        let role_count = [self.master_candidate, self.drained, self.offline]
            .iter()
            .filter(|b| **b)
            .count();
        if role_count > 1 {
            errs.push(format!(
                "node {}: more than one of master_candidate/drained/offline is set",
                self.name
            ));
        }
        if self.name.trim().is_empty() {
            errs.push(format!("node {}: name must not be empty", self.uuid));
        }
        errs
    }
}
