// src/entities/nodegroup.rs

use super::{Entity, cluster::ParamMap};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Matches the shape of an entity UUID. `NodeGroup::name` must never look
/// like one, so a name can never be ambiguous with a UUID-keyed lookup.
static UUID_LIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

pub fn looks_like_uuid(name: &str) -> bool {
    UUID_LIKE.is_match(name)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeGroup {
    #[serde(default)]
    pub uuid: Uuid,
    pub name: String,
    /// Derived on load from `Node::group`; never persisted (see
    /// `#[serde(skip)]` — insertion order of the on-disk dict form is not
    /// stable enough to round-trip a membership list).
    #[serde(skip)]
    pub members: Vec<Uuid>,
    #[serde(default)]
    pub ndparams: ParamMap,
    #[serde(default)]
    pub ipolicy: ParamMap,
    #[serde(default)]
    pub diskparams: std::collections::BTreeMap<String, ParamMap>,
    /// Network UUID -> {mode, link} netparams.
    #[serde(default)]
    pub networks: std::collections::BTreeMap<Uuid, NetworkParams>,
    #[serde(default)]
    pub serial_no: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkParams {
    pub mode: String,
    pub link: String,
}

impl NodeGroup {
    pub fn new(uuid: Uuid, name: String) -> Self {
        Self {
            uuid,
            name,
            members: Vec::new(),
            ndparams: Default::default(),
            ipolicy: Default::default(),
            diskparams: Default::default(),
            networks: Default::default(),
            serial_no: 1,
        }
    }

    pub fn bump_serial(&mut self) {
        self.serial_no += 1;
    }
}

impl Entity for NodeGroup {
    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if looks_like_uuid(&self.name) {
            errs.push(format!(
                "nodegroup {}: name '{}' looks like a UUID",
                self.uuid, self.name
            ));
        }
        if self.name.trim().is_empty() {
            errs.push(format!("nodegroup {}: name must not be empty", self.uuid));
        }
        errs
    }
}
