// src/entities/disk.rs

//! Disks are a tagged sum over `dev_type`. DRBD disks stack over two
//! `Plain` children and carry the two-node tuple in `logical_id`; LV
//! enumeration recursively descends `children`, switching owning node at
//! DRBD boundaries.

use super::Entity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiskDevType {
    Plain,
    Drbd8,
    File,
    SharedFile,
    Gluster,
    Blockdev,
    Ext,
}

/// The type-specific payload of `logical_id`. Modeled as an enum rather
/// than an untyped tuple so each variant can only be constructed with the
/// fields its dev_type actually has.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogicalId {
    Plain { vg: String, lv: String },
    Drbd8 {
        node_a: Uuid,
        node_b: Uuid,
        tcp_port: u16,
        minor_a: u32,
        minor_b: u32,
        secret: String,
    },
    File { driver: String, path: String },
    Other { data: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disk {
    #[serde(default)]
    pub uuid: Uuid,
    pub dev_type: DiskDevType,
    pub logical_id: LogicalId,
    #[serde(default)]
    pub children: Vec<Disk>,
    /// Must equal `"disk/<index>"` for this disk's position in its owning
    /// instance's disk list; renumbered on every insert/remove.
    pub iv_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Nodes hosting this disk directly (not recursing into children).
    #[serde(default)]
    pub nodes: BTreeSet<Uuid>,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub ctime: f64,
    #[serde(default)]
    pub mtime: f64,
}

fn default_mode() -> String {
    "rw".to_string()
}

impl Disk {
    pub fn bump_serial(&mut self, now: f64) {
        self.serial_no += 1;
        self.mtime = now;
    }

    /// The flat set of node UUIDs participating in this disk, recursing
    /// through `children` (the `all_nodes` derived field from the spec).
    pub fn all_nodes(&self) -> BTreeSet<Uuid> {
        let mut out = self.nodes.clone();
        if let LogicalId::Drbd8 { node_a, node_b, .. } = &self.logical_id {
            out.insert(*node_a);
            out.insert(*node_b);
        }
        for child in &self.children {
            out.extend(child.all_nodes());
        }
        out
    }

    /// Recursively enumerates every leaf PLAIN disk's `(vg, lv)` mapped to
    /// its owning node. At a DRBD boundary the two children are attributed
    /// to `node_a`/`node_b` respectively rather than to this disk's own
    /// node set.
    pub fn lvs_by_node(&self) -> Vec<(Uuid, String, String)> {
        let mut out = Vec::new();
        self.collect_lvs(&self.nodes.iter().copied().collect::<Vec<_>>(), &mut out);
        out
    }

    fn collect_lvs(&self, inherited_nodes: &[Uuid], out: &mut Vec<(Uuid, String, String)>) {
        match &self.logical_id {
            LogicalId::Plain { vg, lv } => {
                for node in inherited_nodes {
                    out.push((*node, vg.clone(), lv.clone()));
                }
            }
            LogicalId::Drbd8 { node_a, node_b, .. } => {
                if let Some(a) = self.children.first() {
                    a.collect_lvs(&[*node_a], out);
                }
                if let Some(b) = self.children.get(1) {
                    b.collect_lvs(&[*node_b], out);
                }
            }
            _ => {
                for child in &self.children {
                    child.collect_lvs(inherited_nodes, out);
                }
            }
        }
    }

    /// Ports in use by this disk (and its DRBD children), for port-
    /// duplicate detection in the verifier.
    pub fn ports(&self) -> Vec<u16> {
        let mut out = Vec::new();
        if let LogicalId::Drbd8 { tcp_port, .. } = &self.logical_id {
            out.push(*tcp_port);
        }
        for child in &self.children {
            out.extend(child.ports());
        }
        out
    }
}

impl Entity for Disk {
    fn to_public_dict(&self) -> crate::error::Result<serde_json::Value> {
        fn redact(v: &mut serde_json::Value) {
            if let Some(obj) = v.as_object_mut()
                && obj.get("kind").and_then(|k| k.as_str()) == Some("drbd8")
            {
                obj.insert(
                    "secret".into(),
                    serde_json::Value::String("<redacted>".into()),
                );
            }
            if let Some(children) = v.get_mut("children").and_then(|c| c.as_array_mut()) {
                for child in children {
                    redact(child);
                }
            }
        }
        let mut v = serde_json::to_value(self)?;
        if let Some(lid) = v.get_mut("logical_id") {
            redact(lid);
        }
        Ok(v)
    }

    fn verify_local(&self) -> Vec<String> {
        let mut errs = Vec::new();
        if let LogicalId::Drbd8 {
            node_a,
            node_b,
            minor_a,
            minor_b,
            ..
        } = &self.logical_id
        {
            if node_a == node_b {
                errs.push(format!(
                    "disk {}: drbd8 logical_id has identical node_a/node_b",
                    self.uuid
                ));
            }
            if self.children.len() != 2 {
                errs.push(format!(
                    "disk {}: drbd8 disk must have exactly two children, found {}",
                    self.uuid,
                    self.children.len()
                ));
            }
            if minor_a == minor_b && node_a == node_b {
                errs.push(format!("disk {}: duplicate DRBD minors", self.uuid));
            }
        }
        errs
    }
}
