// src/entities/graph.rs

//! `ConfigData`: the top-level, UUID-keyed entity graph. Every cross
//! reference between entities is by UUID, never by pointer -- this keeps a
//! full graph clone (the unit of a shared-session cache refresh) a cheap
//! deep-copy of maps of value types, with no cyclic-ownership concerns.

use super::{Cluster, Disk, Entity, Instance, Network, Node, NodeGroup};
use crate::constants::CONFIG_VERSION;
use crate::error::{ClusterConfigError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigData {
    pub version: u32,
    pub cluster: Cluster,
    #[serde(default)]
    pub nodes: HashMap<Uuid, Node>,
    #[serde(default)]
    pub instances: HashMap<Uuid, Instance>,
    #[serde(default)]
    pub disks: HashMap<Uuid, Disk>,
    #[serde(default)]
    pub nodegroups: HashMap<Uuid, NodeGroup>,
    #[serde(default)]
    pub networks: HashMap<Uuid, Network>,
    #[serde(default)]
    pub serial_no: u64,
    #[serde(default)]
    pub mtime: f64,
}

impl ConfigData {
    /// Deserializes a graph from its on-disk/on-wire dict form, rejecting
    /// anything whose `version` doesn't match the compiled
    /// `CONFIG_VERSION` before any other field is even looked at.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let found = value
            .get("version")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        if found != CONFIG_VERSION {
            return Err(ClusterConfigError::VersionMismatch {
                found,
                expected: CONFIG_VERSION,
            });
        }
        let mut data: ConfigData = serde_json::from_value(value)?;
        data.rebuild_group_members();
        Ok(data)
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Rebuilds every `NodeGroup::members` from `Node::group`. Must be run
    /// after every load and after `AssignGroupNodes`/`AddNode`/`RemoveNode`
    /// -- membership is derived, never persisted.
    pub fn rebuild_group_members(&mut self) {
        for ng in self.nodegroups.values_mut() {
            ng.members.clear();
        }
        let mut by_group: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for node in self.nodes.values() {
            by_group.entry(node.group).or_default().push(node.uuid);
        }
        for (group_uuid, mut members) in by_group {
            if let Some(ng) = self.nodegroups.get_mut(&group_uuid) {
                members.sort();
                ng.members = members;
            }
        }
    }

    pub fn expand_node_name(&self, needle: &str) -> Option<Uuid> {
        expand_unique(
            needle,
            self.nodes.values().map(|n| (n.uuid, n.name.as_str())),
        )
    }

    pub fn expand_instance_name(&self, needle: &str) -> Option<Uuid> {
        expand_unique(
            needle,
            self.instances.values().map(|i| (i.uuid, i.name.as_str())),
        )
    }

    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.values().find(|n| n.name == name)
    }

    pub fn instance_by_name(&self, name: &str) -> Option<&Instance> {
        self.instances.values().find(|i| i.name == name)
    }

    pub fn nodegroup_by_name(&self, name: &str) -> Option<&NodeGroup> {
        self.nodegroups.values().find(|g| g.name == name)
    }

    /// `LookupNodeGroup(None)`: returns the sole group's UUID, or fails if
    /// there's more than one.
    pub fn lookup_sole_nodegroup(&self) -> Result<Uuid> {
        if self.nodegroups.len() == 1 {
            Ok(*self.nodegroups.keys().next().unwrap())
        } else {
            Err(ClusterConfigError::invalid(format!(
                "no target node group specified and cluster has {} node groups",
                self.nodegroups.len()
            )))
        }
    }

    /// All node UUIDs participating in an instance: primary plus every
    /// disk's `all_nodes()`.
    pub fn instance_all_nodes(&self, inst: &Instance) -> std::collections::BTreeSet<Uuid> {
        let mut out = std::collections::BTreeSet::new();
        out.insert(inst.primary_node);
        for disk_uuid in &inst.disks {
            if let Some(disk) = self.disks.get(disk_uuid) {
                out.extend(disk.all_nodes());
            }
        }
        out
    }

    pub fn instance_secondary_nodes(&self, inst: &Instance) -> Vec<Uuid> {
        self.instance_all_nodes(inst)
            .into_iter()
            .filter(|n| *n != inst.primary_node)
            .collect()
    }
}

/// Case-insensitive unique-prefix resolution: returns `None` on ambiguity
/// or miss (never raises), matching `ExpandInstanceName`/`ExpandNodeName`.
fn expand_unique<'a>(needle: &str, items: impl Iterator<Item = (Uuid, &'a str)>) -> Option<Uuid> {
    let needle_lower = needle.to_lowercase();
    let mut exact = None;
    let mut prefix_matches = Vec::new();
    for (uuid, name) in items {
        let lower = name.to_lowercase();
        if lower == needle_lower {
            if exact.is_some() {
                return None;
            }
            exact = Some(uuid);
        } else if lower.starts_with(&needle_lower) {
            prefix_matches.push(uuid);
        }
    }
    if let Some(u) = exact {
        return Some(u);
    }
    if prefix_matches.len() == 1 {
        Some(prefix_matches[0])
    } else {
        None
    }
}
