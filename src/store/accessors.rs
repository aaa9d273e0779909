// src/store/accessors.rs

//! Shared (read-only) operations over the graph: the catalog of
//! accessor methods in spec §4.5. Each one opens a shared session and
//! returns a defensive copy of whatever it reads -- callers never see a
//! live reference into the cached graph.

use super::ConfigStore;
use crate::entities::cluster::ParamMap;
use crate::entities::{ConfigData, Disk, Instance, Network, Node, NodeGroup};
use crate::error::{ClusterConfigError, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// `GetMasterCandidateStats`: `(now, should, max)` -- `now` is the current
/// candidate count, `should` is `min(candidate_pool_size,
/// promotable-and-not-exception count)`, `max` is the promotable count
/// with no exceptions applied.
pub fn master_candidate_stats(graph: &ConfigData, exceptions: &HashSet<Uuid>) -> (usize, usize, usize) {
    let now = graph.nodes.values().filter(|n| n.master_candidate).count();
    let max = graph.nodes.values().filter(|n| n.promotable()).count();
    let eligible = graph
        .nodes
        .values()
        .filter(|n| n.promotable() && !exceptions.contains(&n.uuid))
        .count();
    let should = graph.cluster.candidate_pool_size.min(eligible);
    (now, should, max)
}

/// Resolves ndparams with cluster -> group -> node inheritance, later
/// layers overriding earlier ones.
pub fn resolve_ndparams(graph: &ConfigData, node: &Node) -> ParamMap {
    let mut out = graph.cluster.ndparams.clone();
    if let Some(group) = graph.nodegroups.get(&node.group) {
        out.extend(group.ndparams.clone());
    }
    out.extend(node.ndparams.clone());
    out
}

/// Resolves diskparams for `template` with cluster -> group inheritance.
pub fn resolve_diskparams(graph: &ConfigData, group: Option<&NodeGroup>, template: &str) -> ParamMap {
    let mut out = graph
        .cluster
        .diskparams
        .get(template)
        .cloned()
        .unwrap_or_default();
    if let Some(group) = group {
        if let Some(over) = group.diskparams.get(template) {
            out.extend(over.clone());
        }
    }
    out
}

/// Resolves nicparams for a NIC with cluster -> group -> NIC inheritance.
/// The group layer comes from `group.networks[nic.network]` (the `{mode,
/// link}` netparams a NodeGroup records per connected network) -- a
/// `NodeGroup` has no `nicparams` field of its own.
pub fn resolve_nicparams(graph: &ConfigData, group: Option<&NodeGroup>, nic: &crate::entities::Nic) -> ParamMap {
    let mut out: ParamMap = graph
        .cluster
        .nicparams
        .get("default")
        .cloned()
        .unwrap_or_default();
    if let Some(group) = group {
        if let Some(net_uuid) = nic.network {
            if let Some(net_params) = group.networks.get(&net_uuid) {
                out.insert("mode".to_string(), serde_json::Value::String(net_params.mode.clone()));
                out.insert("link".to_string(), serde_json::Value::String(net_params.link.clone()));
            }
        }
    }
    out.extend(nic.nicparams.clone());
    out
}

impl ConfigStore {
    pub async fn get_node_name(&mut self, uuid: Uuid) -> Result<Option<String>> {
        self.run_shared(|g| Ok(g.nodes.get(&uuid).map(|n| n.name.clone()))).await
    }

    pub async fn get_node_uuid(&mut self, name: String) -> Result<Option<Uuid>> {
        self.run_shared(|g| Ok(g.node_by_name(&name).map(|n| n.uuid))).await
    }

    pub async fn get_instance_name(&mut self, uuid: Uuid) -> Result<Option<String>> {
        self.run_shared(|g| Ok(g.instances.get(&uuid).map(|i| i.name.clone())))
            .await
    }

    pub async fn get_instance_uuid(&mut self, name: String) -> Result<Option<Uuid>> {
        self.run_shared(|g| Ok(g.instance_by_name(&name).map(|i| i.uuid)))
            .await
    }

    pub async fn get_nodegroup_name(&mut self, uuid: Uuid) -> Result<Option<String>> {
        self.run_shared(|g| Ok(g.nodegroups.get(&uuid).map(|n| n.name.clone())))
            .await
    }

    pub async fn get_nodegroup_uuid(&mut self, name: String) -> Result<Option<Uuid>> {
        self.run_shared(|g| Ok(g.nodegroup_by_name(&name).map(|n| n.uuid)))
            .await
    }

    pub async fn get_network_name(&mut self, uuid: Uuid) -> Result<Option<String>> {
        self.run_shared(|g| Ok(g.networks.get(&uuid).map(|n| n.name.clone())))
            .await
    }

    pub async fn all_nodes_info(&mut self) -> Result<HashMap<Uuid, Node>> {
        self.run_shared(|g| Ok(g.nodes.clone())).await
    }

    pub async fn all_instances_info(&mut self) -> Result<HashMap<Uuid, Instance>> {
        self.run_shared(|g| Ok(g.instances.clone())).await
    }

    pub async fn all_nodegroups_info(&mut self) -> Result<HashMap<Uuid, NodeGroup>> {
        self.run_shared(|g| Ok(g.nodegroups.clone())).await
    }

    pub async fn all_networks_info(&mut self) -> Result<HashMap<Uuid, Network>> {
        self.run_shared(|g| Ok(g.networks.clone())).await
    }

    pub async fn all_disks_info(&mut self) -> Result<HashMap<Uuid, Disk>> {
        self.run_shared(|g| Ok(g.disks.clone())).await
    }

    pub async fn instance_disks(&mut self, inst_uuid: Uuid) -> Result<Vec<Disk>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            Ok(inst
                .disks
                .iter()
                .filter_map(|d| g.disks.get(d).cloned())
                .collect())
        })
        .await
    }

    pub async fn instance_all_nodes(&mut self, inst_uuid: Uuid) -> Result<BTreeSet<Uuid>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            Ok(g.instance_all_nodes(inst))
        })
        .await
    }

    pub async fn instance_secondary_nodes(&mut self, inst_uuid: Uuid) -> Result<Vec<Uuid>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            Ok(g.instance_secondary_nodes(inst))
        })
        .await
    }

    pub async fn instance_nodegroups(&mut self, inst_uuid: Uuid) -> Result<BTreeSet<Uuid>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            let nodes = g.instance_all_nodes(inst);
            Ok(nodes
                .into_iter()
                .filter_map(|n| g.nodes.get(&n).map(|node| node.group))
                .collect())
        })
        .await
    }

    pub async fn instance_networks(&mut self, inst_uuid: Uuid) -> Result<BTreeSet<Uuid>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            Ok(inst.nics.iter().filter_map(|n| n.network).collect())
        })
        .await
    }

    pub async fn instance_lvs_by_node(&mut self, inst_uuid: Uuid) -> Result<Vec<(Uuid, String, String)>> {
        self.run_shared(|g| {
            let inst = g
                .instances
                .get(&inst_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
            let mut out = Vec::new();
            for disk_uuid in &inst.disks {
                if let Some(disk) = g.disks.get(disk_uuid) {
                    out.extend(disk.lvs_by_node());
                }
            }
            Ok(out)
        })
        .await
    }

    pub async fn get_ndparams(&mut self, node_uuid: Uuid) -> Result<ParamMap> {
        self.run_shared(|g| {
            let node = g
                .nodes
                .get(&node_uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("node {node_uuid} does not exist")))?;
            Ok(resolve_ndparams(g, node))
        })
        .await
    }

    pub async fn get_diskparams(&mut self, group_uuid: Option<Uuid>, template: String) -> Result<ParamMap> {
        self.run_shared(|g| {
            let group = group_uuid.and_then(|u| g.nodegroups.get(&u));
            Ok(resolve_diskparams(g, group, &template))
        })
        .await
    }

    pub async fn expand_instance_name(&mut self, needle: String) -> Result<Option<Uuid>> {
        self.run_shared(|g| Ok(g.expand_instance_name(&needle))).await
    }

    pub async fn expand_node_name(&mut self, needle: String) -> Result<Option<Uuid>> {
        self.run_shared(|g| Ok(g.expand_node_name(&needle))).await
    }

    pub async fn lookup_node_group(&mut self, target: Option<Uuid>) -> Result<Uuid> {
        self.run_shared(|g| match target {
            Some(u) if g.nodegroups.contains_key(&u) => Ok(u),
            Some(u) => Err(ClusterConfigError::no_ent(format!("node group {u} does not exist"))),
            None => g.lookup_sole_nodegroup(),
        })
        .await
    }

    pub async fn get_master_candidate_stats(&mut self, exceptions: HashSet<Uuid>) -> Result<(usize, usize, usize)> {
        self.run_shared(|g| Ok(master_candidate_stats(g, &exceptions))).await
    }

    pub async fn has_any_disk_of_type(&mut self, dev_type: crate::entities::DiskDevType) -> Result<bool> {
        self.run_shared(|g| Ok(g.disks.values().any(|d| d.dev_type == dev_type)))
            .await
    }

    pub async fn get_ssconf_values(&mut self) -> Result<HashMap<String, String>> {
        self.run_shared(|g| Ok(crate::ssconf::ssconf_values(g))).await
    }
}
