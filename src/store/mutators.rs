// src/store/mutators.rs

//! Exclusive (read-write) operations over the graph: the catalog of
//! mutating methods in spec §4.5. Each mutation below is a free function
//! over `&mut ConfigData` (plus the in-process UUID pool where a fresh
//! UUID is needed) so it can be unit-tested directly against a graph
//! without going through a full `Session`; [`ConfigStore`] wraps each one
//! in [`ConfigStore::run_exclusive`] to apply the session's commit
//! lifecycle.

use super::ConfigStore;
use crate::constants::LAST_DRBD_PORT;
use crate::entities::disk::LogicalId;
use crate::entities::{AdminState, AdminStateSource, ConfigData, Disk, Instance, NodeGroup};
use crate::entities::{Network, Node};
use crate::error::{ClusterConfigError, Result};
use crate::reservations::UuidPool;
use crate::session::now_unix;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use uuid::Uuid;

fn fresh_uuid(pool: &mut UuidPool, existing: &ConfigData, ec_id: &str) -> Uuid {
    let taken: HashSet<Uuid> = existing
        .nodes
        .keys()
        .chain(existing.instances.keys())
        .chain(existing.disks.keys())
        .chain(existing.nodegroups.keys())
        .chain(existing.networks.keys())
        .copied()
        .collect();
    pool.generate(&taken, Uuid::new_v4, ec_id)
}

/// `AddNode`: assigns a fresh UUID if the caller left it nil, checks name
/// uniqueness, inserts, and rebuilds group membership.
pub fn add_node(graph: &mut ConfigData, pool: &mut UuidPool, mut node: Node) -> Result<Uuid> {
    if graph.node_by_name(&node.name).is_some() {
        return Err(ClusterConfigError::exists(format!(
            "node named '{}' already exists",
            node.name
        )));
    }
    if !graph.nodegroups.contains_key(&node.group) {
        return Err(ClusterConfigError::no_ent(format!(
            "node group {} does not exist",
            node.group
        )));
    }
    if node.uuid.is_nil() {
        node.uuid = fresh_uuid(pool, graph, "add-node");
    }
    let now = now_unix();
    node.ctime = now;
    node.mtime = now;
    node.serial_no = 1;
    let uuid = node.uuid;
    graph.nodes.insert(uuid, node);
    graph.rebuild_group_members();
    bump_cluster_serial(graph, now);
    Ok(uuid)
}

/// `RemoveNode`: rejects removing the master node or a node still hosting
/// an instance.
pub fn remove_node(graph: &mut ConfigData, node_uuid: Uuid) -> Result<()> {
    if !graph.nodes.contains_key(&node_uuid) {
        return Err(ClusterConfigError::no_ent(format!(
            "node {node_uuid} does not exist"
        )));
    }
    if graph.cluster.master_node == node_uuid {
        return Err(ClusterConfigError::Configuration(
            "cannot remove the master node".into(),
        ));
    }
    for inst in graph.instances.values() {
        if graph.instance_all_nodes(inst).contains(&node_uuid) {
            return Err(ClusterConfigError::Configuration(format!(
                "node {node_uuid} still hosts instance '{}'",
                inst.name
            )));
        }
    }
    graph.nodes.remove(&node_uuid);
    graph.cluster.candidate_certs.remove(&node_uuid);
    graph.rebuild_group_members();
    bump_cluster_serial(graph, now_unix());
    Ok(())
}

/// `AssignGroupNodes`: atomic multi-node group reassignment, preserving
/// the `NodeGroup::members` invariant afterwards.
pub fn assign_group_nodes(
    graph: &mut ConfigData,
    target_group: Uuid,
    node_uuids: &[Uuid],
) -> Result<()> {
    if !graph.nodegroups.contains_key(&target_group) {
        return Err(ClusterConfigError::no_ent(format!(
            "node group {target_group} does not exist"
        )));
    }
    for n in node_uuids {
        if !graph.nodes.contains_key(n) {
            return Err(ClusterConfigError::no_ent(format!("node {n} does not exist")));
        }
    }
    let now = now_unix();
    for n in node_uuids {
        let node = graph.nodes.get_mut(n).unwrap();
        if node.group != target_group {
            node.group = target_group;
            node.bump_serial(now);
        }
    }
    graph.rebuild_group_members();
    bump_cluster_serial(graph, now);
    Ok(())
}

pub fn add_nodegroup(graph: &mut ConfigData, pool: &mut UuidPool, name: String) -> Result<Uuid> {
    if crate::entities::nodegroup::looks_like_uuid(&name) {
        return Err(ClusterConfigError::invalid(format!(
            "node group name '{name}' looks like a UUID"
        )));
    }
    if graph.nodegroup_by_name(&name).is_some() {
        return Err(ClusterConfigError::exists(format!(
            "node group named '{name}' already exists"
        )));
    }
    let uuid = fresh_uuid(pool, graph, "add-nodegroup");
    graph.nodegroups.insert(uuid, NodeGroup::new(uuid, name));
    Ok(uuid)
}

/// `RemoveNodeGroup`: must never leave zero groups, and the group must be
/// empty of nodes.
pub fn remove_nodegroup(graph: &mut ConfigData, group_uuid: Uuid) -> Result<()> {
    if graph.nodegroups.len() <= 1 {
        return Err(ClusterConfigError::Configuration(
            "cannot remove the only remaining node group".into(),
        ));
    }
    let group = graph
        .nodegroups
        .get(&group_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("node group {group_uuid} does not exist")))?;
    if !group.members.is_empty() {
        return Err(ClusterConfigError::Configuration(format!(
            "node group '{}' still has {} member node(s)",
            group.name,
            group.members.len()
        )));
    }
    graph.nodegroups.remove(&group_uuid);
    Ok(())
}

fn validate_new_instance(graph: &ConfigData, inst: &Instance) -> Result<()> {
    if graph.instance_by_name(&inst.name).is_some() {
        return Err(ClusterConfigError::exists(format!(
            "instance named '{}' already exists",
            inst.name
        )));
    }
    if !graph.nodes.contains_key(&inst.primary_node) {
        return Err(ClusterConfigError::no_ent(format!(
            "primary node {} does not exist",
            inst.primary_node
        )));
    }
    if !graph
        .cluster
        .enabled_disk_templates
        .contains(&inst.disk_template)
    {
        return Err(ClusterConfigError::Configuration(format!(
            "disk template '{}' is not enabled on this cluster",
            inst.disk_template
        )));
    }
    let existing_macs: HashSet<&str> = graph
        .instances
        .values()
        .flat_map(|i| i.nics.iter().map(|n| n.mac.as_str()))
        .collect();
    for nic in &inst.nics {
        if existing_macs.contains(nic.mac.as_str()) {
            return Err(ClusterConfigError::Configuration(format!(
                "MAC address {} is already in use",
                nic.mac
            )));
        }
    }
    Ok(())
}

/// `AddInstance`: MAC/name uniqueness is enforced here; in online mode the
/// LockD `AddInstance` RPC additionally enforces it cluster-wide within
/// the same call (see [`ConfigStore::add_instance`]).
pub fn add_instance(graph: &mut ConfigData, pool: &mut UuidPool, mut inst: Instance) -> Result<Uuid> {
    validate_new_instance(graph, &inst)?;
    if inst.uuid.is_nil() {
        inst.uuid = fresh_uuid(pool, graph, "add-instance");
    }
    let now = now_unix();
    inst.ctime = now;
    inst.mtime = now;
    inst.serial_no = 1;
    let uuid = inst.uuid;
    graph.instances.insert(uuid, inst);
    bump_cluster_serial(graph, now);
    Ok(uuid)
}

/// `RemoveInstance`: returns `network_port` to the pool, drops the
/// instance's disks from the global table, and releases every NIC's IP
/// back to its owning network's address pool synchronously (spec §4.5
/// "IP lifecycle": `RemoveInstance` releases every NIC's IP synchronously,
/// unlike `Update` which defers to `_CommitTemporaryIps`).
pub fn remove_instance(graph: &mut ConfigData, inst_uuid: Uuid) -> Result<Instance> {
    let inst = graph
        .instances
        .remove(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
    for disk_uuid in &inst.disks {
        graph.disks.remove(disk_uuid);
    }
    if let Some(port) = inst.network_port {
        graph.cluster.tcpudp_port_pool.insert(port);
    }
    for nic in &inst.nics {
        if let (Some(net_uuid), Some(ip)) = (nic.network, &nic.ip) {
            if let (Some(net), Ok(addr)) = (
                graph.networks.get_mut(&net_uuid),
                ip.parse::<std::net::Ipv4Addr>(),
            ) {
                net.pool.release(addr);
            }
        }
    }
    bump_cluster_serial(graph, now_unix());
    Ok(inst)
}

/// `RenameInstance`: atomically renames and rewrites any `file`/
/// `shared_file` disk path to use the new instance name, following the
/// convention `.../<old-name>/<rest>` -> `.../<new-name>/<rest>`.
pub fn rename_instance(graph: &mut ConfigData, inst_uuid: Uuid, new_name: String) -> Result<()> {
    if graph.instance_by_name(&new_name).is_some() {
        return Err(ClusterConfigError::exists(format!(
            "instance named '{new_name}' already exists"
        )));
    }
    let old_name = {
        let inst = graph
            .instances
            .get(&inst_uuid)
            .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
        inst.name.clone()
    };

    let disk_uuids: Vec<Uuid> = graph
        .instances
        .get(&inst_uuid)
        .map(|i| i.disks.clone())
        .unwrap_or_default();
    let now = now_unix();
    for disk_uuid in disk_uuids {
        if let Some(disk) = graph.disks.get_mut(&disk_uuid) {
            rewrite_file_path(disk, &old_name, &new_name);
            disk.bump_serial(now);
        }
    }

    let inst = graph.instances.get_mut(&inst_uuid).unwrap();
    inst.name = new_name;
    inst.bump_serial(now);
    bump_cluster_serial(graph, now);
    Ok(())
}

fn rewrite_file_path(disk: &mut Disk, old_name: &str, new_name: &str) {
    if let LogicalId::File { path, .. } = &mut disk.logical_id {
        let needle = format!("/{old_name}/");
        let replacement = format!("/{new_name}/");
        if path.contains(&needle) {
            *path = path.replacen(&needle, &replacement, 1);
        }
    }
    for child in &mut disk.children {
        rewrite_file_path(child, old_name, new_name);
    }
}

pub fn set_instance_primary_node(
    graph: &mut ConfigData,
    inst_uuid: Uuid,
    new_primary: Uuid,
) -> Result<()> {
    if !graph.nodes.contains_key(&new_primary) {
        return Err(ClusterConfigError::no_ent(format!(
            "node {new_primary} does not exist"
        )));
    }
    let now = now_unix();
    let inst = graph
        .instances
        .get_mut(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
    if inst.primary_node != new_primary {
        inst.primary_node = new_primary;
        inst.bump_serial(now);
        bump_cluster_serial(graph, now);
    }
    Ok(())
}

pub fn set_instance_disk_template(
    graph: &mut ConfigData,
    inst_uuid: Uuid,
    template: String,
) -> Result<()> {
    if !graph.cluster.enabled_disk_templates.contains(&template) {
        return Err(ClusterConfigError::Configuration(format!(
            "disk template '{template}' is not enabled on this cluster"
        )));
    }
    let now = now_unix();
    let inst = graph
        .instances
        .get_mut(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
    if inst.disk_template != template {
        inst.disk_template = template;
        inst.bump_serial(now);
        bump_cluster_serial(graph, now);
    }
    Ok(())
}

fn mutate_instance_state<F>(graph: &mut ConfigData, inst_uuid: Uuid, f: F) -> Result<()>
where
    F: FnOnce(&mut Instance) -> bool,
{
    let now = now_unix();
    let inst = graph
        .instances
        .get_mut(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
    if f(inst) {
        inst.bump_serial(now);
        bump_cluster_serial(graph, now);
    }
    Ok(())
}

pub fn mark_instance_up(graph: &mut ConfigData, inst_uuid: Uuid) -> Result<()> {
    mutate_instance_state(graph, inst_uuid, |i| {
        let changed = i.admin_state != AdminState::Up || i.admin_state_source != AdminStateSource::Admin;
        i.admin_state = AdminState::Up;
        i.admin_state_source = AdminStateSource::Admin;
        changed
    })
}

pub fn mark_instance_down(graph: &mut ConfigData, inst_uuid: Uuid) -> Result<()> {
    mutate_instance_state(graph, inst_uuid, |i| {
        let changed = i.admin_state != AdminState::Down || i.admin_state_source != AdminStateSource::Admin;
        i.admin_state = AdminState::Down;
        i.admin_state_source = AdminStateSource::Admin;
        changed
    })
}

pub fn mark_instance_offline(graph: &mut ConfigData, inst_uuid: Uuid) -> Result<()> {
    mutate_instance_state(graph, inst_uuid, |i| {
        let changed = i.admin_state != AdminState::Offline || i.admin_state_source != AdminStateSource::Admin;
        i.admin_state = AdminState::Offline;
        i.admin_state_source = AdminStateSource::Admin;
        changed
    })
}

pub fn mark_instance_user_down(graph: &mut ConfigData, inst_uuid: Uuid) -> Result<()> {
    mutate_instance_state(graph, inst_uuid, |i| {
        let changed = i.admin_state != AdminState::Down || i.admin_state_source != AdminStateSource::User;
        i.admin_state = AdminState::Down;
        i.admin_state_source = AdminStateSource::User;
        changed
    })
}

pub fn mark_instance_disks_active(graph: &mut ConfigData, inst_uuid: Uuid, active: bool) -> Result<()> {
    mutate_instance_state(graph, inst_uuid, |i| {
        let changed = i.disks_active != active;
        i.disks_active = active;
        changed
    })
}

/// Renumbers `iv_name` on every disk of `inst` from `from_idx` onward to
/// `"disk/<index>"`, matching its position in `inst.disks`.
fn renumber_iv_names(graph: &mut ConfigData, inst: &Instance, from_idx: usize) {
    for (idx, disk_uuid) in inst.disks.iter().enumerate().skip(from_idx) {
        if let Some(disk) = graph.disks.get_mut(disk_uuid) {
            disk.iv_name = format!("disk/{idx}");
        }
    }
}

/// `AddInstanceDisk(inst, disk, idx)`: registers `disk` in the global
/// table (rejecting a duplicate UUID or a disk already attached
/// elsewhere), inserts its UUID at `idx` (`None` means append), then
/// renumbers `iv_name` on every disk from `idx` onward.
pub fn add_instance_disk(
    graph: &mut ConfigData,
    pool: &mut UuidPool,
    inst_uuid: Uuid,
    mut disk: Disk,
    idx: Option<i64>,
) -> Result<Uuid> {
    let len = graph
        .instances
        .get(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?
        .disks
        .len();

    let insert_at = match idx {
        None => len,
        Some(i) if i < 0 => {
            return Err(ClusterConfigError::invalid(
                "AddInstanceDisk: negative index is only valid as `None` (append)",
            ));
        }
        Some(i) if i as usize > len => {
            return Err(ClusterConfigError::invalid(format!(
                "AddInstanceDisk: index {i} is out of range (instance has {len} disks)"
            )));
        }
        Some(i) => i as usize,
    };

    if disk.uuid.is_nil() {
        disk.uuid = fresh_uuid(pool, graph, "add-instance-disk");
    }
    if graph.disks.contains_key(&disk.uuid) {
        return Err(ClusterConfigError::Reservation(format!(
            "disk {} is already registered",
            disk.uuid
        )));
    }
    for other in graph.instances.values() {
        if other.disks.contains(&disk.uuid) {
            return Err(ClusterConfigError::Reservation(format!(
                "disk {} is already attached to instance '{}'",
                disk.uuid, other.name
            )));
        }
    }

    let now = now_unix();
    disk.ctime = now;
    disk.mtime = now;
    disk.serial_no = 1;
    let disk_uuid = disk.uuid;
    graph.disks.insert(disk_uuid, disk);

    let inst = graph.instances.get_mut(&inst_uuid).unwrap();
    inst.disks.insert(insert_at, disk_uuid);
    inst.bump_serial(now);
    let inst_snapshot = inst.clone();
    renumber_iv_names(graph, &inst_snapshot, insert_at);
    bump_cluster_serial(graph, now);
    Ok(disk_uuid)
}

/// `RemoveInstanceDisk`: rejects a disk not attached to the named
/// instance, then detaches, renumbers, and drops it from the global
/// table.
pub fn remove_instance_disk(graph: &mut ConfigData, inst_uuid: Uuid, disk_uuid: Uuid) -> Result<Disk> {
    let inst = graph
        .instances
        .get_mut(&inst_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("instance {inst_uuid} does not exist")))?;
    let pos = inst
        .disks
        .iter()
        .position(|d| *d == disk_uuid)
        .ok_or_else(|| {
            ClusterConfigError::Configuration(format!(
                "disk {disk_uuid} is not attached to instance '{}'",
                inst.name
            ))
        })?;
    inst.disks.remove(pos);
    let now = now_unix();
    inst.bump_serial(now);
    let inst_snapshot = inst.clone();
    renumber_iv_names(graph, &inst_snapshot, pos);
    let removed = graph
        .disks
        .remove(&disk_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("disk {disk_uuid} does not exist")))?;
    bump_cluster_serial(graph, now);
    Ok(removed)
}

pub fn add_tcpudp_port(graph: &mut ConfigData, port: u16) -> Result<()> {
    graph.cluster.tcpudp_port_pool.insert(port);
    Ok(())
}

/// `AllocatePort`: pool-first. If the pool is empty, increments
/// `highest_used_port`, failing if that would reach `LAST_DRBD_PORT`.
pub fn allocate_port(graph: &mut ConfigData) -> Result<u16> {
    if let Some(&port) = graph.cluster.tcpudp_port_pool.iter().next() {
        graph.cluster.tcpudp_port_pool.remove(&port);
        return Ok(port);
    }
    let next = graph.cluster.highest_used_port.saturating_add(1);
    if next >= LAST_DRBD_PORT {
        return Err(ClusterConfigError::Configuration(format!(
            "no free ports: highest_used_port would reach the DRBD port ceiling ({LAST_DRBD_PORT})"
        )));
    }
    graph.cluster.highest_used_port = next;
    Ok(next)
}

pub fn add_network(graph: &mut ConfigData, pool: &mut UuidPool, mut net: Network) -> Result<Uuid> {
    if net.uuid.is_nil() {
        net.uuid = fresh_uuid(pool, graph, "add-network");
    }
    let uuid = net.uuid;
    graph.networks.insert(uuid, net);
    Ok(uuid)
}

pub fn remove_network(graph: &mut ConfigData, net_uuid: Uuid) -> Result<()> {
    for inst in graph.instances.values() {
        for nic in &inst.nics {
            if nic.network == Some(net_uuid) {
                return Err(ClusterConfigError::Configuration(format!(
                    "network {net_uuid} is still referenced by instance '{}'",
                    inst.name
                )));
            }
        }
    }
    graph
        .networks
        .remove(&net_uuid)
        .ok_or_else(|| ClusterConfigError::no_ent(format!("network {net_uuid} does not exist")))?;
    Ok(())
}

/// `MaintainCandidatePool`: in random node order, promotes master-capable,
/// online, non-drained, non-exception nodes to master candidate until
/// reaching `min(candidate_pool_size, capable_count)`. Returns the set of
/// newly promoted node UUIDs.
pub fn maintain_candidate_pool(graph: &mut ConfigData, exceptions: &HashSet<Uuid>) -> Vec<Uuid> {
    let (now, should, _max) = super::master_candidate_stats(graph, exceptions);
    if now >= should {
        return Vec::new();
    }
    let mut candidates: Vec<Uuid> = graph
        .nodes
        .values()
        .filter(|n| n.promotable() && !n.master_candidate && !exceptions.contains(&n.uuid))
        .map(|n| n.uuid)
        .collect();
    candidates.shuffle(&mut rand::thread_rng());

    let need = should - now;
    let promote: Vec<Uuid> = candidates.into_iter().take(need).collect();
    let ts = now_unix();
    for uuid in &promote {
        let node = graph.nodes.get_mut(uuid).unwrap();
        node.master_candidate = true;
        node.bump_serial(ts);
    }
    if !promote.is_empty() {
        bump_cluster_serial(graph, ts);
    }
    promote
}

pub fn add_node_to_candidate_certs(graph: &mut ConfigData, node_uuid: Uuid, digest: String) -> Result<()> {
    if !graph.nodes.contains_key(&node_uuid) {
        return Err(ClusterConfigError::no_ent(format!("node {node_uuid} does not exist")));
    }
    graph.cluster.candidate_certs.insert(node_uuid, digest);
    bump_cluster_serial(graph, now_unix());
    Ok(())
}

pub fn remove_node_from_candidate_certs(graph: &mut ConfigData, node_uuid: Uuid) -> Result<()> {
    if graph.cluster.candidate_certs.remove(&node_uuid).is_some() {
        bump_cluster_serial(graph, now_unix());
    }
    Ok(())
}

pub fn set_vg_name(graph: &mut ConfigData, vg: Option<String>) {
    if graph.cluster.volume_group_name != vg {
        graph.cluster.volume_group_name = vg;
        bump_cluster_serial(graph, now_unix());
    }
}

pub fn set_drbd_helper(graph: &mut ConfigData, helper: Option<String>) {
    if graph.cluster.drbd_usermode_helper != helper {
        graph.cluster.drbd_usermode_helper = helper;
        bump_cluster_serial(graph, now_unix());
    }
}

pub fn set_install_image(graph: &mut ConfigData, image: String) {
    if graph.cluster.install_image != image {
        graph.cluster.install_image = image;
        bump_cluster_serial(graph, now_unix());
    }
}

pub fn set_compression_tools(graph: &mut ConfigData, tools: Vec<String>) {
    if graph.cluster.compression_tools != tools {
        graph.cluster.compression_tools = tools;
        bump_cluster_serial(graph, now_unix());
    }
}

pub fn set_instance_communication_network(graph: &mut ConfigData, network: Option<String>) {
    if graph.cluster.instance_communication_network != network {
        graph.cluster.instance_communication_network = network;
        bump_cluster_serial(graph, now_unix());
    }
}

/// The target of a generic [`update`] call: the caller's locally-edited
/// copy of one entity, to be committed under an optimistic-concurrency
/// check on `serial_no`.
pub enum UpdateTarget {
    Node(Node),
    Instance(Box<Instance>),
    NodeGroup(NodeGroup),
    Disk(Box<Disk>),
    Network(Network),
}

/// `Update(target)`: the current stored `serial_no` must equal the
/// target's or a conflict error is raised; otherwise overwrite, bump
/// `serial_no`, update `mtime`. Node updates additionally bump the
/// cluster serial/mtime, as does any mutation reaching this function at
/// all other than Network (see spec invariant 3: node/instance/disk/
/// group/network-scoped mutations bump cluster serial).
pub fn update(graph: &mut ConfigData, target: UpdateTarget) -> Result<()> {
    let now = now_unix();
    match target {
        UpdateTarget::Node(mut node) => {
            let current = graph
                .nodes
                .get(&node.uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("node {} does not exist", node.uuid)))?;
            check_serial(current.serial_no, node.serial_no)?;
            node.bump_serial(now);
            graph.nodes.insert(node.uuid, node);
            graph.rebuild_group_members();
        }
        UpdateTarget::Instance(mut inst) => {
            let current = graph.instances.get(&inst.uuid).ok_or_else(|| {
                ClusterConfigError::no_ent(format!("instance {} does not exist", inst.uuid))
            })?;
            check_serial(current.serial_no, inst.serial_no)?;
            inst.bump_serial(now);
            graph.instances.insert(inst.uuid, *inst);
        }
        UpdateTarget::NodeGroup(mut ng) => {
            let current = graph.nodegroups.get(&ng.uuid).ok_or_else(|| {
                ClusterConfigError::no_ent(format!("node group {} does not exist", ng.uuid))
            })?;
            check_serial(current.serial_no, ng.serial_no)?;
            ng.bump_serial();
            let members = graph.nodegroups.get(&ng.uuid).unwrap().members.clone();
            ng.members = members;
            graph.nodegroups.insert(ng.uuid, ng);
        }
        UpdateTarget::Disk(mut disk) => {
            let current = graph
                .disks
                .get(&disk.uuid)
                .ok_or_else(|| ClusterConfigError::no_ent(format!("disk {} does not exist", disk.uuid)))?;
            check_serial(current.serial_no, disk.serial_no)?;
            disk.bump_serial(now);
            graph.disks.insert(disk.uuid, *disk);
        }
        UpdateTarget::Network(mut net) => {
            let current = graph.networks.get(&net.uuid).ok_or_else(|| {
                ClusterConfigError::no_ent(format!("network {} does not exist", net.uuid))
            })?;
            check_serial(current.serial_no, net.serial_no)?;
            net.bump_serial(now);
            graph.networks.insert(net.uuid, net);
            return Ok(());
        }
    }
    bump_cluster_serial(graph, now);
    Ok(())
}

fn check_serial(current: u64, target: u64) -> Result<()> {
    if current != target {
        return Err(ClusterConfigError::Configuration(format!(
            "optimistic concurrency conflict: stored serial_no {current} != target's {target}"
        )));
    }
    Ok(())
}

/// `_CommitTemporaryIps(ec_id)`: applies the pending `(action, address,
/// network)` list LockD handed back for this execution context to the
/// in-memory `AddressPool` of each owning network -- the deferred half of
/// the IP lifecycle that `Update(instance)` triggers on a successful
/// commit (spec §4.6 "IP lifecycle"). Addresses for networks or with
/// malformed text that no longer resolve are skipped rather than failing
/// the whole update; LockD is the source of truth for whether the
/// reservation was real.
fn commit_temporary_ips(graph: &mut ConfigData, pending: &[crate::lockd::PendingIpAction]) {
    for action in pending {
        match action {
            crate::lockd::PendingIpAction::Reserve { network, address } => {
                if let (Some(net), Ok(addr)) = (
                    graph.networks.get_mut(network),
                    address.parse::<std::net::Ipv4Addr>(),
                ) {
                    net.pool.reserve(addr);
                }
            }
            crate::lockd::PendingIpAction::Release { network, address } => {
                if let (Some(net), Ok(addr)) = (
                    graph.networks.get_mut(network),
                    address.parse::<std::net::Ipv4Addr>(),
                ) {
                    net.pool.release(addr);
                }
            }
        }
    }
}

fn bump_cluster_serial(graph: &mut ConfigData, now: f64) {
    graph.cluster.bump_serial(now);
    graph.serial_no += 1;
    graph.mtime = now;
}

impl ConfigStore {
    pub async fn add_node(&mut self, node: Node) -> Result<Uuid> {
        self.run_exclusive(|g, p| add_node(g, p, node)).await
    }

    pub async fn remove_node(&mut self, node_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| remove_node(g, node_uuid)).await
    }

    pub async fn assign_group_nodes(&mut self, group: Uuid, nodes: Vec<Uuid>) -> Result<()> {
        self.run_exclusive(|g, _| assign_group_nodes(g, group, &nodes))
            .await
    }

    pub async fn add_nodegroup(&mut self, name: String) -> Result<Uuid> {
        self.run_exclusive(|g, p| add_nodegroup(g, p, name)).await
    }

    pub async fn remove_nodegroup(&mut self, group: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| remove_nodegroup(g, group)).await
    }

    /// `AddInstance`: online callers additionally go through LockD's
    /// `AddInstance` RPC so MAC/UUID uniqueness is enforced cluster-wide
    /// within the same call, not just against this store's cached graph.
    pub async fn add_instance(&mut self, inst: Instance) -> Result<Uuid> {
        if !self.session.offline {
            self.session
                .lockd
                .add_instance(&self.session.wconfd_context, &inst)
                .await?;
        }
        self.run_exclusive(|g, p| add_instance(g, p, inst)).await
    }

    pub async fn remove_instance(&mut self, inst_uuid: Uuid) -> Result<Instance> {
        self.run_exclusive(|g, _| remove_instance(g, inst_uuid)).await
    }

    pub async fn rename_instance(&mut self, inst_uuid: Uuid, new_name: String) -> Result<()> {
        self.run_exclusive(|g, _| rename_instance(g, inst_uuid, new_name))
            .await
    }

    pub async fn set_instance_primary_node(&mut self, inst_uuid: Uuid, node: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| set_instance_primary_node(g, inst_uuid, node))
            .await
    }

    pub async fn set_instance_disk_template(&mut self, inst_uuid: Uuid, template: String) -> Result<()> {
        self.run_exclusive(|g, _| set_instance_disk_template(g, inst_uuid, template))
            .await
    }

    pub async fn mark_instance_up(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_up(g, inst_uuid)).await
    }

    pub async fn mark_instance_down(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_down(g, inst_uuid)).await
    }

    pub async fn mark_instance_offline(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_offline(g, inst_uuid)).await
    }

    pub async fn mark_instance_user_down(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_user_down(g, inst_uuid))
            .await
    }

    pub async fn mark_instance_disks_active(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_disks_active(g, inst_uuid, true))
            .await
    }

    pub async fn mark_instance_disks_inactive(&mut self, inst_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| mark_instance_disks_active(g, inst_uuid, false))
            .await
    }

    pub async fn add_instance_disk(
        &mut self,
        inst_uuid: Uuid,
        disk: Disk,
        idx: Option<i64>,
    ) -> Result<Uuid> {
        self.run_exclusive(|g, p| add_instance_disk(g, p, inst_uuid, disk, idx))
            .await
    }

    pub async fn remove_instance_disk(&mut self, inst_uuid: Uuid, disk_uuid: Uuid) -> Result<Disk> {
        self.run_exclusive(|g, _| remove_instance_disk(g, inst_uuid, disk_uuid))
            .await
    }

    pub async fn add_tcpudp_port(&mut self, port: u16) -> Result<()> {
        self.run_exclusive(|g, _| add_tcpudp_port(g, port)).await
    }

    pub async fn allocate_port(&mut self) -> Result<u16> {
        self.run_exclusive(|g, _| allocate_port(g)).await
    }

    pub async fn add_network(&mut self, net: Network) -> Result<Uuid> {
        self.run_exclusive(|g, p| add_network(g, p, net)).await
    }

    pub async fn remove_network(&mut self, net_uuid: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| remove_network(g, net_uuid)).await
    }

    pub async fn maintain_candidate_pool(&mut self, exceptions: HashSet<Uuid>) -> Result<Vec<Uuid>> {
        self.run_exclusive(|g, _| Ok(maintain_candidate_pool(g, &exceptions)))
            .await
    }

    pub async fn add_node_to_candidate_certs(&mut self, node: Uuid, digest: String) -> Result<()> {
        self.run_exclusive(|g, _| add_node_to_candidate_certs(g, node, digest))
            .await
    }

    pub async fn remove_node_from_candidate_certs(&mut self, node: Uuid) -> Result<()> {
        self.run_exclusive(|g, _| remove_node_from_candidate_certs(g, node))
            .await
    }

    pub async fn set_vg_name(&mut self, vg: Option<String>) -> Result<()> {
        self.run_exclusive(|g, _| {
            set_vg_name(g, vg.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_drbd_helper(&mut self, helper: Option<String>) -> Result<()> {
        self.run_exclusive(|g, _| {
            set_drbd_helper(g, helper.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_install_image(&mut self, image: String) -> Result<()> {
        self.run_exclusive(|g, _| {
            set_install_image(g, image.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_compression_tools(&mut self, tools: Vec<String>) -> Result<()> {
        self.run_exclusive(|g, _| {
            set_compression_tools(g, tools.clone());
            Ok(())
        })
        .await
    }

    pub async fn set_instance_communication_network(&mut self, network: Option<String>) -> Result<()> {
        self.run_exclusive(|g, _| {
            set_instance_communication_network(g, network.clone());
            Ok(())
        })
        .await
    }

    pub async fn update(&mut self, target: UpdateTarget) -> Result<()> {
        let release_drbd = matches!(target, UpdateTarget::Instance(_));
        let ec_id = self.session.wconfd_context.caller_id.clone();
        let pending_ips = if release_drbd && !self.session.offline {
            self.session.lockd.list_reserved_ips(&ec_id).await?
        } else {
            Vec::new()
        };
        let result = self
            .run_exclusive(|g, _| {
                update(g, target)?;
                commit_temporary_ips(g, &pending_ips);
                Ok(())
            })
            .await;
        if result.is_ok() && release_drbd && !self.session.offline {
            self.session.lockd.release_drbd_minors(&ec_id).await?;
        }
        result
    }
}
