// src/store/mod.rs

//! `ConfigStore`: the façade exposing every accessor method. Each public
//! method declares its intent (shared read vs exclusive write) in its
//! doc comment and runs its body inside a [`Session`] of that intent.

mod accessors;
mod mutators;

pub use accessors::{master_candidate_stats, resolve_diskparams, resolve_ndparams, resolve_nicparams};
pub use mutators::UpdateTarget;

use crate::entities::ConfigData;
use crate::error::{ClusterConfigError, Result};
use crate::lockd::{LockDClient, NullLockDClient, WConfdContext};
use crate::persistence::{EntsGetter, NoopEntsGetter};
use crate::reservations::UuidPool;
use crate::session::Session;
use crate::settings::RuntimeConfig;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// A read-only, frozen view of the graph that rejects every write
/// attempt as a programmer error. Useful for consumers that need a
/// stable snapshot without holding a lock (spec §6 "GetDetachedConfig").
pub struct DetachedConfig {
    graph: ConfigData,
}

impl DetachedConfig {
    pub fn graph(&self) -> &ConfigData {
        &self.graph
    }

    /// Always fails: a detached snapshot is read-only by construction.
    pub fn write(&mut self) -> Result<()> {
        Err(ClusterConfigError::Programmer(
            "attempted to write through a detached, read-only config snapshot".into(),
        ))
    }
}

pub struct ConfigStore {
    pub(crate) session: Session,
    pub(crate) uuid_pool: UuidPool,
}

impl ConfigStore {
    pub fn new(runtime: &RuntimeConfig, caller_id: impl Into<String>) -> Self {
        let ctx = WConfdContext::new(caller_id, String::new(), std::process::id());
        let lockd: Arc<dyn LockDClient> = if runtime.offline {
            Arc::new(NullLockDClient)
        } else {
            panic!("online ConfigStore must be constructed with ConfigStore::new_online")
        };
        Self {
            session: Session::new(runtime, ctx, lockd, Arc::new(NoopEntsGetter)),
            uuid_pool: UuidPool::new(),
        }
    }

    pub fn new_online(
        runtime: &RuntimeConfig,
        caller_id: impl Into<String>,
        lockd: Arc<dyn LockDClient>,
    ) -> Self {
        let ctx = WConfdContext::new(caller_id, String::new(), std::process::id());
        Self {
            session: Session::new(runtime, ctx, lockd, Arc::new(NoopEntsGetter)),
            uuid_pool: UuidPool::new(),
        }
    }

    pub fn with_ents_getter(mut self, ents: Arc<dyn EntsGetter>) -> Self {
        self.session.ents = ents;
        self
    }

    /// Runs `body` inside a shared (read-only) session.
    pub async fn run_shared<F, T>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&ConfigData) -> Result<T>,
    {
        self.session.open(true, false).await?;
        let result = {
            let graph = self.session.graph();
            match graph {
                Ok(g) => body(g),
                Err(e) => Err(e),
            }
        };
        self.session.close(result.is_ok()).await?;
        result
    }

    /// Runs `body` inside an exclusive (read-write) session. On success
    /// the mutated graph is committed (saved/`WriteConfigAndUnlock`); on
    /// failure it is discarded.
    pub async fn run_exclusive<F, T>(&mut self, body: F) -> Result<T>
    where
        F: FnOnce(&mut ConfigData, &mut UuidPool) -> Result<T>,
    {
        self.session.open(false, false).await?;
        let result = {
            match self.session.graph_mut() {
                Ok(g) => body(g, &mut self.uuid_pool),
                Err(e) => Err(e),
            }
        };
        self.session.close(result.is_ok()).await?;
        result
    }

    /// Returns a frozen, read-only snapshot of the current graph. Opens
    /// (and immediately closes) a shared session to obtain it.
    pub async fn get_detached_config(&mut self) -> Result<DetachedConfig> {
        let graph = self.run_shared(|g| Ok(g.clone())).await?;
        Ok(DetachedConfig { graph })
    }

    pub async fn flush_config(&mut self) -> Result<()> {
        if self.session.offline {
            return Ok(());
        }
        self.session.open(false, false).await?;
        let r = self
            .session
            .lockd
            .flush_config(&self.session.wconfd_context)
            .await;
        self.session.close(r.is_ok()).await?;
        r
    }
}

/// Tests for cluster-file existence at the well-known path, without
/// constructing a store. Mirrors the original `IsCluster()` helper.
pub fn is_cluster(path: &Path) -> bool {
    path.is_file()
}

/// Runs the upgrade-on-load pass (spec §4.8): per-entity `UpgradeConfig`,
/// fresh UUIDs for any entity missing one, default node group creation,
/// unattached-node group assignment, and rebuilding `NodeGroup::members`.
/// Returns whether the graph was modified.
pub fn upgrade_on_load(graph: &mut ConfigData, uuid_pool: &mut UuidPool, now: f64) -> bool {
    use crate::entities::Entity;
    use std::collections::HashSet;

    let mut changed = false;
    const UPGRADE_EC: &str = "upgrade";

    if graph.cluster.upgrade_config() {
        changed = true;
    }

    let mut existing: HashSet<Uuid> = graph
        .nodes
        .keys()
        .chain(graph.instances.keys())
        .chain(graph.disks.keys())
        .chain(graph.nodegroups.keys())
        .chain(graph.networks.keys())
        .copied()
        .collect();
    existing.insert(graph.cluster.uuid);

    if graph.cluster.uuid.is_nil() {
        graph.cluster.uuid = uuid_pool.generate(&existing, Uuid::new_v4, UPGRADE_EC);
        changed = true;
    }

    for map_changed in [
        assign_missing_uuids(&mut graph.nodes, uuid_pool, &mut existing, UPGRADE_EC),
        assign_missing_uuids(&mut graph.instances, uuid_pool, &mut existing, UPGRADE_EC),
        assign_missing_uuids(&mut graph.disks, uuid_pool, &mut existing, UPGRADE_EC),
        assign_missing_uuids(&mut graph.nodegroups, uuid_pool, &mut existing, UPGRADE_EC),
        assign_missing_uuids(&mut graph.networks, uuid_pool, &mut existing, UPGRADE_EC),
    ] {
        changed |= map_changed;
    }

    for node in graph.nodes.values_mut() {
        if node.upgrade_config() {
            changed = true;
        }
    }
    for inst in graph.instances.values_mut() {
        if inst.upgrade_config() {
            changed = true;
        }
    }

    if graph.nodegroups.is_empty() {
        let uuid = uuid_pool.generate(&existing, Uuid::new_v4, UPGRADE_EC);
        existing.insert(uuid);
        let mut default_group =
            crate::entities::NodeGroup::new(uuid, crate::constants::INITIAL_NODE_GROUP_NAME.into());
        default_group.serial_no = 1;
        graph.nodegroups.insert(uuid, default_group);
        changed = true;
    }

    let default_group_uuid = if graph.nodegroups.len() == 1 {
        *graph.nodegroups.keys().next().unwrap()
    } else {
        graph
            .nodegroups
            .values()
            .find(|g| g.name == crate::constants::INITIAL_NODE_GROUP_NAME)
            .map(|g| g.uuid)
            .unwrap_or_else(|| *graph.nodegroups.keys().next().unwrap())
    };

    for node in graph.nodes.values_mut() {
        if node.group.is_nil() {
            node.group = default_group_uuid;
            changed = true;
        }
    }

    graph.rebuild_group_members();

    if changed {
        graph.mtime = now;
    }

    changed
}

fn assign_missing_uuids<V>(
    map: &mut std::collections::HashMap<Uuid, V>,
    uuid_pool: &mut UuidPool,
    existing: &mut std::collections::HashSet<Uuid>,
    ec_id: &str,
) -> bool
where
    V: HasUuid,
{
    let missing: Vec<Uuid> = map
        .iter()
        .filter(|(_, v)| v.uuid().is_nil())
        .map(|(k, _)| *k)
        .collect();
    if missing.is_empty() {
        return false;
    }
    for placeholder_key in missing {
        if let Some(mut value) = map.remove(&placeholder_key) {
            let fresh = uuid_pool.generate(existing, Uuid::new_v4, ec_id);
            existing.insert(fresh);
            value.set_uuid(fresh);
            map.insert(fresh, value);
        }
    }
    true
}

trait HasUuid {
    fn uuid(&self) -> Uuid;
    fn set_uuid(&mut self, uuid: Uuid);
}

macro_rules! impl_has_uuid {
    ($t:ty) => {
        impl HasUuid for $t {
            fn uuid(&self) -> Uuid {
                self.uuid
            }
            fn set_uuid(&mut self, uuid: Uuid) {
                self.uuid = uuid;
            }
        }
    };
}

impl_has_uuid!(crate::entities::Node);
impl_has_uuid!(crate::entities::Instance);
impl_has_uuid!(crate::entities::Disk);
impl_has_uuid!(crate::entities::NodeGroup);
impl_has_uuid!(crate::entities::Network);

/// Graph fixtures shared by unit tests across `verify`, `ssconf`, and this
/// module -- a minimal bootstrapped single-node cluster satisfying every
/// invariant in spec §3 (scenario 1, spec §8 "End-to-end scenarios").
#[cfg(test)]
pub(crate) mod test_support {
    use crate::entities::{Cluster, IpFamily, Node, NodeGroup};
    use std::collections::{BTreeMap, BTreeSet, HashMap};
    use uuid::Uuid;

    pub fn bootstrap_graph() -> ConfigData {
        let group_uuid = Uuid::new_v4();
        let node_uuid = Uuid::new_v4();

        let mut nodes = HashMap::new();
        nodes.insert(
            node_uuid,
            Node {
                uuid: node_uuid,
                name: "node1.example.com".into(),
                primary_ip: "10.0.0.1".into(),
                secondary_ip: "10.0.0.1".into(),
                group: group_uuid,
                master_candidate: true,
                drained: false,
                offline: false,
                master_capable: true,
                vm_capable: true,
                ndparams: BTreeMap::new(),
                serial_no: 1,
                ctime: 0.0,
                mtime: 0.0,
            },
        );

        let mut nodegroups = HashMap::new();
        let mut default_group = NodeGroup::new(group_uuid, "default".into());
        default_group.members = vec![node_uuid];
        nodegroups.insert(group_uuid, default_group);

        let mut enabled_disk_templates = BTreeSet::new();
        enabled_disk_templates.insert("plain".to_string());

        ConfigData {
            version: crate::constants::CONFIG_VERSION,
            cluster: Cluster {
                uuid: Uuid::new_v4(),
                cluster_name: "test.cluster".into(),
                master_node: node_uuid,
                master_ip: "10.0.0.254".into(),
                master_netdev: "eth0".into(),
                master_netmask: 24,
                primary_ip_family: IpFamily::Ipv4,
                mac_prefix: "aa:00:00".into(),
                highest_used_port: 0,
                tcpudp_port_pool: BTreeSet::new(),
                volume_group_name: Some("xenvg".into()),
                file_storage_dir: String::new(),
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
            },
            nodes,
            instances: HashMap::new(),
            disks: HashMap::new(),
            nodegroups,
            networks: HashMap::new(),
            serial_no: 1,
            mtime: 0.0,
        }
    }
}
