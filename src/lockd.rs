// src/lockd.rs

//! Thin typed façade over the out-of-process coordination service
//! ("LockD") used only when the store runs online. This module defines
//! the RPC surface as a trait -- grounded on the teacher's `WardenClient`,
//! itself a minimal typed client that talks to a remote peer -- plus two
//! in-process implementations used by tests and by offline mode: a
//! `NullLockDClient` that refuses every call, and a `FakeLockDClient` that
//! backs the same trait with an in-memory mutex, for exercising the
//! online code paths without a real daemon.

use crate::entities::{ConfigData, Instance};
use crate::error::{ClusterConfigError, Result};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identifies the calling execution context for every LockD RPC: the job
/// id if there is one, otherwise the current thread/task name, plus the
/// liveness-tracking livelock file and pid the daemon uses to detect a
/// dead caller.
#[derive(Debug, Clone)]
pub struct WConfdContext {
    pub caller_id: String,
    pub livelock_path: String,
    pub pid: u32,
}

impl WConfdContext {
    pub fn new(caller_id: impl Into<String>, livelock_path: impl Into<String>, pid: u32) -> Self {
        Self {
            caller_id: caller_id.into(),
            livelock_path: livelock_path.into(),
            pid,
        }
    }
}

/// A `(action, address, net_uuid)` entry queued by `GenerateIp`/`ReserveIp`
/// until `Update(instance)` commits it into the owning network's pool.
#[derive(Debug, Clone)]
pub enum PendingIpAction {
    Reserve { network: Uuid, address: String },
    Release { network: Uuid, address: String },
}

#[async_trait]
pub trait LockDClient: Send + Sync {
    /// Polls internally (cooperative back-off) until the lock is granted.
    /// Returns `None` when granted in shared mode and the caller's cached
    /// graph is already current ("reuse your cache"); otherwise returns
    /// the fresh graph.
    async fn lock_config(&self, ctx: &WConfdContext, shared: bool) -> Result<Option<ConfigData>>;
    async fn unlock_config(&self, ctx: &WConfdContext) -> Result<()>;
    /// Returns a fresh snapshot without acquiring a lock.
    async fn read_config(&self, ctx: &WConfdContext) -> Result<ConfigData>;
    async fn write_config(&self, ctx: &WConfdContext, data: &ConfigData) -> Result<()>;
    async fn write_config_and_unlock(&self, ctx: &WConfdContext, data: &ConfigData) -> Result<()>;
    async fn verify_config(&self, ctx: &WConfdContext) -> Result<Vec<String>>;
    async fn flush_config(&self, ctx: &WConfdContext) -> Result<()>;

    async fn generate_mac(&self, ctx: &WConfdContext, ec_id: &str) -> Result<String>;
    async fn reserve_mac(&self, ctx: &WConfdContext, ec_id: &str, mac: &str) -> Result<()>;
    async fn generate_ip(&self, ctx: &WConfdContext, ec_id: &str, network: Uuid) -> Result<String>;
    async fn reserve_ip(
        &self,
        ctx: &WConfdContext,
        ec_id: &str,
        network: Uuid,
        ip: &str,
    ) -> Result<()>;
    async fn release_ip(&self, ctx: &WConfdContext, network: Uuid, ip: &str) -> Result<()>;
    async fn list_reserved_ips(&self, ec_id: &str) -> Result<Vec<PendingIpAction>>;
    async fn reserve_lv(&self, ctx: &WConfdContext, ec_id: &str, lv_name: &str) -> Result<()>;
    async fn generate_drbd_secret(&self, ctx: &WConfdContext, ec_id: &str) -> Result<String>;
    async fn compute_drbd_map(&self, ctx: &WConfdContext) -> Result<HashMap<Uuid, Vec<u32>>>;
    async fn allocate_drbd_minor(&self, ctx: &WConfdContext, ec_id: &str, node: Uuid)
    -> Result<u32>;
    async fn release_drbd_minors(&self, ec_id: &str) -> Result<()>;
    async fn add_instance(&self, ctx: &WConfdContext, inst: &Instance) -> Result<()>;
    async fn drop_all_reservations(&self, ec_id: &str) -> Result<()>;
}

fn programmer_offline(op: &str) -> ClusterConfigError {
    ClusterConfigError::Programmer(format!(
        "{op}: LockD-backed reservation called while the store is offline"
    ))
}

/// Used whenever `RuntimeConfig::offline` is true. Any call into it is a
/// programmer error: offline callers must only use the in-process UUID
/// reservation manager.
pub struct NullLockDClient;

#[async_trait]
impl LockDClient for NullLockDClient {
    async fn lock_config(&self, _ctx: &WConfdContext, _shared: bool) -> Result<Option<ConfigData>> {
        Err(programmer_offline("LockConfig"))
    }
    async fn unlock_config(&self, _ctx: &WConfdContext) -> Result<()> {
        Err(programmer_offline("UnlockConfig"))
    }
    async fn read_config(&self, _ctx: &WConfdContext) -> Result<ConfigData> {
        Err(programmer_offline("ReadConfig"))
    }
    async fn write_config(&self, _ctx: &WConfdContext, _data: &ConfigData) -> Result<()> {
        Err(programmer_offline("WriteConfig"))
    }
    async fn write_config_and_unlock(
        &self,
        _ctx: &WConfdContext,
        _data: &ConfigData,
    ) -> Result<()> {
        Err(programmer_offline("WriteConfigAndUnlock"))
    }
    async fn verify_config(&self, _ctx: &WConfdContext) -> Result<Vec<String>> {
        Err(programmer_offline("VerifyConfig"))
    }
    async fn flush_config(&self, _ctx: &WConfdContext) -> Result<()> {
        Err(programmer_offline("FlushConfig"))
    }
    async fn generate_mac(&self, _ctx: &WConfdContext, _ec_id: &str) -> Result<String> {
        Err(programmer_offline("GenerateMAC"))
    }
    async fn reserve_mac(&self, _ctx: &WConfdContext, _ec_id: &str, _mac: &str) -> Result<()> {
        Err(programmer_offline("ReserveMAC"))
    }
    async fn generate_ip(
        &self,
        _ctx: &WConfdContext,
        _ec_id: &str,
        _network: Uuid,
    ) -> Result<String> {
        Err(programmer_offline("GenerateIP"))
    }
    async fn reserve_ip(
        &self,
        _ctx: &WConfdContext,
        _ec_id: &str,
        _network: Uuid,
        _ip: &str,
    ) -> Result<()> {
        Err(programmer_offline("ReserveIP"))
    }
    async fn release_ip(&self, _ctx: &WConfdContext, _network: Uuid, _ip: &str) -> Result<()> {
        Err(programmer_offline("ReleaseIp"))
    }
    async fn list_reserved_ips(&self, _ec_id: &str) -> Result<Vec<PendingIpAction>> {
        Err(programmer_offline("ListReservedIps"))
    }
    async fn reserve_lv(&self, _ctx: &WConfdContext, _ec_id: &str, _lv_name: &str) -> Result<()> {
        Err(programmer_offline("ReserveLV"))
    }
    async fn generate_drbd_secret(&self, _ctx: &WConfdContext, _ec_id: &str) -> Result<String> {
        Err(programmer_offline("GenerateDRBDSecret"))
    }
    async fn compute_drbd_map(&self, _ctx: &WConfdContext) -> Result<HashMap<Uuid, Vec<u32>>> {
        Err(programmer_offline("ComputeDRBDMap"))
    }
    async fn allocate_drbd_minor(
        &self,
        _ctx: &WConfdContext,
        _ec_id: &str,
        _node: Uuid,
    ) -> Result<u32> {
        Err(programmer_offline("AllocateDRBDMinor"))
    }
    async fn release_drbd_minors(&self, _ec_id: &str) -> Result<()> {
        Err(programmer_offline("ReleaseDRBDMinors"))
    }
    async fn add_instance(&self, _ctx: &WConfdContext, _inst: &Instance) -> Result<()> {
        Err(programmer_offline("AddInstance"))
    }
    async fn drop_all_reservations(&self, _ec_id: &str) -> Result<()> {
        Err(programmer_offline("DropAllReservations"))
    }
}

/// Sleeps a random sub-second interval, the jitter `LockConfig`'s poll
/// loop uses to avoid synchronized retries across many waiters.
pub async fn jitter_sleep(max_ms: u64) {
    let ms = rand::thread_rng().gen_range(0..=max_ms.max(1));
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[derive(Default)]
struct FakeState {
    graph: Option<ConfigData>,
    exclusive_held: bool,
    shared_count: u32,
    mac_reserved: std::collections::HashSet<String>,
    ip_reserved: std::collections::HashSet<(Uuid, String)>,
    lv_reserved: std::collections::HashSet<String>,
    pending_ip: HashMap<String, Vec<PendingIpAction>>,
    drbd_minors: HashMap<Uuid, std::collections::HashSet<u32>>,
    next_minor: u32,
}

/// An in-process stand-in for a real LockD daemon, used by tests to
/// exercise the online code paths. Not part of the public API surface a
/// production deployment would use.
pub struct FakeLockDClient {
    state: Arc<Mutex<FakeState>>,
}

impl FakeLockDClient {
    pub fn new(initial: ConfigData) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                graph: Some(initial),
                ..Default::default()
            })),
        }
    }
}

#[async_trait]
impl LockDClient for FakeLockDClient {
    async fn lock_config(&self, _ctx: &WConfdContext, shared: bool) -> Result<Option<ConfigData>> {
        loop {
            let mut st = self.state.lock().await;
            if !st.exclusive_held && (shared || st.shared_count == 0) {
                if shared {
                    st.shared_count += 1;
                } else {
                    st.exclusive_held = true;
                }
                return Ok(st.graph.clone());
            }
            drop(st);
            jitter_sleep(20).await;
        }
    }

    async fn unlock_config(&self, _ctx: &WConfdContext) -> Result<()> {
        let mut st = self.state.lock().await;
        if st.exclusive_held {
            st.exclusive_held = false;
        } else if st.shared_count > 0 {
            st.shared_count -= 1;
        }
        Ok(())
    }

    async fn read_config(&self, _ctx: &WConfdContext) -> Result<ConfigData> {
        let st = self.state.lock().await;
        st.graph
            .clone()
            .ok_or_else(|| ClusterConfigError::Configuration("no config loaded".into()))
    }

    async fn write_config(&self, _ctx: &WConfdContext, data: &ConfigData) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.exclusive_held {
            return Err(ClusterConfigError::Lock(
                "WriteConfig called without holding an exclusive lock".into(),
            ));
        }
        st.graph = Some(data.clone());
        Ok(())
    }

    async fn write_config_and_unlock(
        &self,
        ctx: &WConfdContext,
        data: &ConfigData,
    ) -> Result<()> {
        self.write_config(ctx, data).await?;
        self.unlock_config(ctx).await
    }

    async fn verify_config(&self, _ctx: &WConfdContext) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn flush_config(&self, _ctx: &WConfdContext) -> Result<()> {
        Ok(())
    }

    async fn generate_mac(&self, ctx: &WConfdContext, ec_id: &str) -> Result<String> {
        let mut attempt: u32 = 0;
        loop {
            let mut st = self.state.lock().await;
            let candidate = format!("aa:00:00:{:02x}:{:02x}:{:02x}",
                (attempt >> 16) & 0xff, (attempt >> 8) & 0xff, attempt & 0xff);
            if !st.mac_reserved.contains(&candidate) {
                st.mac_reserved.insert(candidate.clone());
                drop(st);
                self.reserve_mac(ctx, ec_id, &candidate).await.ok();
                return Ok(candidate);
            }
            attempt += 1;
            if attempt > 1_000_000 {
                return Err(ClusterConfigError::Reservation(
                    "exhausted MAC address space".into(),
                ));
            }
        }
    }

    async fn reserve_mac(&self, _ctx: &WConfdContext, _ec_id: &str, mac: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.mac_reserved.insert(mac.to_string()) {
            return Err(ClusterConfigError::Reservation(format!(
                "MAC address {mac} already reserved"
            )));
        }
        Ok(())
    }

    async fn generate_ip(&self, ctx: &WConfdContext, ec_id: &str, network: Uuid) -> Result<String> {
        let free = {
            let st = self.state.lock().await;
            let graph = st
                .graph
                .as_ref()
                .ok_or_else(|| ClusterConfigError::Configuration("no config loaded".into()))?;
            let net = graph.networks.get(&network).ok_or_else(|| {
                ClusterConfigError::no_ent(format!("unknown network {network}"))
            })?;
            net.pool
                .first_free()
                .ok_or_else(|| ClusterConfigError::Reservation("network pool exhausted".into()))?
        };
        let ip = free.to_string();
        self.reserve_ip(ctx, ec_id, network, &ip).await?;
        Ok(ip)
    }

    async fn reserve_ip(
        &self,
        _ctx: &WConfdContext,
        ec_id: &str,
        network: Uuid,
        ip: &str,
    ) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.ip_reserved.insert((network, ip.to_string())) {
            return Err(ClusterConfigError::Reservation(format!(
                "IP {ip} already reserved on network {network}"
            )));
        }
        st.pending_ip
            .entry(ec_id.to_string())
            .or_default()
            .push(PendingIpAction::Reserve {
                network,
                address: ip.to_string(),
            });
        Ok(())
    }

    async fn release_ip(&self, _ctx: &WConfdContext, network: Uuid, ip: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        st.ip_reserved.remove(&(network, ip.to_string()));
        Ok(())
    }

    async fn list_reserved_ips(&self, ec_id: &str) -> Result<Vec<PendingIpAction>> {
        let mut st = self.state.lock().await;
        Ok(st.pending_ip.remove(ec_id).unwrap_or_default())
    }

    async fn reserve_lv(&self, _ctx: &WConfdContext, _ec_id: &str, lv_name: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        if !st.lv_reserved.insert(lv_name.to_string()) {
            return Err(ClusterConfigError::Reservation(format!(
                "LV name {lv_name} already reserved"
            )));
        }
        Ok(())
    }

    async fn generate_drbd_secret(&self, _ctx: &WConfdContext, _ec_id: &str) -> Result<String> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);
        Ok(hex::encode(bytes))
    }

    async fn compute_drbd_map(&self, _ctx: &WConfdContext) -> Result<HashMap<Uuid, Vec<u32>>> {
        let st = self.state.lock().await;
        Ok(st
            .drbd_minors
            .iter()
            .map(|(k, v)| (*k, v.iter().copied().collect()))
            .collect())
    }

    async fn allocate_drbd_minor(
        &self,
        _ctx: &WConfdContext,
        _ec_id: &str,
        node: Uuid,
    ) -> Result<u32> {
        let mut st = self.state.lock().await;
        let used = st.drbd_minors.entry(node).or_default();
        let mut minor = st.next_minor;
        while used.contains(&minor) {
            minor += 1;
        }
        used.insert(minor);
        st.next_minor = minor + 1;
        Ok(minor)
    }

    async fn release_drbd_minors(&self, _ec_id: &str) -> Result<()> {
        Ok(())
    }

    async fn add_instance(&self, _ctx: &WConfdContext, _inst: &Instance) -> Result<()> {
        Ok(())
    }

    async fn drop_all_reservations(&self, ec_id: &str) -> Result<()> {
        let mut st = self.state.lock().await;
        st.pending_ip.remove(ec_id);
        Ok(())
    }
}
