// src/session.rs

//! The session manager: scoped acquisition of the configuration graph
//! under shared or exclusive intent, with reentrancy, forced-exclusive
//! upgrade, and guaranteed release with optional writeback.
//!
//! Per the documented concurrency contract, `lock_count` is not protected
//! by a mutex -- each execution context (thread/task) is expected to
//! construct its own [`crate::store::ConfigStore`]. Cross-process mutual
//! exclusion is delegated to LockD.

use crate::entities::ConfigData;
use crate::error::{ClusterConfigError, Result};
use crate::lockd::{LockDClient, WConfdContext};
use crate::persistence::{self, EntsGetter, FileId};
use crate::settings::RuntimeConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

pub fn now_unix() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Per-store-instance session state (spec §4.4 "State per store instance").
pub struct Session {
    pub(crate) lock_count: u32,
    pub(crate) lock_current_shared: bool,
    pub(crate) lock_forced: bool,
    pub(crate) cached_graph: Option<ConfigData>,
    pub(crate) cached_file_id: Option<FileId>,
    pub(crate) wconfd_context: WConfdContext,
    pub(crate) offline: bool,
    pub(crate) my_hostname: String,
    pub(crate) accept_foreign: bool,
    pub(crate) config_path: PathBuf,
    pub(crate) poll_jitter_ms: u64,
    pub(crate) lockd: Arc<dyn LockDClient>,
    pub(crate) ents: Arc<dyn EntsGetter>,
}

impl Session {
    pub fn new(
        runtime: &RuntimeConfig,
        ctx: WConfdContext,
        lockd: Arc<dyn LockDClient>,
        ents: Arc<dyn EntsGetter>,
    ) -> Self {
        Self {
            lock_count: 0,
            lock_current_shared: true,
            lock_forced: false,
            cached_graph: None,
            cached_file_id: None,
            wconfd_context: ctx,
            offline: runtime.offline,
            my_hostname: runtime.my_hostname.clone(),
            accept_foreign: runtime.accept_foreign,
            config_path: PathBuf::from(&runtime.config_path),
            poll_jitter_ms: runtime.poll_jitter_ms,
            lockd,
            ents,
        }
    }

    pub fn graph(&self) -> Result<&ConfigData> {
        self.cached_graph
            .as_ref()
            .ok_or_else(|| ClusterConfigError::Programmer("no session graph loaded".into()))
    }

    pub fn graph_mut(&mut self) -> Result<&mut ConfigData> {
        self.cached_graph
            .as_mut()
            .ok_or_else(|| ClusterConfigError::Programmer("no session graph loaded".into()))
    }

    /// Opens the session under the requested intent. See spec §4.4 "Open
    /// logic".
    pub async fn open(&mut self, shared: bool, force: bool) -> Result<()> {
        if self.lock_count >= 1 {
            if self.lock_current_shared && !shared && !force {
                return Err(ClusterConfigError::Programmer(
                    "nested exclusive open requested inside a shared session without force"
                        .into(),
                ));
            }
            if self.lock_current_shared && !shared && force {
                self.lock_current_shared = false;
                self.lock_forced = true;
            }
            self.lock_count += 1;
            return Ok(());
        }

        self.lock_current_shared = shared;
        self.lock_forced = force;

        if self.offline {
            self.open_offline().await?;
        } else {
            self.open_online(shared).await?;
        }

        self.lock_count = 1;
        Ok(())
    }

    async fn open_offline(&mut self) -> Result<()> {
        let (mut graph, file_id) = persistence::load(&self.config_path).await?;

        if graph.cluster.rsahostkeypub.is_none() {
            return Err(ClusterConfigError::Configuration(
                "cluster.rsahostkeypub is not set".into(),
            ));
        }
        let master = graph.nodes.get(&graph.cluster.master_node).ok_or_else(|| {
            ClusterConfigError::Configuration(format!(
                "master_node {} is not a known node",
                graph.cluster.master_node
            ))
        })?;
        if !self.accept_foreign && master.name != self.my_hostname {
            return Err(ClusterConfigError::Configuration(format!(
                "this host ({}) is not the configured master node ({})",
                self.my_hostname, master.name
            )));
        }

        let mut uuid_pool = crate::reservations::UuidPool::new();
        let changed = crate::store::upgrade_on_load(&mut graph, &mut uuid_pool, now_unix());
        uuid_pool.drop_ec_reservations("upgrade");

        let file_id = if changed {
            info!("config graph changed during upgrade-on-load, saving back to disk");
            persistence::save(&self.config_path, file_id, &graph, self.ents.as_ref()).await?
        } else {
            file_id
        };

        self.cached_graph = Some(graph);
        self.cached_file_id = Some(file_id);
        Ok(())
    }

    async fn open_online(&mut self, shared: bool) -> Result<()> {
        if shared {
            if self.cached_graph.is_some() {
                debug!("shared open reusing cached graph (online, cache assumed fresh)");
                return Ok(());
            }
            let graph = self.lockd.read_config(&self.wconfd_context).await?;
            self.cached_graph = Some(graph);
            return Ok(());
        }

        loop {
            match self.lockd.lock_config(&self.wconfd_context, shared).await? {
                Some(graph) => {
                    self.cached_graph = Some(graph);
                    return Ok(());
                }
                None => {
                    // Granted in shared mode with an already-fresh cache,
                    // or (exclusive) will be retried below.
                    if self.cached_graph.is_some() {
                        return Ok(());
                    }
                    crate::lockd::jitter_sleep(self.poll_jitter_ms).await;
                }
            }
        }
    }

    /// Closes the outermost open frame. `success == false` means the
    /// caller's body raised; mutations (if any) are discarded rather than
    /// committed. See spec §4.4 "Close logic".
    pub async fn close(&mut self, success: bool) -> Result<()> {
        if self.lock_count == 0 {
            return Err(ClusterConfigError::Programmer(
                "Session::close called without a matching open".into(),
            ));
        }
        self.lock_count -= 1;
        if self.lock_count > 0 {
            return Ok(());
        }

        let was_exclusive = !self.lock_current_shared;

        if was_exclusive {
            if success {
                self.commit().await?;
            } else {
                warn!("exclusive session aborted, discarding in-memory mutations");
                self.cached_graph = None;
                self.cached_file_id = None;
                if !self.offline {
                    self.lockd.unlock_config(&self.wconfd_context).await?;
                }
            }
        } else if !self.lock_forced && !self.offline {
            self.lockd.unlock_config(&self.wconfd_context).await?;
        }

        self.lock_forced = false;
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        let graph = self
            .cached_graph
            .clone()
            .ok_or_else(|| ClusterConfigError::Programmer("commit with no graph loaded".into()))?;

        if self.offline {
            let expected = self.cached_file_id.ok_or_else(|| {
                ClusterConfigError::Programmer("commit offline with no file id".into())
            })?;
            let new_id =
                persistence::save(&self.config_path, expected, &graph, self.ents.as_ref()).await?;
            self.cached_file_id = Some(new_id);
        } else {
            self.lockd
                .write_config_and_unlock(&self.wconfd_context, &graph)
                .await?;
        }

        let verify_errors = crate::verify::verify(&graph);
        if !verify_errors.is_empty() {
            for err in &verify_errors {
                tracing::error!(error = %err, "post-commit config verification finding");
            }
        }
        Ok(())
    }
}
