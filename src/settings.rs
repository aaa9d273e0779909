// src/settings.rs

//! Process-local settings for this instance of the config core: whether it
//! runs online (talking to LockD) or offline (direct file I/O), where the
//! config file lives, and the identity this process presents to the
//! master-node-hostname check in `Session::open`.

use crate::error::{ClusterConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// The well-known on-disk location used by [`crate::store::is_cluster`].
pub const DEFAULT_CONFIG_PATH: &str = "/var/lib/clusterconf/config.data";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Path to the config blob (offline mode) or to the file LockD itself
    /// persists to (used only for `IsCluster`-style existence checks).
    #[serde(default = "default_config_path")]
    pub config_path: String,

    /// When true, no LockD RPCs are made; all access is direct file I/O.
    #[serde(default)]
    pub offline: bool,

    /// This process's hostname, compared against the master node's
    /// hostname on every offline session open.
    pub my_hostname: String,

    /// When true, skip the master-hostname-matches-me check. Used by
    /// tooling that inspects a foreign cluster's config read-only.
    #[serde(default)]
    pub accept_foreign: bool,

    /// Upper bound, in milliseconds, on the random jitter added to each
    /// `LockConfig` poll iteration.
    #[serde(default = "default_poll_jitter_ms")]
    pub poll_jitter_ms: u64,
}

fn default_config_path() -> String {
    DEFAULT_CONFIG_PATH.to_string()
}

fn default_poll_jitter_ms() -> u64 {
    500
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            offline: true,
            my_hostname: String::new(),
            accept_foreign: false,
            poll_jitter_ms: default_poll_jitter_ms(),
        }
    }
}

impl RuntimeConfig {
    /// Reads and parses a TOML settings file, the same way the teacher's
    /// server config is loaded: read to string, then `toml::from_str`.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            ClusterConfigError::Configuration(format!(
                "failed to read settings file at '{path}': {e}"
            ))
        })?;
        let config: RuntimeConfig = toml::from_str(&contents).map_err(|e| {
            ClusterConfigError::Configuration(format!("failed to parse TOML from '{path}': {e}"))
        })?;
        Ok(config)
    }
}
