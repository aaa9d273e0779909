// src/persistence.rs

//! Offline-path persistence: read/write the entire config blob to a single
//! file, atomically, while detecting concurrent external modification via
//! a file identity token derived from inode/mtime/size.

use crate::entities::ConfigData;
use crate::error::{ClusterConfigError, Result};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

/// An opaque token identifying "this exact version of the file on disk".
/// Two tokens compare equal iff inode, mtime (nanosecond), and size all
/// match -- good enough to detect "someone else replaced this file since
/// we last read it" without needing a content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileId {
    inode: u64,
    mtime_nanos: i128,
    size: u64,
}

/// Resolves the group identity ("confd") that persisted config files
/// should be owned by. Pluggable so tests and non-Unix-privileged
/// environments don't need a real system group to exist.
pub trait EntsGetter: Send + Sync {
    fn confd_gid(&self) -> Option<u32>;
}

/// The default resolver: no group change is attempted. Production
/// deployments supply a resolver backed by `getent group confd` or
/// equivalent.
pub struct NoopEntsGetter;

impl EntsGetter for NoopEntsGetter {
    fn confd_gid(&self) -> Option<u32> {
        None
    }
}

const PERSISTED_MODE: u32 = 0o640;

async fn file_id(path: &Path) -> Result<FileId> {
    let meta = fs::metadata(path).await?;
    Ok(FileId {
        inode: meta.ino(),
        mtime_nanos: meta.mtime() as i128 * 1_000_000_000 + meta.mtime_nsec() as i128,
        size: meta.size(),
    })
}

/// Reads the config file, validates its version, and returns the parsed
/// graph plus the file identity token callers must present to `save`.
pub async fn load(path: &Path) -> Result<(ConfigData, FileId)> {
    debug!(?path, "loading config graph from disk");
    let bytes = fs::read(path).await?;
    let id = file_id(path).await?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)?;
    let data = ConfigData::from_value(value)?;
    info!(serial_no = data.serial_no, "config graph loaded");
    Ok((data, id))
}

/// Atomically replaces the config file with `data`'s serialized form,
/// first checking that nobody modified the file since `expected`. Writes
/// to a temp sibling, sets mode `0640` (and group ownership via
/// `ents`), then renames into place -- rename failure is fatal to the
/// save; the in-memory graph is left intact for the caller to retry or
/// discard.
pub async fn save(
    path: &Path,
    expected: FileId,
    data: &ConfigData,
    ents: &dyn EntsGetter,
) -> Result<FileId> {
    let actual = file_id(path).await.map_err(|e| {
        ClusterConfigError::Lock(format!(
            "cannot verify config file identity before save: {e}"
        ))
    })?;
    if actual != expected {
        return Err(ClusterConfigError::Lock(
            "config file was modified externally since it was loaded".to_string(),
        ));
    }

    let value = data.to_value()?;
    let serialized = serde_json::to_vec_pretty(&value)?;

    let tmp_path = temp_sibling(path);
    fs::write(&tmp_path, &serialized).await?;

    let perms = std::fs::Permissions::from_mode(PERSISTED_MODE);
    fs::set_permissions(&tmp_path, perms).await?;

    if let Some(gid) = ents.confd_gid() {
        // Best-effort: chown requires privileges this process may not
        // have; failure here must not abort the save.
        if let Err(e) = chown_group(&tmp_path, gid) {
            warn!(error = %e, "failed to set confd group ownership on config file");
        }
    }

    fs::rename(&tmp_path, path).await.map_err(|e| {
        ClusterConfigError::Configuration(format!(
            "failed to atomically replace config file (rename {tmp_path:?} -> {path:?}): {e}"
        ))
    })?;

    let new_id = file_id(path).await?;
    info!(serial_no = data.serial_no, "config graph saved");
    Ok(new_id)
}

fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let file_name = path
        .file_name()
        .map(|f| f.to_string_lossy().to_string())
        .unwrap_or_else(|| "config.data".to_string());
    path.with_file_name(format!(".{file_name}.new"))
}

#[cfg(unix)]
fn chown_group(path: &Path, gid: u32) -> std::io::Result<()> {
    use std::ffi::CString;
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|_| std::io::Error::other("path contains NUL byte"))?;
    // SAFETY: `c_path` is a valid, NUL-terminated C string for the
    // duration of this call; `-1` leaves the owning uid unchanged.
    let rc = unsafe { libc::chown(c_path.as_ptr(), -1i32 as libc::uid_t, gid as libc::gid_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
