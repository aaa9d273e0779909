// src/error.rs

//! Defines the error taxonomy for the entire configuration core.

use std::sync::Arc;
use thiserror::Error;

/// Stable error codes surfaced to user-facing callers, mirroring the
/// `ECODE_*` family from the original implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// The named entity does not exist.
    NoEnt,
    /// An entity with that name/identity already exists.
    Exists,
    /// The request itself is malformed or inconsistent.
    Invalid,
    /// A uniqueness constraint would be violated.
    NotUnique,
    /// The resource exists but is temporarily unavailable (e.g. locked).
    TempNotAvailable,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorCode::NoEnt => "ECODE_NOENT",
            ErrorCode::Exists => "ECODE_EXISTS",
            ErrorCode::Invalid => "ECODE_INVAL",
            ErrorCode::NotUnique => "ECODE_NOTUNIQUE",
            ErrorCode::TempNotAvailable => "ECODE_TEMP_NOREPLY",
        };
        write!(f, "{s}")
    }
}

/// The main error enum for the configuration core. Using `thiserror` gives
/// clean `Display` impls and automatic `From` conversions for the IO/JSON
/// boundary.
#[derive(Error, Debug)]
pub enum ClusterConfigError {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error(
        "Configuration version mismatch: on-disk version {found} does not match compiled version {expected}"
    )]
    VersionMismatch { found: u32, expected: u32 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Reservation error: {0}")]
    Reservation(String),

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("{code}: {msg}")]
    OpPrereq { code: ErrorCode, msg: String },

    #[error("Operational error: {0}")]
    OpExec(String),

    #[error("Programmer error (internal API misuse): {0}")]
    Programmer(String),
}

impl Clone for ClusterConfigError {
    fn clone(&self) -> Self {
        match self {
            ClusterConfigError::Io(e) => ClusterConfigError::Io(Arc::clone(e)),
            ClusterConfigError::VersionMismatch { found, expected } => {
                ClusterConfigError::VersionMismatch {
                    found: *found,
                    expected: *expected,
                }
            }
            ClusterConfigError::Configuration(s) => ClusterConfigError::Configuration(s.clone()),
            ClusterConfigError::Reservation(s) => ClusterConfigError::Reservation(s.clone()),
            ClusterConfigError::Lock(s) => ClusterConfigError::Lock(s.clone()),
            ClusterConfigError::OpPrereq { code, msg } => ClusterConfigError::OpPrereq {
                code: *code,
                msg: msg.clone(),
            },
            ClusterConfigError::OpExec(s) => ClusterConfigError::OpExec(s.clone()),
            ClusterConfigError::Programmer(s) => ClusterConfigError::Programmer(s.clone()),
        }
    }
}

impl From<std::io::Error> for ClusterConfigError {
    fn from(e: std::io::Error) -> Self {
        ClusterConfigError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for ClusterConfigError {
    fn from(e: serde_json::Error) -> Self {
        ClusterConfigError::Configuration(format!("JSON (de)serialization error: {e}"))
    }
}

impl From<uuid::Error> for ClusterConfigError {
    fn from(e: uuid::Error) -> Self {
        ClusterConfigError::Programmer(format!("invalid UUID: {e}"))
    }
}

impl ClusterConfigError {
    pub fn no_ent(msg: impl Into<String>) -> Self {
        ClusterConfigError::OpPrereq {
            code: ErrorCode::NoEnt,
            msg: msg.into(),
        }
    }

    pub fn exists(msg: impl Into<String>) -> Self {
        ClusterConfigError::OpPrereq {
            code: ErrorCode::Exists,
            msg: msg.into(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        ClusterConfigError::OpPrereq {
            code: ErrorCode::Invalid,
            msg: msg.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClusterConfigError>;
