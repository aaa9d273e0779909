//! The entity model: typed records for every cluster-graph object, plus the
//! serialization and in-place migration contract every entity obeys.

pub mod cluster;
pub mod disk;
pub mod graph;
pub mod instance;
pub mod network;
pub mod node;
pub mod nodegroup;

pub use cluster::{Cluster, IpFamily};
pub use disk::{Disk, DiskDevType};
pub use graph::ConfigData;
pub use instance::{AdminState, AdminStateSource, Instance, Nic};
pub use network::Network;
pub use node::Node;
pub use nodegroup::NodeGroup;

use crate::error::Result;
use serde_json::Value;
use uuid::Uuid;

/// Current (monotonic, per-entity) lifecycle bookkeeping shared by every
/// top-level entity: a serial number for optimistic concurrency and a
/// creation/modification timestamp pair.
pub trait TimeStamped {
    fn serial_no(&self) -> u64;
    fn bump_serial(&mut self, now: f64);
    fn ctime(&self) -> f64;
    fn mtime(&self) -> f64;
}

/// The contract every top-level entity (Cluster, Node, NodeGroup, Instance,
/// Disk, Network) implements: a stable dict form for serialization, a
/// constructor from that form, an idempotent in-place upgrade step, and a
/// purely-local verification pass.
///
/// `ToDict`/`FromDict` in the original design doc map onto `serde_json`
/// here: the "dict" is a `serde_json::Value::Object`, built via
/// `serde_json::to_value`/`from_value` rather than hand-rolled field
/// walking, since every entity already derives `Serialize`/`Deserialize`.
pub trait Entity: Sized + serde::Serialize + serde::de::DeserializeOwned {
    /// Canonical dict form used for wire transport: secrets are replaced
    /// with a sentinel.
    fn to_public_dict(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Canonical dict form used for on-disk persistence: secrets included.
    /// Entities with no private fields can rely on the default, which is
    /// identical to the public form.
    fn to_private_dict(&self) -> Result<Value> {
        self.to_public_dict()
    }

    fn from_dict(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Fills defaults for fields introduced by later config versions.
    /// Must be idempotent: calling it twice in a row is a no-op the second
    /// time. Returns whether anything actually changed.
    fn upgrade_config(&mut self) -> bool {
        false
    }

    /// Local, single-entity consistency checks. Cross-entity checks live
    /// in [`crate::verify`].
    fn verify_local(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Generates a random v4 UUID, the in-process reservation manager's
/// building block (see [`crate::reservations::UuidPool`]).
pub fn new_uuid() -> Uuid {
    Uuid::new_v4()
}
