// src/reservations.rs

//! Reservation managers: scarce-name allocation scoped to an execution
//! context (`ec_id`), typically a job id. A reservation is an `(ec_id,
//! name)` pair; uniqueness is enforced across the union of all committed
//! names and all currently reserved names. On success the caller commits
//! the reservation (it becomes a real entity); on failure
//! `drop_ec_reservations` releases everything that `ec_id` ever reserved.
//!
//! Two tiers exist, sharing this module's generic tracker:
//! - [`UuidPool`]: in-process, used for UUID generation regardless of
//!   online/offline mode.
//! - Every other scarce name (MACs, IPs, DRBD minors/secrets, LV names) is
//!   delegated to LockD (see [`crate::lockd`]) and is unavailable offline.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

/// A generic `(ec_id, name)` reservation tracker. Kept separate from any
/// particular name type via a type parameter so the same bookkeeping
/// backs UUIDs, MAC strings, and anything else with the same lifecycle.
#[derive(Debug, Default)]
pub struct ReservationTracker<T: std::hash::Hash + Eq + Clone> {
    by_ec: HashMap<String, HashSet<T>>,
    all_reserved: HashSet<T>,
}

impl<T: std::hash::Hash + Eq + Clone> ReservationTracker<T> {
    pub fn new() -> Self {
        Self {
            by_ec: HashMap::new(),
            all_reserved: HashSet::new(),
        }
    }

    pub fn is_reserved(&self, name: &T) -> bool {
        self.all_reserved.contains(name)
    }

    /// Records `name` as reserved under `ec_id`. Returns false (and
    /// records nothing) if the name is already reserved by anyone.
    pub fn reserve(&mut self, ec_id: &str, name: T) -> bool {
        if self.all_reserved.contains(&name) {
            return false;
        }
        self.all_reserved.insert(name.clone());
        self.by_ec.entry(ec_id.to_string()).or_default().insert(name);
        true
    }

    /// Drops every reservation owned by `ec_id`, committed or not. Used
    /// both for job failure (nothing was committed) and, for entries that
    /// *were* committed elsewhere, this only clears the in-process
    /// tracking bookkeeping -- committed names stay unique because they
    /// also exist in the entity graph itself.
    pub fn drop_ec_reservations(&mut self, ec_id: &str) {
        if let Some(names) = self.by_ec.remove(ec_id) {
            for name in names {
                self.all_reserved.remove(&name);
            }
        }
    }

    /// Removes `name` from the reserved set without it ever becoming
    /// committed (explicit release, e.g. `ReleaseIp`).
    pub fn release(&mut self, ec_id: &str, name: &T) {
        self.all_reserved.remove(name);
        if let Some(set) = self.by_ec.get_mut(ec_id) {
            set.remove(name);
        }
    }

    pub fn reserved_count(&self, ec_id: &str) -> usize {
        self.by_ec.get(ec_id).map(|s| s.len()).unwrap_or(0)
    }
}

/// In-process UUID reservation manager. Generates UUIDs that are neither
/// already present in the graph (`existing`) nor currently reserved by
/// another concurrent execution context, and records the draw so two
/// concurrent `Generate` calls never hand out the same UUID.
#[derive(Debug, Default)]
pub struct UuidPool {
    tracker: ReservationTracker<Uuid>,
}

impl UuidPool {
    pub fn new() -> Self {
        Self {
            tracker: ReservationTracker::new(),
        }
    }

    /// Draws UUIDs via `rand_fn` until one is neither in `existing` nor
    /// reserved, then records it under `ec_id`.
    pub fn generate(
        &mut self,
        existing: &HashSet<Uuid>,
        mut rand_fn: impl FnMut() -> Uuid,
        ec_id: &str,
    ) -> Uuid {
        loop {
            let candidate = rand_fn();
            if existing.contains(&candidate) {
                continue;
            }
            if self.tracker.reserve(ec_id, candidate) {
                return candidate;
            }
        }
    }

    pub fn drop_ec_reservations(&mut self, ec_id: &str) {
        self.tracker.drop_ec_reservations(ec_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_avoids_existing_and_reserved() {
        let mut pool = UuidPool::new();
        let taken = Uuid::new_v4();
        let mut existing = HashSet::new();
        existing.insert(taken);

        let mut sequence = vec![taken, taken, Uuid::new_v4()].into_iter();
        let got = pool.generate(&existing, || sequence.next().unwrap(), "job-1");
        assert_ne!(got, taken);
    }

    #[test]
    fn drop_ec_reservations_frees_the_name_for_reuse() {
        let mut tracker: ReservationTracker<String> = ReservationTracker::new();
        assert!(tracker.reserve("job-1", "mac-a".to_string()));
        assert!(!tracker.reserve("job-2", "mac-a".to_string()));

        tracker.drop_ec_reservations("job-1");
        assert_eq!(tracker.reserved_count("job-1"), 0);
        assert!(tracker.reserve("job-2", "mac-a".to_string()));
    }
}
