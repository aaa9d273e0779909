//! Invariant 7: after any sequence of reservations under an ec_id
//! followed by `DropECReservations`, that ec_id's reserved set is empty
//! and no committed name is affected by the drop.

use clusterconf::reservations::ReservationTracker;
use proptest::prelude::*;

proptest! {
    #[test]
    fn drop_ec_reservations_always_empties_that_ec_and_nothing_else(
        ec_names in prop::collection::vec("[a-z]{1,8}", 1..20),
        other_ec_names in prop::collection::vec("[a-z]{1,8}", 0..20),
    ) {
        let mut tracker: ReservationTracker<String> = ReservationTracker::new();

        for name in &ec_names {
            tracker.reserve("under-test", name.clone());
        }
        for name in &other_ec_names {
            // Reservations under a disjoint ec_id must never be disturbed
            // by dropping "under-test" below, so give them a name prefix
            // that cannot collide with `ec_names`.
            tracker.reserve("bystander", format!("b-{name}"));
        }

        let bystander_count_before = tracker.reserved_count("bystander");

        tracker.drop_ec_reservations("under-test");

        prop_assert_eq!(tracker.reserved_count("under-test"), 0);
        for name in &ec_names {
            prop_assert!(!tracker.is_reserved(name));
        }
        prop_assert_eq!(tracker.reserved_count("bystander"), bystander_count_before);
    }
}
