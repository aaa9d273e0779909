//! `ssconf` relies on `nice_sort` being a genuine total order (a
//! permutation of the input, stable under re-sorting) for its
//! newline-joined value lists to be deterministic byte-for-byte.

use clusterconf::nicesort::{nice_cmp, nice_sorted};
use proptest::prelude::*;
use std::cmp::Ordering;

proptest! {
    #[test]
    fn sorting_is_a_permutation_of_the_input(
        items in prop::collection::vec("[a-zA-Z0-9]{0,6}", 0..20),
    ) {
        let sorted = nice_sorted(items.clone());

        let mut expected = items.clone();
        expected.sort();
        let mut actual = sorted.clone();
        actual.sort();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn sorting_is_idempotent(
        items in prop::collection::vec("[a-zA-Z0-9]{0,6}", 0..20),
    ) {
        let once = nice_sorted(items);
        let twice = nice_sorted(once.clone());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn nice_cmp_agrees_with_itself_reversed(
        a in "[a-zA-Z0-9]{0,8}",
        b in "[a-zA-Z0-9]{0,8}",
    ) {
        let forward = nice_cmp(&a, &b);
        let backward = nice_cmp(&b, &a);
        prop_assert_eq!(forward.reverse(), backward);
    }

    #[test]
    fn numeric_runs_compare_numerically_not_lexically(
        low in 0u32..10_000,
        high in 0u32..10_000,
    ) {
        prop_assume!(low < high);
        let a = format!("node{low}");
        let b = format!("node{high}");
        prop_assert_eq!(nice_cmp(&a, &b), Ordering::Less);
    }
}
