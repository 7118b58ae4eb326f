//! Property-based tests for the split algebra.
//!
//! Tests invariants like:
//! - normalize never keeps the lowest relevant bit and is idempotent
//! - both sides of an unrooted split normalize to the same bitmask
//! - single taxa and their complements are trivial
//! - compatibility is symmetric

use phylo_splits::bitset::{self, Bitset};
use proptest::prelude::*;

/// A fill of `n` taxa and a mask inside it, spanning up to two words.
fn split_strategy() -> impl Strategy<Value = (Bitset, Bitset)> {
    (2usize..=128, any::<u64>(), any::<u64>()).prop_map(|(n, lo, hi)| {
        let fill = Bitset::filled(n);
        let mask = &Bitset::from_words(vec![lo, hi]) & &fill;
        (mask, fill)
    })
}

/// A split as above plus a lowest relevant bit anywhere inside the fill.
fn anchored_split_strategy() -> impl Strategy<Value = (Bitset, Bitset, usize)> {
    split_strategy().prop_flat_map(|(mask, fill)| {
        let n = fill.count_ones();
        (Just(mask), Just(fill), 0..n)
    })
}

proptest! {
    #[test]
    fn normalize_clears_lowest_bit((mask, fill, lowest) in anchored_split_strategy()) {
        let normalized = bitset::normalize(&mask, &fill, lowest);
        prop_assert!(!normalized.contains(lowest));
        prop_assert!(normalized.is_subset_of(&fill));
        if !mask.contains(lowest) {
            prop_assert_eq!(normalized, mask);
        }
    }

    #[test]
    fn normalize_is_idempotent((mask, fill, lowest) in anchored_split_strategy()) {
        let once = bitset::normalize(&mask, &fill, lowest);
        let twice = bitset::normalize(&once, &fill, lowest);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn both_sides_normalize_alike((mask, fill, lowest) in anchored_split_strategy()) {
        let complement = fill.difference(&mask);
        prop_assert_eq!(
            bitset::normalize(&mask, &fill, lowest),
            bitset::normalize(&complement, &fill, lowest)
        );
    }

    #[test]
    fn single_taxa_are_trivial(n in 2usize..=128, idx in 0usize..128) {
        let idx = idx % n;
        let fill = Bitset::filled(n);
        let single = Bitset::singleton(idx);
        prop_assert!(bitset::is_trivial(&single, &fill));
        prop_assert!(bitset::is_trivial(&fill.difference(&single), &fill));
    }

    #[test]
    fn compatibility_is_symmetric((m1, fill) in split_strategy(), lo in any::<u64>(), hi in any::<u64>()) {
        let m2 = &Bitset::from_words(vec![lo, hi]) & &fill;
        prop_assert_eq!(
            bitset::is_compatible(&m1, &m2, &fill),
            bitset::is_compatible(&m2, &m1, &fill)
        );
    }

    #[test]
    fn split_is_compatible_with_itself_and_complement((mask, fill) in split_strategy()) {
        prop_assert!(bitset::is_compatible(&mask, &mask, &fill));
        prop_assert!(bitset::is_compatible(&mask, &fill.difference(&mask), &fill));
    }

    #[test]
    fn nested_splits_are_compatible((mask, fill) in split_strategy(), keep in any::<u64>()) {
        let inner = &mask & &Bitset::from_words(vec![keep, keep]);
        prop_assert!(inner.is_subset_of(&mask));
        prop_assert!(bitset::is_compatible(&inner, &mask, &fill));
    }
}
