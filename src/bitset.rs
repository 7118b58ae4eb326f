//! Compact bitset representation for taxon sets in phylogenetic trees.
//!
//! # Overview
//! A bitset is an efficient way to represent which taxa sit on one side of a
//! tree edge. Each bit position corresponds to a taxon index in the
//! [`TaxonNamespace`](crate::taxon::TaxonNamespace).
//!
//! # Example
//! For a namespace with taxa [A, B, C, D] mapped to indices [0, 1, 2, 3]:
//! - Leafset {A, C} → bitset `0b0101` (bits 0 and 2 set)
//! - Leafset {B, C, D} → bitset `0b1110` (bits 1, 2, 3 set)
//!
//! Besides the [`Bitset`] type this module holds the three pure split
//! functions everything else is built on: [`normalize`], [`is_trivial`] and
//! [`is_compatible`].

use std::cmp::Ordering;
use std::ops::{BitAnd, BitOr, BitXor};

/// A compact bitset for representing which taxa belong to a leafset or split.
///
/// Internally stores bits in `Vec<u64>` words to support arbitrarily large
/// namespaces. Each u64 word holds 64 taxon indices.
///
/// # Canonical form
/// Trailing zero words are always trimmed, so two bitsets holding the same
/// bits compare and hash equal no matter how many taxa existed when each was
/// built. The empty set has no words at all.
///
/// Ordering is by numeric value (as if the words were one big unsigned
/// integer), which is what split tie-breaking relies on.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Bitset(Vec<u64>);

impl Bitset {
    /// Creates an empty bitset.
    pub fn new() -> Self {
        Bitset(Vec::new())
    }

    /// Creates a bitset from raw words (least-significant word first).
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let bs = Bitset::from_words(vec![0b101, 0, 0]);
    /// assert_eq!(bs.words(), &[0b101]);
    /// ```
    pub fn from_words(words: Vec<u64>) -> Self {
        let mut bs = Bitset(words);
        bs.trim();
        bs
    }

    /// Creates a bitset holding the bits of a single `u64`.
    pub fn from_u64(bits: u64) -> Self {
        Self::from_words(vec![bits])
    }

    /// Creates a bitset with exactly one bit set.
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let bs = Bitset::singleton(65);
    /// assert_eq!(bs.words(), &[0, 0b10]);
    /// ```
    pub fn singleton(idx: usize) -> Self {
        let mut bs = Bitset::new();
        bs.set(idx);
        bs
    }

    /// Creates a bitset with every index in `indices` set.
    pub fn from_indices<I: IntoIterator<Item = usize>>(indices: I) -> Self {
        let mut bs = Bitset::new();
        for idx in indices {
            bs.set(idx);
        }
        bs
    }

    /// Creates a bitset with the lowest `n` bits set.
    pub fn filled(n: usize) -> Self {
        let mut words = vec![u64::MAX; n >> 6];
        let rest = n & 63;
        if rest > 0 {
            words.push((1u64 << rest) - 1);
        }
        Self::from_words(words)
    }

    /// Raw words, least-significant first, without trailing zero words.
    pub fn words(&self) -> &[u64] {
        &self.0
    }

    /// Sets the bit at the given index to 1.
    ///
    /// Marks a taxon as present in this set.
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let mut bs = Bitset::new();
    /// bs.set(0);  // Mark taxon 0 as present
    /// bs.set(5);  // Mark taxon 5 as present
    /// assert_eq!(bs.words(), &[0b00100001]);
    /// ```
    #[inline]
    pub fn set(&mut self, idx: usize) {
        let word = idx >> 6; // Equivalent to idx / 64
        let bit = idx & 63; // Equivalent to idx % 64
        if word >= self.0.len() {
            self.0.resize(word + 1, 0);
        }
        self.0[word] |= 1u64 << bit;
    }

    /// Returns true if the bit at `idx` is set.
    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0
            .get(idx >> 6)
            .is_some_and(|w| w & (1u64 << (idx & 63)) != 0)
    }

    /// Performs bitwise OR with another bitset (union operation).
    ///
    /// Merges two leafsets: `self` becomes `self ∪ other`
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let mut left = Bitset::singleton(0);   // {0}
    /// let right = Bitset::singleton(1);      // {1}
    ///
    /// left.or_assign(&right);  // {0} ∪ {1} = {0, 1}
    /// assert_eq!(left.words(), &[0b11]);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        if other.0.len() > self.0.len() {
            self.0.resize(other.0.len(), 0);
        }
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Bits set in `self` but not in `other` (`self & !other`).
    ///
    /// With `self` as the fill mask this is the complement of `other` within
    /// that fill.
    pub fn difference(&self, other: &Bitset) -> Bitset {
        let words = self
            .0
            .iter()
            .enumerate()
            .map(|(i, w)| w & !other.0.get(i).copied().unwrap_or(0))
            .collect();
        Bitset::from_words(words)
    }

    /// Counts the number of set bits (population count).
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let bs = Bitset::from_indices([0, 2, 5]);
    /// assert_eq!(bs.count_ones(), 3);
    /// ```
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Index of the lowest set bit, or `None` for the empty set.
    pub fn lowest_set_bit(&self) -> Option<usize> {
        self.0
            .iter()
            .enumerate()
            .find(|(_, w)| **w != 0)
            .map(|(i, w)| (i << 6) + w.trailing_zeros() as usize)
    }

    /// Returns true if every bit of `self` is also set in `other`.
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.0
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.0.get(i).copied().unwrap_or(0) == 0)
    }

    /// Returns true if `self` and `other` share at least one bit.
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.0.iter().zip(&other.0).any(|(a, b)| a & b != 0)
    }

    /// Iterates over the indices of the set bits, lowest first.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().flat_map(|(i, &word)| {
            let mut w = word;
            std::iter::from_fn(move || {
                if w == 0 {
                    return None;
                }
                let bit = w.trailing_zeros() as usize;
                w &= w - 1;
                Some((i << 6) + bit)
            })
        })
    }

    /// Renders the lowest `width` bits as a fixed-width string.
    ///
    /// By default the most-significant bit (the last taxon) comes first, as
    /// in a binary literal. With `reverse` the first taxon comes first.
    ///
    /// # Example
    /// ```
    /// # use phylo_splits::bitset::Bitset;
    /// let bs = Bitset::from_indices([0, 1]);
    /// assert_eq!(bs.as_bitstring(5, '.', '*', false), "...**");
    /// assert_eq!(bs.as_bitstring(5, '.', '*', true), "**...");
    /// ```
    pub fn as_bitstring(&self, width: usize, symbol0: char, symbol1: char, reverse: bool) -> String {
        let symbol = |i: usize| if self.contains(i) { symbol1 } else { symbol0 };
        if reverse {
            (0..width).map(symbol).collect()
        } else {
            (0..width).rev().map(symbol).collect()
        }
    }

    fn trim(&mut self) {
        while self.0.last() == Some(&0) {
            self.0.pop();
        }
    }

    fn zip_words(&self, other: &Bitset, op: impl Fn(u64, u64) -> u64) -> Bitset {
        let len = self.0.len().max(other.0.len());
        let words = (0..len)
            .map(|i| {
                op(
                    self.0.get(i).copied().unwrap_or(0),
                    other.0.get(i).copied().unwrap_or(0),
                )
            })
            .collect();
        Bitset::from_words(words)
    }
}

impl Ord for Bitset {
    fn cmp(&self, other: &Self) -> Ordering {
        // Trimmed: more words means a larger value.
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.iter().rev().cmp(other.0.iter().rev()))
    }
}

impl PartialOrd for Bitset {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl BitAnd for &Bitset {
    type Output = Bitset;

    fn bitand(self, rhs: &Bitset) -> Bitset {
        self.zip_words(rhs, |a, b| a & b)
    }
}

impl BitOr for &Bitset {
    type Output = Bitset;

    fn bitor(self, rhs: &Bitset) -> Bitset {
        self.zip_words(rhs, |a, b| a | b)
    }
}

impl BitXor for &Bitset {
    type Output = Bitset;

    fn bitxor(self, rhs: &Bitset) -> Bitset {
        self.zip_words(rhs, |a, b| a ^ b)
    }
}

/// Canonicalize a split so it never contains `lowest_relevant_bit`.
///
/// If the bit at `lowest_relevant_bit` is set in `bitmask`, the complement
/// within `fill` is returned; otherwise `bitmask & fill`. Both sides of an
/// unrooted edge therefore map to the same bitset.
///
/// # Example
/// Taxa A=0, B=1, C=2, D=3, fill `0b1111`:
/// - {A,B} `0b0011` has A → `0b1100`
/// - {C,D} `0b1100` has no A → `0b1100`
pub fn normalize(bitmask: &Bitset, fill: &Bitset, lowest_relevant_bit: usize) -> Bitset {
    if bitmask.contains(lowest_relevant_bit) {
        fill.difference(bitmask)
    } else {
        bitmask & fill
    }
}

/// Returns true if the split isolates at most one taxon on either side.
///
/// Empty and full masks are trivial, as are single taxa and the complements
/// of single taxa within `fill`.
pub fn is_trivial(bitmask: &Bitset, fill: &Bitset) -> bool {
    let masked = bitmask & fill;
    if masked.is_empty() || masked == *fill {
        return true;
    }
    masked.count_ones() == 1 || fill.difference(&masked).count_ones() == 1
}

/// Four-quadrant compatibility test for two unrooted splits.
///
/// Two splits are compatible iff at least one of `m1 ∩ m2`, `m1 ∩ ¬m2`,
/// `¬m1 ∩ m2`, `¬m1 ∩ ¬m2` (complements taken within `fill`) is empty.
pub fn is_compatible(m1: &Bitset, m2: &Bitset, fill: &Bitset) -> bool {
    let m1 = m1 & fill;
    let m2 = m2 & fill;
    let c1 = fill.difference(&m1);
    let c2 = fill.difference(&m2);
    !m1.intersects(&m2) || !m1.intersects(&c2) || !c1.intersects(&m2) || !c1.intersects(&c2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_bitset_basic() {
        let mut bs = Bitset::new();
        bs.set(0);
        bs.set(2);
        assert_eq!(bs.words(), &[0b0101]);
        assert!(bs.contains(2));
        assert!(!bs.contains(1));
        assert!(!bs.contains(500));
    }

    #[test]
    fn test_bitset_or() {
        let mut bs1 = Bitset::from_indices([0, 1]);
        let bs2 = Bitset::from_indices([2, 3]);

        bs1.or_assign(&bs2);
        assert_eq!(bs1.words(), &[0b1111]);
    }

    #[test]
    fn test_large_bitset() {
        // More than 64 taxa (multiple words)
        let bs = Bitset::from_indices([0, 63, 64, 127]);

        assert_eq!(bs.count_ones(), 4);
        assert_eq!(bs.words(), &[1u64 | (1u64 << 63), 1u64 | (1u64 << 63)]);
        assert_eq!(bs.ones().collect::<Vec<_>>(), vec![0, 63, 64, 127]);
    }

    #[test]
    fn test_trimmed_equality() {
        let a = Bitset::from_words(vec![0b11, 0, 0]);
        let b = Bitset::from_u64(0b11);
        assert_eq!(a, b);

        let high = Bitset::singleton(70);
        let diff = &high ^ &high;
        assert!(diff.is_empty());
        assert_eq!(diff, Bitset::new());
    }

    #[test]
    fn test_numeric_ordering() {
        let small = Bitset::from_u64(u64::MAX);
        let large = Bitset::singleton(64);
        assert!(small < large);
        assert!(Bitset::from_u64(0b100) > Bitset::from_u64(0b011));
        assert!(Bitset::new() < Bitset::singleton(0));
    }

    #[test]
    fn test_filled_and_lowest_bit() {
        assert_eq!(Bitset::filled(4).words(), &[0b1111]);
        assert_eq!(Bitset::filled(64).words(), &[u64::MAX]);
        assert_eq!(Bitset::filled(65).count_ones(), 65);
        assert_eq!(Bitset::filled(0), Bitset::new());

        assert_eq!(Bitset::from_indices([66, 70]).lowest_set_bit(), Some(66));
        assert_eq!(Bitset::new().lowest_set_bit(), None);
    }

    #[test]
    fn test_subset_and_difference() {
        let fill = Bitset::filled(5);
        let ab = Bitset::from_indices([0, 1]);
        assert!(ab.is_subset_of(&fill));
        assert!(!fill.is_subset_of(&ab));
        assert_eq!(fill.difference(&ab), Bitset::from_indices([2, 3, 4]));
        assert!(ab.intersects(&fill));
        assert!(!ab.intersects(&Bitset::singleton(3)));
    }

    /// Both sides of the unrooted split {A,B}|{C,D} normalize to {C,D}.
    #[test]
    fn test_normalize_unrooted_sides() {
        let fill = Bitset::filled(4);
        let ab = Bitset::from_u64(0b0011);
        let cd = Bitset::from_u64(0b1100);
        assert_eq!(normalize(&ab, &fill, 0), cd);
        assert_eq!(normalize(&cd, &fill, 0), cd);
    }

    #[test]
    fn test_is_trivial() {
        let fill = Bitset::filled(5);
        assert!(is_trivial(&Bitset::new(), &fill));
        assert!(is_trivial(&fill, &fill));
        assert!(is_trivial(&Bitset::singleton(3), &fill));
        // complement of a single taxon
        assert!(is_trivial(&Bitset::from_indices([0, 1, 2, 3]), &fill));
        assert!(!is_trivial(&Bitset::from_indices([0, 1]), &fill));
    }

    #[test]
    fn test_is_compatible() {
        let fill = Bitset::filled(5);
        let ab = Bitset::from_indices([0, 1]);
        let abc = Bitset::from_indices([0, 1, 2]);
        let bc = Bitset::from_indices([1, 2]);
        let de = Bitset::from_indices([3, 4]);

        // nested
        assert!(is_compatible(&ab, &abc, &fill));
        // disjoint
        assert!(is_compatible(&ab, &de, &fill));
        // overlapping
        assert!(!is_compatible(&ab, &bc, &fill));
        assert!(!is_compatible(&bc, &ab, &fill));
    }

    #[test]
    fn test_bitstring_rendering() {
        let bs = Bitset::from_indices([0, 3]);
        assert_eq!(bs.as_bitstring(4, '0', '1', false), "1001");
        assert_eq!(Bitset::singleton(0).as_bitstring(4, '0', '1', false), "0001");
        assert_eq!(Bitset::singleton(0).as_bitstring(4, '0', '1', true), "1000");
    }
}
