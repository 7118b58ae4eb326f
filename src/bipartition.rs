//! Bipartitions: the split of a tree's taxa induced by one edge.
//!
//! # What is a bipartition?
//! Each edge in a tree divides the leaves into two groups.
//! For example:
//! ```text
//!      root
//!     /    \
//!   {A,B}  {C,D}  ← This edge creates the split {A,B}|{C,D}
//! ```
//!
//! A [`Bipartition`] keeps three masks:
//! - `leafset_bitmask`: taxa below the edge (tree-local, unnormalized)
//! - `tree_leafset_bitmask`: all taxa of the owning tree
//! - `split_bitmask`: the tree-independent identity of the split
//!
//! For rooted trees the split is the leafset itself. For unrooted trees the
//! split is normalized to the side *without* the tree's lowest taxon, so the
//! same split has one bitmask no matter how the tree is drawn.
//!
//! Bipartitions are only mutable through [`BipartitionBuilder`]; once
//! [`BipartitionBuilder::freeze`] is called the value is immutable and
//! hashes on its split.

use crate::bitset::{self, Bitset};
use crate::taxon::TaxonNamespace;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Mutable bipartition under construction.
#[derive(Debug, Clone, Default)]
pub struct BipartitionBuilder {
    leafset_bitmask: Bitset,
    tree_leafset_bitmask: Bitset,
    is_rooted: bool,
    split_bitmask: Option<Bitset>,
}

impl BipartitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_leafset_bitmask(&mut self, leafset: Bitset) -> &mut Self {
        self.leafset_bitmask = leafset;
        self.split_bitmask = None;
        self
    }

    pub fn set_tree_leafset_bitmask(&mut self, tree_leafset: Bitset) -> &mut Self {
        self.tree_leafset_bitmask = tree_leafset;
        self.split_bitmask = None;
        self
    }

    pub fn set_rooted(&mut self, is_rooted: bool) -> &mut Self {
        self.is_rooted = is_rooted;
        self.split_bitmask = None;
        self
    }

    /// Sets all inputs and computes the split bitmask.
    pub fn compile(&mut self, leafset: Bitset, tree_leafset: Bitset, is_rooted: bool) -> &Bitset {
        self.leafset_bitmask = leafset;
        self.tree_leafset_bitmask = tree_leafset;
        self.is_rooted = is_rooted;
        self.split_bitmask
            .insert(compile_split(&self.leafset_bitmask, &self.tree_leafset_bitmask, is_rooted))
    }

    /// Consumes the builder, compiling the split if that has not happened.
    pub fn freeze(self) -> Bipartition {
        let split_bitmask = self.split_bitmask.unwrap_or_else(|| {
            compile_split(&self.leafset_bitmask, &self.tree_leafset_bitmask, self.is_rooted)
        });
        Bipartition {
            split_bitmask,
            leafset_bitmask: self.leafset_bitmask,
            tree_leafset_bitmask: self.tree_leafset_bitmask,
            is_rooted: self.is_rooted,
        }
    }
}

fn compile_split(leafset: &Bitset, tree_leafset: &Bitset, is_rooted: bool) -> Bitset {
    if is_rooted {
        return leafset.clone();
    }
    match tree_leafset.lowest_set_bit() {
        Some(lowest) => bitset::normalize(leafset, tree_leafset, lowest),
        None => leafset & tree_leafset,
    }
}

/// A frozen split. Equality, hashing and ordering use `split_bitmask` only.
#[derive(Debug, Clone)]
pub struct Bipartition {
    split_bitmask: Bitset,
    leafset_bitmask: Bitset,
    tree_leafset_bitmask: Bitset,
    is_rooted: bool,
}

impl Bipartition {
    /// Builds, compiles and freezes in one step.
    pub fn new(leafset: Bitset, tree_leafset: Bitset, is_rooted: bool) -> Self {
        let mut builder = BipartitionBuilder::new();
        builder.compile(leafset, tree_leafset, is_rooted);
        builder.freeze()
    }

    pub fn split_bitmask(&self) -> &Bitset {
        &self.split_bitmask
    }

    pub fn leafset_bitmask(&self) -> &Bitset {
        &self.leafset_bitmask
    }

    pub fn tree_leafset_bitmask(&self) -> &Bitset {
        &self.tree_leafset_bitmask
    }

    pub fn is_rooted(&self) -> bool {
        self.is_rooted
    }

    /// True if the split isolates at most one taxon.
    pub fn is_trivial(&self) -> bool {
        bitset::is_trivial(&self.split_bitmask, &self.tree_leafset_bitmask)
    }

    pub fn is_compatible_with(&self, other: &Bipartition) -> bool {
        bitset::is_compatible(
            &self.split_bitmask,
            &other.split_bitmask,
            &self.tree_leafset_bitmask,
        )
    }

    pub fn is_incompatible_with(&self, other: &Bipartition) -> bool {
        !self.is_compatible_with(other)
    }

    /// True if this split's bitmask is a subset of `other`'s.
    pub fn is_nested_within(&self, other: &Bipartition) -> bool {
        self.split_bitmask.is_subset_of(&other.split_bitmask)
    }

    /// True if this edge's leafset lies within `other`'s leafset.
    pub fn is_leafset_nested_within(&self, other: &Bipartition) -> bool {
        self.leafset_bitmask.is_subset_of(&other.leafset_bitmask)
    }

    pub fn split_as_bitstring(&self, namespace: &TaxonNamespace, symbol0: char, symbol1: char, reverse: bool) -> String {
        self.split_bitmask
            .as_bitstring(namespace.len(), symbol0, symbol1, reverse)
    }

    pub fn leafset_as_bitstring(&self, namespace: &TaxonNamespace, symbol0: char, symbol1: char, reverse: bool) -> String {
        self.leafset_bitmask
            .as_bitstring(namespace.len(), symbol0, symbol1, reverse)
    }

    /// Labels of the taxa below this edge.
    pub fn leafset_labels<'a>(&self, namespace: &'a TaxonNamespace) -> Vec<&'a str> {
        namespace.bitmask_labels(&self.leafset_bitmask)
    }
}

impl PartialEq for Bipartition {
    fn eq(&self, other: &Self) -> bool {
        self.split_bitmask == other.split_bitmask
    }
}

impl Eq for Bipartition {}

impl Hash for Bipartition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.split_bitmask.hash(state);
    }
}

impl Ord for Bipartition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.split_bitmask.cmp(&other.split_bitmask)
    }
}

impl PartialOrd for Bipartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use test_log::test;

    #[test]
    fn test_rooted_split_is_leafset() {
        let bp = Bipartition::new(Bitset::from_u64(0b0011), Bitset::from_u64(0b1111), true);
        assert_eq!(bp.split_bitmask(), &Bitset::from_u64(0b0011));
        assert!(bp.is_rooted());
    }

    /// Unrooted: {A,B} contains A → flip to {C,D}; {C,D} kept as-is.
    #[test]
    fn test_unrooted_split_is_normalized() {
        let fill = Bitset::from_u64(0b1111);
        let ab = Bipartition::new(Bitset::from_u64(0b0011), fill.clone(), false);
        let cd = Bipartition::new(Bitset::from_u64(0b1100), fill, false);

        assert_eq!(ab.split_bitmask(), &Bitset::from_u64(0b1100));
        assert_eq!(ab, cd);
        assert_eq!(ab.leafset_bitmask(), &Bitset::from_u64(0b0011));

        let set: HashSet<Bipartition> = [ab, cd].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    /// The lowest taxon of the *tree* decides, not taxon 0 of the namespace.
    #[test]
    fn test_normalization_uses_tree_lowest_bit() {
        let tree_leafset = Bitset::from_u64(0b11100);
        let bp = Bipartition::new(Bitset::from_u64(0b01100), tree_leafset, false);
        assert_eq!(bp.split_bitmask(), &Bitset::from_u64(0b10000));
    }

    #[test]
    fn test_builder_recompiles_after_edit() {
        let mut builder = BipartitionBuilder::new();
        builder.compile(Bitset::from_u64(0b01), Bitset::from_u64(0b11), false);
        builder.set_rooted(true);
        let bp = builder.freeze();
        assert_eq!(bp.split_bitmask(), &Bitset::from_u64(0b01));
    }

    #[test]
    fn test_relations() {
        let fill = Bitset::filled(5);
        let ab = Bipartition::new(Bitset::from_indices([0, 1]), fill.clone(), true);
        let abc = Bipartition::new(Bitset::from_indices([0, 1, 2]), fill.clone(), true);
        let bc = Bipartition::new(Bitset::from_indices([1, 2]), fill.clone(), true);
        let leaf = Bipartition::new(Bitset::singleton(4), fill, true);

        assert!(ab.is_nested_within(&abc));
        assert!(ab.is_leafset_nested_within(&abc));
        assert!(ab.is_compatible_with(&abc));
        assert!(ab.is_incompatible_with(&bc));
        assert!(leaf.is_trivial());
        assert!(!ab.is_trivial());
    }

    #[test]
    fn test_rendering() {
        let ns = TaxonNamespace::from_labels(["A", "B", "C", "D"]).unwrap();
        let bp = Bipartition::new(Bitset::from_u64(0b0011), ns.all_taxa_bitmask(), false);
        assert_eq!(bp.split_as_bitstring(&ns, '.', '*', false), "**..");
        assert_eq!(bp.leafset_as_bitstring(&ns, '.', '*', true), "**..");
        assert_eq!(bp.leafset_labels(&ns), vec!["A", "B"]);
    }
}
