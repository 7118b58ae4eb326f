//! Taxon namespace: the registry that assigns every taxon its bit.
//!
//! Every taxon gets a stable, monotonically increasing index that is never
//! reused. Index `i` is bit `i` in every [`Bitset`] built against the
//! namespace, so all trees that are compared or aggregated together must
//! share one namespace (the same `Arc`).
//!
//! # Why sort labels?
//! Node ids are assigned during parsing and differ across files; taxon names
//! are consistent. [`TaxonNamespace::from_phylotrees`] sorts leaf names
//! alphabetically so identical taxa always map to the same bit positions.

use crate::bitset::Bitset;
use crate::error::SplitError;
use phylotree::tree::Tree as PhyloTree;
use std::collections::{BTreeSet, HashMap};

/// A single taxon: its label and its bit index in the namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Taxon {
    index: usize,
    label: String,
}

impl Taxon {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// Ordered registry of taxa.
#[derive(Debug, Clone, Default)]
pub struct TaxonNamespace {
    taxa: Vec<Taxon>,
    by_label: HashMap<String, usize>,
}

impl TaxonNamespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a namespace with one taxon per label, in the given order.
    ///
    /// # Errors
    /// `InvalidArgument` if a label occurs twice.
    pub fn from_labels<I, S>(labels: I) -> Result<Self, SplitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ns = TaxonNamespace::new();
        for label in labels {
            let label = label.into();
            if ns.by_label.contains_key(&label) {
                return Err(SplitError::InvalidArgument(format!(
                    "duplicate taxon label '{label}'"
                )));
            }
            ns.require_taxon(&label);
        }
        Ok(ns)
    }

    /// Builds a namespace from the leaf names of a tree sample.
    ///
    /// Leaf names are collected across all trees and sorted alphabetically,
    /// so the bit layout does not depend on the order leaves were parsed in.
    ///
    /// # Errors
    /// `InvalidTree` if a leaf has no name.
    pub fn from_phylotrees(trees: &[PhyloTree]) -> Result<Self, SplitError> {
        let mut labels = BTreeSet::new();
        for tree in trees {
            for leaf_id in tree.get_leaves() {
                let name = tree.get(&leaf_id)?.name.clone().ok_or_else(|| {
                    SplitError::InvalidTree(format!("leaf {leaf_id} has no name"))
                })?;
                labels.insert(name);
            }
        }
        Self::from_labels(labels)
    }

    /// Returns the index of `label`, registering a new taxon if needed.
    pub fn require_taxon(&mut self, label: &str) -> usize {
        if let Some(&idx) = self.by_label.get(label) {
            return idx;
        }
        let index = self.taxa.len();
        self.taxa.push(Taxon {
            index,
            label: label.to_string(),
        });
        self.by_label.insert(label.to_string(), index);
        index
    }

    pub fn taxon(&self, index: usize) -> Option<&Taxon> {
        self.taxa.get(index)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.by_label.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.taxa.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taxa.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Taxon> {
        self.taxa.iter()
    }

    /// Single-bit mask of the taxon at `index`.
    pub fn taxon_bitmask(&self, index: usize) -> Bitset {
        Bitset::singleton(index)
    }

    /// Union mask of the named taxa.
    ///
    /// # Errors
    /// `InvalidArgument` if a label is not in the namespace.
    pub fn taxa_bitmask<I, S>(&self, labels: I) -> Result<Bitset, SplitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut mask = Bitset::new();
        for label in labels {
            let label = label.as_ref();
            let idx = self.index_of(label).ok_or_else(|| {
                SplitError::InvalidArgument(format!("taxon '{label}' not in namespace"))
            })?;
            mask.set(idx);
        }
        Ok(mask)
    }

    /// Mask with one bit per taxon in the namespace.
    pub fn all_taxa_bitmask(&self) -> Bitset {
        Bitset::filled(self.taxa.len())
    }

    /// Labels of the taxa whose bits are set in `mask`, in index order.
    pub fn bitmask_labels(&self, mask: &Bitset) -> Vec<&str> {
        mask.ones()
            .filter_map(|i| self.taxa.get(i))
            .map(|t| t.label.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn test_indices_are_stable() {
        let mut ns = TaxonNamespace::from_labels(["A", "B", "C"]).unwrap();
        assert_eq!(ns.index_of("B"), Some(1));
        assert_eq!(ns.require_taxon("B"), 1);
        assert_eq!(ns.require_taxon("D"), 3);
        assert_eq!(ns.len(), 4);
        assert_eq!(ns.taxon(3).unwrap().label(), "D");
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = TaxonNamespace::from_labels(["A", "A"]).unwrap_err();
        assert!(matches!(err, SplitError::InvalidArgument(_)));
    }

    #[test]
    fn test_masks() {
        let ns = TaxonNamespace::from_labels(["A", "B", "C", "D"]).unwrap();
        assert_eq!(ns.taxon_bitmask(2).words(), &[0b0100]);
        assert_eq!(ns.all_taxa_bitmask().words(), &[0b1111]);
        assert_eq!(ns.taxa_bitmask(["A", "D"]).unwrap().words(), &[0b1001]);
        assert!(ns.taxa_bitmask(["A", "Z"]).is_err());
        assert_eq!(ns.bitmask_labels(&Bitset::from_u64(0b0110)), vec!["B", "C"]);
    }

    /// Same taxa, different leaf order in the Newick strings, same layout.
    #[test]
    fn test_from_phylotrees_sorts_labels() {
        let t1 = PhyloTree::from_newick("((Human,Chimp),Gorilla);").unwrap();
        let t2 = PhyloTree::from_newick("((Gorilla,Chimp),Human);").unwrap();
        let ns = TaxonNamespace::from_phylotrees(&[t1, t2]).unwrap();

        assert_eq!(ns.index_of("Chimp"), Some(0));
        assert_eq!(ns.index_of("Gorilla"), Some(1));
        assert_eq!(ns.index_of("Human"), Some(2));
    }
}
