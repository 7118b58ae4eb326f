//! A compact, append-only collection of trees.
//!
//! Trees are not kept as node graphs. Each one is stored as the columns its
//! counted splits produce (split bitmasks, edge lengths, leafset, weight)
//! while the embedded [`SplitDistribution`] accumulates the split counts.
//! A stored tree is rebuilt on demand through [`SplitReconstructor`].
//!
//! Trees can be added or inserted but never removed: removal would have to
//! retract the tree's contribution from the distribution.

use crate::bitset::{self, Bitset};
use crate::error::SplitError;
use crate::reconstruct::SplitReconstructor;
use crate::split_distribution::{SplitDistribution, SplitDistributionConfig};
use crate::summary::SummarizationOptions;
use crate::taxon::TaxonNamespace;
use crate::tree::{Rooting, Tree};
use indexmap::IndexMap;
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Borrowed view of one stored tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeRecord<'a> {
    pub split_bitmasks: &'a [Bitset],
    pub edge_lengths: Option<&'a [Option<f64>]>,
    pub leafset_bitmask: &'a Bitset,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TreeArray {
    taxon_namespace: Arc<TaxonNamespace>,
    split_distribution: SplitDistribution,
    is_rooted_trees: Option<bool>,
    tree_split_bitmasks: Vec<Vec<Bitset>>,
    tree_edge_lengths: Vec<Option<Vec<Option<f64>>>>,
    tree_leafset_bitmasks: Vec<Bitset>,
    tree_weights: Vec<Option<f64>>,
}

impl TreeArray {
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Self::with_config(taxon_namespace, SplitDistributionConfig::default())
    }

    pub fn with_config(taxon_namespace: Arc<TaxonNamespace>, config: SplitDistributionConfig) -> Self {
        TreeArray {
            split_distribution: SplitDistribution::with_config(Arc::clone(&taxon_namespace), config),
            taxon_namespace,
            is_rooted_trees: None,
            tree_split_bitmasks: Vec::new(),
            tree_edge_lengths: Vec::new(),
            tree_leafset_bitmasks: Vec::new(),
            tree_weights: Vec::new(),
        }
    }

    pub fn taxon_namespace(&self) -> &Arc<TaxonNamespace> {
        &self.taxon_namespace
    }

    pub fn split_distribution(&self) -> &SplitDistribution {
        &self.split_distribution
    }

    /// Rooting fixed by the first tree added; `None` while empty.
    pub fn is_rooted_trees(&self) -> Option<bool> {
        self.is_rooted_trees
    }

    pub fn len(&self) -> usize {
        self.tree_split_bitmasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree_split_bitmasks.is_empty()
    }

    /// Counts `tree` and stores it at `index` (appended when `None`).
    ///
    /// Returns the position of the stored tree.
    ///
    /// # Errors
    /// `TaxonNamespaceIdentity`, `MixedRooting` if the tree's rooting differs
    /// from the first tree's, `IndexOutOfRange` for an index past the end,
    /// and any error of [`SplitDistribution::count_splits_on_tree`].
    pub fn add_tree(&mut self, tree: &mut Tree, index: Option<usize>) -> Result<usize, SplitError> {
        if !Arc::ptr_eq(tree.taxon_namespace(), &self.taxon_namespace) {
            return Err(SplitError::TaxonNamespaceIdentity);
        }
        let found = tree.is_rooted();
        if let Some(expected) = self.is_rooted_trees {
            if expected != found {
                return Err(SplitError::MixedRooting { expected, found });
            }
        }
        let index = index.unwrap_or(self.len());
        if index > self.len() {
            return Err(SplitError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let counted = self.split_distribution.count_splits_on_tree(tree)?;
        self.is_rooted_trees.get_or_insert(found);
        self.tree_split_bitmasks.insert(index, counted.splits);
        self.tree_edge_lengths.insert(index, counted.edge_lengths);
        self.tree_leafset_bitmasks.insert(index, counted.leafset);
        self.tree_weights.insert(index, tree.weight());
        Ok(index)
    }

    pub fn add_trees(&mut self, trees: &mut [Tree]) -> Result<(), SplitError> {
        for tree in trees {
            self.add_tree(tree, None)?;
        }
        Ok(())
    }

    /// Appends every tree of `other` and merges its distribution.
    ///
    /// # Errors
    /// `TaxonNamespaceIdentity`, `IncompatibleRootingUpdate`, or the
    /// tracking mismatches of [`SplitDistribution::update`]. Nothing is
    /// merged on error.
    pub fn update(&mut self, other: &TreeArray) -> Result<(), SplitError> {
        if !Arc::ptr_eq(&other.taxon_namespace, &self.taxon_namespace) {
            return Err(SplitError::TaxonNamespaceIdentity);
        }
        if let (Some(mine), Some(theirs)) = (self.is_rooted_trees, other.is_rooted_trees) {
            if mine != theirs {
                return Err(SplitError::IncompatibleRootingUpdate);
            }
        }
        self.split_distribution.update(&other.split_distribution)?;
        if self.is_rooted_trees.is_none() {
            self.is_rooted_trees = other.is_rooted_trees;
        }
        self.tree_split_bitmasks
            .extend(other.tree_split_bitmasks.iter().cloned());
        self.tree_edge_lengths
            .extend(other.tree_edge_lengths.iter().cloned());
        self.tree_leafset_bitmasks
            .extend(other.tree_leafset_bitmasks.iter().cloned());
        self.tree_weights.extend_from_slice(&other.tree_weights);
        debug!("tree array: merged {} trees, now {}", other.len(), self.len());
        Ok(())
    }

    pub fn record(&self, index: usize) -> Result<TreeRecord<'_>, SplitError> {
        if index >= self.len() {
            return Err(SplitError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(TreeRecord {
            split_bitmasks: &self.tree_split_bitmasks[index],
            edge_lengths: self.tree_edge_lengths[index].as_deref(),
            leafset_bitmask: &self.tree_leafset_bitmasks[index],
            weight: self.tree_weights[index],
        })
    }

    /// Weight a stored tree contributed to the distribution.
    fn counted_weight(&self, index: usize) -> f64 {
        if self.split_distribution.config().use_tree_weights {
            self.tree_weights[index].unwrap_or(1.0)
        } else {
            1.0
        }
    }

    /// Rebuilds the tree stored at `index`, with its edge lengths and weight.
    ///
    /// With `summarization`, nodes are decorated with the support and
    /// summaries of the whole array.
    pub fn restore_tree(&self, index: usize, summarization: Option<&SummarizationOptions>) -> Result<Tree, SplitError> {
        let record = self.record(index)?;
        let lengths: HashMap<Bitset, f64> = match record.edge_lengths {
            Some(lengths) => record
                .split_bitmasks
                .iter()
                .zip(lengths)
                .filter_map(|(split, length)| length.map(|l| (split.clone(), l)))
                .collect(),
            None => HashMap::new(),
        };
        let mut tree = SplitReconstructor::new(Arc::clone(&self.taxon_namespace))
            .leafset(record.leafset_bitmask.clone())
            .rooting(Rooting::from_rooted(self.is_rooted_trees))
            .edge_lengths(&lengths)
            .build(record.split_bitmasks)?;
        tree.set_weight(record.weight);
        if let Some(options) = summarization {
            self.split_distribution
                .summarize_splits_on_tree(&mut tree, options)?;
        }
        Ok(tree)
    }

    /// Support values of the splits of each stored tree.
    ///
    /// The split equal to the tree's leafset (the root edge) always counts;
    /// other trivial splits only with `include_external_splits`.
    fn split_supports(&self, index: usize, include_external_splits: bool) -> impl Iterator<Item = f64> + '_ {
        let leafset = &self.tree_leafset_bitmasks[index];
        self.tree_split_bitmasks[index]
            .iter()
            .filter(move |split| {
                include_external_splits || *split == leafset || !bitset::is_trivial(split, leafset)
            })
            .map(move |split| self.split_distribution.split_frequency(split))
    }

    /// Score of every stored tree and the index of the best one.
    ///
    /// Ties keep the earliest tree.
    fn score_trees(&self, score: impl Fn(usize) -> f64) -> (Vec<f64>, Option<usize>) {
        let scores: Vec<f64> = (0..self.len()).map(score).collect();
        let mut best: Option<usize> = None;
        for (i, &s) in scores.iter().enumerate() {
            if best.is_none_or(|b| s > scores[b]) {
                best = Some(i);
            }
        }
        (scores, best)
    }

    /// Per-tree sum of log split frequencies; zero frequencies are skipped.
    pub fn calculate_log_product_of_split_supports(&self, include_external_splits: bool) -> (Vec<f64>, Option<usize>) {
        self.score_trees(|i| {
            self.split_supports(i, include_external_splits)
                .filter(|&freq| freq > 0.0)
                .map(f64::ln)
                .sum()
        })
    }

    pub fn calculate_sum_of_split_supports(&self, include_external_splits: bool) -> (Vec<f64>, Option<usize>) {
        self.score_trees(|i| self.split_supports(i, include_external_splits).sum())
    }

    /// The maximum clade credibility tree and its log score.
    pub fn maximum_product_of_split_support_tree(
        &self,
        include_external_splits: bool,
        summarization: Option<&SummarizationOptions>,
    ) -> Result<(Tree, f64), SplitError> {
        let (scores, best) = self.calculate_log_product_of_split_supports(include_external_splits);
        self.restore_best(scores, best, summarization)
    }

    pub fn maximum_sum_of_split_support_tree(
        &self,
        include_external_splits: bool,
        summarization: Option<&SummarizationOptions>,
    ) -> Result<(Tree, f64), SplitError> {
        let (scores, best) = self.calculate_sum_of_split_supports(include_external_splits);
        self.restore_best(scores, best, summarization)
    }

    fn restore_best(
        &self,
        scores: Vec<f64>,
        best: Option<usize>,
        summarization: Option<&SummarizationOptions>,
    ) -> Result<(Tree, f64), SplitError> {
        let best = best.ok_or_else(|| SplitError::InvalidArgument("tree array is empty".to_string()))?;
        debug!("tree array: best tree {best} with score {}", scores[best]);
        Ok((self.restore_tree(best, summarization)?, scores[best]))
    }

    pub fn consensus_tree(&self, min_freq: f64, summarization: Option<&SummarizationOptions>) -> Result<Tree, SplitError> {
        self.split_distribution
            .consensus_tree(min_freq, self.is_rooted_trees, summarization)
    }

    /// Groups stored trees by their split set: first member and total weight.
    fn group_topologies(&self) -> IndexMap<BTreeSet<&Bitset>, (usize, f64)> {
        let mut groups: IndexMap<BTreeSet<&Bitset>, (usize, f64)> = IndexMap::new();
        for (i, splits) in self.tree_split_bitmasks.iter().enumerate() {
            let key: BTreeSet<&Bitset> = splits.iter().collect();
            groups.entry(key).or_insert((i, 0.0)).1 += self.counted_weight(i);
        }
        groups
    }

    fn total_counted_weight(&self) -> f64 {
        (0..self.len()).map(|i| self.counted_weight(i)).sum()
    }

    /// Weighted frequency of each distinct split set, in first-seen order.
    pub fn split_bitmask_set_frequencies(&self) -> IndexMap<BTreeSet<Bitset>, f64> {
        let total = self.total_counted_weight();
        self.group_topologies()
            .into_iter()
            .map(|(key, (_, weight))| (key.into_iter().cloned().collect(), weight / total))
            .collect()
    }

    /// One representative tree per distinct topology, with its frequency.
    ///
    /// `Some(true)` sorts by descending frequency, `Some(false)` ascending,
    /// `None` keeps first-seen order. Ties keep first-seen order.
    pub fn topologies(&self, sort_descending: Option<bool>) -> Result<Vec<(Tree, f64)>, SplitError> {
        let total = self.total_counted_weight();
        let mut groups: Vec<(usize, f64)> = self
            .group_topologies()
            .into_values()
            .map(|(first, weight)| (first, weight / total))
            .collect();
        match sort_descending {
            Some(true) => groups.sort_by(|a, b| b.1.total_cmp(&a.1)),
            Some(false) => groups.sort_by(|a, b| a.1.total_cmp(&b.1)),
            None => {}
        }
        groups
            .into_iter()
            .map(|(first, freq)| Ok((self.restore_tree(first, None)?, freq)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylotree::tree::Tree as PhyloTree;
    use test_log::test;

    fn namespace() -> Arc<TaxonNamespace> {
        Arc::new(TaxonNamespace::from_labels(["A", "B", "C", "D"]).unwrap())
    }

    fn tree(ns: &Arc<TaxonNamespace>, newick: &str, rooting: Rooting) -> Tree {
        let source = PhyloTree::from_newick(newick).unwrap();
        Tree::from_phylotree(&source, Arc::clone(ns), rooting).unwrap()
    }

    fn bits(indices: &[usize]) -> Bitset {
        Bitset::from_indices(indices.iter().copied())
    }

    fn array(ns: &Arc<TaxonNamespace>) -> TreeArray {
        let mut array = TreeArray::new(Arc::clone(ns));
        let mut trees = vec![
            tree(ns, "((A:1,B:1):1,(C:1,D:1):1);", Rooting::Rooted),
            tree(ns, "((A:1,B:1):1,(C:1,D:1):1);", Rooting::Rooted),
            tree(ns, "((A:1,C:1):1,(B:1,D:1):1);", Rooting::Rooted),
        ];
        array.add_trees(&mut trees).unwrap();
        array
    }

    fn split_set(tree: &Tree) -> BTreeSet<Bitset> {
        tree.bipartition_encoding()
            .unwrap()
            .iter()
            .map(|b| b.split_bitmask().clone())
            .collect()
    }

    #[test]
    fn test_add_and_record() {
        let ns = namespace();
        let array = array(&ns);
        assert_eq!(array.len(), 3);
        assert_eq!(array.is_rooted_trees(), Some(true));
        let record = array.record(2).unwrap();
        assert_eq!(record.split_bitmasks.len(), 7);
        assert!(record.split_bitmasks.contains(&bits(&[0, 2])));
        assert_eq!(record.leafset_bitmask, &bits(&[0, 1, 2, 3]));
        assert_eq!(record.weight, None);
        assert_eq!(
            array.record(3).unwrap_err(),
            SplitError::IndexOutOfRange { index: 3, len: 3 }
        );
    }

    #[test]
    fn test_mixed_rooting_rejected() {
        let ns = namespace();
        let mut array = array(&ns);
        let mut unrooted = tree(&ns, "((A,B),(C,D));", Rooting::Unrooted);
        assert_eq!(
            array.add_tree(&mut unrooted, None),
            Err(SplitError::MixedRooting {
                expected: true,
                found: false
            })
        );
        assert_eq!(array.split_distribution().total_trees_counted(), 3);
    }

    #[test]
    fn test_insert_at_index() {
        let ns = namespace();
        let mut array = array(&ns);
        let mut t = tree(&ns, "((A,D),(B,C));", Rooting::Rooted);
        assert_eq!(array.add_tree(&mut t, Some(0)).unwrap(), 0);
        assert!(array.record(0).unwrap().split_bitmasks.contains(&bits(&[0, 3])));

        let mut t = tree(&ns, "((A,D),(B,C));", Rooting::Rooted);
        assert_eq!(
            array.add_tree(&mut t, Some(9)),
            Err(SplitError::IndexOutOfRange { index: 9, len: 4 })
        );
    }

    #[test]
    fn test_restore_rooted_round_trip() {
        let ns = namespace();
        let mut array = TreeArray::new(Arc::clone(&ns));
        let mut original = tree(&ns, "((A:1,B:2):0.5,(C:3,D:4):0.25);", Rooting::Rooted);
        original.set_weight(Some(2.0));
        array.add_tree(&mut original, None).unwrap();

        let restored = array.restore_tree(0, None).unwrap();
        assert_eq!(restored.as_newick_string(), "((A:1,B:2):0.5,(C:3,D:4):0.25);");
        assert_eq!(restored.weight(), Some(2.0));
        assert_eq!(split_set(&restored), split_set(&original));
    }

    #[test]
    fn test_restore_unrooted_round_trip() {
        let ns = namespace();
        let mut array = TreeArray::new(Arc::clone(&ns));
        let mut original = tree(&ns, "((A:1,B:2):0.5,(C:3,D:4):0.25);", Rooting::Unrooted);
        array.add_tree(&mut original, None).unwrap();

        let restored = array.restore_tree(0, None).unwrap();
        assert!(!restored.is_rooted());
        assert_eq!(split_set(&restored), split_set(&original));
        for split in split_set(&original) {
            let a = original.edge_for_split(&split).unwrap();
            let b = restored.edge_for_split(&split).unwrap();
            assert_eq!(original.node(a).edge().length(), restored.node(b).edge().length());
        }
        // the collapsed basal edges are summed
        let cd = restored.edge_for_split(&bits(&[2, 3])).unwrap();
        assert_eq!(restored.node(cd).edge().length(), Some(0.75));
    }

    #[test]
    fn test_split_support_scores() {
        let ns = namespace();
        let array = array(&ns);

        let (scores, best) = array.calculate_log_product_of_split_supports(false);
        let two_thirds = (2.0f64 / 3.0).ln() * 2.0;
        let one_third = (1.0f64 / 3.0).ln() * 2.0;
        assert!((scores[0] - two_thirds).abs() < 1e-12);
        assert!((scores[2] - one_third).abs() < 1e-12);
        assert_eq!(best, Some(0));

        let (sums, best) = array.calculate_sum_of_split_supports(true);
        assert!((sums[0] - (4.0 / 3.0 + 5.0)).abs() < 1e-12);
        assert!((sums[2] - (2.0 / 3.0 + 5.0)).abs() < 1e-12);
        assert_eq!(best, Some(0));

        let (mcc, score) = array.maximum_product_of_split_support_tree(false, None).unwrap();
        assert!((score - two_thirds).abs() < 1e-12);
        assert!(mcc.edge_for_split(&bits(&[0, 1])).is_some());
    }

    #[test]
    fn test_single_tree_scores_zero() {
        let ns = namespace();
        let mut array = TreeArray::new(Arc::clone(&ns));
        array
            .add_tree(&mut tree(&ns, "((A,B),(C,D));", Rooting::Rooted), None)
            .unwrap();
        let (scores, best) = array.calculate_log_product_of_split_supports(true);
        assert_eq!(scores, vec![0.0]);
        assert_eq!(best, Some(0));
    }

    #[test]
    fn test_empty_array() {
        let array = TreeArray::new(namespace());
        assert_eq!(array.calculate_sum_of_split_supports(false), (vec![], None));
        assert!(matches!(
            array.maximum_sum_of_split_support_tree(false, None),
            Err(SplitError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_topologies() {
        let ns = namespace();
        let array = array(&ns);

        let freqs = array.split_bitmask_set_frequencies();
        assert_eq!(freqs.len(), 2);
        let values: Vec<f64> = freqs.values().copied().collect();
        assert!((values[0] - 2.0 / 3.0).abs() < 1e-12);
        assert!((values[1] - 1.0 / 3.0).abs() < 1e-12);

        let ascending = array.topologies(Some(false)).unwrap();
        assert!((ascending[0].1 - 1.0 / 3.0).abs() < 1e-12);
        assert!(ascending[0].0.edge_for_split(&bits(&[0, 2])).is_some());
        let descending = array.topologies(Some(true)).unwrap();
        assert!(descending[0].0.edge_for_split(&bits(&[0, 1])).is_some());
    }

    #[test]
    fn test_update() {
        let ns = namespace();
        let mut left = array(&ns);
        let right = array(&ns);
        left.update(&right).unwrap();
        assert_eq!(left.len(), 6);
        assert_eq!(left.split_distribution().total_trees_counted(), 6);

        let mut unrooted = TreeArray::new(Arc::clone(&ns));
        unrooted
            .add_tree(&mut tree(&ns, "((A,B),(C,D));", Rooting::Unrooted), None)
            .unwrap();
        assert_eq!(left.update(&unrooted), Err(SplitError::IncompatibleRootingUpdate));

        let ignoring = TreeArray::with_config(
            Arc::clone(&ns),
            SplitDistributionConfig {
                ignore_edge_lengths: true,
                ..SplitDistributionConfig::default()
            },
        );
        assert_eq!(left.update(&ignoring), Err(SplitError::IncompatibleEdgeLengthsUpdate));
        assert_eq!(left.len(), 6);
    }

    #[test]
    fn test_consensus_from_array() {
        let ns = namespace();
        let array = array(&ns);
        let consensus = array.consensus_tree(0.5, None).unwrap();
        assert!(consensus.is_rooted());
        assert!(consensus.edge_for_split(&bits(&[0, 1])).is_some());
        assert!(consensus.edge_for_split(&bits(&[2, 3])).is_some());
    }
}
