//! Split frequencies over a sample of trees.
//!
//! A [`SplitDistribution`] counts every split of every tree it is given,
//! optionally weighting trees and sampling the edge length and node age seen
//! for each split occurrence. From the counts it derives split support,
//! majority-rule style consensus trees and per-tree support scores.
//!
//! ```text
//! ((A,B),(C,D))  ((A,B),(C,D))  ((A,C),(B,D))
//!     {A,B}: 2/3   {C,D}: 2/3   {A,C}: 1/3   {B,D}: 1/3
//! ```

use crate::bitset::Bitset;
use crate::encode::EncodeOptions;
use crate::error::SplitError;
use crate::node_age::NodeAgeOptions;
use crate::reconstruct::SplitReconstructor;
use crate::summary::{self, SummarizationOptions, SummaryStats};
use crate::taxon::TaxonNamespace;
use crate::tree::{Rooting, Tree};
use itertools::Itertools;
use log::debug;
use rayon::prelude::*;
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::sync::Arc;

/// Tolerance for admitting splits at frequency 1.0 when `min_freq` is 1.0.
const FULL_SUPPORT_EPSILON: f64 = 1e-7;

/// Whether a split at `freq` passes the consensus threshold `min_freq`.
fn meets_min_freq(freq: f64, min_freq: f64) -> bool {
    freq >= min_freq || (min_freq == 1.0 && freq >= 1.0 - FULL_SUPPORT_EPSILON)
}

/// What a distribution tracks besides split counts.
#[derive(Debug, Clone)]
pub struct SplitDistributionConfig {
    pub ignore_edge_lengths: bool,
    pub ignore_node_ages: bool,
    /// Weight each tree by [`Tree::weight`] instead of 1.
    pub use_tree_weights: bool,
    /// Length sampled for edges that have none.
    pub default_edge_length: Option<f64>,
    pub encode: EncodeOptions,
    pub node_ages: NodeAgeOptions,
}

impl Default for SplitDistributionConfig {
    fn default() -> Self {
        SplitDistributionConfig {
            ignore_edge_lengths: false,
            ignore_node_ages: true,
            use_tree_weights: false,
            default_edge_length: None,
            encode: EncodeOptions::default(),
            node_ages: NodeAgeOptions::default(),
        }
    }
}

/// The splits of one counted tree, in encoding order.
#[derive(Debug, Clone, PartialEq)]
pub struct CountedTree {
    pub splits: Vec<Bitset>,
    /// Edge length per split; `None` when edge lengths are ignored.
    pub edge_lengths: Option<Vec<Option<f64>>>,
    pub leafset: Bitset,
    pub weight: f64,
    pub is_rooted: bool,
}

#[derive(Debug, Clone)]
pub struct SplitDistribution {
    taxon_namespace: Arc<TaxonNamespace>,
    config: SplitDistributionConfig,
    split_counts: HashMap<Bitset, f64>,
    split_edge_lengths: HashMap<Bitset, Vec<f64>>,
    split_node_ages: HashMap<Bitset, Vec<f64>>,
    total_trees_counted: usize,
    sum_of_tree_weights: f64,
    rooted_trees_counted: usize,
    unrooted_trees_counted: usize,
    observed_leafset: Bitset,
    freqs: HashMap<Bitset, f64>,
    freqs_counted_at: Option<usize>,
}

impl SplitDistribution {
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Self::with_config(taxon_namespace, SplitDistributionConfig::default())
    }

    pub fn with_config(taxon_namespace: Arc<TaxonNamespace>, config: SplitDistributionConfig) -> Self {
        SplitDistribution {
            taxon_namespace,
            config,
            split_counts: HashMap::new(),
            split_edge_lengths: HashMap::new(),
            split_node_ages: HashMap::new(),
            total_trees_counted: 0,
            sum_of_tree_weights: 0.0,
            rooted_trees_counted: 0,
            unrooted_trees_counted: 0,
            observed_leafset: Bitset::new(),
            freqs: HashMap::new(),
            freqs_counted_at: None,
        }
    }

    /// An empty distribution with the same namespace and configuration.
    fn empty_like(&self) -> Self {
        Self::with_config(Arc::clone(&self.taxon_namespace), self.config.clone())
    }

    pub fn taxon_namespace(&self) -> &Arc<TaxonNamespace> {
        &self.taxon_namespace
    }

    pub fn config(&self) -> &SplitDistributionConfig {
        &self.config
    }

    pub fn total_trees_counted(&self) -> usize {
        self.total_trees_counted
    }

    pub fn sum_of_tree_weights(&self) -> f64 {
        self.sum_of_tree_weights
    }

    /// Weighted occurrence count per split.
    pub fn split_counts(&self) -> &HashMap<Bitset, f64> {
        &self.split_counts
    }

    pub fn split_edge_lengths(&self) -> &HashMap<Bitset, Vec<f64>> {
        &self.split_edge_lengths
    }

    pub fn split_node_ages(&self) -> &HashMap<Bitset, Vec<f64>> {
        &self.split_node_ages
    }

    /// Union of the leafsets of all counted trees.
    pub fn observed_leafset(&self) -> &Bitset {
        &self.observed_leafset
    }

    /// Number of distinct splits seen.
    pub fn len(&self) -> usize {
        self.split_counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.split_counts.is_empty()
    }

    fn check_namespace(&self, taxon_namespace: &Arc<TaxonNamespace>) -> Result<(), SplitError> {
        if Arc::ptr_eq(taxon_namespace, &self.taxon_namespace) {
            Ok(())
        } else {
            Err(SplitError::TaxonNamespaceIdentity)
        }
    }

    /// Counts every split of `tree`, encoding it first if needed.
    ///
    /// # Errors
    /// `TaxonNamespaceIdentity` if the tree uses another namespace;
    /// `Ultrametricity` if node ages are tracked and the tree is not
    /// ultrametric. Nothing is counted in either case.
    pub fn count_splits_on_tree(&mut self, tree: &mut Tree) -> Result<CountedTree, SplitError> {
        self.check_namespace(tree.taxon_namespace())?;
        tree.ensure_bipartitions(&self.config.encode);
        if !self.config.ignore_node_ages {
            tree.calc_node_ages(&self.config.node_ages)?;
        }

        let weight = if self.config.use_tree_weights {
            tree.weight().unwrap_or(1.0)
        } else {
            1.0
        };
        let is_rooted = tree.is_rooted();
        let seed = tree.seed();

        let mut splits = Vec::new();
        let mut edge_lengths = Vec::new();
        for id in tree.postorder() {
            if !is_rooted && id == seed {
                continue;
            }
            let node = tree.node(id);
            let Some(bipartition) = node.edge().bipartition() else {
                continue;
            };
            let split = bipartition.split_bitmask().clone();
            *self.split_counts.entry(split.clone()).or_insert(0.0) += weight;

            let length = node.edge().length().or(self.config.default_edge_length);
            if !self.config.ignore_edge_lengths {
                if let Some(length) = length {
                    self.split_edge_lengths
                        .entry(split.clone())
                        .or_default()
                        .push(length);
                }
            }
            if !self.config.ignore_node_ages {
                if let Some(age) = node.age() {
                    self.split_node_ages.entry(split.clone()).or_default().push(age);
                }
            }
            edge_lengths.push(length);
            splits.push(split);
        }

        let leafset = tree.leafset_bitmask().cloned().unwrap_or_default();
        self.observed_leafset.or_assign(&leafset);
        self.total_trees_counted += 1;
        self.sum_of_tree_weights += weight;
        if is_rooted {
            self.rooted_trees_counted += 1;
        } else {
            self.unrooted_trees_counted += 1;
        }
        self.freqs_counted_at = None;
        debug!(
            "split distribution: counted tree {} ({} splits, weight {weight})",
            self.total_trees_counted,
            splits.len()
        );

        Ok(CountedTree {
            splits,
            edge_lengths: (!self.config.ignore_edge_lengths).then_some(edge_lengths),
            leafset,
            weight,
            is_rooted,
        })
    }

    pub fn count_splits_on_trees(&mut self, trees: &mut [Tree]) -> Result<Vec<CountedTree>, SplitError> {
        trees
            .iter_mut()
            .map(|tree| self.count_splits_on_tree(tree))
            .collect()
    }

    /// Counts `trees` on the rayon pool.
    ///
    /// Each worker fills a partial distribution; partials are merged with
    /// [`SplitDistribution::update`]. Sample lists may end up in a different
    /// order than sequential counting would produce.
    pub fn count_splits_on_trees_parallel(&mut self, trees: &mut [Tree]) -> Result<(), SplitError> {
        let empty = self.empty_like();
        let merged = trees
            .par_iter_mut()
            .try_fold(
                || empty.clone(),
                |mut partial, tree| {
                    partial.count_splits_on_tree(tree)?;
                    Ok::<_, SplitError>(partial)
                },
            )
            .try_reduce(
                || empty.clone(),
                |mut left, right| {
                    left.update(&right)?;
                    Ok(left)
                },
            )?;
        self.update(&merged)
    }

    /// Sum of tree weights, or the tree count when no weight was recorded.
    pub fn normalization_weight(&self) -> f64 {
        if self.sum_of_tree_weights != 0.0 {
            self.sum_of_tree_weights
        } else {
            self.total_trees_counted as f64
        }
    }

    fn frequencies(&self) -> HashMap<Bitset, f64> {
        let weight = self.normalization_weight();
        self.split_counts
            .iter()
            .map(|(split, count)| {
                let freq = if self.total_trees_counted == 0 {
                    1.0
                } else {
                    count / weight
                };
                (split.clone(), freq)
            })
            .collect()
    }

    /// Frequency of every split, cached until the next tree is counted.
    pub fn calc_freqs(&mut self) -> &HashMap<Bitset, f64> {
        if self.freqs_counted_at != Some(self.total_trees_counted) {
            self.freqs = self.frequencies();
            self.freqs_counted_at = Some(self.total_trees_counted);
        }
        &self.freqs
    }

    /// Frequency of one split; 0 for splits never seen.
    pub fn split_frequency(&self, split: &Bitset) -> f64 {
        match self.split_counts.get(split) {
            Some(_) if self.total_trees_counted == 0 => 1.0,
            Some(count) => count / self.normalization_weight(),
            None => 0.0,
        }
    }

    pub fn is_all_counted_trees_rooted(&self) -> bool {
        self.rooted_trees_counted > 0 && self.unrooted_trees_counted == 0
    }

    pub fn is_all_counted_trees_unrooted(&self) -> bool {
        self.unrooted_trees_counted > 0 && self.rooted_trees_counted == 0
    }

    pub fn is_mixed_rootings_counted(&self) -> bool {
        self.rooted_trees_counted > 0 && self.unrooted_trees_counted > 0
    }

    /// Rooting shared by all counted trees, if they agree.
    fn observed_rooting(&self) -> Option<bool> {
        if self.is_all_counted_trees_rooted() {
            Some(true)
        } else if self.is_all_counted_trees_unrooted() {
            Some(false)
        } else {
            None
        }
    }

    /// Mean sampled edge length per split.
    pub fn mean_edge_lengths(&self) -> HashMap<Bitset, f64> {
        self.split_edge_lengths
            .iter()
            .filter(|(_, lengths)| !lengths.is_empty())
            .map(|(split, lengths)| (split.clone(), lengths.iter().mean()))
            .collect()
    }

    pub fn edge_length_summaries(&self) -> HashMap<Bitset, SummaryStats> {
        summarize_samples(&self.split_edge_lengths)
    }

    pub fn node_age_summaries(&self) -> HashMap<Bitset, SummaryStats> {
        summarize_samples(&self.split_node_ages)
    }

    /// Builds the tree of all splits with frequency of at least `min_freq`.
    ///
    /// Splits are inserted by descending frequency, ties by ascending
    /// bitmask, so a conflicting split with less support is dropped. Edge
    /// lengths are the mean sampled lengths. `is_rooted` defaults to the
    /// rooting shared by all counted trees.
    pub fn consensus_tree(
        &self,
        min_freq: f64,
        is_rooted: Option<bool>,
        summarization: Option<&SummarizationOptions>,
    ) -> Result<Tree, SplitError> {
        let rooting = Rooting::from_rooted(is_rooted.or_else(|| self.observed_rooting()));
        let freqs = self.frequencies();
        let selected: Vec<&Bitset> = freqs
            .iter()
            .filter(|&(_, &freq)| meets_min_freq(freq, min_freq))
            .sorted_by(|(s1, f1), (s2, f2)| f2.total_cmp(f1).then_with(|| s1.cmp(s2)))
            .map(|(split, _)| split)
            .collect();
        debug!(
            "consensus: {} of {} splits at min_freq {min_freq}",
            selected.len(),
            freqs.len()
        );

        let lengths = self.mean_edge_lengths();
        let leafset = if self.observed_leafset.is_empty() {
            self.taxon_namespace.all_taxa_bitmask()
        } else {
            self.observed_leafset.clone()
        };
        let mut tree = SplitReconstructor::new(Arc::clone(&self.taxon_namespace))
            .leafset(leafset)
            .rooting(rooting)
            .edge_lengths(&lengths)
            .build(selected)?;
        if let Some(options) = summarization {
            self.summarize_splits_on_tree(&mut tree, options)?;
        }
        Ok(tree)
    }

    /// Decorates `tree` with the support and summaries of its splits.
    pub fn summarize_splits_on_tree(&self, tree: &mut Tree, options: &SummarizationOptions) -> Result<(), SplitError> {
        self.check_namespace(tree.taxon_namespace())?;
        tree.ensure_bipartitions(&self.config.encode);
        summary::decorate_tree(
            tree,
            |split| self.split_frequency(split),
            &self.edge_length_summaries(),
            &self.node_age_summaries(),
            options,
        )
    }

    fn split_supports_on_tree(&self, tree: &mut Tree, include_external_splits: bool) -> Result<Vec<f64>, SplitError> {
        self.check_namespace(tree.taxon_namespace())?;
        let encoding = tree.ensure_bipartitions(&self.config.encode);
        Ok(encoding
            .iter()
            .filter(|b| {
                include_external_splits
                    || b.split_bitmask() == b.tree_leafset_bitmask()
                    || !b.is_trivial()
            })
            .map(|b| self.split_frequency(b.split_bitmask()))
            .collect())
    }

    /// Sum of the log frequencies of the tree's splits; unseen splits are
    /// skipped.
    pub fn log_product_of_split_support_on_tree(
        &self,
        tree: &mut Tree,
        include_external_splits: bool,
    ) -> Result<f64, SplitError> {
        Ok(self
            .split_supports_on_tree(tree, include_external_splits)?
            .into_iter()
            .filter(|&freq| freq > 0.0)
            .map(f64::ln)
            .sum())
    }

    pub fn sum_of_split_support_on_tree(&self, tree: &mut Tree, include_external_splits: bool) -> Result<f64, SplitError> {
        Ok(self
            .split_supports_on_tree(tree, include_external_splits)?
            .into_iter()
            .sum())
    }

    /// Merges the counts and samples of `other` into this distribution.
    ///
    /// # Errors
    /// `TaxonNamespaceIdentity` for another namespace, and one of the
    /// `Incompatible*Update` errors if `other` tracks edge lengths, node ages
    /// or tree weights differently.
    pub fn update(&mut self, other: &SplitDistribution) -> Result<(), SplitError> {
        self.check_namespace(&other.taxon_namespace)?;
        if self.config.ignore_edge_lengths != other.config.ignore_edge_lengths {
            return Err(SplitError::IncompatibleEdgeLengthsUpdate);
        }
        if self.config.ignore_node_ages != other.config.ignore_node_ages {
            return Err(SplitError::IncompatibleNodeAgesUpdate);
        }
        if self.config.use_tree_weights != other.config.use_tree_weights {
            return Err(SplitError::IncompatibleTreeWeightsUpdate);
        }

        for (split, count) in &other.split_counts {
            *self.split_counts.entry(split.clone()).or_insert(0.0) += count;
        }
        for (split, lengths) in &other.split_edge_lengths {
            self.split_edge_lengths
                .entry(split.clone())
                .or_default()
                .extend_from_slice(lengths);
        }
        for (split, ages) in &other.split_node_ages {
            self.split_node_ages
                .entry(split.clone())
                .or_default()
                .extend_from_slice(ages);
        }
        self.total_trees_counted += other.total_trees_counted;
        self.sum_of_tree_weights += other.sum_of_tree_weights;
        self.rooted_trees_counted += other.rooted_trees_counted;
        self.unrooted_trees_counted += other.unrooted_trees_counted;
        self.observed_leafset.or_assign(&other.observed_leafset);
        self.freqs_counted_at = None;
        debug!(
            "split distribution: merged {} trees, now {}",
            other.total_trees_counted, self.total_trees_counted
        );
        Ok(())
    }
}

fn summarize_samples(samples: &HashMap<Bitset, Vec<f64>>) -> HashMap<Bitset, SummaryStats> {
    samples
        .iter()
        .filter_map(|(split, values)| SummaryStats::from_values(values).map(|stats| (split.clone(), stats)))
        .collect()
}
