//! Summary statistics of split samples and tree decoration.
//!
//! A split distribution samples one edge length (and optionally one node
//! age) per occurrence of a split. [`SummaryStats`] condenses such a sample;
//! [`SummarizationOptions`] controls how the statistics and split support
//! are written back onto a tree sharing the same split universe.

use crate::bitset::Bitset;
use crate::error::SplitError;
use crate::tree::{NodeId, Tree};
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};
use std::collections::HashMap;

/// Summary of a sample of edge lengths or node ages.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryStats {
    pub n: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` for fewer than two values.
    pub sd: Option<f64>,
    /// Shortest interval holding 95% of the sample.
    pub hpd95: (f64, f64),
    pub quantile_5_95: (f64, f64),
    pub range: (f64, f64),
}

impl SummaryStats {
    /// Returns `None` for an empty sample.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let n = values.len();
        let mean = values.iter().mean();
        let sd = (n > 1).then(|| values.iter().std_dev());

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let range = (sorted[0], sorted[n - 1]);
        let hpd95 = hpd_interval(&sorted, 0.95);

        let mut data = Data::new(sorted);
        let median = data.median();
        let quantile_5_95 = (data.quantile(0.05), data.quantile(0.95));

        Some(SummaryStats {
            n,
            mean,
            median,
            sd,
            hpd95,
            quantile_5_95,
            range,
        })
    }
}

/// Shortest window over the sorted sample that spans `mass` of it.
fn hpd_interval(sorted: &[f64], mass: f64) -> (f64, f64) {
    let n = sorted.len();
    let gap = ((mass * n as f64).round() as usize).clamp(1, n.max(2) - 1);
    if n < 2 {
        return (sorted[0], sorted[0]);
    }
    (0..n - gap)
        .map(|i| (sorted[i], sorted[i + gap]))
        .min_by(|a, b| (a.1 - a.0).total_cmp(&(b.1 - b.0)))
        .unwrap_or((sorted[0], sorted[n - 1]))
}

/// Summaries attached to a node of a summarized tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSummary {
    pub edge_length: Option<SummaryStats>,
    pub age: Option<SummaryStats>,
}

/// What summarization writes into edge lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgeLengthSource {
    /// Leave lengths untouched.
    #[default]
    Keep,
    /// Remove all lengths.
    Clear,
    /// Use the split support as length.
    Support,
    MeanLength,
    MedianLength,
    /// Set node ages from the age summaries, then derive lengths as
    /// parent age minus node age.
    MeanAge,
    MedianAge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummarizationOptions {
    /// Report support as 0-100 instead of 0-1.
    pub support_as_percentages: bool,
    /// Also write the support into the labels of internal nodes.
    pub support_as_labels: bool,
    pub support_label_decimals: usize,
    pub edge_lengths: EdgeLengthSource,
    /// Floor applied to every rewritten edge length.
    pub minimum_edge_length: Option<f64>,
    /// Fail instead of flooring when a rewritten length is negative.
    pub error_on_negative_edge_lengths: bool,
}

impl Default for SummarizationOptions {
    fn default() -> Self {
        SummarizationOptions {
            support_as_percentages: false,
            support_as_labels: false,
            support_label_decimals: 2,
            edge_lengths: EdgeLengthSource::Keep,
            minimum_edge_length: None,
            error_on_negative_edge_lengths: false,
        }
    }
}

impl SummarizationOptions {
    fn finalize_length(&self, length: f64) -> Result<f64, SplitError> {
        if length < 0.0 && self.error_on_negative_edge_lengths {
            return Err(SplitError::NegativeEdgeLength { length });
        }
        Ok(match self.minimum_edge_length {
            Some(min) if length < min => min,
            _ => length,
        })
    }
}

/// Writes support, summaries and edge lengths onto an encoded tree.
///
/// `frequency` gives the support of a split; the maps hold the per-split
/// summaries of sampled edge lengths and node ages.
pub(crate) fn decorate_tree(
    tree: &mut Tree,
    frequency: impl Fn(&Bitset) -> f64,
    edge_lengths: &HashMap<Bitset, SummaryStats>,
    node_ages: &HashMap<Bitset, SummaryStats>,
    options: &SummarizationOptions,
) -> Result<(), SplitError> {
    let edges: Vec<(NodeId, Bitset)> = tree
        .bipartition_encoding()
        .unwrap_or_default()
        .iter()
        .filter_map(|b| {
            tree.edge_for_split(b.split_bitmask())
                .map(|id| (id, b.split_bitmask().clone()))
        })
        .collect();

    for (id, split) in &edges {
        let id = *id;
        let mut support = frequency(split);
        if options.support_as_percentages {
            support *= 100.0;
        }
        tree.set_support(id, Some(support));
        if options.support_as_labels && !tree.node(id).is_leaf() {
            let label = format!("{:.*}", options.support_label_decimals, support);
            tree.set_label(id, Some(label))?;
        }

        let summary = NodeSummary {
            edge_length: edge_lengths.get(split).cloned(),
            age: node_ages.get(split).cloned(),
        };
        let length_summary = summary.edge_length.clone();
        let age_summary = summary.age.clone();
        if length_summary.is_some() || age_summary.is_some() {
            tree.set_summary(id, Some(summary));
        }

        match options.edge_lengths {
            EdgeLengthSource::Keep => {}
            EdgeLengthSource::Clear => tree.set_edge_length(id, None)?,
            EdgeLengthSource::Support => {
                tree.set_edge_length(id, Some(options.finalize_length(support)?))?;
            }
            EdgeLengthSource::MeanLength | EdgeLengthSource::MedianLength => {
                if let Some(stats) = length_summary {
                    let length = if options.edge_lengths == EdgeLengthSource::MeanLength {
                        stats.mean
                    } else {
                        stats.median
                    };
                    tree.set_edge_length(id, Some(options.finalize_length(length)?))?;
                }
            }
            EdgeLengthSource::MeanAge | EdgeLengthSource::MedianAge => {
                let age = age_summary.map(|stats| {
                    if options.edge_lengths == EdgeLengthSource::MeanAge {
                        stats.mean
                    } else {
                        stats.median
                    }
                });
                tree.set_age(id, age);
            }
        }
    }

    if matches!(
        options.edge_lengths,
        EdgeLengthSource::MeanAge | EdgeLengthSource::MedianAge
    ) {
        set_edge_lengths_from_node_ages(tree, options)?;
    }
    Ok(())
}

fn set_edge_lengths_from_node_ages(tree: &mut Tree, options: &SummarizationOptions) -> Result<(), SplitError> {
    for id in tree.preorder() {
        let node = tree.node(id);
        let Some(parent) = node.parent() else {
            continue;
        };
        if let (Some(age), Some(parent_age)) = (node.age(), tree.node(parent).age()) {
            let length = options.finalize_length(parent_age - age)?;
            tree.set_edge_length(id, Some(length))?;
        }
    }
    Ok(())
}
