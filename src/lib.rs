//! Crate root: lightweight module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: arbitrary-width bitmasks and the split algebra on them.
//! - `taxon`: taxon namespaces mapping labels to bit positions.
//! - `bipartition`: frozen splits and their builder.
//! - `tree`: arena tree with rooting state, conversion from `phylotree`.
//! - `encode`: bipartition encoding of a tree.
//! - `node_age`: node ages of ultrametric trees.
//! - `reconstruct`: rebuilding a tree from ordered splits.
//! - `summary`: summary statistics and tree decoration.
//! - `split_distribution`: split frequencies, consensus and support scores.
//! - `tree_array`: compact tree storage with topology grouping and MCC.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod bipartition;
pub mod bitset;
pub mod encode;
pub mod error;
pub mod node_age;
pub mod reconstruct;
pub mod split_distribution;
pub mod summary;
pub mod taxon;
pub mod tree;
pub mod tree_array;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use bipartition::{Bipartition, BipartitionBuilder};
pub use bitset::Bitset;
pub use encode::{EncodeOptions, encode_trees_parallel};
pub use error::SplitError;
pub use node_age::{LeafAgeFn, NodeAgeOptions};
pub use reconstruct::SplitReconstructor;
pub use split_distribution::{CountedTree, SplitDistribution, SplitDistributionConfig};
pub use summary::{EdgeLengthSource, NodeSummary, SummarizationOptions, SummaryStats};
pub use taxon::{Taxon, TaxonNamespace};
pub use tree::{Edge, Node, NodeId, Rooting, Tree};
pub use tree_array::{TreeArray, TreeRecord};
