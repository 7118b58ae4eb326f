//! Error type shared by all split operations.

use thiserror::Error;

/// Errors raised while encoding, counting, merging or rebuilding trees.
///
/// Every error is reported by the call that detected it. Aggregation that
/// already happened before the failure is not rolled back.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SplitError {
    /// A tree or distribution refers to a different taxon namespace than the
    /// aggregator it is being added to.
    #[error("taxon namespace of the tree is not the namespace of the collection")]
    TaxonNamespaceIdentity,

    /// A tree's rooting disagrees with the rooting fixed by the first tree.
    #[error("mixed rooting: collection holds {} trees but tree is {}", rooted_str(.expected), rooted_str(.found))]
    MixedRooting { expected: bool, found: bool },

    #[error("cannot merge collections of rooted and unrooted trees")]
    IncompatibleRootingUpdate,

    #[error("cannot merge collections with different edge length tracking")]
    IncompatibleEdgeLengthsUpdate,

    #[error("cannot merge collections with different node age tracking")]
    IncompatibleNodeAgesUpdate,

    #[error("cannot merge collections with different tree weight tracking")]
    IncompatibleTreeWeightsUpdate,

    /// Sibling subtrees imply ages differing by more than the precision.
    #[error("tree is not ultrametric within threshold of {precision} (deviation {deviation}): {subtree}")]
    Ultrametricity {
        precision: f64,
        deviation: f64,
        subtree: String,
    },

    #[error("computed negative edge length {length}")]
    NegativeEdgeLength { length: f64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A source tree could not be converted (missing root, unnamed leaf...).
    #[error("invalid tree: {0}")]
    InvalidTree(String),
}

fn rooted_str(rooted: &bool) -> &'static str {
    if *rooted { "rooted" } else { "unrooted" }
}

impl From<phylotree::tree::TreeError> for SplitError {
    fn from(e: phylotree::tree::TreeError) -> Self {
        SplitError::InvalidTree(e.to_string())
    }
}
