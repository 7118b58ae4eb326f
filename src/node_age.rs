//! Node ages (time before present) for ultrametric trees.
//!
//! Ages are computed bottom-up: a leaf is age 0 (or whatever the leaf-age
//! override says, for non-contemporaneous tips), and an internal node is as
//! old as its first child plus that child's edge length. Every other child
//! must imply the same age within `ultrametricity_precision`, unless the
//! maximum or minimum over all children is forced instead.
//!
//! Missing edge lengths count as 0.

use crate::error::SplitError;
use crate::tree::{Node, Tree};
use std::fmt;
use std::sync::Arc;

/// Override for leaf ages; `None` falls back to 0.
#[derive(Clone)]
pub struct LeafAgeFn(Arc<dyn Fn(&Node) -> Option<f64> + Send + Sync>);

impl LeafAgeFn {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Node) -> Option<f64> + Send + Sync + 'static,
    {
        LeafAgeFn(Arc::new(f))
    }

    fn age(&self, node: &Node) -> Option<f64> {
        (self.0)(node)
    }
}

impl fmt::Debug for LeafAgeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LeafAgeFn(..)")
    }
}

#[derive(Debug, Clone)]
pub struct NodeAgeOptions {
    /// Maximum tolerated disagreement between sibling-implied ages.
    /// `None` disables the check.
    pub ultrametricity_precision: Option<f64>,
    /// Use the oldest child-implied age instead of checking.
    pub force_max_age: bool,
    /// Use the youngest child-implied age instead of checking.
    pub force_min_age: bool,
    pub leaf_age: Option<LeafAgeFn>,
}

impl Default for NodeAgeOptions {
    fn default() -> Self {
        NodeAgeOptions {
            ultrametricity_precision: Some(1e-5),
            force_max_age: false,
            force_min_age: false,
            leaf_age: None,
        }
    }
}

impl Tree {
    /// Sets the age of every node reachable from the seed.
    ///
    /// # Errors
    /// `Ultrametricity` when two children of a node imply ages further apart
    /// than the precision; the error carries the node's subtree in Newick.
    pub fn calc_node_ages(&mut self, options: &NodeAgeOptions) -> Result<(), SplitError> {
        for id in self.postorder() {
            let node = self.node(id);
            let age = if node.is_leaf() {
                options
                    .leaf_age
                    .as_ref()
                    .and_then(|f| f.age(node))
                    .unwrap_or(0.0)
            } else {
                let implied: Vec<f64> = node
                    .children()
                    .iter()
                    .map(|&c| {
                        let child = self.node(c);
                        child.age().unwrap_or(0.0) + child.edge().length().unwrap_or(0.0)
                    })
                    .collect();
                if options.force_max_age {
                    implied.iter().copied().fold(f64::NEG_INFINITY, f64::max)
                } else if options.force_min_age {
                    implied.iter().copied().fold(f64::INFINITY, f64::min)
                } else {
                    let first = implied[0];
                    if let Some(precision) = options.ultrametricity_precision {
                        for &other in &implied[1..] {
                            let deviation = (first - other).abs();
                            if deviation > precision {
                                return Err(SplitError::Ultrametricity {
                                    precision,
                                    deviation,
                                    subtree: self.subtree_newick(id),
                                });
                            }
                        }
                    }
                    first
                }
            };
            self.set_age(id, Some(age));
        }
        Ok(())
    }
}
