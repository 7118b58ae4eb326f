//! Rebuilding a tree from an ordered set of splits.
//!
//! Starting from a star tree over the leafset, each candidate split is
//! resolved in turn by grouping the children of its insertion point under a
//! new internal node. Earlier candidates win: a candidate that conflicts with
//! what has already been built is skipped without touching the tree.
//!
//! ```text
//! star      (A,B,C,D,E)
//! + {A,B}   ((A,B),C,D,E)
//! + {A,B,C} (((A,B),C),D,E)
//! + {B,C}   skipped, crosses {A,B}
//! ```

use crate::bitset::Bitset;
use crate::encode::EncodeOptions;
use crate::error::SplitError;
use crate::taxon::TaxonNamespace;
use crate::tree::{NodeId, Rooting, Tree};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds a [`Tree`] from split bitmasks.
#[derive(Debug, Clone)]
pub struct SplitReconstructor<'a> {
    taxon_namespace: Arc<TaxonNamespace>,
    leafset: Option<Bitset>,
    rooting: Rooting,
    edge_lengths: Option<&'a HashMap<Bitset, f64>>,
}

impl<'a> SplitReconstructor<'a> {
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        SplitReconstructor {
            taxon_namespace,
            leafset: None,
            rooting: Rooting::Undefined,
            edge_lengths: None,
        }
    }

    /// Taxa of the star tree; defaults to the whole namespace.
    pub fn leafset(mut self, leafset: Bitset) -> Self {
        self.leafset = Some(leafset);
        self
    }

    pub fn rooting(mut self, rooting: Rooting) -> Self {
        self.rooting = rooting;
        self
    }

    /// Edge lengths keyed by split bitmask, applied to accepted splits.
    pub fn edge_lengths(mut self, edge_lengths: &'a HashMap<Bitset, f64>) -> Self {
        self.edge_lengths = Some(edge_lengths);
        self
    }

    /// Resolves `splits` in order and returns the encoded tree.
    ///
    /// # Errors
    /// `IndexOutOfRange` if the leafset names a taxon outside the namespace.
    pub fn build<'s, I>(&self, splits: I) -> Result<Tree, SplitError>
    where
        I: IntoIterator<Item = &'s Bitset>,
    {
        let leafset = match &self.leafset {
            Some(leafset) => leafset.clone(),
            None => self.taxon_namespace.all_taxa_bitmask(),
        };
        if let Some(index) = leafset.ones().find(|&t| self.taxon_namespace.taxon(t).is_none()) {
            return Err(SplitError::IndexOutOfRange {
                index,
                len: self.taxon_namespace.len(),
            });
        }
        let is_rooted = self.rooting.is_rooted();

        let mut tree = Tree::new(Arc::clone(&self.taxon_namespace));
        tree.set_rooting(self.rooting);
        let seed = tree.seed();

        let mut node_leafsets: HashMap<NodeId, Bitset> = HashMap::new();
        let mut leaf_for_taxon: HashMap<usize, NodeId> = HashMap::new();
        for taxon in leafset.ones() {
            let leaf = tree.add_leaf(seed, taxon, None)?;
            leaf_for_taxon.insert(taxon, leaf);
            node_leafsets.insert(leaf, Bitset::singleton(taxon));
        }
        node_leafsets.insert(seed, leafset.clone());
        let lowest = leafset.lowest_set_bit();

        for candidate in splits {
            if !candidate.is_subset_of(&leafset) {
                debug!("reconstruct: rejecting split {candidate:?} outside the leafset");
                continue;
            }
            let length = self.edge_lengths.and_then(|m| m.get(candidate)).copied();

            let split = match lowest {
                Some(bit) if !is_rooted && candidate.contains(bit) => leafset.difference(candidate),
                _ => candidate.clone(),
            };
            let Some(member) = split.lowest_set_bit() else {
                continue;
            };
            if !is_rooted {
                let rest = leafset.difference(&split);
                let isolated = match (split.count_ones(), rest.count_ones()) {
                    (1, _) => Some(member),
                    (_, 1) => rest.lowest_set_bit(),
                    _ => None,
                };
                if let Some(taxon) = isolated {
                    if let (Some(&leaf), Some(length)) = (leaf_for_taxon.get(&taxon), length) {
                        tree.set_edge_length(leaf, Some(length))?;
                    }
                    continue;
                }
            }

            let Some(&leaf) = leaf_for_taxon.get(&member) else {
                continue;
            };
            let mut anchor = leaf;
            while !split.is_subset_of(&node_leafsets[&anchor]) {
                match tree.node(anchor).parent() {
                    Some(parent) => anchor = parent,
                    None => break,
                }
            }

            if node_leafsets[&anchor] == split {
                trace!("reconstruct: split {split:?} already present");
                if length.is_some() {
                    tree.set_edge_length(anchor, length)?;
                }
                continue;
            }

            let movers: Vec<NodeId> = tree
                .node(anchor)
                .children()
                .iter()
                .copied()
                .filter(|c| node_leafsets[c].intersects(&split))
                .collect();
            let mut covered = Bitset::new();
            for mover in &movers {
                covered.or_assign(&node_leafsets[mover]);
            }
            if covered != split {
                debug!("reconstruct: skipping split {split:?}, incompatible with accepted splits");
                continue;
            }

            let node = tree.add_internal(anchor, length)?;
            for mover in movers {
                tree.move_child(mover, node)?;
            }
            node_leafsets.insert(node, split);
        }

        tree.encode_bipartitions(&EncodeOptions {
            suppress_unifurcations: false,
            collapse_unrooted_basal_bifurcation: false,
        });
        Ok(tree)
    }
}

impl Tree {
    /// Builds a tree over the whole namespace from ordered splits.
    pub fn from_split_bitmasks<'s, I>(
        taxon_namespace: Arc<TaxonNamespace>,
        splits: I,
        rooting: Rooting,
        edge_lengths: Option<&HashMap<Bitset, f64>>,
    ) -> Result<Tree, SplitError>
    where
        I: IntoIterator<Item = &'s Bitset>,
    {
        let mut reconstructor = SplitReconstructor::new(taxon_namespace).rooting(rooting);
        if let Some(edge_lengths) = edge_lengths {
            reconstructor = reconstructor.edge_lengths(edge_lengths);
        }
        reconstructor.build(splits)
    }
}
