//! Bipartition encoding: one post-order pass that annotates every edge.
//!
//! # Algorithm
//! 1. With suppression on, splice out seed unifurcations until the seed has
//!    zero or several children. Then optionally collapse a basal
//!    bifurcation of an unrooted tree, repeating while the seed stays
//!    bifurcating (the two edges at the seed are one unrooted edge and would
//!    otherwise yield the same split twice).
//! 2. Walk the nodes children-first:
//!    - **Unifurcation** (one child) with suppression on: splice the node
//!      out, its child inherits the summed edge length. No split is emitted.
//!    - **Leaf**: leafset is the taxon's single bit (empty if taxonless).
//!    - **Internal**: leafset is the OR of the children's leafsets.
//! 3. The seed's leafset is the tree leafset; every recorded edge gets a
//!    frozen [`Bipartition`] compiled against it.
//!
//! The root edge is emitted for rooted trees only. An unrooted tree has no
//! root edge: its normalized split would be the empty set.
//!
//! # Example
//! ```text
//! ((A,B),(C,D)) rooted    → A, B, {A,B}, C, D, {C,D}, root  (7 splits)
//! ((A,B),(C,D)) unrooted  → A, B, C, D, {C,D}               (5 splits)
//! ```

use crate::bipartition::{Bipartition, BipartitionBuilder};
use crate::bitset::Bitset;
use crate::tree::{NodeId, Tree};
use log::trace;
use rayon::prelude::*;
use std::collections::HashMap;

/// Options for [`Tree::encode_bipartitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Splice out nodes with a single child.
    pub suppress_unifurcations: bool,
    /// Merge a bifurcating seed of an unrooted tree into a multifurcation.
    pub collapse_unrooted_basal_bifurcation: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        EncodeOptions {
            suppress_unifurcations: true,
            collapse_unrooted_basal_bifurcation: true,
        }
    }
}

impl Tree {
    /// Computes one bipartition per retained edge.
    ///
    /// Replaces any previous encoding. The returned slice is in post-order;
    /// each edge also carries its bipartition and
    /// [`Tree::edge_for_split`] resolves splits back to edges.
    pub fn encode_bipartitions(&mut self, options: &EncodeOptions) -> &[Bipartition] {
        let is_rooted = self.is_rooted();
        if options.suppress_unifurcations {
            while self.nodes[self.seed].children().len() == 1 {
                let seed = self.seed;
                trace!("encode: suppressing unifurcation at seed {seed}");
                self.splice_unifurcation(seed);
            }
        }
        if options.collapse_unrooted_basal_bifurcation && !is_rooted {
            while self.collapse_basal_bifurcation() {}
        }

        let mut leafsets: HashMap<NodeId, Bitset> = HashMap::with_capacity(self.nodes.len());
        let mut recorded: Vec<NodeId> = Vec::with_capacity(self.nodes.len());
        for id in self.postorder() {
            let children = self.nodes[id].children().to_vec();
            if children.len() == 1 && options.suppress_unifurcations {
                trace!("encode: suppressing unifurcation at node {id}");
                self.splice_unifurcation(id);
                continue;
            }
            let leafset = if children.is_empty() {
                self.nodes[id]
                    .taxon()
                    .map(Bitset::singleton)
                    .unwrap_or_default()
            } else {
                let mut leafset = Bitset::new();
                for child in &children {
                    if let Some(child_leafset) = leafsets.get(child) {
                        leafset.or_assign(child_leafset);
                    }
                }
                leafset
            };
            leafsets.insert(id, leafset);
            recorded.push(id);
        }

        let tree_leafset = leafsets.get(&self.seed).cloned().unwrap_or_default();
        let mut encoding = Vec::with_capacity(recorded.len());
        let mut edge_map = HashMap::with_capacity(recorded.len());
        for id in recorded {
            let leafset = leafsets.remove(&id).unwrap_or_default();
            let mut builder = BipartitionBuilder::new();
            builder.compile(leafset, tree_leafset.clone(), is_rooted);
            let bipartition = builder.freeze();
            if is_rooted || id != self.seed {
                edge_map.insert(bipartition.split_bitmask().clone(), id);
                encoding.push(bipartition.clone());
            }
            self.set_bipartition(id, bipartition);
        }

        self.edge_map = edge_map;
        self.encoding.insert(encoding)
    }

    /// Returns the current encoding, encoding first if it is stale.
    pub fn ensure_bipartitions(&mut self, options: &EncodeOptions) -> &[Bipartition] {
        if self.encoding.is_none() {
            self.encode_bipartitions(options);
        }
        self.encoding.as_deref().unwrap_or_default()
    }
}

/// Encodes many independent trees at once.
///
/// Each tree only touches its own arena, so this is a plain parallel map;
/// counting the results into a distribution remains sequential.
pub fn encode_trees_parallel(trees: &mut [Tree], options: &EncodeOptions) {
    trees.par_iter_mut().for_each(|tree| {
        tree.encode_bipartitions(options);
    });
}
