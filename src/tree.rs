//! Arena tree hosting one bipartition per edge.
//!
//! # Layout
//! All nodes live in one `Vec<Node>` and refer to each other by [`NodeId`].
//! A node owns the [`Edge`] leading to it from its parent (the seed node's
//! edge is the root edge). There are no reference cycles: parent and
//! children are plain indices.
//!
//! ```text
//!           seed (0)
//!          /    \
//!        (1)    (4)        nodes: [seed, n1, A, B, n4, C, D]
//!       /  \    /  \
//!      A    B  C    D
//! ```
//!
//! Nodes removed from the topology (spliced unifurcations, collapsed
//! bifurcations, detached subtrees) stay in the arena but are no longer
//! reachable from the seed; every traversal starts at the seed.
//!
//! Any structural edit invalidates the bipartition encoding; call
//! [`Tree::encode_bipartitions`] again before reading it.

use crate::bipartition::Bipartition;
use crate::bitset::Bitset;
use crate::error::SplitError;
use crate::summary::NodeSummary;
use crate::taxon::TaxonNamespace;
use phylotree::tree::Tree as PhyloTree;
use std::collections::HashMap;
use std::sync::Arc;

/// Index of a node in a tree's arena.
pub type NodeId = usize;

/// Whether the root of a tree is biologically meaningful.
///
/// `Undefined` is treated as unrooted wherever a decision is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rooting {
    Rooted,
    Unrooted,
    #[default]
    Undefined,
}

impl Rooting {
    pub fn is_rooted(self) -> bool {
        self == Rooting::Rooted
    }

    pub fn from_rooted(is_rooted: Option<bool>) -> Self {
        match is_rooted {
            Some(true) => Rooting::Rooted,
            Some(false) => Rooting::Unrooted,
            None => Rooting::Undefined,
        }
    }
}

/// The edge leading into a node.
#[derive(Debug, Clone, Default)]
pub struct Edge {
    length: Option<f64>,
    bipartition: Option<Bipartition>,
}

impl Edge {
    pub fn length(&self) -> Option<f64> {
        self.length
    }

    /// Set by encoding; only meaningful while the tree's encoding is current.
    pub fn bipartition(&self) -> Option<&Bipartition> {
        self.bipartition.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    id: NodeId,
    taxon: Option<usize>,
    label: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    edge: Edge,
    age: Option<f64>,
    support: Option<f64>,
    summary: Option<NodeSummary>,
}

impl Node {
    fn new(id: NodeId, parent: Option<NodeId>, taxon: Option<usize>, length: Option<f64>) -> Self {
        Node {
            id,
            taxon,
            label: None,
            parent,
            children: Vec::new(),
            edge: Edge {
                length,
                bipartition: None,
            },
            age: None,
            support: None,
            summary: None,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Index of this node's taxon in the tree's namespace.
    pub fn taxon(&self) -> Option<usize> {
        self.taxon
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn edge(&self) -> &Edge {
        &self.edge
    }

    /// Set by [`Tree::calc_node_ages`] or by age-based summarization.
    pub fn age(&self) -> Option<f64> {
        self.age
    }

    /// Split support set by summarization.
    pub fn support(&self) -> Option<f64> {
        self.support
    }

    pub fn summary(&self) -> Option<&NodeSummary> {
        self.summary.as_ref()
    }
}

/// A phylogenetic tree over a shared [`TaxonNamespace`].
#[derive(Debug, Clone)]
pub struct Tree {
    pub(crate) nodes: Vec<Node>,
    pub(crate) seed: NodeId,
    taxon_namespace: Arc<TaxonNamespace>,
    rooting: Rooting,
    weight: Option<f64>,
    pub(crate) encoding: Option<Vec<Bipartition>>,
    pub(crate) edge_map: HashMap<Bitset, NodeId>,
}

impl Tree {
    /// Creates a tree holding only a seed node.
    pub fn new(taxon_namespace: Arc<TaxonNamespace>) -> Self {
        Tree {
            nodes: vec![Node::new(0, None, None, None)],
            seed: 0,
            taxon_namespace,
            rooting: Rooting::Undefined,
            weight: None,
            encoding: None,
            edge_map: HashMap::new(),
        }
    }

    /// Converts a parsed `phylotree` tree into an arena tree.
    ///
    /// Leaf names are resolved against `taxon_namespace`; unnamed leaves
    /// become taxonless leaves, internal names become labels and parent edge
    /// lengths are kept.
    ///
    /// # Errors
    /// `InvalidTree` if `source` has no root, `InvalidArgument` if a leaf
    /// name is not in the namespace.
    pub fn from_phylotree(
        source: &PhyloTree,
        taxon_namespace: Arc<TaxonNamespace>,
        rooting: Rooting,
    ) -> Result<Self, SplitError> {
        let mut tree = Tree::new(taxon_namespace);
        tree.rooting = rooting;

        let root_id = source.get_root()?;
        let mut stack = vec![(root_id, tree.seed)];
        while let Some((source_id, node_id)) = stack.pop() {
            let source_node = source.get(&source_id)?;
            if source_node.children.is_empty() {
                if let Some(name) = source_node.name.as_ref().filter(|n| !n.is_empty()) {
                    let idx = tree.taxon_namespace.index_of(name).ok_or_else(|| {
                        SplitError::InvalidArgument(format!("taxon '{name}' not in namespace"))
                    })?;
                    tree.nodes[node_id].taxon = Some(idx);
                }
            } else {
                tree.nodes[node_id].label = source_node.name.clone().filter(|n| !n.is_empty());
            }
            for &child_id in &source_node.children {
                let child = source.get(&child_id)?;
                let new_id = tree.push_node(node_id, None, child.parent_edge);
                stack.push((child_id, new_id));
            }
        }
        Ok(tree)
    }

    pub fn taxon_namespace(&self) -> &Arc<TaxonNamespace> {
        &self.taxon_namespace
    }

    pub fn seed(&self) -> NodeId {
        self.seed
    }

    /// # Panics
    /// If `id` is not a node of this tree; see [`Tree::get_node`].
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    fn check_node(&self, id: NodeId) -> Result<(), SplitError> {
        if id < self.nodes.len() {
            Ok(())
        } else {
            Err(SplitError::IndexOutOfRange {
                index: id,
                len: self.nodes.len(),
            })
        }
    }

    pub fn rooting(&self) -> Rooting {
        self.rooting
    }

    pub fn is_rooted(&self) -> bool {
        self.rooting.is_rooted()
    }

    /// Changes the rooting state; the split normalization depends on it.
    pub fn set_rooting(&mut self, rooting: Rooting) {
        if rooting != self.rooting {
            self.rooting = rooting;
            self.invalidate_bipartitions();
        }
    }

    pub fn weight(&self) -> Option<f64> {
        self.weight
    }

    pub fn set_weight(&mut self, weight: Option<f64>) {
        self.weight = weight;
    }

    /// Adds a leaf for the taxon at `taxon` under `parent`.
    ///
    /// # Errors
    /// `IndexOutOfRange` if `parent` is not a node of this tree or `taxon`
    /// is not in the namespace.
    pub fn add_leaf(&mut self, parent: NodeId, taxon: usize, length: Option<f64>) -> Result<NodeId, SplitError> {
        self.check_node(parent)?;
        if self.taxon_namespace.taxon(taxon).is_none() {
            return Err(SplitError::IndexOutOfRange {
                index: taxon,
                len: self.taxon_namespace.len(),
            });
        }
        self.invalidate_bipartitions();
        Ok(self.push_node(parent, Some(taxon), length))
    }

    /// Adds a taxonless node under `parent`.
    ///
    /// # Errors
    /// `IndexOutOfRange` if `parent` is not a node of this tree.
    pub fn add_internal(&mut self, parent: NodeId, length: Option<f64>) -> Result<NodeId, SplitError> {
        self.check_node(parent)?;
        self.invalidate_bipartitions();
        Ok(self.push_node(parent, None, length))
    }

    /// Re-attaches `child` (with its subtree) as the last child of `new_parent`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for unknown nodes, `InvalidArgument` if `child` is
    /// the seed or an ancestor of `new_parent`.
    pub fn move_child(&mut self, child: NodeId, new_parent: NodeId) -> Result<(), SplitError> {
        self.check_node(child)?;
        self.check_node(new_parent)?;
        if child == self.seed || self.is_ancestor_of(child, new_parent) {
            return Err(SplitError::InvalidArgument(format!(
                "cannot move node {child} under node {new_parent}"
            )));
        }
        self.detach(child);
        self.nodes[child].parent = Some(new_parent);
        self.nodes[new_parent].children.push(child);
        self.invalidate_bipartitions();
        Ok(())
    }

    /// Detaches `child` and its subtree from `parent`.
    ///
    /// # Errors
    /// `IndexOutOfRange` for an unknown `child`, `InvalidArgument` if
    /// `child` is not a child of `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), SplitError> {
        self.check_node(child)?;
        if self.nodes[child].parent != Some(parent) {
            return Err(SplitError::InvalidArgument(format!(
                "node {child} is not a child of node {parent}"
            )));
        }
        self.detach(child);
        self.invalidate_bipartitions();
        Ok(())
    }

    pub fn set_edge_length(&mut self, id: NodeId, length: Option<f64>) -> Result<(), SplitError> {
        self.check_node(id)?;
        self.nodes[id].edge.length = length;
        Ok(())
    }

    pub fn set_label(&mut self, id: NodeId, label: Option<String>) -> Result<(), SplitError> {
        self.check_node(id)?;
        self.nodes[id].label = label;
        Ok(())
    }

    pub(crate) fn set_age(&mut self, id: NodeId, age: Option<f64>) {
        self.nodes[id].age = age;
    }

    pub(crate) fn set_support(&mut self, id: NodeId, support: Option<f64>) {
        self.nodes[id].support = support;
    }

    pub(crate) fn set_summary(&mut self, id: NodeId, summary: Option<NodeSummary>) {
        self.nodes[id].summary = summary;
    }

    pub(crate) fn set_bipartition(&mut self, id: NodeId, bipartition: Bipartition) {
        self.nodes[id].edge.bipartition = Some(bipartition);
    }

    /// Node ids reachable from the seed, children before parents.
    pub fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.seed, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Node ids reachable from the seed, parents before children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.seed];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    pub fn leaves(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|&id| self.nodes[id].is_leaf())
            .collect()
    }

    /// Ordered bipartitions of the current encoding, if it is up to date.
    pub fn bipartition_encoding(&self) -> Option<&[Bipartition]> {
        self.encoding.as_deref()
    }

    pub fn is_bipartitions_updated(&self) -> bool {
        self.encoding.is_some()
    }

    /// Node whose edge carries `split_bitmask` in the current encoding.
    pub fn edge_for_split(&self, split_bitmask: &Bitset) -> Option<NodeId> {
        self.encoding.as_ref()?;
        self.edge_map.get(split_bitmask).copied()
    }

    /// All taxa of the tree (the seed's leafset), once encoded.
    pub fn leafset_bitmask(&self) -> Option<&Bitset> {
        self.encoding.as_ref()?;
        self.nodes[self.seed]
            .edge
            .bipartition
            .as_ref()
            .map(|b| b.leafset_bitmask())
    }

    /// Removes a bifurcation at the seed by merging one child into it.
    ///
    /// The second child is collapsed if internal, else the first; the kept
    /// child's edge absorbs the collapsed edge's length. Returns whether
    /// anything changed.
    pub fn collapse_basal_bifurcation(&mut self) -> bool {
        let children = self.nodes[self.seed].children.clone();
        if children.len() != 2 {
            return false;
        }
        let (pos, to_collapse, to_keep) = if !self.nodes[children[1]].is_leaf() {
            (1, children[1], children[0])
        } else if !self.nodes[children[0]].is_leaf() {
            (0, children[0], children[1])
        } else {
            return false;
        };

        let merged = sum_lengths(self.nodes[to_keep].edge.length, self.nodes[to_collapse].edge.length);
        self.nodes[to_keep].edge.length = merged;

        let grandchildren = std::mem::take(&mut self.nodes[to_collapse].children);
        for &gc in &grandchildren {
            self.nodes[gc].parent = Some(self.seed);
        }
        self.nodes[to_collapse].parent = None;
        self.nodes[self.seed]
            .children
            .splice(pos..=pos, grandchildren);
        self.invalidate_bipartitions();
        true
    }

    /// Replaces a node that has exactly one child by that child.
    ///
    /// The child takes the node's place in the parent's children (or becomes
    /// the seed) and its edge absorbs the node's edge length.
    pub(crate) fn splice_unifurcation(&mut self, id: NodeId) {
        let child = self.nodes[id].children[0];
        let merged = sum_lengths(self.nodes[id].edge.length, self.nodes[child].edge.length);
        self.nodes[child].edge.length = merged;

        let parent = self.nodes[id].parent;
        self.nodes[child].parent = parent;
        match parent {
            Some(p) => {
                if let Some(slot) = self.nodes[p].children.iter_mut().find(|c| **c == id) {
                    *slot = child;
                }
            }
            None => self.seed = child,
        }
        self.nodes[id].children.clear();
        self.nodes[id].parent = None;
        self.invalidate_bipartitions();
    }

    /// Copies this tree onto another namespace.
    ///
    /// `remap` maps every taxon index used by this tree to an index in
    /// `taxon_namespace`. The copy carries no encoding.
    ///
    /// # Errors
    /// `InvalidArgument` if a taxon of this tree has no entry in `remap`.
    pub fn clone_with_taxon_remap(
        &self,
        taxon_namespace: Arc<TaxonNamespace>,
        remap: &HashMap<usize, usize>,
    ) -> Result<Tree, SplitError> {
        let mut nodes = self.nodes.clone();
        for node in nodes.iter_mut() {
            node.edge.bipartition = None;
            if let Some(old) = node.taxon {
                let new = remap.get(&old).copied().ok_or_else(|| {
                    SplitError::InvalidArgument(format!("no mapping for taxon index {old}"))
                })?;
                node.taxon = Some(new);
            }
        }
        Ok(Tree {
            nodes,
            seed: self.seed,
            taxon_namespace,
            rooting: self.rooting,
            weight: self.weight,
            encoding: None,
            edge_map: HashMap::new(),
        })
    }

    /// Newick rendering of the whole tree, terminated by `;`.
    pub fn as_newick_string(&self) -> String {
        let mut out = self.subtree_newick(self.seed);
        out.push(';');
        out
    }

    /// Newick rendering of the subtree below `id` (without its own edge).
    pub fn subtree_newick(&self, id: NodeId) -> String {
        let mut out = String::new();
        let mut stack = vec![(id, 0usize)];
        while let Some((current, next)) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_leaf() {
                out.push_str(&self.node_display_label(node));
                self.push_length(&mut out, node, current == id);
                continue;
            }
            if next == 0 {
                out.push('(');
            }
            if next < node.children.len() {
                if next > 0 {
                    out.push(',');
                }
                stack.push((current, next + 1));
                stack.push((node.children[next], 0));
            } else {
                out.push(')');
                out.push_str(&self.node_display_label(node));
                self.push_length(&mut out, node, current == id);
            }
        }
        out
    }

    fn node_display_label(&self, node: &Node) -> String {
        let raw = match node.taxon.and_then(|t| self.taxon_namespace.taxon(t)) {
            Some(taxon) => taxon.label(),
            None => node.label.as_deref().unwrap_or(""),
        };
        if raw.chars().any(|c| "()[]:;,' \t".contains(c)) {
            format!("'{}'", raw.replace('\'', "''"))
        } else {
            raw.to_string()
        }
    }

    fn push_length(&self, out: &mut String, node: &Node, is_top: bool) {
        if is_top {
            return;
        }
        if let Some(length) = node.edge.length {
            out.push(':');
            out.push_str(&length.to_string());
        }
    }

    fn push_node(&mut self, parent: NodeId, taxon: Option<usize>, length: Option<f64>) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node::new(id, Some(parent), taxon, length));
        self.nodes[parent].children.push(id);
        id
    }

    fn detach(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child].parent.take() {
            self.nodes[parent].children.retain(|&c| c != child);
        }
    }

    fn is_ancestor_of(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.nodes[id].parent {
                Some(p) => id = p,
                None => return false,
            }
        }
    }

    pub(crate) fn invalidate_bipartitions(&mut self) {
        self.encoding = None;
        self.edge_map.clear();
    }
}

fn sum_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (x, None) => x,
        (None, y) => y,
    }
}
