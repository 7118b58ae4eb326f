//! End-to-end flow: Newick sample -> distribution / array -> summary trees.

use phylo_splits::{
    Bitset, EdgeLengthSource, Rooting, SplitDistribution, SummarizationOptions, TaxonNamespace,
    Tree, TreeArray, encode_trees_parallel, EncodeOptions,
};
use phylotree::tree::Tree as PhyloTree;
use std::collections::BTreeSet;
use std::sync::Arc;

const SAMPLE: [&str; 3] = [
    "((A:1,B:1):1,(C:1,D:1):1);",
    "((B:1,A:1):2,(D:1,C:1):1);",
    "((A:1,C:1):1,(B:1,D:1):1);",
];

fn load(newicks: &[&str], rooting: Rooting) -> (Arc<TaxonNamespace>, Vec<Tree>) {
    let sources: Vec<PhyloTree> = newicks
        .iter()
        .map(|n| PhyloTree::from_newick(n).unwrap())
        .collect();
    let ns = Arc::new(TaxonNamespace::from_phylotrees(&sources).unwrap());
    let trees = sources
        .iter()
        .map(|s| Tree::from_phylotree(s, Arc::clone(&ns), rooting).unwrap())
        .collect();
    (ns, trees)
}

fn split_set(tree: &Tree) -> BTreeSet<Bitset> {
    tree.bipartition_encoding()
        .unwrap()
        .iter()
        .map(|b| b.split_bitmask().clone())
        .collect()
}

#[test]
fn frequencies_and_majority_consensus() {
    let (ns, mut trees) = load(&SAMPLE, Rooting::Unrooted);
    encode_trees_parallel(&mut trees, &EncodeOptions::default());
    let mut dist = SplitDistribution::new(Arc::clone(&ns));
    dist.count_splits_on_trees(&mut trees).unwrap();

    let ab = ns.taxa_bitmask(["C", "D"]).unwrap();
    let ac = ns.taxa_bitmask(["B", "D"]).unwrap();
    assert!((dist.split_frequency(&ab) - 2.0 / 3.0).abs() < 1e-12);
    assert!((dist.split_frequency(&ac) - 1.0 / 3.0).abs() < 1e-12);

    let consensus = dist.consensus_tree(0.5, None, None).unwrap();
    assert!(!consensus.is_rooted());
    assert_eq!(split_set(&consensus), split_set(&trees[0]));
}

#[test]
fn single_tree_survives_strict_consensus() {
    let (ns, mut trees) = load(&["((A:1,B:1):1,((C:1,D:1):1,E:2):1);"], Rooting::Rooted);
    let mut dist = SplitDistribution::new(Arc::clone(&ns));
    dist.count_splits_on_tree(&mut trees[0]).unwrap();

    let consensus = dist.consensus_tree(1.0, None, None).unwrap();
    assert_eq!(split_set(&consensus), split_set(&trees[0]));
}

#[test]
fn single_unrooted_tree_survives_strict_consensus() {
    let (ns, mut trees) = load(&["((A:1,B:1):1,(C:1,(D:1,E:1):1):1);"], Rooting::Unrooted);
    let mut dist = SplitDistribution::new(Arc::clone(&ns));
    dist.count_splits_on_tree(&mut trees[0]).unwrap();
    assert_eq!(split_set(&trees[0]).len(), 7);

    let consensus = dist.consensus_tree(1.0, None, None).unwrap();
    assert!(!consensus.is_rooted());
    assert_eq!(split_set(&consensus), split_set(&trees[0]));
}

#[test]
fn tree_array_round_trip_and_mcc() {
    let (ns, mut trees) = load(&SAMPLE, Rooting::Rooted);
    let mut array = TreeArray::new(Arc::clone(&ns));
    array.add_trees(&mut trees).unwrap();

    for (i, original) in trees.iter().enumerate() {
        let restored = array.restore_tree(i, None).unwrap();
        assert_eq!(split_set(&restored), split_set(original));
        for split in split_set(original) {
            let a = original.edge_for_split(&split).unwrap();
            let b = restored.edge_for_split(&split).unwrap();
            assert_eq!(original.node(a).edge().length(), restored.node(b).edge().length());
        }
    }

    let (mcc, score) = array.maximum_product_of_split_support_tree(false, None).unwrap();
    assert!((score - 2.0 * (2.0f64 / 3.0).ln()).abs() < 1e-12);
    assert_eq!(split_set(&mcc), split_set(&trees[0]));
}

#[test]
fn log_product_is_zero_for_identical_trees() {
    let (ns, mut trees) = load(&[SAMPLE[0], SAMPLE[1]], Rooting::Rooted);
    let mut array = TreeArray::new(Arc::clone(&ns));
    array.add_trees(&mut trees).unwrap();

    let (scores, best) = array.calculate_log_product_of_split_supports(true);
    assert_eq!(scores, vec![0.0, 0.0]);
    assert_eq!(best, Some(0));
    assert_eq!(array.split_bitmask_set_frequencies().len(), 1);
}

#[test]
fn summarized_consensus_uses_median_lengths() {
    let (ns, mut trees) = load(&SAMPLE, Rooting::Rooted);
    let mut array = TreeArray::new(Arc::clone(&ns));
    array.add_trees(&mut trees).unwrap();

    let options = SummarizationOptions {
        edge_lengths: EdgeLengthSource::MedianLength,
        ..SummarizationOptions::default()
    };
    let consensus = array.consensus_tree(0.5, Some(&options)).unwrap();
    let ab = ns.taxa_bitmask(["A", "B"]).unwrap();
    let node = consensus.node(consensus.edge_for_split(&ab).unwrap());
    assert_eq!(node.edge().length(), Some(1.5));
    assert!((node.support().unwrap() - 2.0 / 3.0).abs() < 1e-12);
}
