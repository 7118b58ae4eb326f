//! Python binding layer for split summaries.
//!
//! Provides Python functions that take tree samples as lists of Newick
//! strings and return split frequencies and summary trees.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use rayon::prelude::*;
use std::sync::Arc;

use crate::encode::{EncodeOptions, encode_trees_parallel};
use crate::error::SplitError;
use crate::summary::SummarizationOptions;
use crate::taxon::TaxonNamespace;
use crate::tree::{Rooting, Tree};
use crate::tree_array::TreeArray;

fn to_py_err(e: SplitError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Parses and encodes all trees over one shared namespace.
fn load_trees(newicks: &[String], rooted: bool) -> PyResult<(Arc<TaxonNamespace>, Vec<Tree>)> {
    if newicks.is_empty() {
        return Err(PyValueError::new_err("No trees provided"));
    }
    let sources: Vec<PhyloTree> = newicks
        .par_iter()
        .enumerate()
        .map(|(idx, newick)| {
            PhyloTree::from_newick(newick)
                .map_err(|e| PyValueError::new_err(format!("Failed to parse tree {}: {}", idx, e)))
        })
        .collect::<PyResult<Vec<_>>>()?;

    let namespace = Arc::new(TaxonNamespace::from_phylotrees(&sources).map_err(to_py_err)?);
    let rooting = Rooting::from_rooted(Some(rooted));
    let mut trees: Vec<Tree> = sources
        .par_iter()
        .map(|source| Tree::from_phylotree(source, Arc::clone(&namespace), rooting))
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    encode_trees_parallel(&mut trees, &EncodeOptions::default());
    Ok((namespace, trees))
}

fn load_array(newicks: &[String], rooted: bool) -> PyResult<TreeArray> {
    let (namespace, mut trees) = load_trees(newicks, rooted)?;
    let mut array = TreeArray::new(namespace);
    array.add_trees(&mut trees).map_err(to_py_err)?;
    Ok(array)
}

/// Compute the frequency of every split in a tree sample.
///
/// Args:
///     newicks: List of Newick strings over the same taxa
///     rooted: Treat the trees as rooted (default: False)
///     min_freq: Only report splits at least this frequent (default: 0.0)
///
/// Returns:
///     A list of (taxa, frequency) tuples sorted by descending frequency,
///     where taxa are the labels on one side of the split
///
/// Raises:
///     ValueError: If no trees are given or a tree cannot be parsed
#[pyfunction]
#[pyo3(signature = (newicks, rooted=false, min_freq=0.0))]
fn split_frequencies(newicks: Vec<String>, rooted: bool, min_freq: f64) -> PyResult<Vec<(Vec<String>, f64)>> {
    let array = load_array(&newicks, rooted)?;
    let distribution = array.split_distribution();
    let namespace = array.taxon_namespace();

    let mut result: Vec<(Vec<String>, f64)> = distribution
        .split_counts()
        .keys()
        .map(|split| (split, distribution.split_frequency(split)))
        .filter(|&(_, freq)| freq >= min_freq)
        .map(|(split, freq)| {
            let labels = namespace
                .bitmask_labels(split)
                .into_iter()
                .map(str::to_string)
                .collect();
            (labels, freq)
        })
        .collect();
    result.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(result)
}

/// Build a majority-rule consensus tree.
///
/// Args:
///     newicks: List of Newick strings over the same taxa
///     min_freq: Minimum split frequency to include (default: 0.5)
///     rooted: Treat the trees as rooted (default: False)
///     percent_support: Label nodes with support in percent instead of
///         as a fraction (default: False)
///
/// Returns:
///     The consensus tree in Newick format, internal nodes labelled with
///     their support and edge lengths set to the mean sampled length
///
/// Raises:
///     ValueError: If no trees are given or a tree cannot be parsed
#[pyfunction]
#[pyo3(signature = (newicks, min_freq=0.5, rooted=false, percent_support=false))]
fn consensus_tree(newicks: Vec<String>, min_freq: f64, rooted: bool, percent_support: bool) -> PyResult<String> {
    let array = load_array(&newicks, rooted)?;
    let options = SummarizationOptions {
        support_as_percentages: percent_support,
        support_as_labels: true,
        ..SummarizationOptions::default()
    };
    let tree = array
        .consensus_tree(min_freq, Some(&options))
        .map_err(to_py_err)?;
    Ok(tree.as_newick_string())
}

/// Find the maximum clade credibility tree of a sample.
///
/// The MCC tree is the sampled tree maximizing the product of its split
/// frequencies.
///
/// Args:
///     newicks: List of Newick strings over the same taxa
///     rooted: Treat the trees as rooted (default: True)
///
/// Returns:
///     A tuple of (newick, log_score)
///
/// Raises:
///     ValueError: If no trees are given or a tree cannot be parsed
#[pyfunction]
#[pyo3(signature = (newicks, rooted=true))]
fn maximum_clade_credibility_tree(newicks: Vec<String>, rooted: bool) -> PyResult<(String, f64)> {
    let array = load_array(&newicks, rooted)?;
    let (tree, score) = array
        .maximum_product_of_split_support_tree(false, None)
        .map_err(to_py_err)?;
    Ok((tree.as_newick_string(), score))
}

/// Python module definition
#[pymodule]
fn phylo_splits(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(split_frequencies, m)?)?;
    m.add_function(wrap_pyfunction!(consensus_tree, m)?)?;
    m.add_function(wrap_pyfunction!(maximum_clade_credibility_tree, m)?)?;
    Ok(())
}
