//! The forest: an ordered ensemble of trees sharing one topology.

use crate::model::ForestModel;

use super::tree::slots_for_depth;
use super::Tree;

/// A random forest of `T` complete binary trees of depth `D`.
///
/// `M` supplies the model-specific hooks (impurity, split search, leaf
/// distributions, header serialization); `P` is the length of the
/// feature-parameter vector handed to the feature functor.
///
/// A forest starts *invalid*: it owns allocated but unfitted trees and
/// must not be queried. Training ([`train`]) or loading
/// ([`read_from_file`]) makes it valid; any failure along the way leaves
/// it invalid.
///
/// [`train`]: Forest::train
/// [`read_from_file`]: Forest::read_from_file
#[derive(Debug, Clone)]
pub struct Forest<M: ForestModel, const P: usize> {
    pub(crate) model: M,
    pub(crate) trees: Vec<Tree<M::NodeDist, P>>,
    pub(crate) n_levels: u32,
    pub(crate) fit_split_nodes: bool,
    pub(crate) feature_header: String,
    pub(crate) feature_string: String,
    pub(crate) valid: bool,
}

impl<M: ForestModel, const P: usize> Forest<M, P> {
    /// Create an untrained forest of `num_trees` trees of depth
    /// `num_levels`, each with its full complement of
    /// `2^(num_levels+1) - 1` node slots.
    pub fn new(model: M, num_trees: usize, num_levels: u32) -> Self {
        let n_nodes = slots_for_depth(num_levels);
        let trees = (0..num_trees)
            .map(|_| Tree::with_node_slots(n_nodes))
            .collect();

        Self {
            model,
            trees,
            n_levels: num_levels,
            fit_split_nodes: false,
            feature_header: String::new(),
            feature_string: String::new(),
            valid: false,
        }
    }

    pub(crate) fn from_parts(
        model: M,
        trees: Vec<Tree<M::NodeDist, P>>,
        n_levels: u32,
        fit_split_nodes: bool,
    ) -> Self {
        Self {
            model,
            trees,
            n_levels,
            fit_split_nodes,
            feature_header: String::new(),
            feature_string: String::new(),
            valid: true,
        }
    }

    /// Whether the forest has been trained or loaded and may be queried.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Maximum tree depth.
    #[inline]
    pub fn n_levels(&self) -> u32 {
        self.n_levels
    }

    /// Node slots per tree.
    #[inline]
    pub fn n_nodes_per_tree(&self) -> usize {
        slots_for_depth(self.n_levels)
    }

    /// Whether node distributions were fitted at split nodes as well.
    #[inline]
    pub fn fits_split_nodes(&self) -> bool {
        self.fit_split_nodes
    }

    /// The model hooks this forest was built around.
    #[inline]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Access a tree of the ensemble.
    #[inline]
    pub fn tree(&self, t: usize) -> &Tree<M::NodeDist, P> {
        &self.trees[t]
    }

    /// Iterate over the trees.
    pub fn trees(&self) -> impl Iterator<Item = &Tree<M::NodeDist, P>> {
        self.trees.iter()
    }

    /// Attach a free-form description of the feature extraction process.
    ///
    /// Both strings are opaque to the engine; they are persisted alongside
    /// the model so a stored forest can be matched to its feature pipeline.
    /// Newlines are replaced by spaces to keep the text format line-based.
    pub fn set_feature_definition(&mut self, header: &str, feature_string: &str) {
        self.feature_header = header.replace('\n', " ");
        self.feature_string = feature_string.replace('\n', " ");
    }

    /// The feature definition attached to this forest, `(header, string)`.
    pub fn feature_definition(&self) -> (&str, &str) {
        (&self.feature_header, &self.feature_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::classifier::Classifier;

    #[test]
    fn new_forest_is_invalid_with_allocated_trees() {
        let forest: Forest<Classifier, 1> = Forest::new(Classifier::new(3), 4, 5);
        assert!(!forest.is_valid());
        assert_eq!(forest.n_trees(), 4);
        assert_eq!(forest.n_levels(), 5);
        assert_eq!(forest.n_nodes_per_tree(), 63);
        for tree in forest.trees() {
            assert_eq!(tree.n_nodes(), 63);
        }
    }

    #[test]
    fn feature_definition_round_trips_and_flattens_newlines() {
        let mut forest: Forest<Classifier, 1> = Forest::new(Classifier::new(2), 1, 1);
        forest.set_feature_definition("gaussian features", "dims:\n2");
        assert_eq!(forest.feature_definition(), ("gaussian features", "dims: 2"));
    }
}
