//! The hook bundle that turns the generic engine into a concrete model.
//!
//! The forest engine owns tree layout, bagging, the split-selection
//! protocol, traversal and persistence; everything label-specific is
//! supplied by a [`ForestModel`] implementation: the impurity measure, the
//! best-split search, the leaf distribution factory and the model header
//! serialization. The engine is monomorphized over the model, so the hooks
//! dispatch statically.
//!
//! Shipped models:
//!
//! - [`classifier::Classifier`] - discrete labels, entropy-based splits
//! - [`circular::CircularRegressor`] - angular labels, von Mises leaves

pub mod circular;
pub mod classifier;

use crate::distribution::{DistributionParseError, NodeDistribution};

/// A feature score paired with the internal index of the sample that
/// produced it.
///
/// Split evaluation sorts these ascending by score; the internal index
/// refers to a position in the caller's id/label sequences.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreIndex {
    pub score: f32,
    pub index: u32,
}

/// Model-specific hooks consumed by the forest engine.
///
/// Implementations carry the model's fixed parameters (class count,
/// info-gain threshold, ...) and remain immutable during training; any
/// per-dataset precomputation lives in the associated `Scratch` value,
/// which is built once per training run and dropped when training ends.
pub trait ForestModel: Send + Sync + Sized {
    /// The label type the forest predicts.
    type Label: Copy + Send + Sync;
    /// The distribution stored at fitted nodes.
    type NodeDist: NodeDistribution<Label = Self::Label>;
    /// Per-training-run precomputed state shared by all trees.
    type Scratch: Send + Sync;

    /// Precompute whatever the split hooks need for this dataset.
    fn prepare_training(&self, labels: &[Self::Label]) -> Self::Scratch;

    /// Impurity of the labels selected by `bag` (lower is purer).
    ///
    /// Only differences of impurity values matter to the engine.
    fn node_impurity(&self, scratch: &Self::Scratch, labels: &[Self::Label], bag: &[u32]) -> f64;

    /// Find the best single-threshold split of `sorted` (ascending by
    /// score, at least two distinct scores).
    ///
    /// Returns `(info_gain, threshold)`; a gain of `f64::NEG_INFINITY`
    /// marks a list that admits no valid split.
    fn best_split(
        &self,
        scratch: &Self::Scratch,
        sorted: &[ScoreIndex],
        labels: &[Self::Label],
        initial_impurity: f64,
    ) -> (f64, f32);

    /// Gain threshold below which a node becomes a leaf.
    fn min_info_gain(&self) -> f64;

    /// A blank node distribution shaped for this model's label space.
    fn node_dist(&self) -> Self::NodeDist;

    /// Human-readable description of the header payload (ignored on read).
    fn header_description(&self) -> &'static str;

    /// Append the parameters needed to reconstruct the model.
    fn write_header(&self, out: &mut String);

    /// Reconstruct the model from the tokens written by
    /// [`write_header`](Self::write_header).
    fn read_header(
        tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<Self, DistributionParseError>;
}
