//! canopy: a generic random-forest engine for Rust.
//!
//! Canopy trains and evaluates ensembles of binary decision trees over
//! user-defined label spaces, feature extractors and leaf distributions.
//! The engine itself is domain-agnostic; concrete predictors plug a label
//! type, an impurity measure and a leaf distribution into the shared
//! training and inference machinery.
//!
//! # Key Types
//!
//! - [`Forest`] - The ensemble: training, inference and persistence
//! - [`ForestModel`] - Hook bundle implemented by each specialization
//! - [`Classifier`] / [`ClassifierForest`] - Discrete-label specialization
//! - [`CircularRegressor`] / [`CircularForest`] - Angular specialization
//! - [`TrainConfig`] - Training configuration builder
//!
//! # Training
//!
//! Build a [`TrainConfig`] with `TrainConfig::builder()`, then call
//! [`Forest::train`] with sample ids, labels, a groupwise feature functor
//! and a parameter sampler. Plain closures satisfy the functor traits.
//!
//! ```ignore
//! use canopy::{Classifier, Forest, TrainConfig, UniformParameterSampler};
//!
//! let model = Classifier::new(3);
//! let mut forest: Forest<Classifier, 1> = Forest::new(model, 128, 10);
//! let config = TrainConfig::builder().num_param_combos(2).build()?;
//! forest.train(&ids, &labels, &features, &UniformParameterSampler::new(1), &config)?;
//! ```
//!
//! # Inference
//!
//! Either predict a full output distribution per id
//! ([`Forest::predict_dist_groupwise`], [`Forest::predict_dist_single`])
//! or evaluate the model probability of given labels
//! ([`Forest::probability_groupwise`], [`Forest::probability_single`]).
//!
//! # Persistence
//!
//! Models round-trip through a line-oriented text format via
//! [`Forest::write_to_file`] and [`Forest::read_from_file`]; loading can
//! truncate the ensemble or the tree depth (see [`LoadOptions`]).

pub mod distribution;
pub mod features;
pub mod inference;
pub mod io;
pub mod model;
pub mod repr;
pub mod special;
pub mod testing;
pub mod training;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Core engine types
pub use model::{ForestModel, ScoreIndex};
pub use repr::{Forest, Node, Tree};

// Shipped specializations
pub use model::circular::{CircularForest, CircularRegressor};
pub use model::classifier::{Classifier, ClassifierForest};

// Distribution capabilities
pub use distribution::discrete::DiscreteDistribution;
pub use distribution::von_mises::VonMisesDistribution;
pub use distribution::{DistributionParseError, NodeDistribution, OutputDistribution};

// Feature and parameter contracts
pub use features::{
    GroupwiseFeatures, ParameterSampler, PointwiseFeatures, UniformParameterSampler,
};

// Training and persistence entry points
pub use io::{LoadOptions, PersistError};
pub use training::{ConfigError, TrainConfig, Verbosity};

// Shared utilities
pub use utils::{run_with_threads, Parallelism};
