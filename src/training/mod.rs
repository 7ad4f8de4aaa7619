//! Forest training: configuration, bagging and the per-tree grower.
//!
//! Training walks every tree independently (and in parallel): the root
//! bag is the (optionally bagged) training set, and each live node either
//! becomes a leaf or is split by the best of `num_param_combos` randomly
//! sampled feature parameterizations, partitioning its bag onto the two
//! children. All label-specific decisions go through the
//! [`ForestModel`](crate::model::ForestModel) hooks.

mod logger;

use std::num::NonZeroUsize;

use bon::Builder;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use thiserror::Error;

use crate::distribution::NodeDistribution;
use crate::features::{GroupwiseFeatures, ParameterSampler};
use crate::model::{ForestModel, ScoreIndex};
use crate::repr::{Forest, Tree};
use crate::utils::run_with_threads;

pub use logger::{TrainingLogger, Verbosity};

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during training-configuration validation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Bagging proportion must lie in `(0, 1]`.
    #[error("bag_proportion must be in (0, 1], got {0}")]
    InvalidBagProportion(f32),
    /// At least one parameter combination must be tested per node.
    #[error("num_param_combos must be at least 1")]
    InvalidParamCombos,
}

// =============================================================================
// TrainConfig
// =============================================================================

/// Configuration for [`Forest::train`].
///
/// Built through the `bon` builder; `build()` validates and returns a
/// [`ConfigError`] for out-of-range values.
///
/// # Example
///
/// ```
/// use canopy::TrainConfig;
///
/// let config = TrainConfig::builder()
///     .num_param_combos(8)
///     .bag_proportion(0.7)
///     .seed(42)
///     .build()
///     .unwrap();
/// assert!(config.bagging);
/// ```
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct TrainConfig {
    /// Number of random feature parameterizations tried per split node.
    pub num_param_combos: u32,

    /// Whether each tree trains on a random subsample of the data.
    /// Default: true.
    #[builder(default = true)]
    pub bagging: bool,

    /// Fraction of the training set bagged per tree, in `(0, 1]`.
    /// Default: 0.5.
    #[builder(default = 0.5)]
    pub bag_proportion: f32,

    /// Also fit a node distribution at every split node. Enables depth
    /// truncation when the model is later loaded. Default: true.
    #[builder(default = true)]
    pub fit_split_nodes: bool,

    /// Bags smaller than this become leaves. Default: 50.
    #[builder(default = 50)]
    pub min_training_data: u32,

    /// Master random seed. `None` seeds from entropy; a fixed seed with
    /// single-threaded training reproduces the forest exactly.
    pub seed: Option<u64>,

    /// Number of worker threads. `None` uses all available cores.
    pub n_threads: Option<NonZeroUsize>,

    /// Progress output level. Default: `Silent`.
    #[builder(default)]
    pub verbosity: Verbosity,
}

/// Custom finishing function that validates the config.
impl<S: train_config_builder::IsComplete> TrainConfigBuilder<S> {
    /// Build and validate the configuration.
    pub fn build(self) -> Result<TrainConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl TrainConfig {
    /// Validate the configuration.
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if !(self.bag_proportion > 0.0 && self.bag_proportion <= 1.0) {
            return Err(ConfigError::InvalidBagProportion(self.bag_proportion));
        }
        if self.num_param_combos == 0 {
            return Err(ConfigError::InvalidParamCombos);
        }
        Ok(())
    }
}

// =============================================================================
// Training
// =============================================================================

/// The best split found so far at one node.
struct BestSplit<const P: usize> {
    info_gain: f64,
    thresh: f32,
    params: [i32; P],
    /// Scores of the bag (in bag order) under `params`, retained so the
    /// accepted split can partition without re-evaluating the feature.
    scores: Vec<f32>,
}

impl<M: ForestModel, const P: usize> Forest<M, P> {
    /// Train the forest on `ids[i] -> labels[i]`.
    ///
    /// `features` scores batches of ids under a candidate parameter
    /// vector; `sampler` draws those vectors. Both must be callable
    /// concurrently. The caller's sequences are never reordered; the
    /// engine tracks samples by index.
    ///
    /// On success the forest becomes valid. A configuration error leaves
    /// it invalid and untouched otherwise.
    pub fn train<I, F, G>(
        &mut self,
        ids: &[I],
        labels: &[M::Label],
        features: &F,
        sampler: &G,
        config: &TrainConfig,
    ) -> Result<(), ConfigError>
    where
        I: Clone + Sync,
        F: GroupwiseFeatures<I, P>,
        G: ParameterSampler<P>,
    {
        assert_eq!(ids.len(), labels.len(), "one label per id");
        // A failed training attempt leaves the forest unusable, whatever
        // state it was in before.
        self.valid = false;
        config.validate()?;

        let logger = TrainingLogger::new(config.verbosity);
        logger.training_started(self.trees.len(), ids.len());

        let scratch = self.model.prepare_training(labels);
        let master_seed = config.seed.unwrap_or_else(rand::random);
        let n_trees = self.trees.len();
        let n_threads = config.n_threads.map_or(0, NonZeroUsize::get);

        let grower = TreeGrower {
            model: &self.model,
            scratch: &scratch,
            ids,
            labels,
            features,
            sampler,
            config,
            n_levels: self.n_levels,
            master_seed,
        };

        self.trees = run_with_threads(n_threads, |parallelism| {
            parallelism.maybe_par_map(0..n_trees, |t| {
                let tree = grower.grow(t);
                logger.tree_trained(t, n_trees);
                tree
            })
        });

        self.fit_split_nodes = config.fit_split_nodes;
        self.valid = true;
        logger.training_finished(n_trees);
        Ok(())
    }
}

/// Everything one tree needs to grow itself; shared read-only across the
/// per-tree workers.
struct TreeGrower<'a, M: ForestModel, I, F, G, const P: usize> {
    model: &'a M,
    scratch: &'a M::Scratch,
    ids: &'a [I],
    labels: &'a [M::Label],
    features: &'a F,
    sampler: &'a G,
    config: &'a TrainConfig,
    n_levels: u32,
    master_seed: u64,
}

impl<'a, M, I, F, G, const P: usize> TreeGrower<'a, M, I, F, G, P>
where
    M: ForestModel,
    I: Clone + Sync,
    F: GroupwiseFeatures<I, P>,
    G: ParameterSampler<P>,
{
    fn grow(&self, tree_index: usize) -> Tree<M::NodeDist, P> {
        let n_nodes = crate::repr::tree_slots(self.n_levels);
        let last_level_start = crate::repr::tree_last_level_start(self.n_levels);
        let mut tree = Tree::with_node_slots(n_nodes);
        let mut rng = self.tree_rng(tree_index);

        // Per-node bags of internal indices, freed once the node is done.
        let mut bags: Vec<Vec<u32>> = vec![Vec::new(); n_nodes];
        let mut live = vec![false; n_nodes];
        bags[0] = self.root_bag(&mut rng);
        live[0] = true;

        for n in 0..n_nodes {
            if !live[n] {
                continue;
            }
            let bag = std::mem::take(&mut bags[n]);

            if n >= last_level_start || (bag.len() as u32) < self.config.min_training_data {
                self.fit_leaf(&mut tree, n, &bag);
                continue;
            }

            match self.search_split(&bag, &mut rng) {
                Some(best) => {
                    let (left, right) = partition_bag(&bag, &best);
                    assert!(
                        !left.is_empty() && !right.is_empty(),
                        "accepted split produced an empty child bag"
                    );

                    tree.node_mut(n).make_split(best.params, best.thresh);
                    if self.config.fit_split_nodes {
                        let mut post = self.model.node_dist();
                        post.fit(self.labels, &bag);
                        tree.node_mut(n).posterior = Some(post);
                    }

                    let left_slot = Tree::<M::NodeDist, P>::left_child(n);
                    bags[left_slot] = left;
                    bags[left_slot + 1] = right;
                    live[left_slot] = true;
                    live[left_slot + 1] = true;
                }
                None => self.fit_leaf(&mut tree, n, &bag),
            }
        }

        tree
    }

    /// Derive a decorrelated per-tree RNG from the master seed.
    fn tree_rng(&self, tree_index: usize) -> Xoshiro256PlusPlus {
        let stream = (tree_index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Xoshiro256PlusPlus::seed_from_u64(self.master_seed ^ stream)
    }

    /// All internal indices, shuffled and truncated when bagging.
    fn root_bag(&self, rng: &mut Xoshiro256PlusPlus) -> Vec<u32> {
        let mut bag: Vec<u32> = (0..self.ids.len() as u32).collect();
        if self.config.bagging {
            bag.shuffle(rng);
            let kept = (self.config.bag_proportion as f64 * bag.len() as f64).floor() as usize;
            bag.truncate(kept);
        }
        bag
    }

    fn fit_leaf(&self, tree: &mut Tree<M::NodeDist, P>, n: usize, bag: &[u32]) {
        let mut post = self.model.node_dist();
        post.fit(self.labels, bag);
        tree.node_mut(n).make_leaf(post);
    }

    /// Try `num_param_combos` random parameterizations and keep the best
    /// accepted split, or `None` if the node should become a leaf.
    ///
    /// A parameterization whose scores show no variation across the bag
    /// counts as a failure; a node where every trial fails is a leaf
    /// regardless of gain.
    fn search_split(&self, bag: &[u32], rng: &mut Xoshiro256PlusPlus) -> Option<BestSplit<P>> {
        let initial_impurity = self.model.node_impurity(self.scratch, self.labels, bag);
        let bag_ids: Vec<I> = bag.iter().map(|&d| self.ids[d as usize].clone()).collect();

        let mut params = [0i32; P];
        let mut scores = vec![0.0f32; bag.len()];
        let mut failures = 0u32;
        let mut best: Option<BestSplit<P>> = None;

        for _ in 0..self.config.num_param_combos {
            self.sampler.sample(rng, &mut params);
            self.features.evaluate(&bag_ids, &params, &mut scores);

            let (min_score, max_score) = score_range(&scores);
            if max_score - min_score <= f32::MIN_POSITIVE * bag.len() as f32 {
                failures += 1;
                continue;
            }

            let mut pairs: Vec<ScoreIndex> = scores
                .iter()
                .zip(bag.iter())
                .map(|(&score, &index)| ScoreIndex { score, index })
                .collect();
            pairs.sort_unstable_by(|a, b| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let (info_gain, thresh) =
                self.model
                    .best_split(self.scratch, &pairs, self.labels, initial_impurity);

            // Strict improvement: gain ties resolve to the earlier candidate.
            if best.as_ref().map_or(true, |b| info_gain > b.info_gain) {
                best = Some(BestSplit {
                    info_gain,
                    thresh,
                    params,
                    scores: scores.clone(),
                });
            }
        }

        if failures >= self.config.num_param_combos {
            return None;
        }
        best.filter(|b| b.info_gain > self.model.min_info_gain())
    }
}

/// Split a bag by the retained scores: strictly below the threshold goes
/// left.
fn partition_bag<const P: usize>(bag: &[u32], best: &BestSplit<P>) -> (Vec<u32>, Vec<u32>) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    for (&score, &index) in best.scores.iter().zip(bag.iter()) {
        if score < best.thresh {
            left.push(index);
        } else {
            right.push(index);
        }
    }
    (left, right)
}

fn score_range(scores: &[f32]) -> (f32, f32) {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for &score in scores {
        min = min.min(score);
        max = max.max(score);
    }
    (min, max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TrainConfig::builder().num_param_combos(4).build();
        assert!(config.is_ok());

        let config = config.unwrap();
        assert!(config.bagging);
        assert!((config.bag_proportion - 0.5).abs() < 1e-6);
        assert!(config.fit_split_nodes);
        assert_eq!(config.min_training_data, 50);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_invalid_bag_proportion_zero() {
        let result = TrainConfig::builder()
            .num_param_combos(4)
            .bag_proportion(0.0)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidBagProportion(_))));
    }

    #[test]
    fn test_invalid_bag_proportion_above_one() {
        let result = TrainConfig::builder()
            .num_param_combos(4)
            .bag_proportion(1.2)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidBagProportion(_))));
    }

    #[test]
    fn test_valid_bag_proportion_boundary() {
        let result = TrainConfig::builder()
            .num_param_combos(4)
            .bag_proportion(1.0)
            .build();
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_param_combos() {
        let result = TrainConfig::builder().num_param_combos(0).build();
        assert!(matches!(result, Err(ConfigError::InvalidParamCombos)));
    }

    #[test]
    fn test_score_range() {
        assert_eq!(score_range(&[0.5, -1.0, 2.0]), (-1.0, 2.0));
        assert_eq!(score_range(&[3.0]), (3.0, 3.0));
    }
}
