//! Circular-label specialization: squared-circular-distance splits and
//! von Mises leaves.

use crate::distribution::von_mises::VonMisesDistribution;
use crate::distribution::DistributionParseError;
use crate::repr::Forest;

use super::{ForestModel, ScoreIndex};

/// A forest predicting angular labels in radians.
pub type CircularForest<const P: usize> = Forest<CircularRegressor, P>;

/// Default information-gain threshold below which a leaf is declared.
pub const DEFAULT_MIN_INFO_GAIN: f64 = 0.1;

/// Number of candidate thresholds swept per feature during split search.
const NUM_SPLIT_TRIALS: usize = 100;

/// Model hooks for regression over angles in `R mod 2pi`.
///
/// Split quality is the squared circular distance of the labels about
/// each side's mean direction; leaves carry [`VonMisesDistribution`]s.
/// Unlike the discrete model, candidate thresholds are not enumerated from
/// the score boundaries but swept across the score range, since the
/// impurity must be re-evaluated about a new mean for every partition.
#[derive(Debug, Clone)]
pub struct CircularRegressor {
    min_info_gain: f64,
}

/// Per-label sine/cosine tables precomputed for one training run.
pub struct TrigTables {
    sin: Vec<f64>,
    cos: Vec<f64>,
}

impl Default for CircularRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CircularRegressor {
    /// Create a regressor with the default info-gain threshold.
    pub fn new() -> Self {
        Self::with_min_info_gain(DEFAULT_MIN_INFO_GAIN)
    }

    /// Create a regressor with an explicit info-gain threshold.
    pub fn with_min_info_gain(min_info_gain: f64) -> Self {
        Self { min_info_gain }
    }

    /// Sum of squared circular distances of the selected labels about the
    /// mean direction `(sin_mu, cos_mu)`.
    fn squared_circular_spread(
        tables: &TrigTables,
        selection: &[ScoreIndex],
        sin_mu: f64,
        cos_mu: f64,
    ) -> f64 {
        selection
            .iter()
            .map(|pair| {
                let d = pair.index as usize;
                let cos_delta = tables.cos[d] * cos_mu + tables.sin[d] * sin_mu;
                let half_dist = 0.5 * (1.0 - cos_delta);
                half_dist * half_dist
            })
            .sum()
    }
}

impl ForestModel for CircularRegressor {
    type Label = f32;
    type NodeDist = VonMisesDistribution;
    type Scratch = TrigTables;

    fn prepare_training(&self, labels: &[f32]) -> TrigTables {
        TrigTables {
            sin: labels.iter().map(|&theta| (theta as f64).sin()).collect(),
            cos: labels.iter().map(|&theta| (theta as f64).cos()).collect(),
        }
    }

    /// Squared circular spread of the bag about its own mean direction.
    fn node_impurity(&self, tables: &TrigTables, _labels: &[f32], bag: &[u32]) -> f64 {
        let mut s = 0.0f64;
        let mut c = 0.0f64;
        for &d in bag {
            s += tables.sin[d as usize];
            c += tables.cos[d as usize];
        }
        let mu = s.atan2(c);
        let (sin_mu, cos_mu) = mu.sin_cos();

        bag.iter()
            .map(|&d| {
                let d = d as usize;
                let cos_delta = tables.cos[d] * cos_mu + tables.sin[d] * sin_mu;
                let half_dist = 0.5 * (1.0 - cos_delta);
                half_dist * half_dist
            })
            .sum()
    }

    /// Sweep uniformly spaced thresholds across the score range.
    ///
    /// Cumulative sine/cosine sums over the sorted order give each side's
    /// mean direction in O(1); the spread about those means is then
    /// accumulated per side. Candidates that leave the partition unchanged
    /// are not re-evaluated: the surviving threshold is the midpoint of
    /// the plateau of sweep values producing the winning partition.
    fn best_split(
        &self,
        tables: &TrigTables,
        sorted: &[ScoreIndex],
        _labels: &[f32],
        initial_impurity: f64,
    ) -> (f64, f32) {
        let n = sorted.len();
        debug_assert!(n >= 2);

        let mut cum_sin = Vec::with_capacity(n + 1);
        let mut cum_cos = Vec::with_capacity(n + 1);
        let mut total_sin = 0.0f64;
        let mut total_cos = 0.0f64;
        cum_sin.push(0.0);
        cum_cos.push(0.0);
        for pair in sorted {
            let d = pair.index as usize;
            total_sin += tables.sin[d];
            total_cos += tables.cos[d];
            cum_sin.push(total_sin);
            cum_cos.push(total_cos);
        }

        let min_score = sorted[0].score;
        let max_score = sorted[n - 1].score;
        let span = max_score - min_score;

        let mut best_impurity = f64::INFINITY;
        let mut best_thresh = 0.0f32;
        let mut best_is_open_plateau = false;
        let mut plateau_start = 0.0f32;
        let mut evaluated_left = 0usize;
        let mut n_left = 0usize;

        for trial in 0..NUM_SPLIT_TRIALS {
            let thresh = min_score + span * (trial + 1) as f32 / (NUM_SPLIT_TRIALS + 1) as f32;
            while n_left < n && sorted[n_left].score < thresh {
                n_left += 1;
            }
            if n_left == 0 || n_left == n {
                best_is_open_plateau = false;
                continue;
            }

            if n_left == evaluated_left {
                // Same partition as the previous candidate: keep its
                // impurity, extend the winning plateau's midpoint.
                if best_is_open_plateau {
                    best_thresh = 0.5 * (plateau_start + thresh);
                }
                continue;
            }
            evaluated_left = n_left;

            let mu_left = cum_sin[n_left].atan2(cum_cos[n_left]);
            let mu_right = (total_sin - cum_sin[n_left]).atan2(total_cos - cum_cos[n_left]);
            let (sin_l, cos_l) = mu_left.sin_cos();
            let (sin_r, cos_r) = mu_right.sin_cos();

            let impurity = Self::squared_circular_spread(tables, &sorted[..n_left], sin_l, cos_l)
                + Self::squared_circular_spread(tables, &sorted[n_left..], sin_r, cos_r);

            if impurity < best_impurity {
                best_impurity = impurity;
                best_thresh = thresh;
                plateau_start = thresh;
                best_is_open_plateau = true;
            } else {
                best_is_open_plateau = false;
            }
        }

        if !best_impurity.is_finite() {
            return (f64::NEG_INFINITY, 0.0);
        }
        (initial_impurity - best_impurity, best_thresh)
    }

    #[inline]
    fn min_info_gain(&self) -> f64 {
        self.min_info_gain
    }

    fn node_dist(&self) -> VonMisesDistribution {
        VonMisesDistribution::new()
    }

    fn header_description(&self) -> &'static str {
        "No model parameters"
    }

    fn write_header(&self, _out: &mut String) {}

    fn read_header(
        _tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<Self, DistributionParseError> {
        Ok(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::von_mises_angles;
    use approx::assert_relative_eq;

    fn pairs(scores: &[f32]) -> Vec<ScoreIndex> {
        let mut pairs: Vec<ScoreIndex> = scores
            .iter()
            .enumerate()
            .map(|(i, &score)| ScoreIndex {
                score,
                index: i as u32,
            })
            .collect();
        pairs.sort_unstable_by(|a, b| a.score.partial_cmp(&b.score).unwrap());
        pairs
    }

    #[test]
    fn impurity_zero_for_identical_angles() {
        let model = CircularRegressor::new();
        let labels = vec![1.2f32; 8];
        let tables = model.prepare_training(&labels);
        let bag: Vec<u32> = (0..8).collect();
        assert_relative_eq!(
            model.node_impurity(&tables, &labels, &bag),
            0.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn impurity_grows_with_spread() {
        let model = CircularRegressor::new();
        let tight = von_mises_angles(0.0, 20.0, 200, 1);
        let loose = von_mises_angles(0.0, 1.0, 200, 1);
        let bag: Vec<u32> = (0..200).collect();

        let tight_imp = model.node_impurity(&model.prepare_training(&tight), &tight, &bag);
        let loose_imp = model.node_impurity(&model.prepare_training(&loose), &loose, &bag);
        assert!(loose_imp > tight_imp);
    }

    #[test]
    fn impurity_respects_wraparound() {
        let model = CircularRegressor::new();
        // Angles hugging pi from both sides are tightly concentrated even
        // though their linear values sit at opposite ends of the range.
        let labels = vec![3.1f32, -3.1, 3.05, -3.05];
        let tables = model.prepare_training(&labels);
        let impurity = model.node_impurity(&tables, &labels, &[0, 1, 2, 3]);
        assert!(impurity < 0.01, "wrapped cluster scored {impurity}");
    }

    #[test]
    fn best_split_separates_two_directions() {
        let model = CircularRegressor::new();
        // Two clusters of angles, perfectly correlated with the score.
        let mut labels = vec![0.0f32; 40];
        let mut scores = vec![0.0f32; 40];
        for i in 0..20 {
            labels[i] = 0.1;
            scores[i] = i as f32 / 20.0;
        }
        for i in 20..40 {
            labels[i] = 2.5;
            scores[i] = 2.0 + (i - 20) as f32 / 20.0;
        }

        let tables = model.prepare_training(&labels);
        let bag: Vec<u32> = (0..40).collect();
        let initial = model.node_impurity(&tables, &labels, &bag);
        let sorted = pairs(&scores);

        let (gain, thresh) = model.best_split(&tables, &sorted, &labels, initial);
        assert!(gain > 0.0);
        // The score gap between the clusters is (0.95, 2.0).
        assert!(thresh > 0.95 && thresh < 2.0, "threshold {thresh}");
    }

    #[test]
    fn best_split_finds_nothing_on_uniform_labels() {
        let model = CircularRegressor::new();
        let labels = vec![0.7f32; 30];
        let scores: Vec<f32> = (0..30).map(|i| i as f32).collect();
        let tables = model.prepare_training(&labels);
        let bag: Vec<u32> = (0..30).collect();
        let initial = model.node_impurity(&tables, &labels, &bag);

        let (gain, _) = model.best_split(&tables, &pairs(&scores), &labels, initial);
        // No partition reduces an already-zero spread.
        assert!(gain <= 1e-9);
    }

    #[test]
    fn plateau_threshold_sits_between_score_groups() {
        let model = CircularRegressor::new();
        // Scores form two tight groups; many sweep candidates land in the
        // wide gap and must collapse to the plateau midpoint.
        let labels = vec![0.1f32, 0.12, 0.09, 2.4, 2.45, 2.38];
        let scores = vec![0.0f32, 0.01, 0.02, 10.0, 10.01, 10.02];
        let tables = model.prepare_training(&labels);
        let bag: Vec<u32> = (0..6).collect();
        let initial = model.node_impurity(&tables, &labels, &bag);

        let (gain, thresh) = model.best_split(&tables, &pairs(&scores), &labels, initial);
        assert!(gain > 0.0);
        // The winning plateau spans nearly the whole gap, so its midpoint
        // lands near the center.
        assert!(thresh > 3.0 && thresh < 7.5, "threshold {thresh}");
    }
}
