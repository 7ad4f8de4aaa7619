//! Discrete-label specialization: entropy splits and histogram leaves.

use crate::distribution::discrete::DiscreteDistribution;
use crate::distribution::{next_value, DistributionParseError};
use crate::repr::Forest;

use super::{ForestModel, ScoreIndex};

/// A forest predicting discrete class labels.
pub type ClassifierForest<const P: usize> = Forest<Classifier, P>;

/// Model hooks for discrete classification over the labels `0..K-1`.
///
/// Split quality is Shannon entropy, evaluated through a pre-tabulated
/// `x ln x` so the incremental split scan costs O(1) per candidate
/// boundary. Leaves carry [`DiscreteDistribution`] histograms.
#[derive(Debug, Clone)]
pub struct Classifier {
    n_classes: usize,
    class_names: Vec<String>,
    min_info_gain: f64,
}

/// Default information-gain threshold below which a leaf is declared.
pub const DEFAULT_MIN_INFO_GAIN: f64 = 0.05;

/// Pre-tabulated `x ln x` over `0..=N`, shared by the impurity and split
/// hooks for one training run.
pub struct XLogXTable(Vec<f64>);

impl XLogXTable {
    fn up_to(n: usize) -> Self {
        let mut table = Vec::with_capacity(n + 1);
        table.push(0.0);
        for i in 1..=n {
            let x = i as f64;
            table.push(x * x.ln());
        }
        Self(table)
    }
}

impl Classifier {
    /// Create a classifier over `num_classes` labels with the default
    /// info-gain threshold.
    pub fn new(num_classes: usize) -> Self {
        Self::with_min_info_gain(num_classes, DEFAULT_MIN_INFO_GAIN)
    }

    /// Create a classifier with an explicit info-gain threshold.
    pub fn with_min_info_gain(num_classes: usize, min_info_gain: f64) -> Self {
        assert!(num_classes > 0, "a classifier needs at least one class");
        Self {
            n_classes: num_classes,
            class_names: Vec::new(),
            min_info_gain,
        }
    }

    /// Number of classes in the label space.
    #[inline]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Attach human-readable class names (one per class).
    pub fn set_class_names(&mut self, names: Vec<String>) {
        assert_eq!(
            names.len(),
            self.n_classes,
            "expected one name per class"
        );
        self.class_names = names;
    }

    /// Class names, synthesizing `"Class <i>"` for any that were never set.
    pub fn class_names(&self) -> Vec<String> {
        (0..self.n_classes)
            .map(|c| {
                self.class_names
                    .get(c)
                    .cloned()
                    .unwrap_or_else(|| format!("Class {c}"))
            })
            .collect()
    }
}

impl ForestModel for Classifier {
    type Label = usize;
    type NodeDist = DiscreteDistribution;
    type Scratch = XLogXTable;

    fn prepare_training(&self, labels: &[usize]) -> XLogXTable {
        XLogXTable::up_to(labels.len())
    }

    /// Entropy of the bag's label histogram, up to a constant factor:
    /// `(X[n] - sum_k X[count_k]) / n` with `X[i] = i ln i`.
    fn node_impurity(&self, scratch: &XLogXTable, labels: &[usize], bag: &[u32]) -> f64 {
        let x = &scratch.0;
        let mut counts = vec![0usize; self.n_classes];
        for &d in bag {
            counts[labels[d as usize]] += 1;
        }
        let sum: f64 = counts.iter().map(|&c| x[c]).sum();
        (x[bag.len()] - sum) / bag.len() as f64
    }

    /// Scan every candidate boundary between adjacent distinct scores,
    /// maintaining the two child histograms and their `x ln x` partial sums
    /// incrementally.
    ///
    /// With `left` holding the first `d + 1` sorted samples, the combined
    /// child impurity is `(X[d+1] - S_L) + (X[n-d-1] - S_R)`; moving one
    /// sample across the boundary updates `S_L`/`S_R` in O(1). The adopted
    /// threshold is the midpoint of the bracketing scores and the gain is
    /// `initial - best / n`.
    fn best_split(
        &self,
        scratch: &XLogXTable,
        sorted: &[ScoreIndex],
        labels: &[usize],
        initial_impurity: f64,
    ) -> (f64, f32) {
        let x = &scratch.0;
        let n = sorted.len();
        debug_assert!(n >= 2);

        let mut left = vec![0u32; self.n_classes];
        let mut right = vec![0u32; self.n_classes];
        for pair in &sorted[1..] {
            right[labels[pair.index as usize]] += 1;
        }
        left[labels[sorted[0].index as usize]] = 1;

        // X[0] = X[1] = 0, so the one-sample left sum starts at zero.
        let mut sum_left = 0.0f64;
        let mut sum_right: f64 = right.iter().map(|&c| x[c as usize]).sum();

        let mut best_impurity = f64::INFINITY;
        let mut best_thresh = 0.0f32;

        for d in 0..n - 1 {
            if d > 0 {
                let k = labels[sorted[d].index as usize];
                sum_right -= x[right[k] as usize];
                right[k] -= 1;
                sum_right += x[right[k] as usize];

                sum_left -= x[left[k] as usize];
                left[k] += 1;
                sum_left += x[left[k] as usize];
            }

            // Equal adjacent scores admit no threshold strictly between them.
            if sorted[d].score < sorted[d + 1].score {
                let impurity = (x[d + 1] - sum_left) + (x[n - d - 1] - sum_right);
                if impurity < best_impurity {
                    best_impurity = impurity;
                    best_thresh = 0.5 * (sorted[d].score + sorted[d + 1].score);
                }
            }
        }

        if !best_impurity.is_finite() {
            return (f64::NEG_INFINITY, 0.0);
        }
        (initial_impurity - best_impurity / n as f64, best_thresh)
    }

    #[inline]
    fn min_info_gain(&self) -> f64 {
        self.min_info_gain
    }

    fn node_dist(&self) -> DiscreteDistribution {
        DiscreteDistribution::new(self.n_classes)
    }

    fn header_description(&self) -> &'static str {
        "Number of classes followed by one name per class"
    }

    fn write_header(&self, out: &mut String) {
        use std::fmt::Write;

        write!(out, "{}", self.n_classes).expect("writing to a String cannot fail");
        for name in self.class_names() {
            // Names are single tokens in the header line.
            write!(out, " {}", name.replace(char::is_whitespace, "_"))
                .expect("writing to a String cannot fail");
        }
    }

    fn read_header(
        tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<Self, DistributionParseError> {
        let n_classes: usize = next_value(tokens, "class count")?;
        if n_classes == 0 {
            return Err(DistributionParseError(
                "class count must be positive".into(),
            ));
        }

        let mut model = Self::new(n_classes);
        let names: Vec<String> = tokens.map(str::to_owned).collect();
        if !names.is_empty() {
            // Pad missing trailing names so loading stays permissive.
            let mut names = names;
            while names.len() < n_classes {
                names.push(format!("Class {}", names.len()));
            }
            names.truncate(n_classes);
            model.set_class_names(names);
        }
        Ok(model)
    }
}

impl<const P: usize> Forest<Classifier, P> {
    /// Attach human-readable class names (one per class) to the model.
    ///
    /// The names travel with the persisted forest.
    pub fn set_class_names(&mut self, names: Vec<String>) {
        self.model.set_class_names(names);
    }

    /// Softmax-smooth every stored node distribution at temperature `t`.
    ///
    /// Applies to leaf posteriors and, when the forest was trained with
    /// split-node distributions, to internal posteriors as well. Useful to
    /// regularise an over-confident forest after training or loading.
    pub fn raise_node_temperature(&mut self, t: f64) {
        for tree in &mut self.trees {
            for n in 0..tree.n_nodes() {
                if let Some(post) = &mut tree.node_mut(n).posterior {
                    post.raise_temperature(t);
                }
            }
        }
    }
}
