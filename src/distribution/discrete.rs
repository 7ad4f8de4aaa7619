//! Discrete distribution over integer class labels.

use super::{next_value, DistributionParseError, NodeDistribution, OutputDistribution};

/// A probability distribution over the class labels `0..K-1`.
///
/// Doubles as the node and the output distribution of the discrete
/// classifier: fitting produces a normalized label histogram, aggregation
/// is an elementwise sum followed by [`normalise`].
///
/// [`normalise`]: OutputDistribution::normalise
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteDistribution {
    prob: Vec<f32>,
}

impl DiscreteDistribution {
    /// Create a distribution over `num_classes` labels, all probabilities zero.
    pub fn new(num_classes: usize) -> Self {
        Self {
            prob: vec![0.0; num_classes],
        }
    }

    /// Number of classes in the label space.
    #[inline]
    pub fn n_classes(&self) -> usize {
        self.prob.len()
    }

    /// The per-class probability values.
    #[inline]
    pub fn probabilities(&self) -> &[f32] {
        &self.prob
    }

    /// Smooth the distribution with a softmax at temperature `t`.
    ///
    /// Replaces every probability with `exp(p / t)` and renormalises.
    /// Higher temperatures flatten the distribution; `t <= 0` is a no-op.
    pub fn raise_temperature(&mut self, t: f64) {
        if t > 0.0 {
            for p in &mut self.prob {
                *p = (*p as f64 / t).exp() as f32;
            }
            self.normalise();
        }
    }
}

impl NodeDistribution for DiscreteDistribution {
    type Label = usize;

    fn reset(&mut self) {
        self.prob.fill(0.0);
    }

    /// Fit as a normalized histogram of the bag's labels.
    ///
    /// Labels must lie in `0..n_classes`; an empty bag yields the uniform
    /// distribution.
    fn fit(&mut self, labels: &[usize], bag: &[u32]) {
        if bag.is_empty() {
            let uniform = 1.0 / self.prob.len() as f32;
            self.prob.fill(uniform);
            return;
        }

        self.prob.fill(0.0);
        for &d in bag {
            self.prob[labels[d as usize]] += 1.0;
        }
        let inv_n = 1.0 / bag.len() as f32;
        for p in &mut self.prob {
            *p *= inv_n;
        }
    }

    #[inline]
    fn pdf(&self, x: usize) -> f32 {
        self.prob[x]
    }

    fn write_text(&self, out: &mut String) {
        use std::fmt::Write;

        for (c, p) in self.prob.iter().enumerate() {
            if c > 0 {
                out.push(' ');
            }
            write!(out, "{p}").expect("writing to a String cannot fail");
        }
    }

    fn read_text(
        &mut self,
        tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<(), DistributionParseError> {
        for c in 0..self.prob.len() {
            self.prob[c] = next_value(tokens, &format!("probability of class {c}"))?;
        }
        Ok(())
    }
}

impl OutputDistribution<DiscreteDistribution> for DiscreteDistribution {
    fn reset(&mut self) {
        NodeDistribution::reset(self);
    }

    fn combine_with(&mut self, node: &DiscreteDistribution) {
        debug_assert_eq!(self.prob.len(), node.prob.len());
        for (p, q) in self.prob.iter_mut().zip(node.prob.iter()) {
            *p += q;
        }
    }

    fn normalise(&mut self) {
        let sum: f32 = self.prob.iter().sum();
        if sum > 0.0 {
            for p in &mut self.prob {
                *p /= sum;
            }
        }
    }
}
