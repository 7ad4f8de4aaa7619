//! Von Mises distribution over circular labels.

use std::f64::consts::PI;

use crate::special::{bessel_i0, bessel_i1, bessel_i2};

use super::{next_value, DistributionParseError, NodeDistribution, OutputDistribution};

/// Concentration assigned when the resultant length saturates (R > 0.98);
/// also the seed of the Newton solve.
const KAPPA_SATURATION: f64 = 25.0;

/// Clamp applied when the pdf normaliser overflows during aggregation.
const KAPPA_OVERFLOW_CLAMP: f32 = 500.0;

/// Pdf normaliser `1 / (2 pi I0(500))`, precomputed because `I0` itself
/// stays finite at the clamp while intermediate aggregates do not.
const OVERFLOW_NORMALISER: f64 = 6.35397e-217;

/// A distribution over angles in radians, the circular analog of the
/// Gaussian with location `mu` and concentration `kappa`.
///
/// Doubles as the node and the output distribution of the circular
/// regressor. Aggregation follows the sensor-fusion rule of Stienne 2011:
/// each distribution contributes its unit mean direction weighted by its
/// concentration, and [`normalise`] recovers `(mu, kappa)` from the summed
/// sine/cosine components.
///
/// [`normalise`]: OutputDistribution::normalise
#[derive(Debug, Clone, PartialEq)]
pub struct VonMisesDistribution {
    mu: f32,
    kappa: f32,
    /// Running sine component of the (weighted) mean direction.
    s: f64,
    /// Running cosine component of the (weighted) mean direction.
    c: f64,
    /// Kept in double precision: at large concentrations the normaliser
    /// underflows single precision while the pdf itself stays O(1).
    pdf_normaliser: f64,
}

impl Default for VonMisesDistribution {
    fn default() -> Self {
        Self::new()
    }
}

impl VonMisesDistribution {
    /// Create a blank distribution (`mu = kappa = 0`).
    pub fn new() -> Self {
        Self {
            mu: 0.0,
            kappa: 0.0,
            s: 0.0,
            c: 0.0,
            pdf_normaliser: 1.0,
        }
    }

    /// The circular mean parameter.
    #[inline]
    pub fn mu(&self) -> f32 {
        self.mu
    }

    /// The concentration parameter.
    #[inline]
    pub fn kappa(&self) -> f32 {
        self.kappa
    }

    /// Differential entropy of the distribution.
    pub fn entropy(&self) -> f32 {
        let kappa = self.kappa as f64;
        let i0 = bessel_i0(kappa);
        ((2.0 * PI * i0).ln() - kappa * bessel_i1(kappa) / i0) as f32
    }

    fn set_normaliser(&mut self) {
        self.pdf_normaliser = 1.0 / (2.0 * PI * bessel_i0(self.kappa as f64));
    }
}

/// Solve `I1(kappa) - r * I0(kappa) = 0` for the concentration given the
/// mean resultant length `r` in `[0, 0.98]`.
///
/// Newton iteration seeded at the saturation value with the analytic
/// derivative `(I0 + I2) / 2 - r * I1`, kept inside the bracket
/// `(0, 25]` by bisection whenever a step escapes it. The bracket is
/// valid because the left side is negative at zero and positive at 25
/// for any `r` below the saturation threshold.
fn solve_kappa(r: f64) -> f64 {
    let mut lo = 0.0f64;
    let mut hi = KAPPA_SATURATION;
    let mut kappa = KAPPA_SATURATION;

    for _ in 0..64 {
        let f = bessel_i1(kappa) - r * bessel_i0(kappa);
        if f > 0.0 {
            hi = kappa;
        } else {
            lo = kappa;
        }

        let df = 0.5 * (bessel_i0(kappa) + bessel_i2(kappa)) - r * bessel_i1(kappa);
        let mut next = kappa - f / df;
        if !next.is_finite() || next <= lo || next >= hi {
            next = 0.5 * (lo + hi);
        }
        if (next - kappa).abs() < 1e-10 {
            return next;
        }
        kappa = next;
    }
    kappa
}

impl NodeDistribution for VonMisesDistribution {
    type Label = f32;

    fn reset(&mut self) {
        self.mu = 0.0;
        self.kappa = 0.0;
        self.s = 0.0;
        self.c = 0.0;
        self.pdf_normaliser = 1.0;
    }

    /// Fit by the first trigonometric moment of the bag's angles.
    ///
    /// The mean direction is `atan2` of the sine/cosine sums; the
    /// concentration comes from the mean resultant length, saturating at 25
    /// when the labels are almost perfectly aligned. After fitting, the
    /// sine/cosine state holds the unit mean direction so that aggregation
    /// and the serialized form agree.
    fn fit(&mut self, labels: &[f32], bag: &[u32]) {
        if bag.is_empty() {
            // An empty bag yields the uniform distribution (kappa = 0).
            *self = Self::new();
            self.set_normaliser();
            return;
        }

        let mut s = 0.0f64;
        let mut c = 0.0f64;
        for &d in bag {
            let theta = labels[d as usize] as f64;
            s += theta.sin();
            c += theta.cos();
        }

        self.mu = s.atan2(c) as f32;

        let r = s.hypot(c) / bag.len() as f64;
        self.kappa = if r > 0.98 {
            KAPPA_SATURATION as f32
        } else {
            solve_kappa(r) as f32
        };

        self.s = (self.mu as f64).sin();
        self.c = (self.mu as f64).cos();
        self.set_normaliser();
    }

    #[inline]
    fn pdf(&self, x: f32) -> f32 {
        let exponent = self.kappa as f64 * ((x - self.mu) as f64).cos();
        (self.pdf_normaliser * exponent.exp()) as f32
    }

    fn write_text(&self, out: &mut String) {
        use std::fmt::Write;

        write!(out, "{} {}", self.mu, self.kappa).expect("writing to a String cannot fail");
    }

    fn read_text(
        &mut self,
        tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<(), DistributionParseError> {
        self.mu = next_value(tokens, "mu")?;
        self.kappa = next_value(tokens, "kappa")?;

        self.s = (self.mu as f64).sin();
        self.c = (self.mu as f64).cos();
        self.set_normaliser();
        Ok(())
    }
}

impl OutputDistribution<VonMisesDistribution> for VonMisesDistribution {
    fn reset(&mut self) {
        NodeDistribution::reset(self);
    }

    /// Accumulate the other distribution's concentration-weighted mean
    /// direction into the sine/cosine sums.
    fn combine_with(&mut self, node: &VonMisesDistribution) {
        self.s += node.kappa as f64 * node.s;
        self.c += node.kappa as f64 * node.c;
    }

    /// Recover `(mu, kappa)` from the accumulated components.
    ///
    /// With many trees the fused concentration can grow past the range of
    /// `I0`; the normaliser is then clamped at `kappa = 500`.
    fn normalise(&mut self) {
        self.mu = self.s.atan2(self.c) as f32;
        self.kappa = self.s.hypot(self.c) as f32;

        let normaliser = 1.0 / (2.0 * PI * bessel_i0(self.kappa as f64));
        if normaliser > 0.0 && normaliser.is_finite() {
            self.pdf_normaliser = normaliser;
        } else {
            self.kappa = KAPPA_OVERFLOW_CLAMP;
            self.pdf_normaliser = OVERFLOW_NORMALISER;
        }
    }
}
