//! Contracts for caller-supplied feature functors and parameter samplers.
//!
//! The engine never looks at raw data: it identifies samples by opaque ids
//! and asks a feature functor to turn `(id, parameter vector)` into a
//! scalar score. Features come in two shapes:
//!
//! - *Groupwise*: one call scores a whole batch of ids, letting the
//!   implementation share per-call overhead (used by training and the
//!   groupwise inference paths).
//! - *Pointwise*: one call scores a single id (used by the per-id
//!   inference paths).
//!
//! Plain closures implement both feature traits through blanket impls,
//! so a capture-by-reference lambda over the caller's data array is
//! enough:
//!
//! ```ignore
//! let features = |ids: &[usize], params: &[i32; 1], scores: &mut [f32]| {
//!     for (slot, &id) in scores.iter_mut().zip(ids) {
//!         *slot = data[id][params[0] as usize] as f32;
//!     }
//! };
//! ```
//!
//! All implementations must be callable concurrently; the engine invokes
//! them from parallel workers.

use rand::{Rng, RngCore};

// =============================================================================
// Feature Functors
// =============================================================================

/// Batch feature evaluation: one score per id, in order.
pub trait GroupwiseFeatures<I, const P: usize>: Sync {
    /// Write `scores[i]` for `ids[i]` under the given parameter vector.
    ///
    /// `scores` has exactly the length of `ids`.
    fn evaluate(&self, ids: &[I], params: &[i32; P], scores: &mut [f32]);
}

impl<I, F, const P: usize> GroupwiseFeatures<I, P> for F
where
    F: Fn(&[I], &[i32; P], &mut [f32]) + Sync,
{
    #[inline]
    fn evaluate(&self, ids: &[I], params: &[i32; P], scores: &mut [f32]) {
        self(ids, params, scores);
    }
}

/// Single-id feature evaluation.
pub trait PointwiseFeatures<I, const P: usize>: Sync {
    /// Score one id under the given parameter vector.
    fn evaluate(&self, id: &I, params: &[i32; P]) -> f32;
}

impl<I, F, const P: usize> PointwiseFeatures<I, P> for F
where
    F: Fn(&I, &[i32; P]) -> f32 + Sync,
{
    #[inline]
    fn evaluate(&self, id: &I, params: &[i32; P]) -> f32 {
        self(id, params)
    }
}

// =============================================================================
// Parameter Samplers
// =============================================================================

/// Draws random feature-parameter combinations during training.
///
/// The engine hands in its per-tree RNG, which keeps training reproducible
/// under a fixed seed: samplers must not carry randomness of their own.
/// [`UniformParameterSampler`] covers independent uniform draws; models
/// with constrained parameter spaces implement the trait themselves.
pub trait ParameterSampler<const P: usize>: Sync {
    /// Fill `params` with a legal parameter combination.
    fn sample(&self, rng: &mut dyn RngCore, params: &mut [i32; P]);
}

/// Sampler drawing each parameter independently and uniformly from
/// `0..=limit`, with a per-parameter limit.
#[derive(Debug, Clone, Copy)]
pub struct UniformParameterSampler<const P: usize> {
    limits: [i32; P],
}

impl<const P: usize> UniformParameterSampler<P> {
    /// One shared inclusive upper limit for every parameter.
    pub fn new(limit: i32) -> Self {
        Self { limits: [limit; P] }
    }

    /// Individual inclusive upper limits per parameter.
    pub fn with_limits(limits: [i32; P]) -> Self {
        Self { limits }
    }
}

impl<const P: usize> ParameterSampler<P> for UniformParameterSampler<P> {
    fn sample(&self, rng: &mut dyn RngCore, params: &mut [i32; P]) {
        for (param, &limit) in params.iter_mut().zip(self.limits.iter()) {
            *param = rng.gen_range(0..=limit);
        }
    }
}
