//! Distribution capabilities for leaf and output distributions.
//!
//! A forest stores a *node distribution* at every leaf (and optionally at
//! internal nodes), fitted to the labels that reached it during training.
//! At query time the leaf distributions of all trees are aggregated into an
//! *output distribution* through `reset` / `combine_with` / `normalise`.
//! The two capabilities may be implemented by the same type; both shipped
//! distributions ([`DiscreteDistribution`], [`VonMisesDistribution`]) do so.
//!
//! [`DiscreteDistribution`]: discrete::DiscreteDistribution
//! [`VonMisesDistribution`]: von_mises::VonMisesDistribution

pub mod discrete;
pub mod von_mises;

use thiserror::Error;

/// Error raised when a serialized distribution record cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed distribution record: {0}")]
pub struct DistributionParseError(pub String);

/// Per-leaf label distribution.
///
/// Implementors are fitted to a bag of training labels, evaluate a point
/// pdf and serialize to a whitespace-separated text record. The engine
/// clones a template distribution (see
/// [`ForestModel::node_dist`](crate::model::ForestModel::node_dist)) for
/// every leaf it fits or loads.
pub trait NodeDistribution: Clone + std::fmt::Debug + Send + Sync {
    /// The label type this distribution is defined over.
    type Label: Copy;

    /// Return the distribution to its post-construction state.
    fn reset(&mut self);

    /// Fit the distribution to the labels selected by `bag`.
    ///
    /// `bag` holds indices into `labels`; an empty bag leaves the
    /// implementor in a well-defined default state.
    fn fit(&mut self, labels: &[Self::Label], bag: &[u32]);

    /// Probability (density) of the label `x`.
    fn pdf(&self, x: Self::Label) -> f32;

    /// Append the defining parameters as whitespace-separated tokens.
    fn write_text(&self, out: &mut String);

    /// Re-read the parameters written by [`write_text`](Self::write_text).
    ///
    /// Consumes exactly the tokens produced by `write_text`; the receiver
    /// must already be shaped for its label space (e.g. class count).
    fn read_text(
        &mut self,
        tokens: &mut dyn Iterator<Item = &str>,
    ) -> Result<(), DistributionParseError>;
}

/// Per-query aggregate distribution.
///
/// `N` is the node distribution being aggregated; it may be `Self`.
pub trait OutputDistribution<N> {
    /// Clear any previously accumulated state.
    fn reset(&mut self);

    /// Fold one leaf distribution into the aggregate.
    fn combine_with(&mut self, node: &N);

    /// Turn the accumulated state into a valid probability distribution.
    fn normalise(&mut self);
}

/// Parse the next whitespace token as a value of type `T`.
pub(crate) fn next_value<T: std::str::FromStr>(
    tokens: &mut dyn Iterator<Item = &str>,
    what: &str,
) -> Result<T, DistributionParseError> {
    let token = tokens
        .next()
        .ok_or_else(|| DistributionParseError(format!("missing {what}")))?;
    token
        .parse::<T>()
        .map_err(|_| DistributionParseError(format!("invalid {what}: {token:?}")))
}
