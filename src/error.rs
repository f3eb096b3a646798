//! Error kinds reported by the simulation engine.

use crate::random::RandomKind;
use thiserror::Error;

/// Every recoverable failure of the engine.
///
/// Validation kinds are returned before any state is touched, so the caller
/// can fix the configuration and try again.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    // Random value configuration.
    #[error("expected a {expected:?} distribution, found {found:?}")]
    UnexpectedRandomKind {
        expected: RandomKind,
        found: RandomKind,
    },
    #[error("non-negative normal distribution (mean {mean}, stddev {stddev}) rarely draws a non-negative value")]
    NormalNonNegLowProb { mean: f64, stddev: f64 },
    #[error("uniform distribution low bound {low} is above high bound {high}")]
    UniformLowHighSwap { low: f64, high: f64 },
    #[error("non-negative uniform distribution [{low}, {high}) rarely draws a non-negative value")]
    UniformNonNegLowProb { low: f64, high: f64 },
    #[error("bernoulli mean {0} must be between 0.0 and 1.0")]
    BernoulliMeanOutOfRange(f64),

    // Reactor configuration.
    #[error("timestep must be positive, but is {0}")]
    InvalidTimestep(f64),
    #[error("initial volume must be positive, but is {0}")]
    InvalidInitVolume(f64),

    // Population layout.
    #[error("agent store holds {store} agents, but variants claim {claimed}")]
    TotalAgentMismatch { store: usize, claimed: usize },
    #[error("agent slices of variant {first} and variant {second} overlap")]
    VariantSliceOverlap { first: usize, second: usize },
    #[error("boolean trait {field} must use a none or bernoulli distribution, not {kind:?}")]
    BoolTraitWrongKind {
        field: &'static str,
        kind: RandomKind,
    },

    // Run control.
    #[error("run interrupted")]
    Interrupted,
}

impl SimError {
    /// Whether this error was raised by pre-run validation.
    pub fn is_validation(&self) -> bool {
        !matches!(self, SimError::Interrupted)
    }
}

pub type SimResult<T> = Result<T, SimError>;
