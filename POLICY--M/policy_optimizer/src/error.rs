use thiserror::Error;

/// Structural errors raised by the optimizer core.
///
/// Numerical outcomes (infeasible, unbounded, approximate) are reported through
/// [`crate::SolveStatus`] instead; only malformed input ends up here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// The caller referenced a lever id absent from the catalogue.
    #[error("unknown policy lever: {0}")]
    UnknownLever(String),
    /// Two catalogue entries share an id.
    #[error("duplicate policy lever: {0}")]
    DuplicateLever(String),
    /// A catalogue entry carries an unusable parameter.
    #[error("invalid lever {id}: {reason}")]
    InvalidLever {
        /// Offending lever id.
        id: String,
        /// What is wrong with it.
        reason: String,
    },
    /// A constraint value is negative, NaN, or otherwise unusable.
    #[error("malformed constraints: {0}")]
    MalformedConstraints(String),
    /// An allocation intensity is negative or not finite.
    #[error("invalid intensity {intensity} for lever {id}")]
    InvalidIntensity {
        /// Lever id.
        id: String,
        /// Rejected value.
        intensity: f64,
    },
    /// A sensitivity variation fraction lies outside `(0, 1)`.
    #[error("invalid {parameter} variation fraction: {value}")]
    InvalidVariation {
        /// Parameter family (`cost`, `effect`, `budget`).
        parameter: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// A sampling strategy cannot search a lever without a finite cap.
    #[error("lever {0} has no finite intensity cap; sampling strategies need a bounded search space")]
    UnboundedSearchSpace(String),
}
