//! Error types for the soma engine.

use thiserror::Error;

use crate::types::PartId;

/// Top-level error type for all soma operations.
///
/// Every variant here is an invariant violation — a programmer error reported
/// immediately and synchronously. Missing-data reads (stats, resources) are
/// resolved via documented defaults and never surface as errors.
#[derive(Error, Debug)]
pub enum SomaError {
    /// An operation referenced a part that is not in the body graph.
    #[error("Part not found in body graph: {0}")]
    PartNotFound(PartId),

    /// Severance was requested for two parts that share no edge.
    #[error("No connection between {a} and {b}")]
    NoSharedEdge {
        /// First part of the requested cut.
        a: PartId,
        /// Second part of the requested cut.
        b: PartId,
    },

    /// A connection integrity value was set outside `[0, 1]`.
    #[error("Connection integrity {0} outside [0, 1]")]
    IntegrityOutOfRange(f32),

    /// The plane registry ran out of primes for new planes.
    #[error("Plane table exhausted: no prime left for \"{0}\"")]
    PlaneTableExhausted(String),

    /// A blueprint failed validation before any body was built.
    #[error("Blueprint error: {0}")]
    Blueprint(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A form condition could not be parsed from data.
    #[error("Condition parse error: {0}")]
    Condition(String),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, SomaError>;
