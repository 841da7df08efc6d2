//! Error type shared by the mapping and optimization pipelines.
//!
//! Only precondition violations are errors. Partial mapping failures,
//! numerical fallbacks, and placement conflicts are logged and counted in the
//! outcome structs instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnamorphError {
    /// Two per-vertex arrays that must line up have different lengths.
    #[error("length mismatch: expected {expected} entries, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// An operation was invoked in a lifecycle state that does not allow it.
    #[error("cannot {op} while in state {state}")]
    InvalidState { op: &'static str, state: &'static str },

    /// A configuration value is out of its accepted range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// No vertex has a reflection exactly aligned with its mirror normal in
    /// the reference plane.
    #[error("no planar solution: smallest in-plane incidence angle is {min_angle} degrees")]
    NoPlanarSolution { min_angle: f64 },

    /// Triangle propagation was requested on a mesh not flagged continuous.
    #[error("triangle propagation requires a continuous mesh")]
    DiscontinuousMesh,

    /// Triangle propagation could not pick a seed triangle.
    #[error("no seed triangle available (mesh has no triangles with mapped vertices)")]
    MissingSeed,
}

impl AnamorphError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub(crate) fn state(op: &'static str, state: &'static str) -> Self {
        Self::InvalidState { op, state }
    }
}

pub type Result<T> = std::result::Result<T, AnamorphError>;
