//! Error types for flock-formation.

use thiserror::Error;

/// Result type for formation operations.
pub type Result<T> = std::result::Result<T, FormationError>;

/// Errors that can occur while generating formation moves.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormationError {
    /// The shape only has tables for a fixed swarm size.
    #[error("formation {shape} is defined for {expected} nodes, swarm has {actual}")]
    UnsupportedSwarmSize {
        shape: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A polygon needs at least three sides.
    #[error("polygon needs at least 3 sides, got {0}")]
    TooFewSides(u32),

    /// Turns below one degree cannot be expressed.
    #[error("polygon may have at most {max} sides, got {sides}")]
    TooManySides { sides: u32, max: u32 },

    /// Convention name was not `enu` or `ned`.
    #[error("unknown coordinate convention: {0}")]
    UnknownConvention(String),
}
