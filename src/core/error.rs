//! Error types for Rawflow.
//!
//! Uses thiserror for structured errors with context. Errors are split by
//! concern:
//! - [`FlowError`]: fork-join episodes, barriers and private slots
//! - [`GeometryError`]: region descriptors, mappings and size negotiation
//! - [`ConfigError`]: engine configuration loading and validation

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for one fork-join episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeId(pub Uuid);

impl EpisodeId {
    /// Create a new random episode ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EpisodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for Rawflow.
#[derive(Error, Debug)]
pub enum RawflowError {
    /// An episode failed or was cancelled.
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// A region or mapping could not be negotiated.
    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Engine configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised inside or around a fork-join episode.
#[derive(Error, Debug)]
pub enum FlowError {
    /// Cooperative cancellation status. Returned by barrier calls once the
    /// episode has been aborted; the per-thread trampoline swallows it.
    #[error("Episode aborted")]
    Aborted,

    /// An allocation inside the episode failed or exceeded its limit.
    #[error("Out of memory: failed to reserve {bytes} bytes")]
    OutOfMemory {
        /// Size of the rejected reservation.
        bytes: usize,
    },

    /// A worker touched another worker's private slot.
    #[error("Worker {thread} may not access private slot {slot}")]
    PrivateSlotDenied {
        /// Worker making the access.
        thread: usize,
        /// Slot it tried to access.
        slot: usize,
    },

    /// A private slot index past the worker count.
    #[error("Private slot {slot} out of range for {threads} workers")]
    PrivateSlotOutOfRange {
        /// Requested slot.
        slot: usize,
        /// Workers in the episode.
        threads: usize,
    },

    /// `set_private_all` received the wrong number of values.
    #[error("Expected {expected} private values, got {got}")]
    PrivateCountMismatch {
        /// One per worker.
        expected: usize,
        /// Values supplied.
        got: usize,
    },

    /// A worker panicked; the episode was aborted.
    #[error("Worker {thread} panicked")]
    WorkerPanicked {
        /// Panicking worker.
        thread: usize,
    },

    /// The OS refused to start a worker thread.
    #[error("Failed to spawn worker {thread}: {error}")]
    Spawn {
        /// Worker that could not start.
        thread: usize,
        /// OS error text.
        error: String,
    },

    /// A body returned an application error.
    #[error("Worker {thread} failed: {message}")]
    Worker {
        /// Failing worker.
        thread: usize,
        /// Error text from the body.
        message: String,
    },
}

/// Errors from region descriptors and size negotiation.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeometryError {
    /// A descriptor with zero size or non-positive pitch.
    #[error("Invalid dimensions: {reason}")]
    InvalidDimensions {
        /// What was wrong.
        reason: String,
    },

    /// Negotiation left nothing to compute.
    #[error("Stage '{stage}' produced an empty region")]
    EmptyRegion {
        /// Stage or mapping that emptied the region.
        stage: String,
    },

    /// A mapping or stage parameter out of range.
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        parameter: String,
        /// What was wrong.
        reason: String,
    },

    /// A radial lens model that folds back on itself.
    #[error("Radial model is not monotonic near r = {radius:.4}")]
    NonMonotonic {
        /// Normalized radius where the model turns.
        radius: f64,
    },

    /// A projective matrix with zero determinant.
    #[error("Projective transform is singular")]
    SingularTransform,

    /// A stage id used twice in one chain.
    #[error("Stage '{0}' is already part of the chain")]
    DuplicateStage(String),

    /// A plan recorded for a different chain.
    #[error("Plan does not match the filter chain: {reason}")]
    PlanMismatch {
        /// What differed.
        reason: String,
    },
}

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Malformed TOML.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {error}")]
    Read {
        /// File path.
        path: String,
        /// Underlying I/O error.
        error: std::io::Error,
    },

    /// A field outside its allowed range.
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// What was wrong.
        reason: String,
    },
}

// ============================================================================
// Error Utilities
// ============================================================================

impl FlowError {
    /// Check if this is the cooperative cancellation status.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, FlowError::Aborted)
    }

    /// Check if the caller may retry the episode (e.g. with smaller tiles).
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            FlowError::WorkerPanicked { .. } | FlowError::Spawn { .. }
        )
    }

    /// Worker index that caused this error, if applicable.
    pub fn thread(&self) -> Option<usize> {
        match self {
            FlowError::PrivateSlotDenied { thread, .. }
            | FlowError::WorkerPanicked { thread }
            | FlowError::Spawn { thread, .. }
            | FlowError::Worker { thread, .. } => Some(*thread),
            _ => None,
        }
    }
}

impl GeometryError {
    /// Shorthand for an invalid parameter error.
    pub fn parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        GeometryError::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for Rawflow operations.
pub type RawflowResult<T> = Result<T, RawflowError>;

/// Result type alias for episode operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// Result type alias for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_id_display() {
        let id = EpisodeId::new();
        assert_eq!(format!("{}", id).len(), 8);
    }

    #[test]
    fn test_cancellation_predicates() {
        assert!(FlowError::Aborted.is_cancellation());
        assert!(FlowError::Aborted.is_recoverable());
        assert!(!FlowError::WorkerPanicked { thread: 2 }.is_recoverable());
        assert_eq!(FlowError::WorkerPanicked { thread: 2 }.thread(), Some(2));
        assert_eq!(FlowError::OutOfMemory { bytes: 8 }.thread(), None);
    }

    #[test]
    fn test_conversion_into_top_level() {
        let err: RawflowError = GeometryError::SingularTransform.into();
        assert!(matches!(err, RawflowError::Geometry(_)));
        assert!(err.to_string().contains("singular"));

        let err: RawflowError = FlowError::Aborted.into();
        assert!(matches!(err, RawflowError::Flow(FlowError::Aborted)));
        let err: RawflowError = ConfigError::InvalidValue {
            field: "tile_width".to_string(),
            reason: "must be positive".to_string(),
        }
        .into();
        assert!(matches!(err, RawflowError::Config(_)));
    }
}
