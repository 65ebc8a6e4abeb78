//! Shared error taxonomy for the BioStudies search service
//!
//! Variants are grouped by failure kind. Boundary code maps InvalidInput to
//! 4xx responses, NotFound to tombstones/empty results, TransientIO to
//! retries, and FatalResource to startup aborts or 503s.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shared error type for the search service
#[derive(Debug, Error)]
pub enum Error {
    // ==========================================================================
    // Invalid input (rejected at the boundary)
    // ==========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Submission has no accession")]
    BlankAccession,

    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfig { key: String, reason: String },

    // ==========================================================================
    // Not found (converted to tombstone/empty result, never surfaced raw)
    // ==========================================================================
    #[error("Submission not found: {0}")]
    SubmissionNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    // ==========================================================================
    // Transient I/O
    // ==========================================================================
    #[error("Upstream error after {attempts} attempts: {reason}")]
    UpstreamExhausted { attempts: u32, reason: String },

    // ==========================================================================
    // Fatal resource
    // ==========================================================================
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    // ==========================================================================
    // I/O and serialization
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error should be retried by a caller with a retry budget.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::UpstreamExhausted { .. } | Self::Io(_))
    }
}
