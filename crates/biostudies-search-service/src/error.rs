//! Service-level error type

use std::time::Duration;

use thiserror::Error;

use crate::backend::BackendError;
use biostudies_search_engine::SearchError;

/// Result type alias for pipeline operations
pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Errors surfaced by the indexing pipeline.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The messaging transport is closed; enqueue fails fast.
    #[error("indexing service unavailable: {0}")]
    Unavailable(String),

    #[error("invalid accession: {0:?}")]
    InvalidAccession(String),

    #[error("queue drain timed out after {0:?}")]
    DrainTimeout(Duration),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Engine(#[from] SearchError),
}
