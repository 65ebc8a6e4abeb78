//! Engine error type
//!
//! Mirrors the shared taxonomy: invalid input fails the request, not-found
//! degrades to an empty result or tombstone, index-level failures are fatal
//! for the named index, refresh failures are logged and skipped by callers.

use biostudies_search_core::error::Error as CoreError;
use thiserror::Error;

use crate::index_manager::IndexName;

/// Result type alias for engine operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Engine error type
#[derive(Debug, Error)]
pub enum SearchError {
    // ==========================================================================
    // Registry / schema
    // ==========================================================================
    #[error("Invalid registry property '{property}': {reason}")]
    InvalidRegistry { property: String, reason: String },

    #[error("Duplicate property name across collections: {0}")]
    DuplicateProperty(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    // ==========================================================================
    // Indexing
    // ==========================================================================
    #[error("Submission has no accession")]
    BlankAccession,

    #[error("Failed to open index {index:?} at {path}: {source}")]
    FailedToOpenIndex {
        index: IndexName,
        path: String,
        #[source]
        source: tantivy::TantivyError,
    },

    #[error("Commit failed for index {index:?}: {source}")]
    CommitFailed {
        index: IndexName,
        #[source]
        source: tantivy::TantivyError,
    },

    // ==========================================================================
    // Query
    // ==========================================================================
    #[error("Cannot build query: {0}")]
    QueryBuild(String),

    #[error("Unknown sort field: {0}")]
    UnknownSortField(String),

    // ==========================================================================
    // Passthrough
    // ==========================================================================
    #[error("Index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<tantivy::query::QueryParserError> for SearchError {
    fn from(err: tantivy::query::QueryParserError) -> Self {
        Self::QueryBuild(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_error_names_property() {
        let err = SearchError::InvalidRegistry {
            property: "facet.file_type".to_string(),
            reason: "unknown analyzer 'Nope'".to_string(),
        };
        assert!(err.to_string().contains("facet.file_type"));
    }
}
