//! Configuration for the BioStudies search service
//!
//! Configuration is loaded from environment variables with sensible
//! defaults, so the service can start with nothing but an index directory.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Default indexing worker count.
pub const DEFAULT_THREAD_COUNT: usize = 8;

/// Default bound of the indexing task queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default connect/read timeout for outbound HTTP, in milliseconds.
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 3000;

/// Stop words shared by the attribute and access analyzers when
/// `BS_STOPWORDS` is not set.
pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// Main configuration struct for the search service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory holding one sub-directory per index.
    pub index_base_dir: PathBuf,
    /// Stop-word list shared by analyzers.
    pub stopwords: Vec<String>,
    /// Query-syntax string of document types excluded from search results,
    /// e.g. `type:compound type:project`. Empty disables the filter.
    pub excluded_document_types: String,
    /// Indexing worker count.
    pub indexer_thread_count: usize,
    /// Indexing queue bound.
    pub indexer_queue_capacity: usize,
    /// Location of the collection registry JSON.
    pub registry_path: PathBuf,
    /// Base URL of the submission backend, e.g. `http://backend:8080`.
    pub backend_url: String,
    /// Value of the `X-Session-Token` header sent to the backend.
    pub session_token: String,
    /// Outbound HTTP connect/read timeout.
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when a variable is present but
    /// cannot be parsed, and [`Error::MissingField`] when `BS_INDEX_BASE_DIR`
    /// is absent.
    pub fn from_env() -> Result<Self> {
        let index_base_dir = env::var("BS_INDEX_BASE_DIR")
            .map(PathBuf::from)
            .map_err(|_| Error::MissingField("BS_INDEX_BASE_DIR".to_string()))?;

        let registry_path = env::var("BS_COLLECTION_REGISTRY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| index_base_dir.join("collection-registry.json"));

        Ok(Self {
            index_base_dir,
            stopwords: env_list("BS_STOPWORDS", DEFAULT_STOPWORDS),
            excluded_document_types: env::var("BS_EXCLUDED_DOCUMENT_TYPES").unwrap_or_default(),
            indexer_thread_count: env_parse("BS_INDEXER_THREAD_COUNT", DEFAULT_THREAD_COUNT)?,
            indexer_queue_capacity: env_parse("BS_INDEXER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            registry_path,
            backend_url: env::var("BS_BACKEND_URL").unwrap_or_default(),
            session_token: env::var("BS_SESSION_TOKEN").unwrap_or_default(),
            http_timeout: Duration::from_millis(env_parse(
                "BS_HTTP_TIMEOUT_MS",
                DEFAULT_HTTP_TIMEOUT_MS,
            )?),
        })
    }

    /// Configuration rooted at an explicit directory, for tests and tools.
    #[must_use]
    pub fn for_testing(base: &Path) -> Self {
        Self {
            index_base_dir: base.to_path_buf(),
            stopwords: DEFAULT_STOPWORDS.iter().map(ToString::to_string).collect(),
            excluded_document_types: String::new(),
            indexer_thread_count: 2,
            indexer_queue_capacity: 8,
            registry_path: base.join("collection-registry.json"),
            backend_url: String::new(),
            session_token: String::new(),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

fn env_list(key: &str, default: &[&str]) -> Vec<String> {
    env::var(key).map_or_else(
        |_| default.iter().map(ToString::to_string).collect(),
        |raw| {
            raw.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        },
    )
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    parse_or(key, env::var(key).ok(), default)
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            reason: format!("cannot parse {raw:?}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_testing_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::for_testing(dir.path());
        assert_eq!(config.index_base_dir, dir.path());
        assert_eq!(config.indexer_thread_count, 2);
        assert!(config.stopwords.contains(&"the".to_string()));
        assert!(config.excluded_document_types.is_empty());
    }

    #[test]
    fn default_stopwords_are_lowercase() {
        for word in DEFAULT_STOPWORDS {
            assert_eq!(*word, word.to_lowercase());
        }
    }

    #[test]
    fn parse_or_rejects_garbage() {
        let result: Result<usize> = parse_or("KEY", Some("not-a-number".to_string()), 1);
        let err = result.unwrap_err();
        assert!(err.to_string().contains("KEY"));
    }

    #[test]
    fn parse_or_falls_back_to_default() {
        let result: Result<usize> = parse_or("KEY", None, 42);
        assert_eq!(result.unwrap(), 42);
    }
}
