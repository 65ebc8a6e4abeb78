//! Submission backend client
//!
//! Fetches extended submission JSON over HTTP with the session token
//! header. 404 is a tombstone (the submission was deleted upstream), other
//! 4xx are fatal, 5xx and transport errors are retried up to three times
//! with linear backoff.

use std::time::Duration;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use biostudies_search_core::Config;

/// Fetch attempts before giving up.
const MAX_ATTEMPTS: u32 = 3;

/// Backoff unit; attempt `n` sleeps `n` times this.
const BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Header carrying the backend session token.
const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

/// Outcome of an extended-submission fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Found(Value),
    /// Upstream 404: the submission no longer exists and must be removed
    /// from the indices.
    NotFound,
}

/// Backend client errors.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend returned status {status} for {url}")]
    Fatal { status: u16, url: String },

    #[error("backend unavailable after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },

    #[error("backend response malformed: {0}")]
    Malformed(String),
}

/// Filters of a streamed paginated re-index.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Deserialize)]
pub struct StreamFilters {
    pub collection: Option<String>,
    /// Inclusive release-time lower bound (ISO local date).
    pub from_r_time: Option<NaiveDate>,
    /// Inclusive release-time upper bound (ISO local date).
    pub to_r_time: Option<NaiveDate>,
    pub released: Option<bool>,
}

/// Source of extended submissions, by accession or by page.
pub trait SubmissionBackend: Send + Sync {
    fn fetch_extended(&self, acc_no: &str) -> Result<FetchOutcome, BackendError>;

    fn fetch_page(
        &self,
        filters: &StreamFilters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, BackendError>;
}

/// Retry classification of one failed attempt.
enum Attempt {
    NotFound,
    Fatal(u16),
    Retry(String),
}

fn classify(error: &ureq::Error) -> Attempt {
    match error {
        ureq::Error::Status(404, _) => Attempt::NotFound,
        ureq::Error::Status(status, _) if (400..500).contains(status) => Attempt::Fatal(*status),
        ureq::Error::Status(status, _) => Attempt::Retry(format!("status {status}")),
        ureq::Error::Transport(transport) => Attempt::Retry(transport.to_string()),
    }
}

/// Production backend over blocking HTTP.
pub struct HttpSubmissionBackend {
    agent: ureq::Agent,
    base_url: String,
    session_token: String,
}

impl HttpSubmissionBackend {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.http_timeout)
            .timeout_read(config.http_timeout)
            .build();
        Self {
            agent,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            session_token: config.session_token.clone(),
        }
    }

    fn get_json(&self, url: &str, params: &[(String, String)]) -> Result<Option<Value>, BackendError> {
        let mut last_reason = String::new();
        for attempt in 1..=MAX_ATTEMPTS {
            let mut request = self
                .agent
                .get(url)
                .set(SESSION_TOKEN_HEADER, &self.session_token);
            for (key, value) in params {
                request = request.query(key, value);
            }
            match request.call() {
                Ok(response) => {
                    return response
                        .into_json::<Value>()
                        .map(Some)
                        .map_err(|e| BackendError::Malformed(e.to_string()));
                }
                Err(error) => match classify(&error) {
                    Attempt::NotFound => {
                        debug!(url, "backend 404");
                        return Ok(None);
                    }
                    Attempt::Fatal(status) => {
                        return Err(BackendError::Fatal {
                            status,
                            url: url.to_string(),
                        });
                    }
                    Attempt::Retry(reason) => {
                        warn!(url, attempt, %reason, "backend fetch failed");
                        last_reason = reason;
                        if attempt < MAX_ATTEMPTS {
                            std::thread::sleep(BACKOFF_STEP * attempt);
                        }
                    }
                },
            }
        }
        Err(BackendError::Exhausted {
            attempts: MAX_ATTEMPTS,
            reason: last_reason,
        })
    }
}

impl SubmissionBackend for HttpSubmissionBackend {
    fn fetch_extended(&self, acc_no: &str) -> Result<FetchOutcome, BackendError> {
        let url = format!("{}/submissions/extended/{acc_no}", self.base_url);
        Ok(self
            .get_json(&url, &[])?
            .map_or(FetchOutcome::NotFound, FetchOutcome::Found))
    }

    fn fetch_page(
        &self,
        filters: &StreamFilters,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<Value>, BackendError> {
        let url = format!("{}/submissions/extended", self.base_url);
        let mut params = vec![
            ("offset".to_string(), offset.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(collection) = &filters.collection {
            params.push(("collection".to_string(), collection.clone()));
        }
        if let Some(from) = filters.from_r_time {
            params.push(("fromRTime".to_string(), from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = filters.to_r_time {
            params.push(("toRTime".to_string(), to.format("%Y-%m-%d").to_string()));
        }
        if let Some(released) = filters.released {
            params.push(("released".to_string(), released.to_string()));
        }

        let body = self
            .get_json(&url, &params)?
            .ok_or_else(|| BackendError::Malformed("page endpoint returned 404".to_string()))?;
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(mut map) => match map.remove("submissions") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(BackendError::Malformed(
                    "expected a submissions array".to_string(),
                )),
            },
            _ => Err(BackendError::Malformed("expected an array body".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_of_statuses() {
        let not_found = ureq::Error::Status(
            404,
            ureq::Response::new(404, "Not Found", "gone").unwrap(),
        );
        assert!(matches!(classify(&not_found), Attempt::NotFound));

        let forbidden = ureq::Error::Status(
            403,
            ureq::Response::new(403, "Forbidden", "no").unwrap(),
        );
        assert!(matches!(classify(&forbidden), Attempt::Fatal(403)));

        let upstream = ureq::Error::Status(
            503,
            ureq::Response::new(503, "Service Unavailable", "later").unwrap(),
        );
        assert!(matches!(classify(&upstream), Attempt::Retry(_)));
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_testing(dir.path());
        config.backend_url = "http://backend:8080/".to_string();
        let backend = HttpSubmissionBackend::new(&config);
        assert_eq!(backend.base_url, "http://backend:8080");
    }

    #[test]
    fn stream_filters_deserialize_from_request_body() {
        let filters: StreamFilters = serde_json::from_str(
            r#"{"collection": "arrayexpress", "from_r_time": "2024-01-01", "released": true}"#,
        )
        .unwrap();
        assert_eq!(filters.collection.as_deref(), Some("arrayexpress"));
        assert_eq!(filters.released, Some(true));
    }
}
