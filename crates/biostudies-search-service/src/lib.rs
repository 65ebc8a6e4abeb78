//! Asynchronous indexing pipeline for the BioStudies search engine
//!
//! - [`IndexingService`] — bounded worker pool with caller-runs
//!   backpressure, per-accession task tracking, streamed paginated batches
//! - [`SubmissionBackend`] / [`HttpSubmissionBackend`] — extended
//!   submission fetches with retry and tombstone semantics
//! - [`MessagingHealth`] — the transport health gate consulted before
//!   every enqueue

#![forbid(unsafe_code)]

pub mod backend;
pub mod error;
pub mod indexing;
pub mod messaging;

pub use backend::{
    BackendError, FetchOutcome, HttpSubmissionBackend, StreamFilters, SubmissionBackend,
};
pub use error::{ServiceError, ServiceResult};
pub use indexing::{IndexingService, QueuedTask};
pub use messaging::{MessagingHealth, StaticMessagingHealth, UpdateMessage};
