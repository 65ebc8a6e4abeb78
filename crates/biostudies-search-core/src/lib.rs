//! Core types, models, and configuration for the BioStudies search service
//!
//! This crate holds the pieces shared by the index engine and the indexing
//! pipeline:
//! - [`Config`] — env-driven service configuration with test constructors
//! - [`Error`] — the shared error taxonomy (invalid input, not-found,
//!   transient I/O, fatal resource, security, programmer invariants)
//! - [`TaskStatus`] / [`TaskState`] — per-accession indexing task records
//! - [`UserContext`] — the explicit per-request access context threaded
//!   through query construction (never a thread-local)

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod logging;
pub mod task;
pub mod user;

pub use config::Config;
pub use error::{Error, Result};
pub use logging::init_tracing;
pub use task::{TaskState, TaskStatus};
pub use user::{PUBLIC_ACCESS_TAG, UserContext};
