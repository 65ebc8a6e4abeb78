//! Per-accession indexing task records
//!
//! A task is created when a submission (or a stream) is queued, transitions
//! on worker pickup and completion, and is evicted one hour after reaching a
//! terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// How long a terminal task remains queryable before eviction.
pub const TASK_TTL: Duration = Duration::from_secs(60 * 60);

/// Lifecycle state of an indexing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
    NotFound,
}

impl TaskState {
    /// Whether the state is terminal (eligible for TTL eviction).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::NotFound)
    }
}

/// Status record for one queued submission or stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Unique id assigned at enqueue time.
    pub task_id: Uuid,
    /// Accession (or stream id) the task operates on.
    pub acc_no: String,
    pub state: TaskState,
    /// Human-readable detail, set on failure or tombstone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub queued_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskStatus {
    /// New queued task for an accession.
    #[must_use]
    pub fn queued(acc_no: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            acc_no: acc_no.into(),
            state: TaskState::Queued,
            message: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Stub returned when no task is known for an accession.
    #[must_use]
    pub fn not_found(acc_no: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::nil(),
            acc_no: acc_no.into(),
            state: TaskState::NotFound,
            message: Some("no task recorded for accession".to_string()),
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the task as picked up by a worker.
    pub fn start(&mut self) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Mark the task as finished in the given terminal state.
    pub fn finish(&mut self, state: TaskState, message: Option<String>) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.message = message;
        self.finished_at = Some(Utc::now());
    }

    /// Whether the task finished longer than [`TASK_TTL`] ago.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state.is_terminal()
            && self.finished_at.is_some_and(|finished| {
                (now - finished).to_std().unwrap_or_default() >= TASK_TTL
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn lifecycle_transitions() {
        let mut task = TaskStatus::queued("S-BSST1");
        assert_eq!(task.state, TaskState::Queued);
        assert!(task.started_at.is_none());

        task.start();
        assert_eq!(task.state, TaskState::Running);
        assert!(task.started_at.is_some());

        task.finish(TaskState::Completed, None);
        assert_eq!(task.state, TaskState::Completed);
        assert!(task.finished_at.is_some());
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::NotFound.is_terminal());
        assert!(!TaskState::Queued.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn expiry_requires_terminal_state_and_age() {
        let mut task = TaskStatus::queued("S-BSST2");
        let now = Utc::now();
        assert!(!task.is_expired(now));

        task.finish(TaskState::Failed, Some("boom".to_string()));
        assert!(!task.is_expired(now));
        assert!(task.is_expired(now + TimeDelta::hours(2)));
    }

    #[test]
    fn not_found_stub_has_nil_id() {
        let stub = TaskStatus::not_found("S-MISSING");
        assert_eq!(stub.task_id, Uuid::nil());
        assert_eq!(stub.state, TaskState::NotFound);
    }

    #[test]
    fn serializes_screaming_snake_case() {
        let task = TaskStatus::queued("S-BSST3");
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"QUEUED\""));
    }
}
