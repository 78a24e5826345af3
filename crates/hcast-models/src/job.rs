//! Job records and canonical job states.
//!
//! Asynchronous backends each speak their own status vocabulary
//! ("succeeded", "COMPLETED", "IN_QUEUE", ...). `JobState::from_raw`
//! normalizes them into one canonical state machine so the lifecycle engine
//! never branches on backend-specific strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical job state.
///
/// `Submitted -> Queued -> Running -> Done | Failed | TimedOut`.
/// `Queued` and `Running` may loop back to themselves on successive polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted by the backend, no status observed yet.
    Submitted,
    /// Waiting for backend capacity (includes rate-limited holds).
    Queued,
    /// Actively generating.
    Running,
    /// Terminal: artifact should be extractable from the final payload.
    Done,
    /// Terminal: the backend reported failure or cancellation.
    Failed,
    /// Terminal: our deadline elapsed before the backend reached a terminal
    /// status. The remote job is not cancelled.
    TimedOut,
}

impl JobState {
    /// Normalize a backend's raw status token.
    ///
    /// Unrecognized tokens map to `Running` so an unknown-but-alive job keeps
    /// polling; the deadline remains the single abandonment mechanism.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "succeeded" | "success" | "completed" | "completed_with_warnings" | "done" => {
                JobState::Done
            }
            "failed" | "error" | "cancelled" | "canceled" => JobState::Failed,
            "queued" | "in_queue" | "pending" | "rate_limited" | "throttled" => JobState::Queued,
            "running" | "in_progress" | "processing" | "started" => JobState::Running,
            _ => JobState::Running,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    /// Check if this is a terminal state (no more polls expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::TimedOut)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One in-flight remote job.
///
/// Created at submit time, mutated only by the lifecycle engine, discarded
/// once a terminal state is reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Backend-assigned opaque identifier.
    pub id: String,
    /// Name of the owning backend.
    pub backend: String,
    /// Current canonical state.
    pub state: JobState,
    /// When the submit succeeded.
    pub submitted_at: DateTime<Utc>,
    /// When the backend was last polled.
    pub last_polled_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(id: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            backend: backend.into(),
            state: JobState::Submitted,
            submitted_at: Utc::now(),
            last_polled_at: None,
        }
    }

    /// Record an observed state after a poll.
    pub fn observe(&mut self, state: JobState) {
        self.state = state;
        self.last_polled_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
