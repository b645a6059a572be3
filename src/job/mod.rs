//! Jobs: one submitted, trackable unit of scraping work
//!
//! A job's state moves Queued → Running → {Completed, Failed}, with
//! Running → Running re-entries for retries. Transitions are validated
//! here; terminal states are final. The registry owns all job records and
//! answers status queries; the lifecycle drives execution with retry and
//! backoff.

mod lifecycle;
mod registry;

pub use lifecycle::{JobLifecycle, JobReport, RetryPolicy};
pub use registry::JobRegistry;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Job-specific errors
#[derive(Debug, Clone, Error)]
pub enum JobError {
    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} failed after {attempts} attempts: {message}")]
    Failed {
        id: String,
        attempts: u32,
        message: String,
    },

    #[error("Job {id} cancelled")]
    Cancelled { id: String },
}

/// Unique job identifier
///
/// Submissions may carry their own id (the external queue's task id);
/// otherwise one is generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What kind of work a job covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Single,
    Bulk,
    SiteCrawl,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Single => "single",
            Self::Bulk => "bulk",
            Self::SiteCrawl => "site-crawl",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle state of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobState {
    /// Terminal states have no outgoing transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether moving to `to` is a defined transition
    ///
    /// Running → Running is the retry re-entry.
    pub fn can_transition_to(&self, to: JobState) -> bool {
        matches!(
            (self, to),
            (Self::Queued, JobState::Running)
                | (Self::Running, JobState::Running)
                | (Self::Running, JobState::Completed)
                | (Self::Running, JobState::Failed)
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// One failed page inside a bulk or crawl job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageError {
    pub url: String,
    pub message: String,
}

impl PageError {
    pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            message: message.into(),
        }
    }
}

/// Cooperative cancellation flag
///
/// Checked at loop tops and before slot acquisition; in-flight fetches are
/// awaited, not interrupted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One unit of scraping work and its observable progress
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub subject_id: String,
    pub kind: JobKind,
    pub state: JobState,
    /// 0 while queued; 1 on first run; +1 per retry
    pub attempt: u32,
    pub pages_done: u32,
    pub pages_total: u32,
    pub errors: Vec<PageError>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancel: CancelToken,
}

impl Job {
    pub fn new(id: JobId, subject_id: impl Into<String>, kind: JobKind, pages_total: u32) -> Self {
        Self {
            id,
            subject_id: subject_id.into(),
            kind,
            state: JobState::Queued,
            attempt: 0,
            pages_done: 0,
            pages_total,
            errors: Vec::new(),
            last_error: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            cancel: CancelToken::new(),
        }
    }

    /// Applies a state transition, or rejects it as undefined
    ///
    /// Entering Running bumps the attempt counter; entering a terminal
    /// state stamps the finish time.
    pub fn transition(&mut self, to: JobState) -> Result<(), JobError> {
        if !self.state.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to,
            });
        }

        if to == JobState::Running {
            self.attempt += 1;
            if self.started_at.is_none() {
                self.started_at = Some(Utc::now());
            }
        }

        if to.is_terminal() {
            self.finished_at = Some(Utc::now());
        }

        tracing::debug!(
            job_id = %self.id,
            from = %self.state,
            to = %to,
            attempt = self.attempt,
            "job transition"
        );

        self.state = to;
        Ok(())
    }

    /// Milliseconds between start and finish, when both are known
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => {
                let ms = (end - start).num_milliseconds();
                Some(ms.max(0) as u64)
            }
            _ => None,
        }
    }

    /// Snapshot answered by the status query
    pub fn status(&self) -> JobStatus {
        JobStatus {
            id: self.id.clone(),
            state: self.state,
            kind: self.kind,
            attempt: self.attempt,
            pages_done: self.pages_done,
            pages_total: self.pages_total,
            last_error: self.last_error.clone(),
        }
    }
}

/// Answer to the external job-status query
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub kind: JobKind,
    pub attempt: u32,
    pub pages_done: u32,
    pub pages_total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new(JobId::generate(), "subject-1", JobKind::Single, 1)
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = job();
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempt, 0);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_dispatch_transition() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();

        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.attempt, 1);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_retry_reenters_running() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Running).unwrap();

        assert_eq!(job.attempt, 3);
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Completed).unwrap();

        assert!(job.finished_at.is_some());
        let err = job.transition(JobState::Running).unwrap_err();
        assert!(matches!(err, JobError::InvalidTransition { .. }));
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Failed).unwrap();

        assert!(job.transition(JobState::Completed).is_err());
        assert!(job.transition(JobState::Running).is_err());
    }

    #[test]
    fn test_queued_cannot_complete_directly() {
        let mut job = job();
        assert!(job.transition(JobState::Completed).is_err());
        assert!(job.transition(JobState::Failed).is_err());
    }

    #[test]
    fn test_duration_requires_both_stamps() {
        let mut job = job();
        assert!(job.duration_ms().is_none());

        job.transition(JobState::Running).unwrap();
        assert!(job.duration_ms().is_none());

        job.transition(JobState::Completed).unwrap();
        assert!(job.duration_ms().is_some());
    }

    #[test]
    fn test_status_snapshot() {
        let mut job = job();
        job.transition(JobState::Running).unwrap();
        job.pages_done = 1;
        job.last_error = Some("HTTP 500".to_string());

        let status = job.status();
        assert_eq!(status.state, JobState::Running);
        assert_eq!(status.attempt, 1);
        assert_eq!(status.pages_done, 1);
        assert_eq!(status.last_error.as_deref(), Some("HTTP 500"));
    }

    #[test]
    fn test_cancel_token_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());

        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_job_ids_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
    }

    #[test]
    fn test_job_id_from_external_queue() {
        let id = JobId::from_string("task-42");
        assert_eq!(id.as_str(), "task-42");
        assert_eq!(id.to_string(), "task-42");
    }
}
