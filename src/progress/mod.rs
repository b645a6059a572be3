//! Progress events and their distribution
//!
//! A job pushes immutable [`ProgressEvent`] values onto the [`ProgressBus`];
//! zero or many listeners receive them. Events are fire-and-forget: nothing
//! is stored for late joiners, and a job runs identically with no audience.

mod bus;

pub use bus::{ListenerId, ProgressBus, Subscription};

use crate::job::PageError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// A job's handle onto the bus
///
/// Carries the job id so the components doing the work (crawl loop, bulk
/// dispatcher) can emit without knowing about jobs or rooms.
#[derive(Clone)]
pub struct ProgressReporter {
    bus: Arc<ProgressBus>,
    job_id: String,
}

impl ProgressReporter {
    pub fn new(bus: Arc<ProgressBus>, job_id: impl Into<String>) -> Self {
        Self {
            bus,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Publishes to this job's room
    pub fn publish(&self, event: ProgressEvent) {
        self.bus.publish(&self.job_id, event);
    }

    /// Shorthand for a work-advanced event
    pub fn progress(&self, pages_done: u32, pages_total: u32, message: impl Into<String>) {
        self.publish(ProgressEvent::progress(
            self.job_id.as_str(),
            pages_done,
            pages_total,
            message,
        ));
    }
}

/// What a progress event reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// Work advanced (a page finished, a retry was scheduled)
    Progress,
    /// The job reached `Completed`
    Complete,
    /// The job reached `Failed`
    Error,
}

/// One immutable notification of a job's state change
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub kind: ProgressKind,
    /// 0..=100, derived from pages_done/pages_total
    pub percent: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    pub pages_done: u32,
    pub pages_total: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<PageError>>,
    /// Overall success flag, set on completion events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    /// Wall-clock duration of the job, set on completion events only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    /// A work-advanced event
    pub fn progress(
        job_id: impl Into<String>,
        pages_done: u32,
        pages_total: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            kind: ProgressKind::Progress,
            percent: percent_of(pages_done, pages_total),
            message: message.into(),
            current_url: None,
            pages_done,
            pages_total,
            errors: None,
            success: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// A terminal completion event; `success` is true only when no per-URL
    /// failure was recorded
    pub fn complete(
        job_id: impl Into<String>,
        success: bool,
        pages_done: u32,
        pages_total: u32,
        duration_ms: u64,
        errors: Vec<PageError>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            kind: ProgressKind::Complete,
            percent: 100,
            message: if success {
                "completed".to_string()
            } else {
                format!("completed with {} failed pages", errors.len())
            },
            current_url: None,
            pages_done,
            pages_total,
            errors: if errors.is_empty() {
                None
            } else {
                Some(errors)
            },
            success: Some(success),
            duration_ms: Some(duration_ms),
            timestamp: Utc::now(),
        }
    }

    /// A terminal failure event
    pub fn error(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            kind: ProgressKind::Error,
            percent: 0,
            message: message.into(),
            current_url: None,
            pages_done: 0,
            pages_total: 0,
            errors: None,
            success: Some(false),
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }

    /// Attaches the URL being worked on
    pub fn with_current_url(mut self, url: impl Into<String>) -> Self {
        self.current_url = Some(url.into());
        self
    }

    /// True for Complete and Error events
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ProgressKind::Complete | ProgressKind::Error)
    }
}

fn percent_of(done: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    ((done as u64 * 100) / total as u64).min(100) as u8
}
