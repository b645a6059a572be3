//! Retryable execution of one job
//!
//! The lifecycle owns the attempt loop: run the work, complete on success,
//! back off and re-enter Running on a whole-unit failure while retries
//! remain, fail terminally otherwise. Per-URL fetch failures never reach
//! this layer; they live inside the work's report.
//!
//! Every transition after the initial dispatch emits through the progress
//! bus: a retry publishes a Progress event, completion a Complete event,
//! terminal failure an Error event.

use crate::fetch::ScrapeResult;
use crate::job::{JobError, JobId, JobRegistry, JobState, PageError};
use crate::progress::{ProgressBus, ProgressEvent};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// How a job retries after whole-unit failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt; 0 means fail on first error
    pub max_retries: u32,

    /// Attempt n backs off n times this duration before re-running
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Backoff before the attempt after `failed_attempt`
    pub fn backoff(&self, failed_attempt: u32) -> Duration {
        self.base_delay * failed_attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(60),
        }
    }
}

/// What one successful run of a job's work produces
#[derive(Debug, Clone, Default)]
pub struct JobReport {
    pub pages_done: u32,
    pub pages_total: u32,
    /// Ordered per-URL results
    pub results: Vec<ScrapeResult>,
    /// Per-URL failures, in discovery order
    pub errors: Vec<PageError>,
}

impl JobReport {
    /// Overall success: zero per-URL failures
    ///
    /// Reported separately from job state: a run with failed pages still
    /// Completes.
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Drives jobs through their state machine with retry and backoff
pub struct JobLifecycle {
    registry: Arc<JobRegistry>,
    bus: Arc<ProgressBus>,
    retry: RetryPolicy,
}

impl JobLifecycle {
    pub fn new(registry: Arc<JobRegistry>, bus: Arc<ProgressBus>, retry: RetryPolicy) -> Self {
        Self {
            registry,
            bus,
            retry,
        }
    }

    /// Runs a job's work to a terminal state
    ///
    /// `work` is invoked once per attempt with the attempt number (starting
    /// at 1). An `Err` from `work` is a whole-unit failure; with retries
    /// remaining the job re-enters Running after `base_delay * attempt`,
    /// otherwise it Fails. A policy of `max_retries = N` yields exactly
    /// `N + 1` attempts.
    pub async fn execute<F, Fut>(&self, id: &JobId, work: F) -> Result<JobReport, JobError>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = crate::Result<JobReport>>,
    {
        // Dispatch by the external queue; this first transition does not emit.
        self.registry.transition(id, JobState::Running)?;
        let cancel = self.registry.cancel_token(id)?;

        loop {
            let attempt = self.registry.attempt(id)?;
            tracing::info!(job_id = %id, attempt, "running job attempt");

            match work(attempt).await {
                Ok(report) => {
                    self.registry
                        .set_progress(id, report.pages_done, report.pages_total);
                    self.registry.record_errors(id, &report.errors);
                    self.registry.transition(id, JobState::Completed)?;

                    let duration_ms = self
                        .registry
                        .with_job(id, |job| job.duration_ms())?
                        .unwrap_or(0);

                    self.bus.publish(
                        id.as_str(),
                        ProgressEvent::complete(
                            id.as_str(),
                            report.success(),
                            report.pages_done,
                            report.pages_total,
                            duration_ms,
                            report.errors.clone(),
                        ),
                    );

                    tracing::info!(
                        job_id = %id,
                        attempt,
                        pages = report.pages_done,
                        failed_pages = report.errors.len(),
                        "job completed"
                    );
                    return Ok(report);
                }

                // A cancelled job goes straight to Failed, never into retry.
                Err(error) if attempt <= self.retry.max_retries && !cancel.is_cancelled() => {
                    let delay = self.retry.backoff(attempt);
                    tracing::warn!(
                        job_id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        %error,
                        "attempt failed, retrying"
                    );

                    self.registry.set_last_error(id, error.to_string());
                    self.registry.transition(id, JobState::Running)?;

                    let (pages_done, pages_total) = self
                        .registry
                        .with_job(id, |job| (job.pages_done, job.pages_total))?;
                    self.bus.publish(
                        id.as_str(),
                        ProgressEvent::progress(
                            id.as_str(),
                            pages_done,
                            pages_total,
                            format!(
                                "attempt {} failed ({}), retrying",
                                attempt, error
                            ),
                        ),
                    );

                    tokio::time::sleep(delay).await;
                }

                Err(error) => {
                    self.registry.set_last_error(id, error.to_string());
                    self.registry.transition(id, JobState::Failed)?;
                    self.bus
                        .publish(id.as_str(), ProgressEvent::error(id.as_str(), error.to_string()));

                    tracing::error!(job_id = %id, attempt, %error, "job failed terminally");
                    return Err(JobError::Failed {
                        id: id.to_string(),
                        attempts: attempt,
                        message: error.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::job::{Job, JobKind};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn setup(max_retries: u32) -> (Arc<JobRegistry>, Arc<ProgressBus>, JobLifecycle, JobId) {
        let registry = Arc::new(JobRegistry::new());
        let bus = Arc::new(ProgressBus::new());
        let lifecycle = JobLifecycle::new(
            Arc::clone(&registry),
            Arc::clone(&bus),
            RetryPolicy::new(max_retries, Duration::from_millis(1)),
        );

        let id = JobId::generate();
        registry.insert(Job::new(id.clone(), "s1", JobKind::Single, 1));

        (registry, bus, lifecycle, id)
    }

    fn ok_report() -> JobReport {
        JobReport {
            pages_done: 1,
            pages_total: 1,
            results: vec![],
            errors: vec![],
        }
    }

    #[tokio::test]
    async fn test_success_completes() {
        let (registry, _bus, lifecycle, id) = setup(3);

        let report = lifecycle.execute(&id, |_| async { Ok(ok_report()) }).await;

        assert!(report.is_ok());
        let status = registry.status(&id).unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.attempt, 1);
    }

    #[tokio::test]
    async fn test_zero_retries_fails_directly() {
        let (registry, _bus, lifecycle, id) = setup(0);

        let calls = AtomicU32::new(0);
        let result = lifecycle
            .execute(&id, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Engine("down".to_string()).into()) }
            })
            .await;

        assert!(matches!(result, Err(JobError::Failed { attempts: 1, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.status(&id).unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_n_retries_makes_n_plus_one_attempts() {
        let (registry, _bus, lifecycle, id) = setup(2);

        let calls = AtomicU32::new(0);
        let result = lifecycle
            .execute(&id, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Engine("always down".to_string()).into()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let status = registry.status(&id).unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempt, 3);
        assert!(status.last_error.unwrap().contains("always down"));
    }

    #[tokio::test]
    async fn test_succeeds_on_retry() {
        let (registry, _bus, lifecycle, id) = setup(3);

        let result = lifecycle
            .execute(&id, |attempt| async move {
                if attempt < 3 {
                    Err(FetchError::Engine("flaky".to_string()).into())
                } else {
                    Ok(ok_report())
                }
            })
            .await;

        assert!(result.is_ok());
        let status = registry.status(&id).unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.attempt, 3);
    }

    #[tokio::test]
    async fn test_retry_emits_progress_then_error() {
        let (_registry, bus, lifecycle, id) = setup(1);
        let mut sub = bus.subscribe(id.as_str());

        let _ = lifecycle
            .execute(&id, |_| async {
                Err(FetchError::Engine("down".to_string()).into())
            })
            .await;

        let retry_event = sub.events.recv().await.unwrap();
        assert_eq!(retry_event.kind, crate::progress::ProgressKind::Progress);
        assert!(retry_event.message.contains("retrying"));

        let failure_event = sub.events.recv().await.unwrap();
        assert_eq!(failure_event.kind, crate::progress::ProgressKind::Error);
        assert!(failure_event.is_terminal());
    }

    #[tokio::test]
    async fn test_completion_emits_complete_event() {
        let (_registry, bus, lifecycle, id) = setup(3);
        let mut sub = bus.subscribe(id.as_str());

        lifecycle
            .execute(&id, |_| async { Ok(ok_report()) })
            .await
            .unwrap();

        let event = sub.events.recv().await.unwrap();
        assert_eq!(event.kind, crate::progress::ProgressKind::Complete);
        assert_eq!(event.success, Some(true));
    }

    #[tokio::test]
    async fn test_partial_failures_still_complete() {
        let (registry, bus, lifecycle, id) = setup(3);
        let mut sub = bus.subscribe(id.as_str());

        let report = lifecycle
            .execute(&id, |_| async {
                Ok(JobReport {
                    pages_done: 2,
                    pages_total: 2,
                    results: vec![],
                    errors: vec![PageError::new("https://a.test/x", "HTTP 500")],
                })
            })
            .await
            .unwrap();

        assert!(!report.success());
        assert_eq!(registry.status(&id).unwrap().state, JobState::Completed);

        let event = sub.events.recv().await.unwrap();
        assert_eq!(event.success, Some(false));
        assert_eq!(event.errors.unwrap().len(), 1);
    }

    #[test]
    fn test_backoff_scales_with_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_secs(60));
        assert_eq!(policy.backoff(1), Duration::from_secs(60));
        assert_eq!(policy.backoff(2), Duration::from_secs(120));
        assert_eq!(policy.backoff(3), Duration::from_secs(180));
    }
}
