//! Bounded-concurrency bulk fetching
//!
//! Runs a batch of independent URL fetches with at most `max_concurrent` in
//! flight. Output order always equals input order, whatever order fetches
//! complete in. A single URL's failure becomes a failed entry in the result
//! list; only an engine failure or cancellation aborts the batch.

use crate::config::ScrapeSettings;
use crate::fetch::{FetchError, PageFetcher, ScrapeResult};
use crate::job::{CancelToken, JobError, PageError};
use crate::progress::ProgressReporter;
use futures::future::join_all;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use url::Url;

/// Aggregate result of one bulk dispatch
#[derive(Debug, Clone)]
pub struct BulkOutcome {
    pub successful: u32,
    pub failed: u32,
    /// One entry per input URL, input order
    pub results: Vec<ScrapeResult>,
    /// Per-URL failures, input order
    pub errors: Vec<PageError>,
}

impl BulkOutcome {
    /// True when every URL in the batch succeeded
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Outcome of one task inside the batch
enum TaskOutcome {
    Done(ScrapeResult),
    Cancelled,
    EngineDown(String),
}

/// Fans a batch of fetches out under a concurrency ceiling
pub struct ConcurrentDispatcher {
    fetcher: Arc<dyn PageFetcher>,
    settings: ScrapeSettings,
}

impl ConcurrentDispatcher {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: ScrapeSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Fetches every URL, at most `settings.max_concurrent` at a time
    ///
    /// Each task takes a concurrency slot, then sleeps the configured
    /// inter-request delay (uniformly, first task included) before its
    /// fetch. Cancellation is checked before the slot is taken; fetches
    /// already in flight run to completion and their results are discarded.
    pub async fn dispatch(
        &self,
        urls: &[Url],
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> crate::Result<BulkOutcome> {
        let total = urls.len() as u32;
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent as usize));
        let delay = Duration::from_millis(self.settings.request_delay_ms);
        let completed = AtomicU32::new(0);

        tracing::info!(
            job_id = reporter.job_id(),
            urls = total,
            ceiling = self.settings.max_concurrent,
            "dispatching bulk fetch"
        );

        let tasks = urls.iter().map(|url| {
            let semaphore = Arc::clone(&semaphore);
            let completed = &completed;
            let url = url.clone();
            async move {
                if cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }

                // The permit is the concurrency ceiling; hold it across the
                // delay and the fetch.
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return TaskOutcome::Cancelled,
                };

                if cancel.is_cancelled() {
                    return TaskOutcome::Cancelled;
                }

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }

                let result = match self.fetcher.fetch(&url, &self.settings).await {
                    Ok(snapshot) => ScrapeResult::ok(&snapshot),
                    Err(FetchError::Page { url: failed, message }) => {
                        tracing::warn!(url = %failed, %message, "bulk fetch failed for one URL");
                        ScrapeResult::failed(failed, message)
                    }
                    Err(FetchError::Engine(message)) => {
                        return TaskOutcome::EngineDown(message);
                    }
                };

                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                reporter.publish(
                    crate::progress::ProgressEvent::progress(
                        reporter.job_id(),
                        done,
                        total,
                        format!("Scraped URL {} of {}", done, total),
                    )
                    .with_current_url(url.as_str()),
                );

                TaskOutcome::Done(result)
            }
        });

        // join_all keeps input order in its output, whatever the
        // completion order was.
        let outcomes = join_all(tasks).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Done(result) => results.push(result),
                TaskOutcome::Cancelled => {
                    return Err(JobError::Cancelled {
                        id: reporter.job_id().to_string(),
                    }
                    .into());
                }
                TaskOutcome::EngineDown(message) => {
                    return Err(FetchError::Engine(message).into());
                }
            }
        }

        let errors: Vec<PageError> = results
            .iter()
            .filter(|r| !r.success)
            .map(|r| {
                PageError::new(
                    r.url.clone(),
                    r.error.as_deref().unwrap_or("fetch failed"),
                )
            })
            .collect();

        let failed = errors.len() as u32;
        let outcome = BulkOutcome {
            successful: total - failed,
            failed,
            results,
            errors,
        };

        tracing::info!(
            job_id = reporter.job_id(),
            successful = outcome.successful,
            failed = outcome.failed,
            "bulk dispatch finished"
        );

        Ok(outcome)
    }
}
