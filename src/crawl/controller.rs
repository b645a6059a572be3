//! Site-crawl orchestration
//!
//! Drives one breadth-first traversal: dequeue, fetch, record, enqueue
//! discovered links, pace, emit progress. The loop is deliberately
//! sequential: FIFO discovery order is part of the contract, and it keeps
//! link bookkeeping simple. Fetching is delegated to the [`PageFetcher`]
//! seam; frontier decisions are delegated to [`Frontier`].

use crate::config::ScrapeSettings;
use crate::crawl::{EnqueueOutcome, Frontier, FrontierPhase};
use crate::fetch::{FetchError, PageFetcher, ScrapeResult};
use crate::job::{CancelToken, JobError, PageError};
use crate::progress::ProgressReporter;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Everything one finished crawl produced
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub start_url: String,
    /// Ordered per-URL results, visit order
    pub pages: Vec<ScrapeResult>,
    /// Per-URL failures, visit order
    pub errors: Vec<PageError>,
    /// Pages actually fetched
    pub pages_done: u32,
    /// The budget the crawl ran under
    pub page_budget: u32,
    /// Visited plus still-queued pages at exhaustion
    pub discovered: u32,
}

impl CrawlOutcome {
    /// True when every fetched page succeeded
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs site crawls against an injected fetch engine
pub struct CrawlController {
    fetcher: Arc<dyn PageFetcher>,
    settings: ScrapeSettings,
}

impl CrawlController {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: ScrapeSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Crawls from `start_url` until the frontier is exhausted
    ///
    /// A failing fetch is recorded and traversal continues; only an engine
    /// failure or cancellation aborts the crawl. The configured
    /// inter-request delay separates consecutive fetches; a one-page crawl
    /// never sleeps.
    pub async fn crawl(
        &self,
        start_url: &Url,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> crate::Result<CrawlOutcome> {
        let budget = self.settings.page_budget as usize;
        let mut frontier = Frontier::new(start_url, budget)?;
        let delay = Duration::from_millis(self.settings.request_delay_ms);

        tracing::info!(
            start = %start_url,
            scope = frontier.scope_host(),
            budget,
            "starting site crawl"
        );

        let mut pages: Vec<ScrapeResult> = Vec::new();
        let mut errors: Vec<PageError> = Vec::new();

        while let Some(url) = frontier.next() {
            if cancel.is_cancelled() {
                tracing::info!(job_id = reporter.job_id(), "crawl cancelled");
                return Err(JobError::Cancelled {
                    id: reporter.job_id().to_string(),
                }
                .into());
            }

            if !pages.is_empty() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            frontier.mark_visited(&url);

            match self.fetcher.fetch(&url, &self.settings).await {
                Ok(snapshot) => {
                    if self.settings.follow_links {
                        self.enqueue_links(&mut frontier, &url, &snapshot.links);
                    }
                    pages.push(ScrapeResult::ok(&snapshot));
                }
                Err(FetchError::Page { url: failed, message }) => {
                    tracing::warn!(url = %failed, %message, "page fetch failed, continuing");
                    errors.push(PageError::new(failed.clone(), message.clone()));
                    pages.push(ScrapeResult::failed(failed, message));
                }
                Err(engine @ FetchError::Engine(_)) => {
                    // Whole-unit failure: the lifecycle decides about retry.
                    return Err(engine.into());
                }
            }

            let done = frontier.visited_count() as u32;
            reporter.publish(
                crate::progress::ProgressEvent::progress(
                    reporter.job_id(),
                    done,
                    self.settings.page_budget,
                    format!("Crawled page {} of up to {}", done, self.settings.page_budget),
                )
                .with_current_url(url.as_str()),
            );
        }

        debug_assert_eq!(frontier.phase(), FrontierPhase::Exhausted);

        let outcome = CrawlOutcome {
            start_url: start_url.to_string(),
            pages_done: pages.len() as u32,
            page_budget: self.settings.page_budget,
            discovered: frontier.discovered_count() as u32,
            pages,
            errors,
        };

        tracing::info!(
            job_id = reporter.job_id(),
            pages = outcome.pages_done,
            failed = outcome.errors.len(),
            discovered = outcome.discovered,
            "crawl exhausted"
        );

        Ok(outcome)
    }

    fn enqueue_links(&self, frontier: &mut Frontier, base: &Url, links: &[String]) {
        for link in links {
            match frontier.enqueue(link, base) {
                EnqueueOutcome::Enqueued => {}
                EnqueueOutcome::BudgetReached => {
                    tracing::debug!(%link, "discarding link beyond page budget");
                }
                EnqueueOutcome::OutOfScope
                | EnqueueOutcome::AlreadySeen
                | EnqueueOutcome::Invalid => {}
            }
        }
    }
}
