//! The submission and execution surface of the orchestrator
//!
//! [`ScrapeService`] is what the plumbing (HTTP routes, queue workers) talks
//! to. Submission is synchronous: validate the request, charge the quota,
//! create a Queued job, hand back its id. A rejected submission never
//! produces a job. Execution (`run`) is the worker-side entry the external
//! queue dispatches; it drives the job through the retry lifecycle.

use crate::config::{self, Config, ScrapeSettings};
use crate::crawl::CrawlController;
use crate::dispatch::ConcurrentDispatcher;
use crate::fetch::{FetchError, PageFetcher, ScrapeResult};
use crate::job::{
    CancelToken, Job, JobError, JobId, JobKind, JobLifecycle, JobRegistry, JobReport, JobStatus,
    PageError, RetryPolicy,
};
use crate::limiter::{
    InMemoryWindowStore, OperationKind, QuotaError, RateLimitStatus, RateLimiter, Subject,
};
use crate::progress::{ProgressBus, ProgressEvent, ProgressReporter, Subscription};
use crate::url::normalize_url;
use crate::ConfigError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Why a submission was rejected
///
/// Both variants surface to the original caller immediately; nothing is
/// queued.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Quota(#[from] QuotaError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// The work a job was submitted with, kept until execution
#[derive(Debug, Clone)]
enum WorkSpec {
    Single {
        url: Url,
        settings: ScrapeSettings,
    },
    Bulk {
        urls: Vec<Url>,
        settings: ScrapeSettings,
    },
    Crawl {
        start_url: Url,
        settings: ScrapeSettings,
    },
}

/// Orchestrates submissions, quota, jobs, and progress for one process
pub struct ScrapeService {
    limiter: RateLimiter,
    registry: Arc<JobRegistry>,
    bus: Arc<ProgressBus>,
    lifecycle: JobLifecycle,
    fetcher: Arc<dyn PageFetcher>,
    defaults: ScrapeSettings,
    work: Mutex<HashMap<String, WorkSpec>>,
}

impl ScrapeService {
    /// Builds the service from configuration and a fetch engine
    pub fn new(config: &Config, fetcher: Arc<dyn PageFetcher>) -> Self {
        let registry = Arc::new(JobRegistry::new());
        let bus = Arc::new(ProgressBus::new());
        let retry = RetryPolicy::new(
            config.service.max_retries,
            Duration::from_millis(config.service.retry_base_delay_ms),
        );

        Self {
            limiter: RateLimiter::new(
                Arc::new(InMemoryWindowStore::new()),
                config.policy_table(),
            ),
            lifecycle: JobLifecycle::new(Arc::clone(&registry), Arc::clone(&bus), retry),
            registry,
            bus,
            fetcher,
            defaults: config.scraper.clone(),
            work: Mutex::new(HashMap::new()),
        }
    }

    /// Submits a single-URL scrape; charges 1 unit of `scrape`
    pub async fn submit_single(
        &self,
        subject: &Subject,
        url: &str,
        settings: Option<ScrapeSettings>,
        job_id: Option<String>,
    ) -> Result<JobId, SubmitError> {
        let settings = self.effective_settings(settings)?;
        let url = parse_submission_url(url)?;

        self.limiter
            .check_and_consume(subject, OperationKind::Scrape, 1)
            .await?;

        let id = self.create_job(
            subject,
            JobKind::Single,
            1,
            job_id,
            WorkSpec::Single { url, settings },
        );
        Ok(id)
    }

    /// Submits a bulk scrape; charges the whole batch against `bulk_scrape`
    /// atomically
    pub async fn submit_bulk(
        &self,
        subject: &Subject,
        urls: &[String],
        settings: Option<ScrapeSettings>,
        job_id: Option<String>,
    ) -> Result<JobId, SubmitError> {
        let settings = self.effective_settings(settings)?;
        config::validate_bulk_size(urls.len())?;

        let mut parsed = Vec::with_capacity(urls.len());
        for url in urls {
            parsed.push(parse_submission_url(url)?);
        }

        self.limiter
            .check_and_consume(subject, OperationKind::BulkScrape, parsed.len() as u32)
            .await?;

        let total = parsed.len() as u32;
        let id = self.create_job(
            subject,
            JobKind::Bulk,
            total,
            job_id,
            WorkSpec::Bulk {
                urls: parsed,
                settings,
            },
        );
        Ok(id)
    }

    /// Submits a site crawl; charges the page budget against
    /// `website_crawl` up front
    pub async fn submit_crawl(
        &self,
        subject: &Subject,
        start_url: &str,
        settings: Option<ScrapeSettings>,
        job_id: Option<String>,
    ) -> Result<JobId, SubmitError> {
        let settings = self.effective_settings(settings)?;
        let start_url = parse_submission_url(start_url)?;

        self.limiter
            .check_and_consume(subject, OperationKind::WebsiteCrawl, settings.page_budget)
            .await?;

        let total = settings.page_budget;
        let id = self.create_job(
            subject,
            JobKind::SiteCrawl,
            total,
            job_id,
            WorkSpec::Crawl {
                start_url,
                settings,
            },
        );
        Ok(id)
    }

    /// Worker-side execution entry; dispatched by the external job queue
    pub async fn run(&self, id: &JobId) -> crate::Result<JobReport> {
        let spec = {
            let work = self.work.lock().unwrap();
            work.get(id.as_str())
                .cloned()
                .ok_or_else(|| JobError::NotFound(id.to_string()))?
        };

        let reporter = ProgressReporter::new(Arc::clone(&self.bus), id.as_str());
        let cancel = self.registry.cancel_token(id)?;

        let result: crate::Result<JobReport> = match spec {
            WorkSpec::Single { url, settings } => {
                let fetcher = Arc::clone(&self.fetcher);
                self.lifecycle
                    .execute(id, move |_attempt| {
                        single_scrape(
                            Arc::clone(&fetcher),
                            url.clone(),
                            settings.clone(),
                            reporter.clone(),
                            cancel.clone(),
                        )
                    })
                    .await
                    .map_err(Into::into)
            }

            WorkSpec::Bulk { urls, settings } => {
                let fetcher = Arc::clone(&self.fetcher);
                self.lifecycle
                    .execute(id, move |_attempt| {
                        let dispatcher =
                            ConcurrentDispatcher::new(Arc::clone(&fetcher), settings.clone());
                        let urls = urls.clone();
                        let reporter = reporter.clone();
                        let cancel = cancel.clone();
                        async move {
                            let outcome = dispatcher.dispatch(&urls, &reporter, &cancel).await?;
                            Ok(JobReport {
                                pages_done: outcome.successful + outcome.failed,
                                pages_total: outcome.results.len() as u32,
                                results: outcome.results,
                                errors: outcome.errors,
                            })
                        }
                    })
                    .await
                    .map_err(Into::into)
            }

            WorkSpec::Crawl {
                start_url,
                settings,
            } => {
                let fetcher = Arc::clone(&self.fetcher);
                self.lifecycle
                    .execute(id, move |_attempt| {
                        let controller =
                            CrawlController::new(Arc::clone(&fetcher), settings.clone());
                        let start_url = start_url.clone();
                        let reporter = reporter.clone();
                        let cancel = cancel.clone();
                        async move {
                            let outcome = controller.crawl(&start_url, &reporter, &cancel).await?;
                            Ok(JobReport {
                                pages_done: outcome.pages_done,
                                pages_total: outcome.page_budget,
                                results: outcome.pages,
                                errors: outcome.errors,
                            })
                        }
                    })
                    .await
                    .map_err(Into::into)
            }
        };

        // The payload is only needed until the job goes terminal.
        let terminal = self
            .registry
            .status(id)
            .map(|status| status.state.is_terminal())
            .unwrap_or(false);
        if terminal {
            self.work.lock().unwrap().remove(id.as_str());
        }

        result
    }

    /// Answers the external status query
    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.registry.status(id)
    }

    /// Requests cooperative cancellation
    pub fn cancel(&self, id: &JobId) -> Result<(), JobError> {
        self.registry.cancel(id)
    }

    /// Joins a job's progress stream
    ///
    /// Joining after completion yields no events; this is not a replay log.
    pub fn subscribe(&self, id: &JobId) -> Subscription {
        self.bus.subscribe(id.as_str())
    }

    /// Subject-wide notification stream
    pub fn subscribe_subject(&self, subject_id: &str) -> Subscription {
        self.bus.subscribe_subject(subject_id)
    }

    /// Pushes a notification to every session watching a subject
    pub fn notify_subject(&self, subject_id: &str, event: ProgressEvent) {
        self.bus.broadcast_to_subject(subject_id, event);
    }

    /// Read-only quota status for one operation
    pub async fn quota_status(
        &self,
        subject: &Subject,
        operation: OperationKind,
    ) -> RateLimitStatus {
        self.limiter.status(subject, operation).await
    }

    /// Administrative quota reset
    pub async fn reset_quota(&self, subject_id: &str, operation: Option<OperationKind>) {
        self.limiter.reset(subject_id, operation).await;
    }

    /// The bus, for wiring external delivery (websockets, SSE)
    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    fn effective_settings(
        &self,
        settings: Option<ScrapeSettings>,
    ) -> Result<ScrapeSettings, ConfigError> {
        let settings = settings.unwrap_or_else(|| self.defaults.clone());
        config::validate_settings(&settings)?;
        Ok(settings)
    }

    fn create_job(
        &self,
        subject: &Subject,
        kind: JobKind,
        pages_total: u32,
        job_id: Option<String>,
        spec: WorkSpec,
    ) -> JobId {
        let id = match job_id {
            Some(external) => JobId::from_string(external),
            None => JobId::generate(),
        };

        tracing::info!(
            job_id = %id,
            subject = %subject.id,
            %kind,
            pages_total,
            "job accepted"
        );

        self.registry
            .insert(Job::new(id.clone(), subject.id.clone(), kind, pages_total));
        self.work
            .lock()
            .unwrap()
            .insert(id.to_string(), spec);
        id
    }
}

/// Parses and normalizes a submitted URL, rejecting anything malformed
fn parse_submission_url(raw: &str) -> Result<Url, ConfigError> {
    normalize_url(raw).map_err(|e| ConfigError::InvalidUrl(format!("'{}': {}", raw, e)))
}

/// The single-URL job body
async fn single_scrape(
    fetcher: Arc<dyn PageFetcher>,
    url: Url,
    settings: ScrapeSettings,
    reporter: ProgressReporter,
    cancel: CancelToken,
) -> crate::Result<JobReport> {
    if cancel.is_cancelled() {
        return Err(JobError::Cancelled {
            id: reporter.job_id().to_string(),
        }
        .into());
    }

    reporter.publish(
        ProgressEvent::progress(
            reporter.job_id(),
            0,
            1,
            format!("Starting to scrape {}", url),
        )
        .with_current_url(url.as_str()),
    );

    match fetcher.fetch(&url, &settings).await {
        Ok(snapshot) => Ok(JobReport {
            pages_done: 1,
            pages_total: 1,
            results: vec![ScrapeResult::ok(&snapshot)],
            errors: vec![],
        }),
        Err(FetchError::Page { url: failed, message }) => Ok(JobReport {
            pages_done: 1,
            pages_total: 1,
            results: vec![ScrapeResult::failed(failed.clone(), message.clone())],
            errors: vec![PageError::new(failed, message)],
        }),
        Err(engine @ FetchError::Engine(_)) => Err(engine.into()),
    }
}
