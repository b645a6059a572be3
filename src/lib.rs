//! Kumo-Loom: a tiered scrape orchestrator
//!
//! This crate coordinates web scraping work on behalf of many subjects:
//! subscription-tier rate limiting, breadth-first site crawling under a page
//! budget, bounded-concurrency bulk fetching, a retryable job lifecycle, and
//! a publish/subscribe progress bus for observers.
//!
//! The actual page fetch is a capability seam ([`fetch::PageFetcher`]); a
//! reqwest-backed reference engine is bundled, and tests run against stubs.

pub mod config;
pub mod crawl;
pub mod dispatch;
pub mod fetch;
pub mod job;
pub mod limiter;
pub mod progress;
pub mod service;
pub mod url;

use thiserror::Error;

/// Main error type for Kumo-Loom operations
#[derive(Debug, Error)]
pub enum KumoError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Quota error: {0}")]
    Quota(#[from] limiter::QuotaError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] fetch::FetchError),

    #[error("Job error: {0}")]
    Job(#[from] job::JobError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for Kumo-Loom operations
pub type Result<T> = std::result::Result<T, KumoError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::{Config, ScrapeSettings};
pub use job::{Job, JobId, JobKind, JobState};
pub use limiter::{OperationKind, RateLimiter, Subject, Tier};
pub use progress::{ProgressBus, ProgressEvent, ProgressKind};
pub use service::ScrapeService;
pub use url::{extract_host, normalize_url, same_scope};
