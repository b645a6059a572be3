//! The page-fetch capability seam
//!
//! The orchestration core never talks to the network itself. Everything it
//! needs from a page goes through [`PageFetcher`]: one logical operation
//! that, given a URL and settings, returns a [`PageSnapshot`] or fails. The
//! bundled [`HttpFetcher`] is a plain-HTTP reference engine; a headless
//! browser engine would implement the same trait.

mod engine;

pub use engine::HttpFetcher;

use crate::config::ScrapeSettings;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Fetch errors, split by blast radius
///
/// `Page` is a single-URL failure: recorded in the job's error list while
/// the batch or crawl continues. `Engine` means the fetch engine itself is
/// unhealthy; it fails the whole unit of work and drives the retry path.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("fetch failed for {url}: {message}")]
    Page { url: String, message: String },

    #[error("fetch engine failure: {0}")]
    Engine(String),
}

impl FetchError {
    pub fn page(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Page {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine(_))
    }
}

/// Everything the engine hands back for one fetched page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    /// The URL as requested
    pub url: String,

    /// Final URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status_code: u16,

    /// Page title, when one was found
    pub title: Option<String>,

    /// Meta description, when one was found
    pub description: Option<String>,

    /// Raw hrefs discovered on the page (unresolved, unfiltered)
    pub links: Vec<String>,

    /// Structured fields the engine extracted
    pub extracted: serde_json::Value,

    /// Size of the raw body in bytes
    pub html_bytes: usize,

    /// Wall-clock time the fetch took
    pub fetched_in: Duration,
}

/// Per-URL outcome inside a bulk or crawl job
///
/// A failed fetch becomes a `success: false` entry; it never aborts the
/// batch it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct ScrapeResult {
    pub url: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScrapeResult {
    pub fn ok(snapshot: &PageSnapshot) -> Self {
        Self {
            url: snapshot.url.clone(),
            success: true,
            title: snapshot.title.clone(),
            error: None,
        }
    }

    pub fn failed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            title: None,
            error: Some(message.into()),
        }
    }
}

/// The external page-fetch collaborator
///
/// Implementations must honor `settings.page_timeout_ms`; the core awaits
/// the call as one logical operation and applies no timeout of its own.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, settings: &ScrapeSettings)
        -> Result<PageSnapshot, FetchError>;
}
