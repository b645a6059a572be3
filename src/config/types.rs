use crate::limiter::{OperationKind, PolicyTable, QuotaPolicy, Tier};
use serde::Deserialize;
use std::collections::HashMap;

/// Main configuration structure for Kumo-Loom
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,

    #[serde(default)]
    pub scraper: ScrapeSettings,

    /// Per-tier quota overrides keyed by tier and operation name; anything
    /// not named here keeps the stock policy. Keys are validated by
    /// [`crate::config::validate`].
    #[serde(default)]
    pub quotas: HashMap<String, HashMap<String, QuotaPolicy>>,
}

impl Config {
    /// Builds the effective policy table: stock defaults with the TOML
    /// overrides applied on top
    ///
    /// Unknown tier or operation names are skipped here; loading through
    /// [`crate::config::load_config`] rejects them first.
    pub fn policy_table(&self) -> PolicyTable {
        let mut table = PolicyTable::default();
        for (tier_name, ops) in &self.quotas {
            let Some(tier) = Tier::parse(tier_name) else {
                continue;
            };
            for (op_name, policy) in ops {
                if let Some(op) = OperationKind::parse(op_name) {
                    table.set(tier, op, *policy);
                }
            }
        }
        table
    }
}

/// Job execution configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Retries allowed after the first attempt of a job
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base backoff; attempt n waits n times this long before re-running
    #[serde(rename = "retry-base-delay-ms", default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    60_000
}

/// Per-job scrape settings
///
/// These travel with a submission; the `[scraper]` config section supplies
/// the defaults a request does not override.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScrapeSettings {
    /// Ask the fetch engine to render JavaScript before extraction
    #[serde(rename = "js-rendering", default = "default_js_rendering")]
    pub js_rendering: bool,

    /// Per-page fetch timeout
    #[serde(rename = "page-timeout-ms", default = "default_page_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Concurrency ceiling for bulk fetches
    #[serde(rename = "max-concurrent", default = "default_max_concurrent")]
    pub max_concurrent: u32,

    /// Maximum pages one site crawl may fetch
    #[serde(rename = "page-budget", default = "default_page_budget")]
    pub page_budget: u32,

    /// Pause between requests of one job
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Follow discovered same-site links during a crawl
    #[serde(rename = "follow-links", default = "default_follow_links")]
    pub follow_links: bool,

    /// User agent the fetch engine should present
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        ScrapeMode::Standard.preset()
    }
}

fn default_js_rendering() -> bool {
    true
}

fn default_page_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent() -> u32 {
    3
}

fn default_page_budget() -> u32 {
    10
}

fn default_request_delay_ms() -> u64 {
    1_000
}

fn default_follow_links() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("kumo-loom/{}", env!("CARGO_PKG_VERSION"))
}

/// Preset scrape profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrapeMode {
    /// No JS rendering, short timeout, no pacing
    Fast,
    /// The stock profile
    Standard,
    /// JS rendering with generous timeout and pacing
    Thorough,
}

impl ScrapeMode {
    pub fn preset(&self) -> ScrapeSettings {
        let base = ScrapeSettings {
            js_rendering: default_js_rendering(),
            page_timeout_ms: default_page_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            page_budget: default_page_budget(),
            request_delay_ms: default_request_delay_ms(),
            follow_links: default_follow_links(),
            user_agent: default_user_agent(),
        };

        match self {
            Self::Standard => base,
            Self::Fast => ScrapeSettings {
                js_rendering: false,
                page_timeout_ms: 10_000,
                request_delay_ms: 0,
                ..base
            },
            Self::Thorough => ScrapeSettings {
                page_timeout_ms: 60_000,
                request_delay_ms: 2_000,
                ..base
            },
        }
    }
}
