use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Subscription tier of a subject
///
/// Resolved by the external auth layer; the core only maps it to a quota
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Starter,
    Pro,
    Enterprise,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }

    /// Parses a tier name as it appears in configuration
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "free" => Some(Self::Free),
            "starter" => Some(Self::Starter),
            "pro" => Some(Self::Pro),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Quota-consuming operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Scrape,
    BulkScrape,
    LlmScrape,
    WebsiteCrawl,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scrape => "scrape",
            Self::BulkScrape => "bulk_scrape",
            Self::LlmScrape => "llm_scrape",
            Self::WebsiteCrawl => "website_crawl",
        }
    }

    /// Parses an operation name as it appears in configuration
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "scrape" => Some(Self::Scrape),
            "bulk_scrape" => Some(Self::BulkScrape),
            "llm_scrape" => Some(Self::LlmScrape),
            "website_crawl" => Some(Self::WebsiteCrawl),
            _ => None,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The caller/tenant on whose behalf work runs
///
/// The id is opaque; the tier comes with it from the auth layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub id: String,
    pub tier: Tier,
}

impl Subject {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }
}

/// Per-operation quota: at most `max_requests` units inside any trailing
/// `window_seconds` interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    #[serde(rename = "max-requests")]
    pub max_requests: u32,

    #[serde(rename = "window-seconds")]
    pub window_seconds: u64,
}

impl QuotaPolicy {
    pub fn new(max_requests: u32, window_seconds: u64) -> Self {
        Self {
            max_requests,
            window_seconds,
        }
    }
}

/// Immutable mapping of (tier, operation) to quota policy
///
/// An operation absent from a tier's table is not rate-limited at all
/// (fail-open). Enterprise carries an explicit effectively-unlimited policy
/// so the fail-open path stays reserved for genuinely unknown operations.
#[derive(Debug, Clone)]
pub struct PolicyTable {
    entries: HashMap<(Tier, OperationKind), QuotaPolicy>,
}

impl PolicyTable {
    const HOUR: u64 = 3_600;
    const DAY: u64 = 86_400;

    /// Builds an empty table (every operation permitted)
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Sets the policy for one (tier, operation) pair, replacing any
    /// previous entry
    pub fn set(&mut self, tier: Tier, operation: OperationKind, policy: QuotaPolicy) {
        self.entries.insert((tier, operation), policy);
    }

    /// Looks up the policy for a (tier, operation) pair
    pub fn lookup(&self, tier: Tier, operation: OperationKind) -> Option<QuotaPolicy> {
        self.entries.get(&(tier, operation)).copied()
    }
}

impl Default for PolicyTable {
    /// The stock quota table
    ///
    /// free: 10 scrapes/hour, 10 bulk units/hour, 2 LLM extractions/day,
    /// 10 crawl pages/day. starter: 100/hour, 100/hour, 10/day, 100/hour.
    /// pro: 500/hour, 500/hour, 50/day, 500/hour. enterprise: 99999/second
    /// across the board.
    fn default() -> Self {
        use OperationKind::*;
        use Tier::*;

        let mut table = Self::empty();

        table.set(Free, Scrape, QuotaPolicy::new(10, Self::HOUR));
        table.set(Free, BulkScrape, QuotaPolicy::new(10, Self::HOUR));
        table.set(Free, LlmScrape, QuotaPolicy::new(2, Self::DAY));
        table.set(Free, WebsiteCrawl, QuotaPolicy::new(10, Self::DAY));

        table.set(Starter, Scrape, QuotaPolicy::new(100, Self::HOUR));
        table.set(Starter, BulkScrape, QuotaPolicy::new(100, Self::HOUR));
        table.set(Starter, LlmScrape, QuotaPolicy::new(10, Self::DAY));
        table.set(Starter, WebsiteCrawl, QuotaPolicy::new(100, Self::HOUR));

        table.set(Pro, Scrape, QuotaPolicy::new(500, Self::HOUR));
        table.set(Pro, BulkScrape, QuotaPolicy::new(500, Self::HOUR));
        table.set(Pro, LlmScrape, QuotaPolicy::new(50, Self::DAY));
        table.set(Pro, WebsiteCrawl, QuotaPolicy::new(500, Self::HOUR));

        for op in [Scrape, BulkScrape, LlmScrape, WebsiteCrawl] {
            table.set(Enterprise, op, QuotaPolicy::new(99_999, 1));
        }

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_table_starter_scrape() {
        let table = PolicyTable::default();
        let policy = table.lookup(Tier::Starter, OperationKind::Scrape).unwrap();
        assert_eq!(policy.max_requests, 100);
        assert_eq!(policy.window_seconds, 3_600);
    }

    #[test]
    fn test_default_table_free_llm_daily() {
        let table = PolicyTable::default();
        let policy = table.lookup(Tier::Free, OperationKind::LlmScrape).unwrap();
        assert_eq!(policy.max_requests, 2);
        assert_eq!(policy.window_seconds, 86_400);
    }

    #[test]
    fn test_enterprise_is_effectively_unlimited() {
        let table = PolicyTable::default();
        for op in [
            OperationKind::Scrape,
            OperationKind::BulkScrape,
            OperationKind::LlmScrape,
            OperationKind::WebsiteCrawl,
        ] {
            let policy = table.lookup(Tier::Enterprise, op).unwrap();
            assert_eq!(policy.max_requests, 99_999);
            assert_eq!(policy.window_seconds, 1);
        }
    }

    #[test]
    fn test_empty_table_has_no_entries() {
        let table = PolicyTable::empty();
        assert!(table.lookup(Tier::Free, OperationKind::Scrape).is_none());
    }

    #[test]
    fn test_set_overrides() {
        let mut table = PolicyTable::default();
        table.set(
            Tier::Free,
            OperationKind::Scrape,
            QuotaPolicy::new(42, 60),
        );
        let policy = table.lookup(Tier::Free, OperationKind::Scrape).unwrap();
        assert_eq!(policy.max_requests, 42);
        assert_eq!(policy.window_seconds, 60);
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Tier::Starter.to_string(), "starter");
        assert_eq!(OperationKind::WebsiteCrawl.to_string(), "website_crawl");
    }
}
