//! Tier-based rate limiting
//!
//! Every quota-consuming operation passes through [`RateLimiter`] before any
//! work starts. The limiter maps a subject's tier and the operation kind to
//! a [`QuotaPolicy`], then runs an atomic sliding-window check against the
//! injected [`WindowStore`]. Rejections carry everything the caller needs to
//! back off: tier, limit, window, and a positive retry-after.

mod policy;
mod window;

pub use policy::{OperationKind, PolicyTable, QuotaPolicy, Subject, Tier};
pub use window::{
    InMemoryWindowStore, RateWindow, WindowDecision, WindowKey, WindowSnapshot, WindowStore,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Rate limiting errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error(
        "Rate limit exceeded for tier {tier}: {limit} per {window_seconds}s, retry in {retry_after_seconds}s"
    )]
    Exceeded {
        tier: Tier,
        limit: u32,
        window_seconds: u64,
        retry_after_seconds: u64,
    },
}

/// Read-only rate-limit status for one (subject, operation) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub tier: Tier,
    pub operation: OperationKind,
    /// None when the operation is not rate-limited for this tier
    pub limit: Option<u32>,
    pub remaining: u32,
    pub window_seconds: u64,
    pub reset_in_seconds: u64,
}

impl RateLimitStatus {
    /// True when the operation has no policy entry for this tier
    pub fn unlimited(&self) -> bool {
        self.limit.is_none()
    }
}

/// Gates quota-consuming operations per subject and operation kind
///
/// Stateless beyond its policy table; all mutable window state lives behind
/// the [`WindowStore`] capability so a deployment can swap the in-memory map
/// for a shared store without touching the algorithm.
pub struct RateLimiter {
    store: Arc<dyn WindowStore>,
    policies: PolicyTable,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn WindowStore>, policies: PolicyTable) -> Self {
        Self { store, policies }
    }

    /// Builds a limiter with the stock policy table and an in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryWindowStore::new()), PolicyTable::default())
    }

    /// Checks the subject's window and consumes `count` units, atomically
    ///
    /// A weighted request (bulk of N) is granted whole or rejected whole; a
    /// rejection never partially consumes quota. Operations without a policy
    /// entry for the subject's tier are always permitted.
    pub async fn check_and_consume(
        &self,
        subject: &Subject,
        operation: OperationKind,
        count: u32,
    ) -> Result<(), QuotaError> {
        self.check_and_consume_at(subject, operation, count, Utc::now())
            .await
    }

    /// [`check_and_consume`](Self::check_and_consume) with an explicit clock,
    /// for tests and replays
    pub async fn check_and_consume_at(
        &self,
        subject: &Subject,
        operation: OperationKind,
        count: u32,
        now: DateTime<Utc>,
    ) -> Result<(), QuotaError> {
        let policy = match self.policies.lookup(subject.tier, operation) {
            Some(p) => p,
            None => {
                // Unknown operations are not rate-limited.
                tracing::debug!(
                    subject = %subject.id,
                    operation = %operation,
                    "no quota policy, permitting"
                );
                return Ok(());
            }
        };

        let key = WindowKey::new(subject.id.clone(), operation);
        match self.store.check_and_consume(&key, policy, count, now).await {
            WindowDecision::Granted => Ok(()),
            WindowDecision::Denied {
                retry_after_seconds,
            } => {
                tracing::info!(
                    subject = %subject.id,
                    operation = %operation,
                    tier = %subject.tier,
                    limit = policy.max_requests,
                    retry_after_seconds,
                    "quota exceeded"
                );
                Err(QuotaError::Exceeded {
                    tier: subject.tier,
                    limit: policy.max_requests,
                    window_seconds: policy.window_seconds,
                    retry_after_seconds,
                })
            }
        }
    }

    /// Reports the current window state without consuming anything
    pub async fn status(&self, subject: &Subject, operation: OperationKind) -> RateLimitStatus {
        self.status_at(subject, operation, Utc::now()).await
    }

    /// [`status`](Self::status) with an explicit clock
    pub async fn status_at(
        &self,
        subject: &Subject,
        operation: OperationKind,
        now: DateTime<Utc>,
    ) -> RateLimitStatus {
        let policy = match self.policies.lookup(subject.tier, operation) {
            Some(p) => p,
            None => {
                return RateLimitStatus {
                    tier: subject.tier,
                    operation,
                    limit: None,
                    remaining: u32::MAX,
                    window_seconds: 0,
                    reset_in_seconds: 0,
                }
            }
        };

        let key = WindowKey::new(subject.id.clone(), operation);
        let snap = self.store.snapshot(&key, policy, now).await;

        RateLimitStatus {
            tier: subject.tier,
            operation,
            limit: Some(policy.max_requests),
            remaining: policy.max_requests.saturating_sub(snap.used),
            window_seconds: policy.window_seconds,
            reset_in_seconds: snap.reset_in_seconds,
        }
    }

    /// Administrative reset of one or all of a subject's windows
    pub async fn reset(&self, subject_id: &str, operation: Option<OperationKind>) {
        tracing::info!(subject = subject_id, ?operation, "resetting rate windows");
        self.store.reset(subject_id, operation).await;
    }
}
