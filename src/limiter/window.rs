//! Sliding-window state and the window-store capability
//!
//! A window is the ordered request timestamps for one (subject, operation)
//! pair. Entries older than the policy window are purged lazily on each
//! check, never eagerly. The store trait is the seam where a shared
//! (cross-process) implementation would plug in; the bundled implementation
//! is an in-memory map for a single process.

use crate::limiter::{OperationKind, QuotaPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key of one rate window
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub subject_id: String,
    pub operation: OperationKind,
}

impl WindowKey {
    pub fn new(subject_id: impl Into<String>, operation: OperationKind) -> Self {
        Self {
            subject_id: subject_id.into(),
            operation,
        }
    }
}

/// Ordered request timestamps for one window key
///
/// Invariant after [`purge`](Self::purge): every entry lies within
/// `(now - window_seconds, now]`. An entry exactly `window_seconds` old is
/// expired.
#[derive(Debug, Clone, Default)]
pub struct RateWindow {
    stamps: Vec<DateTime<Utc>>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self { stamps: Vec::new() }
    }

    /// Drops entries that have left the trailing window
    pub fn purge(&mut self, window_seconds: u64, now: DateTime<Utc>) {
        let cutoff = now - Duration::seconds(window_seconds as i64);
        self.stamps.retain(|ts| *ts > cutoff);
    }

    /// Number of surviving entries (call after [`purge`](Self::purge))
    pub fn count(&self) -> usize {
        self.stamps.len()
    }

    /// Oldest surviving entry, if any
    pub fn oldest(&self) -> Option<DateTime<Utc>> {
        self.stamps.iter().min().copied()
    }

    /// Appends `count` entries stamped `now`
    pub fn consume(&mut self, count: u32, now: DateTime<Utc>) {
        for _ in 0..count {
            self.stamps.push(now);
        }
    }

    /// Seconds until the oldest surviving entry expires, rounded up;
    /// the full window when nothing survives
    pub fn reset_in_seconds(&self, window_seconds: u64, now: DateTime<Utc>) -> u64 {
        match self.oldest() {
            Some(oldest) => {
                let expiry = oldest + Duration::seconds(window_seconds as i64);
                let remaining_ms = (expiry - now).num_milliseconds();
                if remaining_ms <= 0 {
                    0
                } else {
                    ((remaining_ms as u64) + 999) / 1_000
                }
            }
            None => window_seconds,
        }
    }
}

/// Outcome of an atomic check-and-consume against one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowDecision {
    /// All requested units were appended
    Granted,
    /// Nothing was consumed; retry after the given delay
    Denied { retry_after_seconds: u64 },
}

/// Read-only snapshot of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Surviving entries in the current window
    pub used: u32,
    /// Seconds until the oldest surviving entry expires; 0 when empty
    pub reset_in_seconds: u64,
}

/// Capability trait for the shared rate-window state
///
/// `check_and_consume` must be atomic per key: two concurrent callers for
/// the same (subject, operation) must never both be granted the last slot.
/// Every worker process in a deployment must share one store, otherwise each
/// process enforces its own quota and the effective limit multiplies.
#[async_trait]
pub trait WindowStore: Send + Sync {
    /// Atomically checks the window against `policy` and either appends
    /// `count` entries or leaves the window untouched
    async fn check_and_consume(
        &self,
        key: &WindowKey,
        policy: QuotaPolicy,
        count: u32,
        now: DateTime<Utc>,
    ) -> WindowDecision;

    /// Reads the window without mutating it
    async fn snapshot(
        &self,
        key: &WindowKey,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> WindowSnapshot;

    /// Clears one window, or every window of a subject
    async fn reset(&self, subject_id: &str, operation: Option<OperationKind>);
}

/// In-memory window store for a single process
///
/// Windows are created on first use and only removed by [`reset`]. The map
/// mutex makes check-then-append atomic across concurrent jobs in this
/// process.
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: Mutex<HashMap<WindowKey, RateWindow>>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WindowStore for InMemoryWindowStore {
    async fn check_and_consume(
        &self,
        key: &WindowKey,
        policy: QuotaPolicy,
        count: u32,
        now: DateTime<Utc>,
    ) -> WindowDecision {
        let mut windows = self.windows.lock().unwrap();
        let window = windows.entry(key.clone()).or_insert_with(RateWindow::new);

        window.purge(policy.window_seconds, now);

        let current = window.count() as u64;
        if current + count as u64 > policy.max_requests as u64 {
            // Nothing survives -> wait out a full window; otherwise wait for
            // the oldest survivor, never telling the caller "0 seconds".
            let retry_after = window.reset_in_seconds(policy.window_seconds, now).max(1);
            return WindowDecision::Denied {
                retry_after_seconds: retry_after,
            };
        }

        window.consume(count, now);
        WindowDecision::Granted
    }

    async fn snapshot(
        &self,
        key: &WindowKey,
        policy: QuotaPolicy,
        now: DateTime<Utc>,
    ) -> WindowSnapshot {
        let windows = self.windows.lock().unwrap();

        // Read-only: count survivors without rewriting the stored window.
        match windows.get(key) {
            Some(window) => {
                let mut copy = window.clone();
                copy.purge(policy.window_seconds, now);
                let reset_in = if copy.count() == 0 {
                    0
                } else {
                    copy.reset_in_seconds(policy.window_seconds, now)
                };
                WindowSnapshot {
                    used: copy.count() as u32,
                    reset_in_seconds: reset_in,
                }
            }
            None => WindowSnapshot {
                used: 0,
                reset_in_seconds: 0,
            },
        }
    }

    async fn reset(&self, subject_id: &str, operation: Option<OperationKind>) {
        let mut windows = self.windows.lock().unwrap();
        match operation {
            Some(op) => {
                windows.remove(&WindowKey::new(subject_id, op));
            }
            None => {
                windows.retain(|key, _| key.subject_id != subject_id);
            }
        }
    }
}
