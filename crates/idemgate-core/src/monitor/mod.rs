//! Sliding-window anomaly monitoring over the decision stream.
//!
//! The monitor keeps cumulative counters plus a bounded window of recent
//! outcomes, each classified as duplicate-ish (rejections and replays) or
//! new-ish (acceptances). The window is pruned on every insert and the
//! snapshot path re-filters, so both sides agree on the rate regardless of
//! when entries age out. Writers serialize on an internal lock, giving
//! readers a single linear order of events; snapshots are point-in-time
//! copies.


use std::collections::VecDeque;
use std::sync::RwLock;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::{Acceptance, Decision, Rejection};

/// Default sliding-window length in minutes.
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

/// Default duplicate-rate percentage above which traffic is anomalous.
pub const DEFAULT_ANOMALY_THRESHOLD_PERCENT: f64 = 20.0;

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    /// All decisions observed since startup.
    pub total_requests: u64,
    /// Accepted-as-new decisions (including expired reuse).
    pub new_payments: u64,
    /// In-flight duplicates blocked.
    pub duplicate_blocked: u64,
    /// Retries accepted after a failure.
    pub retry_allowed: u64,
    /// Cached responses replayed.
    pub cached_responses: u64,
    /// Parameter mismatches rejected.
    pub param_mismatches: u64,
    /// Decisions inside the sliding window.
    pub window_requests: u64,
    /// Duplicate-ish decisions inside the sliding window.
    pub window_duplicates: u64,
    /// Window duplicate rate as a percentage; zero with no traffic.
    pub window_duplicate_rate: f64,
    /// Whether the window rate strictly exceeds the threshold.
    pub anomaly_detected: bool,
    /// The configured threshold percentage.
    pub anomaly_threshold: f64,
}

#[derive(Debug, Clone, Copy)]
struct WindowEntry {
    at: DateTime<Utc>,
    duplicate: bool,
}

#[derive(Debug, Default)]
struct Inner {
    total_requests: u64,
    new_payments: u64,
    duplicate_blocked: u64,
    retry_allowed: u64,
    cached_responses: u64,
    param_mismatches: u64,
    window: VecDeque<WindowEntry>,
}

/// Observes decision outcomes and tracks the recent duplicate rate.
#[derive(Debug)]
pub struct DecisionMonitor {
    window: TimeDelta,
    threshold: f64,
    inner: RwLock<Inner>,
}

impl Default for DecisionMonitor {
    fn default() -> Self {
        Self::new(
            TimeDelta::minutes(DEFAULT_WINDOW_MINUTES),
            DEFAULT_ANOMALY_THRESHOLD_PERCENT,
        )
    }
}

impl DecisionMonitor {
    /// Creates a monitor with the given window length and anomaly
    /// threshold percentage.
    #[must_use]
    pub fn new(window: TimeDelta, threshold: f64) -> Self {
        Self {
            window,
            threshold,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Records one decision outcome.
    pub fn record(&self, decision: Decision) {
        let now = Utc::now();
        let Ok(mut inner) = self.inner.write() else {
            // A poisoned monitor only loses observability, never
            // correctness of the decision protocol.
            return;
        };
        inner.total_requests += 1;
        match decision {
            Decision::Accepted(Acceptance::New | Acceptance::ExpiredReused) => {
                inner.new_payments += 1;
            }
            Decision::Accepted(Acceptance::Retry) => inner.retry_allowed += 1,
            Decision::Rejected(Rejection::InProgress) => inner.duplicate_blocked += 1,
            Decision::Rejected(Rejection::Mismatch) => inner.param_mismatches += 1,
            Decision::Replay => inner.cached_responses += 1,
        }
        inner.window.push_back(WindowEntry {
            at: now,
            duplicate: decision.is_duplicate(),
        });
        let cutoff = now - self.window;
        while inner.window.front().is_some_and(|e| e.at < cutoff) {
            inner.window.pop_front();
        }
    }

    /// Returns a point-in-time copy of all counters and the window rate.
    #[must_use]
    pub fn snapshot(&self) -> MonitorSnapshot {
        let Ok(inner) = self.inner.read() else {
            return MonitorSnapshot {
                total_requests: 0,
                new_payments: 0,
                duplicate_blocked: 0,
                retry_allowed: 0,
                cached_responses: 0,
                param_mismatches: 0,
                window_requests: 0,
                window_duplicates: 0,
                window_duplicate_rate: 0.0,
                anomaly_detected: false,
                anomaly_threshold: self.threshold,
            };
        };
        let cutoff = Utc::now() - self.window;
        let mut window_requests = 0u64;
        let mut window_duplicates = 0u64;
        for entry in &inner.window {
            if entry.at >= cutoff {
                window_requests += 1;
                if entry.duplicate {
                    window_duplicates += 1;
                }
            }
        }
        let window_duplicate_rate = if window_requests > 0 {
            window_duplicates as f64 / window_requests as f64 * 100.0
        } else {
            0.0
        };
        MonitorSnapshot {
            total_requests: inner.total_requests,
            new_payments: inner.new_payments,
            duplicate_blocked: inner.duplicate_blocked,
            retry_allowed: inner.retry_allowed,
            cached_responses: inner.cached_responses,
            param_mismatches: inner.param_mismatches,
            window_requests,
            window_duplicates,
            window_duplicate_rate,
            anomaly_detected: window_duplicate_rate > self.threshold,
            anomaly_threshold: self.threshold,
        }
    }
}
