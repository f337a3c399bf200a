//! Duplicate-detection reporting.
//!
//! Aggregates per-merchant record shapes into a [`DuplicateReport`]:
//! request totals, duplicate rate, keys with suspiciously many attempts,
//! and the hypothetical monetary exposure from duplicates. The reporter
//! never mutates state.

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::record::RecordStatus;
use crate::store::{RecordStore, StoreError};

/// Attempts above this count flag a key as suspicious by default.
pub const DEFAULT_SUSPICIOUS_ATTEMPT_THRESHOLD: u32 = 3;

/// Errors surfaced by the reporter. Read-only, so everything is a
/// transient read failure or a cancellation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReportError {
    /// The store failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,
}

/// The window a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Inclusive start.
    pub from: DateTime<Utc>,
    /// Inclusive end.
    pub to: DateTime<Utc>,
}

/// A key with an abnormally high attempt count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousKey {
    /// The idempotency key.
    pub idempotency_key: String,
    /// How many times the key was seen.
    pub attempt_count: u32,
    /// Payment amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Current record status.
    pub status: RecordStatus,
    /// When the key was first seen.
    pub first_seen_at: DateTime<Utc>,
    /// When the key was last seen.
    pub last_seen_at: DateTime<Utc>,
}

/// Aggregate duplicate activity for one merchant over a time range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateReport {
    /// The merchant the report covers.
    pub merchant_id: String,
    /// Sum of attempt counts over in-range records.
    pub total_requests: u64,
    /// Number of distinct in-range keys.
    pub unique_payments: u64,
    /// `total_requests - unique_payments`.
    pub duplicate_count: u64,
    /// Duplicates as a percentage of total requests; zero when there was
    /// no traffic.
    pub duplicate_rate: f64,
    /// In-range keys whose attempt count exceeds the suspicion threshold.
    pub suspicious_keys: Vec<SuspiciousKey>,
    /// The window the report covers.
    pub time_range: TimeRange,
    /// Hypothetical exposure: `amount * (attempt_count - 1)` summed over
    /// duplicate records.
    pub amount_at_risk: i64,
    /// Amount at risk broken down by currency.
    pub currency_breakdown: BTreeMap<String, i64>,
}

/// Builds duplicate reports from the record store.
pub struct DuplicateReporter<S> {
    store: Arc<S>,
    suspicious_threshold: u32,
}

impl<S: RecordStore> DuplicateReporter<S> {
    /// Creates a reporter with the given suspicion threshold (attempts
    /// strictly above it flag a key).
    pub fn new(store: Arc<S>, suspicious_threshold: u32) -> Self {
        Self {
            store,
            suspicious_threshold,
        }
    }

    /// Builds the duplicate report for a merchant over `[from, to]`.
    pub async fn report(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<DuplicateReport, ReportError> {
        if cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        let duplicates = self.store.duplicates_in_range(merchant_id, from, to).await?;
        if cancel.is_cancelled() {
            return Err(ReportError::Cancelled);
        }
        let stats = self.store.merchant_stats(merchant_id, from, to).await?;

        let duplicate_count = stats.total_requests.saturating_sub(stats.unique_payments);
        let duplicate_rate = if stats.total_requests > 0 {
            duplicate_count as f64 / stats.total_requests as f64 * 100.0
        } else {
            0.0
        };

        let mut suspicious_keys = Vec::new();
        let mut amount_at_risk: i64 = 0;
        let mut currency_breakdown: BTreeMap<String, i64> = BTreeMap::new();

        for record in &duplicates {
            if record.attempt_count > self.suspicious_threshold {
                suspicious_keys.push(SuspiciousKey {
                    idempotency_key: record.key.clone(),
                    attempt_count: record.attempt_count,
                    amount: record.amount,
                    currency: record.currency.clone(),
                    status: record.status,
                    first_seen_at: record.first_seen_at,
                    last_seen_at: record.last_seen_at,
                });
            }

            // Each extra attempt could have been a double charge.
            let extra_attempts = i64::from(record.attempt_count.saturating_sub(1));
            let at_risk = record.amount * extra_attempts;
            amount_at_risk += at_risk;
            *currency_breakdown.entry(record.currency.clone()).or_default() += at_risk;
        }

        Ok(DuplicateReport {
            merchant_id: merchant_id.to_string(),
            total_requests: stats.total_requests,
            unique_payments: stats.unique_payments,
            duplicate_count,
            duplicate_rate,
            suspicious_keys,
            time_range: TimeRange { from, to },
            amount_at_risk,
            currency_breakdown,
        })
    }
}
