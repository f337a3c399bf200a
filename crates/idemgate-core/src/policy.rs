//! Per-merchant idempotency policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::store::{RecordStore, StoreError};

/// Retention windows a merchant may choose from, in hours.
pub const VALID_RETENTION_HOURS: [u32; 3] = [24, 48, 72];

/// How strictly a merchant wants failed-payment retries to be treated.
///
/// Stored per merchant and carried through the policy API; the decision
/// protocol itself is discipline-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryDiscipline {
    /// No retries after a failure.
    StrictNoRetry,
    /// Default retry behavior.
    Standard,
    /// Generous retry behavior.
    Lenient,
}

impl RetryDiscipline {
    /// Canonical string form, as persisted and rendered on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StrictNoRetry => "strict_no_retry",
            Self::Standard => "standard",
            Self::Lenient => "lenient",
        }
    }

    /// Parses the canonical string form; returns `None` for anything else.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "strict_no_retry" => Some(Self::StrictNoRetry),
            "standard" => Some(Self::Standard),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

impl std::fmt::Display for RetryDiscipline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-merchant idempotency configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantPolicy {
    /// The merchant this policy belongs to.
    pub merchant_id: String,
    /// Retry discipline for failed payments.
    pub retry_discipline: RetryDiscipline,
    /// Retention window in hours; one of [`VALID_RETENTION_HOURS`].
    pub retention_hours: u32,
    /// When the policy was first created.
    pub created_at: DateTime<Utc>,
    /// When the policy was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Errors surfaced by policy operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// The retry discipline string is not a known value.
    #[error("retry_discipline must be strict_no_retry, standard, or lenient, got '{value}'")]
    InvalidDiscipline {
        /// The rejected value.
        value: String,
    },

    /// The retention window is not one of the allowed choices.
    #[error("retention_hours must be 24, 48, or 72, got {hours}")]
    InvalidRetention {
        /// The rejected value.
        hours: u32,
    },

    /// No policy exists for the merchant.
    #[error("no policy for merchant {merchant_id}")]
    NotFound {
        /// The merchant without a policy.
        merchant_id: String,
    },

    /// The store failed; the operation may be retried.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,
}

/// Validated access to merchant policies.
pub struct PolicyStore<S> {
    store: Arc<S>,
}

impl<S: RecordStore> PolicyStore<S> {
    /// Creates a policy store over the shared record store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fetches the merchant's policy.
    pub async fn get(
        &self,
        merchant_id: &str,
        cancel: &CancellationToken,
    ) -> Result<MerchantPolicy, PolicyError> {
        if cancel.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }
        self.store
            .policy(merchant_id)
            .await?
            .ok_or_else(|| PolicyError::NotFound {
                merchant_id: merchant_id.to_string(),
            })
    }

    /// Creates or updates the merchant's policy after validating the
    /// retention window. Returns the stored policy.
    pub async fn upsert(
        &self,
        merchant_id: &str,
        retry_discipline: RetryDiscipline,
        retention_hours: u32,
        cancel: &CancellationToken,
    ) -> Result<MerchantPolicy, PolicyError> {
        if !VALID_RETENTION_HOURS.contains(&retention_hours) {
            return Err(PolicyError::InvalidRetention {
                hours: retention_hours,
            });
        }
        if cancel.is_cancelled() {
            return Err(PolicyError::Cancelled);
        }
        let now = Utc::now();
        let policy = MerchantPolicy {
            merchant_id: merchant_id.to_string(),
            retry_discipline,
            retention_hours,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_policy(&policy).await?;
        info!(
            merchant_id,
            discipline = %retry_discipline,
            retention_hours,
            "merchant policy upserted"
        );
        // Re-read so the caller sees the preserved created_at on updates.
        self.store
            .policy(merchant_id)
            .await?
            .ok_or_else(|| PolicyError::NotFound {
                merchant_id: merchant_id.to_string(),
            })
    }
}
