//! Domain model for idempotency records and the requests that act on them.
//!
//! One [`IdempotencyRecord`] exists per idempotency key. Records are created
//! by the first accepted decision on a key and mutated only by the decision
//! engine (under the per-key lock), the completion recorder, and the
//! retention sweeper.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle status of the payment referenced by an idempotency record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The payment is in flight; no completion has been recorded yet.
    Processing,
    /// The payment completed successfully; a cached response may be stored.
    Succeeded,
    /// The payment failed; a matching retry may reset it to `Processing`.
    Failed,
}

impl RecordStatus {
    /// Canonical string form, as persisted and as rendered on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    /// Parses the canonical string form; returns `None` for anything else.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "processing" => Some(Self::Processing),
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether this status is terminal (no further completion is allowed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target status for a completion request.
///
/// Completion may only move a record out of `processing`, so the target is
/// narrower than [`RecordStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    /// The payment succeeded downstream.
    Succeeded,
    /// The payment failed downstream.
    Failed,
}

impl CompletionStatus {
    /// Parses the wire form (`"succeeded"` or `"failed"`).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "succeeded" => Some(Self::Succeeded),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// The record status this completion transitions into.
    #[must_use]
    pub const fn as_record_status(self) -> RecordStatus {
        match self {
            Self::Succeeded => RecordStatus::Succeeded,
            Self::Failed => RecordStatus::Failed,
        }
    }
}

/// An incoming payment submission carrying a client-chosen idempotency key.
///
/// Fields default when absent on the wire so that missing values surface
/// as validation errors rather than deserialization failures.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentRequest {
    /// Client-supplied opaque key identifying the payment intent.
    pub idempotency_key: String,
    /// Merchant the payment is scoped to.
    pub merchant_id: String,
    /// Customer the payment is scoped to.
    pub customer_id: String,
    /// Amount in minor units. Never floating point.
    pub amount: i64,
    /// Currency code; opaque to the gateway.
    pub currency: String,
}

impl PaymentRequest {
    /// Validates the request fields.
    ///
    /// All string fields must be non-empty and `amount` must be
    /// non-negative.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        if self.idempotency_key.is_empty() {
            return Err(RequestValidationError::MissingKey);
        }
        if self.merchant_id.is_empty() {
            return Err(RequestValidationError::MissingMerchant);
        }
        if self.customer_id.is_empty() {
            return Err(RequestValidationError::MissingCustomer);
        }
        if self.amount < 0 {
            return Err(RequestValidationError::NegativeAmount {
                amount: self.amount,
            });
        }
        if self.currency.is_empty() {
            return Err(RequestValidationError::MissingCurrency);
        }
        Ok(())
    }
}

/// Validation failure on an incoming [`PaymentRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RequestValidationError {
    /// The idempotency key was empty.
    #[error("idempotency_key is required")]
    MissingKey,

    /// The merchant id was empty.
    #[error("merchant_id is required")]
    MissingMerchant,

    /// The customer id was empty.
    #[error("customer_id is required")]
    MissingCustomer,

    /// The currency code was empty.
    #[error("currency is required")]
    MissingCurrency,

    /// The amount was negative.
    #[error("amount must be non-negative, got {amount}")]
    NegativeAmount {
        /// The rejected amount.
        amount: i64,
    },
}

/// Request body for finalizing a payment.
///
/// `status` is carried as a raw string so that unknown values surface as an
/// invalid-status error rather than a deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteRequest {
    /// Requested terminal status: `"succeeded"` or `"failed"`.
    #[serde(default)]
    pub status: String,
    /// Optional opaque response payload, cached for replay when the status
    /// is `succeeded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
}

/// A stored idempotency record, one per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The idempotency key; globally unique.
    pub key: String,
    /// Merchant scope.
    pub merchant_id: String,
    /// Customer scope.
    pub customer_id: String,
    /// Amount in minor units.
    pub amount: i64,
    /// Currency code.
    pub currency: String,
    /// Current payment status.
    pub status: RecordStatus,
    /// Digest of the original request parameters. Set once at first insert
    /// and never rewritten, even across accepted retries.
    pub request_fingerprint: String,
    /// System-assigned payment identifier; replaced on accepted retry.
    pub payment_id: String,
    /// Cached response payload; present only for succeeded payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
    /// How many times this key has been seen. Monotonically non-decreasing.
    pub attempt_count: u32,
    /// When the key was first seen. Preserved across accepted retries.
    pub first_seen_at: DateTime<Utc>,
    /// When the key was last seen.
    pub last_seen_at: DateTime<Utc>,
    /// When the record left `processing`, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Retention boundary; the sweeper reclaims the record after this.
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyRecord {
    /// Whether the record's retention window had passed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PaymentRequest {
        PaymentRequest {
            idempotency_key: "key-1".to_string(),
            merchant_id: "m1".to_string(),
            customer_id: "c1".to_string(),
            amount: 5000,
            currency: "BRL".to_string(),
        }
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn test_empty_fields_rejected() {
        let mut req = request();
        req.idempotency_key = String::new();
        assert_eq!(req.validate(), Err(RequestValidationError::MissingKey));

        let mut req = request();
        req.merchant_id = String::new();
        assert_eq!(req.validate(), Err(RequestValidationError::MissingMerchant));

        let mut req = request();
        req.customer_id = String::new();
        assert_eq!(req.validate(), Err(RequestValidationError::MissingCustomer));

        let mut req = request();
        req.currency = String::new();
        assert_eq!(req.validate(), Err(RequestValidationError::MissingCurrency));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut req = request();
        req.amount = -1;
        assert_eq!(
            req.validate(),
            Err(RequestValidationError::NegativeAmount { amount: -1 })
        );
    }

    #[test]
    fn test_zero_amount_allowed() {
        let mut req = request();
        req.amount = 0;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            RecordStatus::Processing,
            RecordStatus::Succeeded,
            RecordStatus::Failed,
        ] {
            assert_eq!(RecordStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(RecordStatus::parse("refunded"), None);
    }

    #[test]
    fn test_completion_status_parse() {
        assert_eq!(
            CompletionStatus::parse("succeeded"),
            Some(CompletionStatus::Succeeded)
        );
        assert_eq!(
            CompletionStatus::parse("failed"),
            Some(CompletionStatus::Failed)
        );
        assert_eq!(CompletionStatus::parse("processing"), None);
        assert_eq!(CompletionStatus::parse(""), None);
    }
}
