//! Decision outcomes and the record view returned alongside them.

use serde::{Deserialize, Serialize};

use crate::record::RecordStatus;

/// Why a request was accepted for processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acceptance {
    /// First time this key was seen.
    New,
    /// A prior attempt failed and the parameters match.
    Retry,
    /// The key's retention window had passed; treated as new.
    ExpiredReused,
}

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The key's payment is still in flight with matching parameters.
    InProgress,
    /// The key was reused with different payment parameters.
    Mismatch,
}

/// The six-outcome classification of a payment submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The payment should proceed.
    Accepted(Acceptance),
    /// The payment must not proceed.
    Rejected(Rejection),
    /// The payment already succeeded; the cached response is returned.
    Replay,
}

impl Decision {
    /// Whether this outcome counts as duplicate traffic for the anomaly
    /// monitor. Accepted outcomes are new-ish; rejections and replays are
    /// duplicate-ish.
    #[must_use]
    pub const fn is_duplicate(self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Replay)
    }

    /// Stable label for logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accepted(Acceptance::New) => "accepted_new",
            Self::Accepted(Acceptance::Retry) => "accepted_retry",
            Self::Accepted(Acceptance::ExpiredReused) => "accepted_expired_reused",
            Self::Rejected(Rejection::InProgress) => "rejected_in_progress",
            Self::Rejected(Rejection::Mismatch) => "rejected_mismatch",
            Self::Replay => "replay",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing view of the record after a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordView {
    /// The authoritative payment id for accepted outcomes; the stored one
    /// otherwise.
    pub payment_id: String,
    /// The idempotency key.
    #[serde(rename = "idempotency_key")]
    pub key: String,
    /// Record status as of the decision.
    pub status: RecordStatus,
    /// Human-readable explanation of the outcome.
    pub message: String,
    /// Times the key has been seen, including this request.
    pub attempt_count: u32,
    /// Cached response payload; present only for replays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<serde_json::Value>,
}

/// A decision plus the record view it was made against.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutcome {
    /// The classification.
    pub decision: Decision,
    /// The record view to hand back to the caller.
    pub view: RecordView,
}
