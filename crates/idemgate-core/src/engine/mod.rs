//! The idempotency decision engine.
//!
//! [`DecisionEngine::process`] classifies every incoming payment request as
//! one of six outcomes and drives the matching store transition:
//!
//! ```text
//! new key                        -> Accepted(New)
//! expired key                    -> Accepted(ExpiredReused)  + reset
//! processing, fingerprint differs -> Rejected(Mismatch)
//! processing, fingerprint matches -> Rejected(InProgress)
//! succeeded                      -> Replay (cached payload)
//! failed, fingerprint differs     -> Rejected(Mismatch)
//! failed, fingerprint matches     -> Accepted(Retry)         + reset
//! ```
//!
//! The whole protocol runs while holding the store's per-key advisory
//! lock, so for any single key the outcomes form a total order equal to
//! lock-acquisition order, across every caller sharing the store.

mod error;
mod outcome;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub use error::EngineError;
pub use outcome::{Acceptance, Decision, ProcessOutcome, RecordView, Rejection};

use crate::fingerprint;
use crate::record::{PaymentRequest, RecordStatus};
use crate::store::RecordStore;

/// Classifies payment submissions against the durable record state.
pub struct DecisionEngine<S> {
    store: Arc<S>,
    default_retention: TimeDelta,
}

impl<S: RecordStore> DecisionEngine<S> {
    /// Creates an engine over the shared store with the given default
    /// retention window. Merchants with a stored policy override the
    /// default.
    pub fn new(store: Arc<S>, default_retention: TimeDelta) -> Self {
        Self {
            store,
            default_retention,
        }
    }

    /// Runs the idempotency decision protocol for one request.
    ///
    /// Linearizable per key: concurrent calls for the same key serialize
    /// on the store's advisory lock, so exactly one of N identical
    /// concurrent submissions is accepted as new. Cancellation is honored
    /// before store operations and while waiting for the lock; a call
    /// cancelled after the upsert has still durably counted the attempt.
    pub async fn process(
        &self,
        req: &PaymentRequest,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutcome, EngineError> {
        req.validate()?;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let fp = fingerprint::of_request(req);
        let payment_id = generate_payment_id();
        let retention = self.retention_for(&req.merchant_id).await;

        let _lock = tokio::select! {
            guard = self.store.lock_key(&req.idempotency_key) => guard?,
            () = cancel.cancelled() => return Err(EngineError::Cancelled),
        };
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let now = Utc::now();
        let expires_at = now + retention;
        let (record, was_new) = self
            .store
            .insert_or_bump(req, &fp, &payment_id, expires_at)
            .await?;

        if was_new {
            info!(
                key = %record.key,
                merchant_id = %record.merchant_id,
                payment_id = %record.payment_id,
                "payment accepted"
            );
            return Ok(ProcessOutcome {
                decision: Decision::Accepted(Acceptance::New),
                view: RecordView {
                    payment_id: record.payment_id,
                    key: record.key,
                    status: RecordStatus::Processing,
                    message: "payment accepted for processing".to_string(),
                    attempt_count: record.attempt_count,
                    response_body: None,
                },
            });
        }

        // Expiry wins over every other comparison: a reused key past its
        // retention window is a fresh payment even if the parameters match.
        if record.is_expired_at(now) {
            self.store
                .reset_to_processing(&record.key, &payment_id, expires_at)
                .await?;
            info!(
                key = %record.key,
                attempt_count = record.attempt_count,
                "expired key reused"
            );
            return Ok(ProcessOutcome {
                decision: Decision::Accepted(Acceptance::ExpiredReused),
                view: RecordView {
                    payment_id,
                    key: record.key,
                    status: RecordStatus::Processing,
                    message: "expired key reused, payment accepted for processing".to_string(),
                    attempt_count: record.attempt_count,
                    response_body: None,
                },
            });
        }

        match record.status {
            RecordStatus::Processing => {
                if record.request_fingerprint != fp {
                    warn!(key = %record.key, "key reused with different parameters");
                    return Ok(mismatch_outcome(record));
                }
                debug!(key = %record.key, attempt_count = record.attempt_count, "duplicate in flight");
                Ok(ProcessOutcome {
                    decision: Decision::Rejected(Rejection::InProgress),
                    view: RecordView {
                        payment_id: record.payment_id,
                        key: record.key,
                        status: RecordStatus::Processing,
                        message: "payment is already being processed".to_string(),
                        attempt_count: record.attempt_count,
                        response_body: None,
                    },
                })
            }
            RecordStatus::Succeeded => {
                debug!(key = %record.key, "replaying cached response");
                Ok(ProcessOutcome {
                    decision: Decision::Replay,
                    view: RecordView {
                        payment_id: record.payment_id,
                        key: record.key,
                        status: RecordStatus::Succeeded,
                        message: "payment already succeeded".to_string(),
                        attempt_count: record.attempt_count,
                        response_body: record.response_body,
                    },
                })
            }
            RecordStatus::Failed => {
                if record.request_fingerprint != fp {
                    warn!(key = %record.key, "key reused with different parameters");
                    return Ok(mismatch_outcome(record));
                }
                self.store
                    .reset_to_processing(&record.key, &payment_id, expires_at)
                    .await?;
                info!(key = %record.key, attempt_count = record.attempt_count, "retry accepted");
                Ok(ProcessOutcome {
                    decision: Decision::Accepted(Acceptance::Retry),
                    view: RecordView {
                        payment_id,
                        key: record.key,
                        status: RecordStatus::Processing,
                        message: "previous attempt failed, retrying".to_string(),
                        attempt_count: record.attempt_count,
                        response_body: None,
                    },
                })
            }
        }
    }

    /// Retention window for a merchant: the stored policy if present,
    /// otherwise the configured default. Policy lookup failures fall back
    /// to the default rather than failing the decision.
    async fn retention_for(&self, merchant_id: &str) -> TimeDelta {
        match self.store.policy(merchant_id).await {
            Ok(Some(policy)) => TimeDelta::hours(i64::from(policy.retention_hours)),
            Ok(None) => self.default_retention,
            Err(e) => {
                warn!(merchant_id, error = %e, "policy lookup failed, using default retention");
                self.default_retention
            }
        }
    }
}

fn mismatch_outcome(record: crate::record::IdempotencyRecord) -> ProcessOutcome {
    ProcessOutcome {
        decision: Decision::Rejected(Rejection::Mismatch),
        view: RecordView {
            payment_id: record.payment_id,
            key: record.key,
            status: record.status,
            message: "request parameters do not match original payment".to_string(),
            attempt_count: record.attempt_count,
            response_body: None,
        },
    }
}

/// Generates a fresh opaque payment identifier.
///
/// A v4 UUID gives enough entropy that collisions across replicas are
/// negligible.
#[must_use]
pub fn generate_payment_id() -> String {
    format!("pay_{}", Uuid::new_v4().simple())
}
