//! Completion recording.
//!
//! Finalizes an in-flight payment as `succeeded` or `failed`. No per-key
//! lock is needed: the store's conditional update only moves a record
//! *out of* `processing`, so of two concurrent completions exactly one
//! wins and the other observes `AlreadyCompleted`.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::record::{CompleteRequest, CompletionStatus};
use crate::store::{CompleteResult, RecordStore, StoreError};

/// Errors surfaced by [`CompletionRecorder::complete`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CompleteError {
    /// The requested status is not `succeeded` or `failed`. Terminal.
    #[error("invalid status: must be 'succeeded' or 'failed', got '{value}'")]
    InvalidStatus {
        /// The rejected status string.
        value: String,
    },

    /// No record exists for the key.
    #[error("idempotency key not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// The record was already in a terminal status. Terminal by
    /// definition; never retried.
    #[error("payment already completed for key {key}")]
    AlreadyCompleted {
        /// The key of the already-completed record.
        key: String,
    },

    /// The store failed transiently.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// The operation was cancelled before the store was reached. The
    /// record either transitioned or did not, per the atomic update.
    #[error("operation cancelled")]
    Cancelled,
}

/// Transitions `processing` records to their terminal status.
pub struct CompletionRecorder<S> {
    store: Arc<S>,
}

impl<S: RecordStore> CompletionRecorder<S> {
    /// Creates a recorder over the shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Finalizes the payment for `key`, attaching the response payload if
    /// one is provided.
    pub async fn complete(
        &self,
        key: &str,
        req: &CompleteRequest,
        cancel: &CancellationToken,
    ) -> Result<(), CompleteError> {
        let status =
            CompletionStatus::parse(&req.status).ok_or_else(|| CompleteError::InvalidStatus {
                value: req.status.clone(),
            })?;
        if cancel.is_cancelled() {
            return Err(CompleteError::Cancelled);
        }
        match self
            .store
            .conditional_complete(key, status, req.response_body.as_ref())
            .await?
        {
            CompleteResult::Completed => {
                info!(key, status = %status.as_record_status(), "payment completed");
                Ok(())
            }
            CompleteResult::NotFound => Err(CompleteError::NotFound {
                key: key.to_string(),
            }),
            CompleteResult::AlreadyCompleted => Err(CompleteError::AlreadyCompleted {
                key: key.to_string(),
            }),
        }
    }
}
