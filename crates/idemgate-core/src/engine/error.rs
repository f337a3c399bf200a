//! Decision-engine error types.

use thiserror::Error;

use crate::record::RequestValidationError;
use crate::store::StoreError;

/// Errors surfaced by [`DecisionEngine::process`](super::DecisionEngine::process).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The request failed input validation. Terminal.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestValidationError),

    /// The store failed transiently. The caller may retry the whole call;
    /// the per-key lock guarantees no partial commitment persists.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] StoreError),

    /// The operation was cancelled before completing. If the attempt was
    /// already recorded, the bump remains; retries are counted.
    #[error("operation cancelled")]
    Cancelled,
}
