//! Store-specific error types.

use thiserror::Error;

/// Errors surfaced by record store operations.
///
/// Store errors are transient from the caller's point of view: the
/// decision engine maps them to an unavailability outcome and the whole
/// operation may be retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The underlying database rejected or failed the operation.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A store-internal mutex was poisoned by a panicking holder.
    #[error("store mutex poisoned")]
    LockPoisoned,

    /// A persisted row could not be decoded into a record.
    #[error("malformed record for key {key}: {reason}")]
    Corrupt {
        /// The idempotency key of the malformed row.
        key: String,
        /// What failed to decode.
        reason: String,
    },
}
