//! Durable per-key record storage.
//!
//! This module provides the [`RecordStore`] trait plus two implementations:
//!
//! - [`SqliteRecordStore`]: durable storage backed by `SQLite` in WAL mode
//! - [`MemoryRecordStore`]: in-process storage for tests and embedding
//!
//! # Concurrency defense
//!
//! Three layers keep duplicate records impossible under concurrent and
//! retried traffic:
//!
//! 1. A uniqueness constraint on the idempotency key.
//! 2. A single atomic upsert statement, so there is no check-then-act
//!    window at the query layer.
//! 3. A per-key advisory lock ([`KeyLockRegistry`]) that serializes not
//!    only the upsert but the conditional read-and-mutate the decision
//!    engine performs based on the returned record. Without it, two
//!    callers could both observe a `failed` record and both reset it,
//!    racing to assign conflicting payment ids.
//!
//! Callers that act on the *returned* record (the decision engine) must
//! hold the key's lock guard across the whole interaction.

mod error;
mod lock;
mod memory;
mod sqlite;


use chrono::{DateTime, Utc};

pub use error::StoreError;
pub use lock::{advisory_lock_id, KeyLockGuard, KeyLockRegistry};
pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::policy::MerchantPolicy;
use crate::record::{CompletionStatus, IdempotencyRecord, PaymentRequest};

/// Result of a conditional completion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteResult {
    /// The record transitioned out of `processing`.
    Completed,
    /// No record exists for the key.
    NotFound,
    /// The record exists but was already in a terminal status.
    AlreadyCompleted,
}

/// Aggregate request counts for a merchant over a time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MerchantStats {
    /// Sum of `attempt_count` over in-range records.
    pub total_requests: u64,
    /// Number of in-range records (distinct keys).
    pub unique_payments: u64,
}

/// Transactional keyed storage for idempotency records and merchant
/// policies.
///
/// All operations are atomic: no reader may observe a partially-updated
/// record. `lock_key` provides the advisory per-key lock; different keys
/// proceed in parallel, same-key callers serialize in lock-acquisition
/// order.
#[allow(async_fn_in_trait)]
pub trait RecordStore: Send + Sync + 'static {
    /// Acquires the exclusive advisory lock for `key`, derived from a
    /// stable 64-bit hash of the key. The lock is held until the returned
    /// guard is dropped.
    async fn lock_key(&self, key: &str) -> Result<KeyLockGuard, StoreError>;

    /// Atomically inserts a new `processing` record for the request's key,
    /// or bumps `attempt_count` and `last_seen_at` on the existing record,
    /// leaving every other field untouched.
    ///
    /// Returns the post-operation record and whether it was newly
    /// inserted. The boolean is derived from the resulting
    /// `attempt_count` (`== 1` means new).
    async fn insert_or_bump(
        &self,
        req: &PaymentRequest,
        fingerprint: &str,
        payment_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(IdempotencyRecord, bool), StoreError>;

    /// Fetches the record for `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;

    /// Atomically transitions a `processing` record to the target terminal
    /// status, setting `completed_at` and storing the payload if provided.
    async fn conditional_complete(
        &self,
        key: &str,
        target: CompletionStatus,
        payload: Option<&serde_json::Value>,
    ) -> Result<CompleteResult, StoreError>;

    /// If a record exists for `key` with status `failed`, resets it to
    /// `processing` with a fresh payment id and expiry, clearing
    /// `completed_at` and updating `last_seen_at`. `first_seen_at` and the
    /// fingerprint are never touched.
    ///
    /// Silently does nothing when the condition does not hold; callers use
    /// this only under the per-key lock after observing the status.
    async fn reset_to_processing(
        &self,
        key: &str,
        new_payment_id: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deletes all records whose retention window has passed. Returns the
    /// number of deleted records. Idempotent and safe to run concurrently
    /// with decision traffic.
    async fn sweep_expired(&self) -> Result<u64, StoreError>;

    /// Returns in-range records with `attempt_count > 1` for the merchant,
    /// ordered by `attempt_count` descending. The range filters on
    /// `first_seen_at`, inclusive on both ends.
    async fn duplicates_in_range(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IdempotencyRecord>, StoreError>;

    /// Aggregate totals for the merchant over the range (filtered on
    /// `first_seen_at`, inclusive).
    async fn merchant_stats(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MerchantStats, StoreError>;

    /// Fetches the merchant's policy, if configured.
    async fn policy(&self, merchant_id: &str) -> Result<Option<MerchantPolicy>, StoreError>;

    /// Creates or updates a merchant policy. The first insert sets
    /// `created_at`; updates preserve it and refresh `updated_at`.
    async fn upsert_policy(&self, policy: &MerchantPolicy) -> Result<(), StoreError>;
}
