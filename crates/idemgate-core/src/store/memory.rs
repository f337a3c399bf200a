//! In-process record store.
//!
//! Mirrors the `SQLite` store's semantics over plain maps. Useful for unit
//! tests and for embedding the decision protocol without a database; not
//! durable.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::lock::{KeyLockGuard, KeyLockRegistry};
use super::{CompleteResult, MerchantStats, RecordStore, StoreError};
use crate::policy::MerchantPolicy;
use crate::record::{CompletionStatus, IdempotencyRecord, PaymentRequest, RecordStatus};

/// Volatile record store backed by in-process maps.
#[derive(Default)]
pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
    locks: KeyLockRegistry,
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, IdempotencyRecord>,
    policies: HashMap<String, MerchantPolicy>,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> T) -> Result<T, StoreError> {
        let inner = self.inner.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&inner))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> T) -> Result<T, StoreError> {
        let mut inner = self.inner.write().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&mut inner))
    }
}

impl RecordStore for MemoryRecordStore {
    async fn lock_key(&self, key: &str) -> Result<KeyLockGuard, StoreError> {
        self.locks.acquire(key).await
    }

    async fn insert_or_bump(
        &self,
        req: &PaymentRequest,
        fingerprint: &str,
        payment_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(IdempotencyRecord, bool), StoreError> {
        let now = Utc::now();
        self.write(|inner| {
            if let Some(record) = inner.records.get_mut(&req.idempotency_key) {
                record.attempt_count += 1;
                record.last_seen_at = now;
                (record.clone(), false)
            } else {
                let record = IdempotencyRecord {
                    key: req.idempotency_key.clone(),
                    merchant_id: req.merchant_id.clone(),
                    customer_id: req.customer_id.clone(),
                    amount: req.amount,
                    currency: req.currency.clone(),
                    status: RecordStatus::Processing,
                    request_fingerprint: fingerprint.to_string(),
                    payment_id: payment_id.to_string(),
                    response_body: None,
                    attempt_count: 1,
                    first_seen_at: now,
                    last_seen_at: now,
                    completed_at: None,
                    expires_at,
                };
                inner
                    .records
                    .insert(req.idempotency_key.clone(), record.clone());
                (record, true)
            }
        })
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        self.read(|inner| inner.records.get(key).cloned())
    }

    async fn conditional_complete(
        &self,
        key: &str,
        target: CompletionStatus,
        payload: Option<&serde_json::Value>,
    ) -> Result<CompleteResult, StoreError> {
        let now = Utc::now();
        self.write(|inner| match inner.records.get_mut(key) {
            None => CompleteResult::NotFound,
            Some(record) if record.status != RecordStatus::Processing => {
                CompleteResult::AlreadyCompleted
            }
            Some(record) => {
                record.status = target.as_record_status();
                record.response_body = payload.cloned();
                record.completed_at = Some(now);
                CompleteResult::Completed
            }
        })
    }

    async fn reset_to_processing(
        &self,
        key: &str,
        new_payment_id: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(|inner| {
            if let Some(record) = inner.records.get_mut(key) {
                if record.status == RecordStatus::Failed {
                    record.status = RecordStatus::Processing;
                    record.payment_id = new_payment_id.to_string();
                    record.completed_at = None;
                    record.expires_at = new_expires_at;
                    record.last_seen_at = now;
                }
            }
        })
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        self.write(|inner| {
            let before = inner.records.len();
            inner.records.retain(|_, record| record.expires_at >= now);
            (before - inner.records.len()) as u64
        })
    }

    async fn duplicates_in_range(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IdempotencyRecord>, StoreError> {
        self.read(|inner| {
            let mut records: Vec<_> = inner
                .records
                .values()
                .filter(|r| {
                    r.merchant_id == merchant_id
                        && r.first_seen_at >= from
                        && r.first_seen_at <= to
                        && r.attempt_count > 1
                })
                .cloned()
                .collect();
            records.sort_by(|a, b| b.attempt_count.cmp(&a.attempt_count));
            records
        })
    }

    async fn merchant_stats(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MerchantStats, StoreError> {
        self.read(|inner| {
            let mut stats = MerchantStats::default();
            for record in inner.records.values() {
                if record.merchant_id == merchant_id
                    && record.first_seen_at >= from
                    && record.first_seen_at <= to
                {
                    stats.total_requests += u64::from(record.attempt_count);
                    stats.unique_payments += 1;
                }
            }
            stats
        })
    }

    async fn policy(&self, merchant_id: &str) -> Result<Option<MerchantPolicy>, StoreError> {
        self.read(|inner| inner.policies.get(merchant_id).cloned())
    }

    async fn upsert_policy(&self, policy: &MerchantPolicy) -> Result<(), StoreError> {
        self.write(|inner| {
            inner
                .policies
                .entry(policy.merchant_id.clone())
                .and_modify(|existing| {
                    existing.retry_discipline = policy.retry_discipline;
                    existing.retention_hours = policy.retention_hours;
                    existing.updated_at = policy.updated_at;
                })
                .or_insert_with(|| policy.clone());
        })
    }
}
