//! `SQLite`-backed record store.
//!
//! All mutations are single atomic statements or `IMMEDIATE` transactions,
//! so no reader observes a partially-updated record regardless of which
//! process issued the write. The per-key advisory locks are scoped to the
//! store handle: every component of one gateway process shares the same
//! handle, which serializes same-key decisions end to end. Timestamps are
//! persisted as Unix milliseconds so range comparisons stay exact.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::lock::{KeyLockGuard, KeyLockRegistry};
use super::{CompleteResult, MerchantStats, RecordStore, StoreError};
use crate::policy::{MerchantPolicy, RetryDiscipline};
use crate::record::{CompletionStatus, IdempotencyRecord, PaymentRequest, RecordStatus};

/// Column list shared by every query that materializes a full record.
const RECORD_COLUMNS: &str = "idempotency_key, merchant_id, customer_id, amount, currency, \
     status, request_fingerprint, payment_id, response_body, attempt_count, \
     first_seen_at, last_seen_at, completed_at, expires_at";

/// Durable record store backed by `SQLite`.
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
    locks: KeyLockRegistry,
}

impl SqliteRecordStore {
    /// Opens (or creates) the database at `path`, applies connection
    /// pragmas, and initializes the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database. Intended for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            locks: KeyLockRegistry::new(),
        })
    }

    /// Initializes the database schema.
    pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS idempotency_keys (
                idempotency_key     TEXT PRIMARY KEY,
                merchant_id         TEXT NOT NULL,
                customer_id         TEXT NOT NULL,
                amount              INTEGER NOT NULL,
                currency            TEXT NOT NULL,
                status              TEXT NOT NULL,
                request_fingerprint TEXT NOT NULL,
                payment_id          TEXT NOT NULL,
                response_body       TEXT,
                attempt_count       INTEGER NOT NULL DEFAULT 1,
                first_seen_at       INTEGER NOT NULL,
                last_seen_at        INTEGER NOT NULL,
                completed_at        INTEGER,
                expires_at          INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_keys_merchant_first_seen
                ON idempotency_keys(merchant_id, first_seen_at);
            CREATE INDEX IF NOT EXISTS idx_keys_expires
                ON idempotency_keys(expires_at);
            CREATE INDEX IF NOT EXISTS idx_keys_merchant_attempts
                ON idempotency_keys(merchant_id, attempt_count DESC);
            CREATE TABLE IF NOT EXISTS merchant_policies (
                merchant_id      TEXT PRIMARY KEY,
                retry_discipline TEXT NOT NULL,
                retention_hours  INTEGER NOT NULL,
                created_at       INTEGER NOT NULL,
                updated_at       INTEGER NOT NULL
            );",
        )
    }

    /// Verifies database connectivity.
    pub fn ping(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&conn)
    }

    fn with_conn_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        f(&mut conn)
    }
}

impl RecordStore for SqliteRecordStore {
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
        let now = Utc::now().timestamp_millis();
        let sql = format!(
            "INSERT INTO idempotency_keys (idempotency_key, merchant_id, customer_id, amount, \
                 currency, status, request_fingerprint, payment_id, attempt_count, \
                 first_seen_at, last_seen_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'processing', ?6, ?7, 1, ?8, ?8, ?9)
             ON CONFLICT(idempotency_key) DO UPDATE SET
                 last_seen_at = ?8,
                 attempt_count = attempt_count + 1
             RETURNING {RECORD_COLUMNS}"
        );
        let raw = self.with_conn(|conn| {
            Ok(conn.query_row(
                &sql,
                params![
                    req.idempotency_key,
                    req.merchant_id,
                    req.customer_id,
                    req.amount,
                    req.currency,
                    fingerprint,
                    payment_id,
                    now,
                    expires_at.timestamp_millis(),
                ],
                RawRecord::from_row,
            )?)
        })?;
        let record = raw.into_record()?;
        let was_new = record.attempt_count == 1;
        debug!(
            key = %record.key,
            attempt_count = record.attempt_count,
            was_new,
            "insert_or_bump"
        );
        Ok((record, was_new))
    }

    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM idempotency_keys WHERE idempotency_key = ?1");
        let raw = self.with_conn(|conn| {
            Ok(conn
                .query_row(&sql, params![key], RawRecord::from_row)
                .optional()?)
        })?;
        raw.map(RawRecord::into_record).transpose()
    }

    async fn conditional_complete(
        &self,
        key: &str,
        target: CompletionStatus,
        payload: Option<&serde_json::Value>,
    ) -> Result<CompleteResult, StoreError> {
        let now = Utc::now().timestamp_millis();
        let body = payload.map(serde_json::Value::to_string);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let changed = tx.execute(
                "UPDATE idempotency_keys
                 SET status = ?1, response_body = ?2, completed_at = ?3
                 WHERE idempotency_key = ?4 AND status = 'processing'",
                params![target.as_record_status().as_str(), body, now, key],
            )?;
            let result = if changed == 0 {
                let exists = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM idempotency_keys WHERE idempotency_key = ?1)",
                    params![key],
                    |row| row.get::<_, bool>(0),
                )?;
                if exists {
                    CompleteResult::AlreadyCompleted
                } else {
                    CompleteResult::NotFound
                }
            } else {
                CompleteResult::Completed
            };
            tx.commit()?;
            Ok(result)
        })
    }

    async fn reset_to_processing(
        &self,
        key: &str,
        new_payment_id: &str,
        new_expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE idempotency_keys
                 SET status = 'processing', payment_id = ?1, completed_at = NULL,
                     expires_at = ?2, last_seen_at = ?3
                 WHERE idempotency_key = ?4 AND status = 'failed'",
                params![new_payment_id, new_expires_at.timestamp_millis(), now, key],
            )?;
            Ok(())
        })
    }

    async fn sweep_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now().timestamp_millis();
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM idempotency_keys WHERE expires_at < ?1",
                params![now],
            )?;
            Ok(deleted as u64)
        })
    }

    async fn duplicates_in_range(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<IdempotencyRecord>, StoreError> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM idempotency_keys
             WHERE merchant_id = ?1 AND first_seen_at >= ?2 AND first_seen_at <= ?3
               AND attempt_count > 1
             ORDER BY attempt_count DESC"
        );
        let raws = self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                params![
                    merchant_id,
                    from.timestamp_millis(),
                    to.timestamp_millis()
                ],
                RawRecord::from_row,
            )?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })?;
        raws.into_iter().map(RawRecord::into_record).collect()
    }

    async fn merchant_stats(
        &self,
        merchant_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<MerchantStats, StoreError> {
        self.with_conn(|conn| {
            let (total, unique) = conn.query_row(
                "SELECT COALESCE(SUM(attempt_count), 0), COUNT(*)
                 FROM idempotency_keys
                 WHERE merchant_id = ?1 AND first_seen_at >= ?2 AND first_seen_at <= ?3",
                params![
                    merchant_id,
                    from.timestamp_millis(),
                    to.timestamp_millis()
                ],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )?;
            Ok(MerchantStats {
                total_requests: total.max(0) as u64,
                unique_payments: unique.max(0) as u64,
            })
        })
    }

    async fn policy(&self, merchant_id: &str) -> Result<Option<MerchantPolicy>, StoreError> {
        let raw = self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT merchant_id, retry_discipline, retention_hours, created_at, updated_at
                     FROM merchant_policies WHERE merchant_id = ?1",
                    params![merchant_id],
                    |row| {
                        Ok(RawPolicy {
                            merchant_id: row.get(0)?,
                            retry_discipline: row.get(1)?,
                            retention_hours: row.get(2)?,
                            created_at: row.get(3)?,
                            updated_at: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })?;
        raw.map(RawPolicy::into_policy).transpose()
    }

    async fn upsert_policy(&self, policy: &MerchantPolicy) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO merchant_policies
                     (merchant_id, retry_discipline, retention_hours, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(merchant_id) DO UPDATE SET
                     retry_discipline = ?2, retention_hours = ?3, updated_at = ?5",
                params![
                    policy.merchant_id,
                    policy.retry_discipline.as_str(),
                    policy.retention_hours,
                    policy.created_at.timestamp_millis(),
                    policy.updated_at.timestamp_millis(),
                ],
            )?;
            Ok(())
        })
    }
}

/// Row image before domain conversion. Keeping the two steps separate lets
/// the rusqlite closure stay infallible while decode failures surface as
/// [`StoreError::Corrupt`].
struct RawRecord {
    key: String,
    merchant_id: String,
    customer_id: String,
    amount: i64,
    currency: String,
    status: String,
    request_fingerprint: String,
    payment_id: String,
    response_body: Option<String>,
    attempt_count: i64,
    first_seen_at: i64,
    last_seen_at: i64,
    completed_at: Option<i64>,
    expires_at: i64,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key: row.get(0)?,
            merchant_id: row.get(1)?,
            customer_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            status: row.get(5)?,
            request_fingerprint: row.get(6)?,
            payment_id: row.get(7)?,
            response_body: row.get(8)?,
            attempt_count: row.get(9)?,
            first_seen_at: row.get(10)?,
            last_seen_at: row.get(11)?,
            completed_at: row.get(12)?,
            expires_at: row.get(13)?,
        })
    }

    fn into_record(self) -> Result<IdempotencyRecord, StoreError> {
        let status = RecordStatus::parse(&self.status).ok_or_else(|| StoreError::Corrupt {
            key: self.key.clone(),
            reason: format!("unknown status '{}'", self.status),
        })?;
        let attempt_count =
            u32::try_from(self.attempt_count).map_err(|_| StoreError::Corrupt {
                key: self.key.clone(),
                reason: format!("attempt_count out of range: {}", self.attempt_count),
            })?;
        let response_body = self
            .response_body
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| StoreError::Corrupt {
                key: self.key.clone(),
                reason: format!("response_body is not valid JSON: {e}"),
            })?;
        Ok(IdempotencyRecord {
            status,
            attempt_count,
            response_body,
            first_seen_at: millis(&self.key, "first_seen_at", self.first_seen_at)?,
            last_seen_at: millis(&self.key, "last_seen_at", self.last_seen_at)?,
            completed_at: self
                .completed_at
                .map(|ms| millis(&self.key, "completed_at", ms))
                .transpose()?,
            expires_at: millis(&self.key, "expires_at", self.expires_at)?,
            key: self.key,
            merchant_id: self.merchant_id,
            customer_id: self.customer_id,
            amount: self.amount,
            currency: self.currency,
            request_fingerprint: self.request_fingerprint,
            payment_id: self.payment_id,
        })
    }
}

struct RawPolicy {
    merchant_id: String,
    retry_discipline: String,
    retention_hours: i64,
    created_at: i64,
    updated_at: i64,
}

impl RawPolicy {
    fn into_policy(self) -> Result<MerchantPolicy, StoreError> {
        let retry_discipline =
            RetryDiscipline::parse(&self.retry_discipline).ok_or_else(|| StoreError::Corrupt {
                key: self.merchant_id.clone(),
                reason: format!("unknown retry discipline '{}'", self.retry_discipline),
            })?;
        let retention_hours =
            u32::try_from(self.retention_hours).map_err(|_| StoreError::Corrupt {
                key: self.merchant_id.clone(),
                reason: format!("retention_hours out of range: {}", self.retention_hours),
            })?;
        Ok(MerchantPolicy {
            retry_discipline,
            retention_hours,
            created_at: millis(&self.merchant_id, "created_at", self.created_at)?,
            updated_at: millis(&self.merchant_id, "updated_at", self.updated_at)?,
            merchant_id: self.merchant_id,
        })
    }
}

fn millis(key: &str, field: &str, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StoreError::Corrupt {
        key: key.to_string(),
        reason: format!("{field} out of range: {ms}"),
    })
}
