//! Per-key advisory locking.
//!
//! Lock identifiers are derived from the idempotency key with a stable
//! 64-bit hash, so every process holding a handle to the same store
//! derives the same identifier for the same key. A hash collision merely
//! makes two unrelated keys serialize, which is harmless.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::StoreError;

/// Slot-map entries above this size trigger a garbage collection pass that
/// drops lock slots nobody currently holds or waits on.
const SLOT_GC_THRESHOLD: usize = 1024;

/// Stable FNV-1a 64-bit hash of an idempotency key.
///
/// FNV-1a is not cryptographic; it only needs to be deterministic across
/// processes and releases, which the std hasher does not guarantee.
#[must_use]
pub fn advisory_lock_id(key: &str) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET_BASIS;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Registry of per-key exclusive locks, keyed by [`advisory_lock_id`].
///
/// Different keys proceed in parallel; callers for the same key serialize
/// in acquisition order. Memory is bounded: slots that no caller holds or
/// waits on are reclaimed once the map grows past a threshold.
#[derive(Debug, Default)]
pub struct KeyLockRegistry {
    slots: Mutex<HashMap<u64, Arc<AsyncMutex<()>>>>,
}

/// Exclusive per-key lock guard. The lock is released when the guard is
/// dropped.
#[derive(Debug)]
pub struct KeyLockGuard {
    lock_id: u64,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLockGuard {
    /// The 64-bit advisory lock identifier this guard holds.
    #[must_use]
    pub const fn lock_id(&self) -> u64 {
        self.lock_id
    }
}

impl KeyLockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lock for `key`, waiting if another caller
    /// for the same key (or a colliding one) currently holds it.
    pub async fn acquire(&self, key: &str) -> Result<KeyLockGuard, StoreError> {
        let lock_id = advisory_lock_id(key);
        let slot = {
            let mut slots = self.slots.lock().map_err(|_| StoreError::LockPoisoned)?;
            if slots.len() > SLOT_GC_THRESHOLD {
                // strong_count == 1 means only the map holds the slot: no
                // holder, no waiter.
                slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            }
            Arc::clone(slots.entry(lock_id).or_default())
        };
        let guard = slot.lock_owned().await;
        Ok(KeyLockGuard {
            lock_id,
            _guard: guard,
        })
    }
}
