//! Retention sweeping.
//!
//! Deletes records past their retention boundary. Safe to run concurrently
//! with decision traffic: the engine re-checks expiry under the per-key
//! lock and issues a conditional reset rather than relying on the record
//! persisting, so a sweep racing an acceptance is benign.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::store::{RecordStore, StoreError};

/// Periodically reclaims expired idempotency records.
pub struct RetentionSweeper<S> {
    store: Arc<S>,
}

impl<S: RecordStore> RetentionSweeper<S> {
    /// Creates a sweeper over the shared store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Runs a single sweep pass. Idempotent.
    pub async fn sweep_once(&self) -> Result<u64, StoreError> {
        let reclaimed = self.store.sweep_expired().await?;
        if reclaimed > 0 {
            info!(reclaimed, "expired idempotency records reclaimed");
        } else {
            debug!("retention sweep found nothing to reclaim");
        }
        Ok(reclaimed)
    }

    /// Sweeps on a fixed interval until cancelled. Sweep failures are
    /// logged and the loop keeps going; the next tick retries.
    pub async fn run(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of a tokio interval fires immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("retention sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        warn!(error = %e, "retention sweep failed");
                    }
                }
            }
        }
    }
}
