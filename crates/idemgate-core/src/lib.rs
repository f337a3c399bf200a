//! # idemgate-core
//!
//! Core library for the idempotency gateway: it decides, under concurrent
//! and retried traffic, whether each payment submission is a new payment,
//! a duplicate of an in-flight one, a replay of a completed one, a
//! permitted retry of a prior failure, or a conflicting reuse of a key
//! with different parameters. It never executes payments; it gates them.
//!
//! ## Components
//!
//! - [`store`]: durable per-key records with atomic upsert, conditional
//!   completion, per-key advisory locking, and range queries
//! - [`fingerprint`]: canonical digest of payment parameters
//! - [`engine`]: the six-outcome decision state machine
//! - [`recorder`]: `processing` -> `succeeded`/`failed` transitions
//! - [`sweeper`]: retention-based record reclamation
//! - [`report`]: per-merchant duplicate statistics and amount-at-risk
//! - [`policy`]: per-merchant retention and retry configuration
//! - [`monitor`]: sliding-window duplicate-rate observation
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use idemgate_core::engine::DecisionEngine;
//! use idemgate_core::record::PaymentRequest;
//! use idemgate_core::store::MemoryRecordStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryRecordStore::new());
//! let engine = DecisionEngine::new(store, chrono::TimeDelta::hours(24));
//! let outcome = engine
//!     .process(
//!         &PaymentRequest {
//!             idempotency_key: "order-42".into(),
//!             merchant_id: "m1".into(),
//!             customer_id: "c1".into(),
//!             amount: 5000,
//!             currency: "BRL".into(),
//!         },
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//! println!("{}", outcome.decision);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions
)]

pub mod config;
pub mod engine;
pub mod fingerprint;
pub mod monitor;
pub mod policy;
pub mod record;
pub mod recorder;
pub mod report;
pub mod store;
pub mod sweeper;

pub use config::GatewayConfig;
pub use engine::{Decision, DecisionEngine, ProcessOutcome};
pub use record::{IdempotencyRecord, PaymentRequest, RecordStatus};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
