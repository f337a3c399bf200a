//! # idemgate-server
//!
//! HTTP transport shell for the idempotency gateway. Maps decision
//! outcomes onto status codes, propagates request ids, exposes the
//! monitor snapshot and Prometheus metrics, and hosts the retention
//! sweeper. All protocol semantics live in `idemgate-core`; this crate is
//! glue.

#![warn(clippy::all)]

pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod seed;
pub mod state;
