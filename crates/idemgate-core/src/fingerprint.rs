//! Canonical request fingerprinting.
//!
//! The fingerprint is the operational definition of "same payment
//! parameters": two requests with equal digests are considered retries of
//! the same payment, regardless of their idempotency keys. The canonical
//! encoding below is frozen; changing it would silently make existing
//! records unmatchable.

use sha2::{Digest, Sha256};

use crate::record::PaymentRequest;

/// Computes the hex-encoded SHA-256 digest over the canonical encoding
/// `"{merchant_id}|{customer_id}|{amount}|{currency}"`.
///
/// The idempotency key is deliberately excluded: the digest identifies the
/// payment parameters, not the intent.
#[must_use]
pub fn fingerprint(merchant_id: &str, customer_id: &str, amount: i64, currency: &str) -> String {
    let canonical = format!("{merchant_id}|{customer_id}|{amount}|{currency}");
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Fingerprints a [`PaymentRequest`].
#[must_use]
pub fn of_request(req: &PaymentRequest) -> String {
    fingerprint(&req.merchant_id, &req.customer_id, req.amount, &req.currency)
}
