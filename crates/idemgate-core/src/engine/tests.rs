//! Tests for the decision engine state machine.

use std::sync::Arc;

use chrono::TimeDelta;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::record::{CompleteRequest, PaymentRequest, RecordStatus};
use crate::recorder::CompletionRecorder;
use crate::store::MemoryRecordStore;

fn request(key: &str) -> PaymentRequest {
    PaymentRequest {
        idempotency_key: key.to_string(),
        merchant_id: "m1".to_string(),
        customer_id: "c1".to_string(),
        amount: 5000,
        currency: "BRL".to_string(),
    }
}

fn engine_with(ttl: TimeDelta) -> (DecisionEngine<MemoryRecordStore>, Arc<MemoryRecordStore>) {
    let store = Arc::new(MemoryRecordStore::new());
    (DecisionEngine::new(Arc::clone(&store), ttl), store)
}

fn engine() -> (DecisionEngine<MemoryRecordStore>, Arc<MemoryRecordStore>) {
    engine_with(TimeDelta::hours(24))
}

async fn complete(
    store: &Arc<MemoryRecordStore>,
    key: &str,
    status: &str,
    body: Option<serde_json::Value>,
) {
    CompletionRecorder::new(Arc::clone(store))
        .complete(
            key,
            &CompleteRequest {
                status: status.to_string(),
                response_body: body,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_new_key_accepted() {
    let (engine, _) = engine();
    let outcome = engine
        .process(&request("key-a"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.decision, Decision::Accepted(Acceptance::New));
    assert_eq!(outcome.view.attempt_count, 1);
    assert_eq!(outcome.view.status, RecordStatus::Processing);
    assert!(outcome.view.payment_id.starts_with("pay_"));
}

#[tokio::test]
async fn test_duplicate_in_flight_rejected() {
    let (engine, _) = engine();
    let cancel = CancellationToken::new();
    let first = engine.process(&request("key-a"), &cancel).await.unwrap();
    let second = engine.process(&request("key-a"), &cancel).await.unwrap();

    assert_eq!(second.decision, Decision::Rejected(Rejection::InProgress));
    assert_eq!(second.view.attempt_count, 2);
    // The in-flight payment id is reported, not a fresh one.
    assert_eq!(second.view.payment_id, first.view.payment_id);
}

#[tokio::test]
async fn test_mismatch_while_processing() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    engine.process(&request("key-a"), &cancel).await.unwrap();

    let mut altered = request("key-a");
    altered.amount = 9999;
    let outcome = engine.process(&altered, &cancel).await.unwrap();

    assert_eq!(outcome.decision, Decision::Rejected(Rejection::Mismatch));
    // Suspicious traffic is still counted.
    assert_eq!(store.get("key-a").await.unwrap().unwrap().attempt_count, 2);
}

#[tokio::test]
async fn test_replay_returns_cached_payload() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    engine.process(&request("key-a"), &cancel).await.unwrap();

    let payload = json!({"tx": "t1"});
    complete(&store, "key-a", "succeeded", Some(payload.clone())).await;

    let replayed = engine.process(&request("key-a"), &cancel).await.unwrap();
    assert_eq!(replayed.decision, Decision::Replay);
    assert_eq!(replayed.view.response_body, Some(payload.clone()));
    assert_eq!(replayed.view.status, RecordStatus::Succeeded);

    // Replay determinism: a further call returns the identical payload.
    let again = engine.process(&request("key-a"), &cancel).await.unwrap();
    assert_eq!(again.view.response_body, Some(payload));
}

#[tokio::test]
async fn test_failed_then_matching_retry_accepted() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    let first = engine.process(&request("key-b"), &cancel).await.unwrap();
    complete(&store, "key-b", "failed", None).await;

    let retry = engine.process(&request("key-b"), &cancel).await.unwrap();
    assert_eq!(retry.decision, Decision::Accepted(Acceptance::Retry));
    assert_eq!(retry.view.attempt_count, 2);
    // An accepted retry carries a fresh payment id.
    assert_ne!(retry.view.payment_id, first.view.payment_id);

    let record = store.get("key-b").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.payment_id, retry.view.payment_id);
}

#[tokio::test]
async fn test_failed_then_mismatched_retry_rejected() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    engine.process(&request("key-b"), &cancel).await.unwrap();
    complete(&store, "key-b", "failed", None).await;

    let mut altered = request("key-b");
    altered.currency = "USD".to_string();
    let outcome = engine.process(&altered, &cancel).await.unwrap();

    assert_eq!(outcome.decision, Decision::Rejected(Rejection::Mismatch));
    // The record stays failed; no reset happened.
    let record = store.get("key-b").await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Failed);
}

#[tokio::test]
async fn test_expired_key_reused_even_on_mismatch() {
    let (engine, _) = engine_with(TimeDelta::zero());
    let cancel = CancellationToken::new();
    engine.process(&request("key-c"), &cancel).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    // Expiry wins over the fingerprint comparison.
    let mut altered = request("key-c");
    altered.amount = 1;
    let outcome = engine.process(&altered, &cancel).await.unwrap();
    assert_eq!(
        outcome.decision,
        Decision::Accepted(Acceptance::ExpiredReused)
    );
    assert_eq!(outcome.view.attempt_count, 2);
}

#[tokio::test]
async fn test_fingerprint_immutable_across_retries() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    engine.process(&request("key-d"), &cancel).await.unwrap();
    let original = store
        .get("key-d")
        .await
        .unwrap()
        .unwrap()
        .request_fingerprint;

    complete(&store, "key-d", "failed", None).await;
    engine.process(&request("key-d"), &cancel).await.unwrap();

    let record = store.get("key-d").await.unwrap().unwrap();
    assert_eq!(record.request_fingerprint, original);
}

#[tokio::test]
async fn test_attempt_count_bumped_exactly_once_per_call() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    for _ in 0..3 {
        engine.process(&request("key-e"), &cancel).await.unwrap();
    }
    assert_eq!(store.get("key-e").await.unwrap().unwrap().attempt_count, 3);
}

#[tokio::test]
async fn test_invalid_request_rejected_before_store() {
    let (engine, store) = engine();
    let mut bad = request("");
    bad.idempotency_key = String::new();
    let err = engine
        .process(&bad, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
    assert!(store.get("").await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancelled_before_store_leaves_no_record() {
    let (engine, store) = engine();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.process(&request("key-f"), &cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
    assert!(store.get("key-f").await.unwrap().is_none());
}

#[tokio::test]
async fn test_policy_overrides_default_retention() {
    let (engine, store) = engine_with(TimeDelta::zero());
    let cancel = CancellationToken::new();

    // With a 48h policy the zero default no longer applies, so the second
    // request is an in-flight duplicate rather than an expired reuse.
    crate::policy::PolicyStore::new(Arc::clone(&store))
        .upsert("m1", crate::policy::RetryDiscipline::Standard, 48, &cancel)
        .await
        .unwrap();

    engine.process(&request("key-g"), &cancel).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let outcome = engine.process(&request("key-g"), &cancel).await.unwrap();
    assert_eq!(outcome.decision, Decision::Rejected(Rejection::InProgress));
}

#[test]
fn test_payment_ids_are_unique() {
    let a = generate_payment_id();
    let b = generate_payment_id();
    assert_ne!(a, b);
    assert!(a.starts_with("pay_"));
}
