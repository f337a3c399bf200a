//! Tests for the duplicate reporter.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::record::PaymentRequest;
use crate::store::MemoryRecordStore;

fn request(key: &str, merchant: &str, amount: i64, currency: &str) -> PaymentRequest {
    PaymentRequest {
        idempotency_key: key.to_string(),
        merchant_id: merchant.to_string(),
        customer_id: "c1".to_string(),
        amount,
        currency: currency.to_string(),
    }
}

async fn seen_n_times(store: &MemoryRecordStore, req: &PaymentRequest, attempts: u32) {
    let expires = Utc::now() + TimeDelta::hours(24);
    for _ in 0..attempts {
        store
            .insert_or_bump(req, "fp", "pay", expires)
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_empty_range_reports_zero_rate() {
    let store = Arc::new(MemoryRecordStore::new());
    let reporter = DuplicateReporter::new(Arc::clone(&store), 3);
    let now = Utc::now();

    let report = reporter
        .report("m1", now - TimeDelta::hours(24), now, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_requests, 0);
    assert_eq!(report.unique_payments, 0);
    assert_eq!(report.duplicate_count, 0);
    assert!(report.duplicate_rate.abs() < f64::EPSILON);
    assert!(report.suspicious_keys.is_empty());
    assert_eq!(report.amount_at_risk, 0);
}

#[tokio::test]
async fn test_report_aggregates_distribution() {
    let store = Arc::new(MemoryRecordStore::new());

    // 90 singles, 8 keys seen twice at 5000 BRL, 2 keys seen eight times
    // at 15000 BRL.
    for i in 0..90 {
        seen_n_times(&store, &request(&format!("single-{i}"), "m1", 1000, "BRL"), 1).await;
    }
    for i in 0..8 {
        seen_n_times(&store, &request(&format!("double-{i}"), "m1", 5000, "BRL"), 2).await;
    }
    for i in 0..2 {
        seen_n_times(&store, &request(&format!("burst-{i}"), "m1", 15000, "BRL"), 8).await;
    }

    let reporter = DuplicateReporter::new(Arc::clone(&store), 3);
    let now = Utc::now();
    let report = reporter
        .report("m1", now - TimeDelta::hours(24), now + TimeDelta::hours(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total_requests, 122);
    assert_eq!(report.unique_payments, 100);
    assert_eq!(report.duplicate_count, 22);
    assert!((report.duplicate_rate - 22.0 / 122.0 * 100.0).abs() < 1e-9);

    // Only the eight-attempt keys exceed the threshold of 3.
    assert_eq!(report.suspicious_keys.len(), 2);
    assert!(report
        .suspicious_keys
        .iter()
        .all(|k| k.attempt_count == 8 && k.amount == 15000));

    // 8 keys x 1 extra x 5000 + 2 keys x 7 extra x 15000.
    assert_eq!(report.amount_at_risk, 8 * 5000 + 2 * 7 * 15000);
    assert_eq!(report.currency_breakdown.get("BRL"), Some(&250_000));
}

#[tokio::test]
async fn test_threshold_is_strictly_greater() {
    let store = Arc::new(MemoryRecordStore::new());
    seen_n_times(&store, &request("at-threshold", "m1", 100, "BRL"), 3).await;
    seen_n_times(&store, &request("above-threshold", "m1", 100, "BRL"), 4).await;

    let reporter = DuplicateReporter::new(Arc::clone(&store), 3);
    let now = Utc::now();
    let report = reporter
        .report("m1", now - TimeDelta::hours(1), now + TimeDelta::hours(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.suspicious_keys.len(), 1);
    assert_eq!(report.suspicious_keys[0].idempotency_key, "above-threshold");
    // Both keys still contribute to the exposure numbers.
    assert_eq!(report.amount_at_risk, 2 * 100 + 3 * 100);
}

#[tokio::test]
async fn test_currency_breakdown_splits_exposure() {
    let store = Arc::new(MemoryRecordStore::new());
    seen_n_times(&store, &request("brl-key", "m1", 5000, "BRL"), 2).await;
    seen_n_times(&store, &request("mxn-key", "m1", 3000, "MXN"), 3).await;

    let reporter = DuplicateReporter::new(Arc::clone(&store), 3);
    let now = Utc::now();
    let report = reporter
        .report("m1", now - TimeDelta::hours(1), now + TimeDelta::hours(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.currency_breakdown.get("BRL"), Some(&5000));
    assert_eq!(report.currency_breakdown.get("MXN"), Some(&6000));
    assert_eq!(report.amount_at_risk, 11000);
}

#[tokio::test]
async fn test_other_merchants_excluded() {
    let store = Arc::new(MemoryRecordStore::new());
    seen_n_times(&store, &request("mine", "m1", 100, "BRL"), 2).await;
    seen_n_times(&store, &request("theirs", "m2", 100, "BRL"), 5).await;

    let reporter = DuplicateReporter::new(Arc::clone(&store), 3);
    let now = Utc::now();
    let report = reporter
        .report("m1", now - TimeDelta::hours(1), now + TimeDelta::hours(1), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.unique_payments, 1);
    assert!(report.suspicious_keys.is_empty());
}

#[tokio::test]
async fn test_cancelled_report() {
    let store = Arc::new(MemoryRecordStore::new());
    let reporter = DuplicateReporter::new(store, 3);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let now = Utc::now();
    let err = reporter
        .report("m1", now - TimeDelta::hours(1), now, &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, ReportError::Cancelled));
}
