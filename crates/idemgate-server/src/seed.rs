//! Sample-data generation.
//!
//! Populates the store with a realistic traffic mix for demos and manual
//! testing: mostly clean single-attempt payments, a handful of
//! double-click duplicates, a few runaway clients with many retries, some
//! failed-then-retried payments, plus a few records still in flight or
//! failed. Everything goes through the public store API so fingerprints
//! and payloads look exactly like live traffic.

use chrono::{TimeDelta, Utc};
use idemgate_core::fingerprint;
use idemgate_core::policy::{MerchantPolicy, RetryDiscipline};
use idemgate_core::record::{CompletionStatus, PaymentRequest};
use idemgate_core::store::{RecordStore, StoreError};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

/// What [`populate`] wrote.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeedSummary {
    /// Idempotency records created.
    pub records: usize,
    /// Merchant policies created.
    pub policies: usize,
}

const MERCHANTS: [(&str, &str, RetryDiscipline, u32); 3] = [
    ("acme-brasil", "BRL", RetryDiscipline::Standard, 24),
    ("lunamarket-mx", "MXN", RetryDiscipline::Standard, 24),
    ("cafetero-co", "COP", RetryDiscipline::Lenient, 48),
];

/// Seeds merchant policies and ~110 payment records.
pub async fn populate<S: RecordStore>(store: &S) -> Result<SeedSummary, StoreError> {
    let mut summary = SeedSummary::default();
    let now = Utc::now();

    for (merchant_id, _, discipline, hours) in MERCHANTS {
        store
            .upsert_policy(&MerchantPolicy {
                merchant_id: merchant_id.to_string(),
                retry_discipline: discipline,
                retention_hours: hours,
                created_at: now,
                updated_at: now,
            })
            .await?;
        summary.policies += 1;
    }

    // ~85 clean successful payments.
    for i in 0..85 {
        let (merchant, currency, _, _) = MERCHANTS[i % 3];
        let amount = 500 + (i as i64 * 131) % 48_000;
        let customer = format!("cust_{}", i % 20 + 1);
        seed_record(
            store,
            &format!("normal_{i}"),
            merchant,
            &customer,
            amount,
            currency,
            1,
            Outcome::Succeeded,
        )
        .await?;
        summary.records += 1;
    }

    // Double-click duplicates: 2-3 attempts on one key.
    let double_clicks: [(usize, i64, u32); 7] = [
        (0, 15_000, 2),
        (0, 8_500, 3),
        (1, 12_000, 2),
        (1, 3_500, 2),
        (2, 25_000, 3),
        (2, 7_500, 2),
        (0, 9_900, 2),
    ];
    for (i, (merchant_idx, amount, attempts)) in double_clicks.into_iter().enumerate() {
        let (merchant, currency, _, _) = MERCHANTS[merchant_idx];
        seed_record(
            store,
            &format!("doubleclick_{i}"),
            merchant,
            &format!("cust_dblclk_{i}"),
            amount,
            currency,
            attempts,
            Outcome::Succeeded,
        )
        .await?;
        summary.records += 1;
    }

    // Runaway clients hammering one key.
    let runaways: [(usize, i64, u32); 3] = [(0, 45_000, 12), (1, 28_700, 10), (2, 15_000, 8)];
    for (i, (merchant_idx, amount, attempts)) in runaways.into_iter().enumerate() {
        let (merchant, currency, _, _) = MERCHANTS[merchant_idx];
        seed_record(
            store,
            &format!("runaway_{i}"),
            merchant,
            &format!("cust_runaway_{i}"),
            amount,
            currency,
            attempts,
            Outcome::Succeeded,
        )
        .await?;
        summary.records += 1;
    }

    // Failed first attempts that were retried to success.
    let fail_retries: [(usize, i64); 3] = [(0, 5_000), (1, 3_200), (2, 8_000)];
    for (i, (merchant_idx, amount)) in fail_retries.into_iter().enumerate() {
        let (merchant, currency, _, _) = MERCHANTS[merchant_idx];
        seed_record(
            store,
            &format!("fail_retry_{i}"),
            merchant,
            &format!("cust_retry_{i}"),
            amount,
            currency,
            2,
            Outcome::Succeeded,
        )
        .await?;
        summary.records += 1;
    }

    // Still in flight.
    for i in 0..5 {
        let (merchant, currency, _, _) = MERCHANTS[i % 3];
        seed_record(
            store,
            &format!("processing_{i}"),
            merchant,
            &format!("cust_proc_{i}"),
            7_500 + i as i64 * 1_000,
            currency,
            1,
            Outcome::Processing,
        )
        .await?;
        summary.records += 1;
    }

    // Failed and never retried.
    for i in 0..5 {
        let (merchant, currency, _, _) = MERCHANTS[i % 3];
        seed_record(
            store,
            &format!("failed_{i}"),
            merchant,
            &format!("cust_fail_{i}"),
            2_000 + i as i64 * 500,
            currency,
            1,
            Outcome::Failed,
        )
        .await?;
        summary.records += 1;
    }

    info!(
        records = summary.records,
        policies = summary.policies,
        "seed data loaded"
    );
    Ok(summary)
}

enum Outcome {
    Processing,
    Succeeded,
    Failed,
}

#[allow(clippy::too_many_arguments)]
async fn seed_record<S: RecordStore>(
    store: &S,
    key: &str,
    merchant_id: &str,
    customer_id: &str,
    amount: i64,
    currency: &str,
    attempts: u32,
    outcome: Outcome,
) -> Result<(), StoreError> {
    let req = PaymentRequest {
        idempotency_key: key.to_string(),
        merchant_id: merchant_id.to_string(),
        customer_id: customer_id.to_string(),
        amount,
        currency: currency.to_string(),
    };
    let fp = fingerprint::of_request(&req);
    let payment_id = format!("pay_{}", Uuid::new_v4().simple());
    let expires_at = Utc::now() + TimeDelta::hours(24);

    for _ in 0..attempts.max(1) {
        store
            .insert_or_bump(&req, &fp, &payment_id, expires_at)
            .await?;
    }

    match outcome {
        Outcome::Processing => {}
        Outcome::Succeeded => {
            let payload = json!({"transaction_id": format!("tx_{key}"), "provider": "mock"});
            store
                .conditional_complete(key, CompletionStatus::Succeeded, Some(&payload))
                .await?;
        }
        Outcome::Failed => {
            store
                .conditional_complete(key, CompletionStatus::Failed, None)
                .await?;
        }
    }
    Ok(())
}
