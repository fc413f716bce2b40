//! Reconciliation integration tests

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal_macros::dec;
use std::time::Duration;
use uuid::Uuid;

use wallet_ledger::domain::{
    BalanceMode, Discrepancy, FlowDirection, Page, ReconciliationStatus, Wallet,
};
use wallet_ledger::jobs::{ReconciliationScheduler, ReconciliationSchedulerConfig};
use wallet_ledger::{LedgerError, OracleTransaction};

mod common;
use common::Harness;

const ADDRESS: &str = "addr-recon";
const COUNTERPARTY: &str = "addr-bank";

fn oracle_tx(reference: &str, from: &str, to: &str, amount: rust_decimal::Decimal) -> OracleTransaction {
    OracleTransaction {
        reference: reference.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        amount,
        confirmations: 12,
        timestamp: Utc::now(),
    }
}

/// Wallet with txA (+100) and txB (-30) booked; returns the wallet and a
/// window covering both
async fn funded_wallet(h: &Harness) -> (Wallet, DateTime<Utc>, DateTime<Utc>) {
    let start = Utc::now() - ChronoDuration::hours(1);
    let wallet = h.wallet(ADDRESS).await;

    h.ledger.deposit(wallet.id, dec!(100.00), "txA").await.unwrap();
    h.ledger.withdraw(wallet.id, dec!(30.00), "txB").await.unwrap();

    let end = Utc::now() + ChronoDuration::minutes(1);
    (wallet, start, end)
}

#[tokio::test]
async fn test_matching_history_reconciles() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    h.oracle
        .insert_transaction(oracle_tx("txA", COUNTERPARTY, ADDRESS, dec!(100.00)))
        .await;
    h.oracle
        .insert_transaction(oracle_tx("txB", ADDRESS, COUNTERPARTY, dec!(30.00)))
        .await;

    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    assert_eq!(record.status, ReconciliationStatus::Matched);
    assert_eq!(record.internal_balance, dec!(70.00));
    assert_eq!(record.external_balance, dec!(70.00));
    assert_eq!(record.difference, dec!(0));
    assert_eq!(record.entry_count, 2);
    assert!(record.explanation.is_empty());
}

#[tokio::test]
async fn test_missing_external_transaction_is_explained() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    h.oracle
        .insert_transaction(oracle_tx("txA", COUNTERPARTY, ADDRESS, dec!(100.00)))
        .await;
    h.oracle.pin_balance(ADDRESS, dec!(65.00)).await;

    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    assert_eq!(record.status, ReconciliationStatus::Mismatch);
    assert_eq!(record.difference, dec!(5.00));
    assert_eq!(record.explanation.len(), 1);
    assert_eq!(
        record.explanation[0].to_string(),
        "txB present internally, absent externally"
    );
}

#[tokio::test]
async fn test_difference_is_signed() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    h.oracle.pin_balance(ADDRESS, dec!(75.00)).await;
    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    assert_eq!(record.status, ReconciliationStatus::Mismatch);
    assert_eq!(record.difference, dec!(-5.00));
}

#[tokio::test]
async fn test_difference_within_tolerance_matches() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    h.oracle.pin_balance(ADDRESS, dec!(70.0001)).await;
    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();
    assert_eq!(record.status, ReconciliationStatus::Matched);

    h.oracle.pin_balance(ADDRESS, dec!(70.0002)).await;
    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();
    assert_eq!(record.status, ReconciliationStatus::Mismatch);
}

#[tokio::test]
async fn test_unrecorded_and_mismatched_amounts() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    h.oracle
        .insert_transaction(oracle_tx("txA", COUNTERPARTY, ADDRESS, dec!(100.00)))
        .await;
    h.oracle
        .insert_transaction(oracle_tx("txB", ADDRESS, COUNTERPARTY, dec!(31.00)))
        .await;
    h.oracle
        .insert_transaction(oracle_tx("txC", COUNTERPARTY, ADDRESS, dec!(10.00)))
        .await;

    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    // 70 internal vs 100 - 31 + 10 = 79 external
    assert_eq!(record.status, ReconciliationStatus::Mismatch);
    assert_eq!(record.difference, dec!(-9.00));
    assert_eq!(record.explanation.len(), 2);
    assert!(record.explanation.contains(&Discrepancy::AmountMismatch {
        reference: "txB".to_string(),
        internal: dec!(30.00),
        external: dec!(31.00),
    }));
    assert!(record.explanation.contains(&Discrepancy::UnrecordedExternally {
        reference: "txC".to_string(),
        amount: dec!(10.00),
        direction: FlowDirection::Inbound,
    }));
}

#[tokio::test]
async fn test_replay_window_excludes_later_entries() {
    let h = Harness::new();
    let (wallet, start, _) = funded_wallet(&h).await;

    // Booked after the window closes
    tokio::time::sleep(Duration::from_millis(5)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    h.ledger.deposit(wallet.id, dec!(1000), "txLater").await.unwrap();

    h.oracle.pin_balance(ADDRESS, dec!(70.00)).await;

    let replay = h
        .reconciliation
        .reconcile(wallet.id, start, cutoff)
        .await
        .unwrap();
    assert_eq!(replay.internal_balance, dec!(70.00));
    assert_eq!(replay.status, ReconciliationStatus::Matched);

    // An empty window opening before any entry replays from the next one
    let empty_start = start - ChronoDuration::hours(2);
    let empty_end = start - ChronoDuration::hours(1);
    h.oracle.pin_balance(ADDRESS, dec!(0)).await;
    let empty = h
        .reconciliation
        .reconcile(wallet.id, empty_start, empty_end)
        .await
        .unwrap();
    assert_eq!(empty.internal_balance, dec!(0));
    assert_eq!(empty.entry_count, 0);
}

#[tokio::test]
async fn test_live_mode_uses_current_balance() {
    let h = Harness::with_mode(BalanceMode::Live);
    let (wallet, start, end) = funded_wallet(&h).await;
    h.ledger.deposit(wallet.id, dec!(5), "txD").await.unwrap();

    h.oracle.pin_balance(ADDRESS, dec!(75.00)).await;
    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    assert_eq!(record.mode, BalanceMode::Live);
    assert_eq!(record.internal_balance, dec!(75.00));
    assert!(record.is_matched());
}

#[tokio::test]
async fn test_slow_oracle_fails_without_record() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    // Harness bounds oracle calls at 200ms
    h.oracle.set_latency(Duration::from_millis(500)).await;

    let err = h
        .reconciliation
        .reconcile(wallet.id, start, end)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OracleTimeout(_)));

    let history = h
        .reconciliation
        .history(wallet.id, Page::default())
        .await
        .unwrap();
    assert!(history.is_empty());

    // A caller-supplied bound overrides the default
    let record = h
        .reconciliation
        .reconcile_with_timeout(wallet.id, start, end, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(record.internal_balance, dec!(70.00));
}

#[tokio::test]
async fn test_unavailable_oracle_fails_without_record() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;
    h.oracle.set_unavailable(true).await;

    let err = h
        .reconciliation
        .reconcile(wallet.id, start, end)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::OracleUnavailable(_)));
    assert!(err.is_retryable());

    assert!(h
        .reconciliation
        .history(wallet.id, Page::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_invalid_window_and_unknown_wallet() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;

    let err = h
        .reconciliation
        .reconcile(wallet.id, end, start)
        .await
        .unwrap_err();
    assert!(err.is_client_error());

    let err = h
        .reconciliation
        .reconcile(Uuid::new_v4(), start, end)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::WalletNotFound(_)));
}

#[tokio::test]
async fn test_repeated_runs_agree_and_history_is_newest_first() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;
    h.oracle.pin_balance(ADDRESS, dec!(65.00)).await;

    let first = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();
    let second = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(first.status, second.status);
    assert_eq!(first.internal_balance, second.internal_balance);
    assert_eq!(first.external_balance, second.external_balance);
    assert_eq!(first.explanation, second.explanation);

    let history = h
        .reconciliation
        .history(wallet.id, Page::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, second.id);
    assert_eq!(history[1].id, first.id);

    // Reconciliation never touches the ledger
    assert_eq!(h.balance(wallet.id).await, dec!(70.00));
}

#[tokio::test]
async fn test_detail_includes_window_entries() {
    let h = Harness::new();
    let (wallet, start, end) = funded_wallet(&h).await;
    h.oracle.pin_balance(ADDRESS, dec!(70.00)).await;

    let record = h.reconciliation.reconcile(wallet.id, start, end).await.unwrap();
    let detail = h.reconciliation.detail(record.id).await.unwrap();

    assert_eq!(detail.record, record);
    let references: Vec<_> = detail
        .entries
        .iter()
        .map(|e| e.external_reference.as_str())
        .collect();
    assert_eq!(references, vec!["txA", "txB"]);

    let err = h.reconciliation.detail(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, LedgerError::ReconciliationNotFound(_)));
}

#[tokio::test]
async fn test_scheduler_sweep_counts_outcomes() {
    let h = Harness::new();
    let matched = h.wallet("addr-sweep-ok").await;
    let drifted = h.wallet("addr-sweep-drift").await;

    h.ledger.deposit(matched.id, dec!(10), "sweep-a").await.unwrap();
    h.ledger.deposit(drifted.id, dec!(10), "sweep-b").await.unwrap();
    h.oracle
        .insert_transaction(oracle_tx("sweep-a", COUNTERPARTY, "addr-sweep-ok", dec!(10)))
        .await;
    tokio::time::sleep(Duration::from_millis(5)).await;

    let scheduler = ReconciliationScheduler::new(
        h.reconciliation.clone(),
        ReconciliationSchedulerConfig {
            interval: Duration::from_secs(60),
            lookback: Duration::from_secs(3600),
        },
    );
    assert!(scheduler.is_enabled());

    let report = scheduler.sweep_once().await;
    assert_eq!(report.matched, 1);
    assert_eq!(report.mismatched, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.total(), 2);

    h.oracle.set_unavailable(true).await;
    let report = scheduler.sweep_once().await;
    assert_eq!(report.failed, 2);
    assert_eq!(report.errors.len(), 2);
}
