//! Postgres store tests
//!
//! Need a migrated database: `DATABASE_URL=... cargo test -- --ignored`

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use uuid::Uuid;

use wallet_ledger::{
    db, DomainError, LedgerConfig, LedgerEngine, LedgerError, MockOracle, PgLedgerStore,
};

async fn setup_engine() -> LedgerEngine {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");

    let pool = db::connect(&database_url, 10)
        .await
        .expect("Failed to connect to DB");
    assert!(
        db::check_schema(&pool).await.expect("Schema check failed"),
        "run migrations/0001_ledger.sql first"
    );

    LedgerEngine::new(
        Arc::new(PgLedgerStore::new(pool, Duration::from_secs(2))),
        Arc::new(MockOracle::new()),
        LedgerConfig::default(),
    )
}

#[tokio::test]
#[ignore]
async fn test_pg_exactly_once() {
    let engine = setup_engine().await;
    let wallet = engine
        .create_wallet(Uuid::new_v4(), "USD", None)
        .await
        .unwrap();
    let reference = format!("pg-{}", Uuid::new_v4());

    engine.deposit(wallet.id, dec!(100.00), &reference).await.unwrap();
    let err = engine
        .deposit(wallet.id, dec!(100.00), &reference)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Domain(DomainError::DuplicateTransaction { .. })
    ));

    let err = engine
        .withdraw(wallet.id, dec!(100.01), &format!("{reference}-over"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::Domain(DomainError::InsufficientBalance { .. })
    ));

    assert_eq!(engine.get_balance(wallet.id).await.unwrap().value(), dec!(100.00));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_pg_concurrent_withdrawals() {
    let engine = setup_engine().await;
    let wallet = engine
        .create_wallet(Uuid::new_v4(), "USD", None)
        .await
        .unwrap();
    let run = Uuid::new_v4();
    engine
        .deposit(wallet.id, dec!(20), &format!("fund-{run}"))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..30 {
        let engine = engine.clone();
        let wallet_id = wallet.id;
        handles.push(tokio::spawn(async move {
            engine
                .withdraw(wallet_id, dec!(1), &format!("race-{run}-{i}"))
                .await
        }));
    }

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            applied += 1;
        }
    }

    assert_eq!(applied, 20);
    assert!(engine.get_balance(wallet.id).await.unwrap().is_zero());
}
