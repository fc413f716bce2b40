//! Common test utilities
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use uuid::Uuid;

use wallet_ledger::api::AppState;
use wallet_ledger::domain::BalanceMode;
use wallet_ledger::{
    InMemoryLedgerStore, LedgerConfig, LedgerEngine, MockOracle, ReconciliationConfig,
    ReconciliationEngine, Wallet,
};

/// Both engines over one in-memory store and one scriptable oracle
pub struct Harness {
    pub store: Arc<InMemoryLedgerStore>,
    pub oracle: Arc<MockOracle>,
    pub ledger: LedgerEngine,
    pub reconciliation: ReconciliationEngine,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mode(BalanceMode::Replay)
    }

    pub fn with_mode(mode: BalanceMode) -> Self {
        let store = Arc::new(InMemoryLedgerStore::new());
        let oracle = Arc::new(MockOracle::new());

        let ledger = LedgerEngine::new(
            store.clone(),
            oracle.clone(),
            LedgerConfig {
                retry_backoff: Duration::from_millis(5),
                ..LedgerConfig::default()
            },
        )
        .with_gateway(oracle.clone());
        let reconciliation = ReconciliationEngine::new(
            store.clone(),
            oracle.clone(),
            ReconciliationConfig {
                mode,
                oracle_timeout: Duration::from_millis(200),
                ..ReconciliationConfig::default()
            },
        );

        Self {
            store,
            oracle,
            ledger,
            reconciliation,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(self.ledger.clone(), self.reconciliation.clone())
            .with_sandbox(self.oracle.clone())
    }

    /// Open a USD wallet with a fixed, recognisable address
    pub async fn wallet(&self, address: &str) -> Wallet {
        self.ledger
            .create_wallet(Uuid::new_v4(), "USD", Some(address.to_string()))
            .await
            .expect("Failed to create wallet")
    }

    pub async fn balance(&self, wallet_id: Uuid) -> Decimal {
        self.ledger
            .get_balance(wallet_id)
            .await
            .expect("Failed to read balance")
            .value()
    }
}
