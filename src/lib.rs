//! wallet_ledger Library
//!
//! Per-wallet balance ledger with exactly-once deposits and withdrawals, and
//! reconciliation of internal balances against an external balance oracle.

pub mod api;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod jobs;
pub mod ledger;
pub mod oracle;
pub mod reconciliation;
pub mod store;

pub use config::Config;
pub use domain::{Amount, Balance, DomainError, LedgerEntry, ReconciliationRecord, Wallet};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{LedgerConfig, LedgerEngine};
pub use oracle::{BalanceOracle, MockOracle, OracleTransaction, TransferGateway};
pub use reconciliation::{ReconciliationConfig, ReconciliationEngine};
pub use store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
