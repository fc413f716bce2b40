//! Reconciliation Engine
//!
//! Recomputes a wallet's balance from its ledger entries, compares it with
//! the balance the oracle reports, and records the classified outcome.

mod engine;

pub use engine::{explain, ReconciliationDetail, ReconciliationEngine};

use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::BalanceMode;

/// Tunables for [`ReconciliationEngine`]
#[derive(Debug, Clone)]
pub struct ReconciliationConfig {
    /// Largest |internal - external| still classified as matched
    pub tolerance: Decimal,

    pub mode: BalanceMode,

    /// Default bound on each oracle call
    pub oracle_timeout: Duration,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            tolerance: Decimal::new(1, 4),
            mode: BalanceMode::Replay,
            oracle_timeout: Duration::from_secs(5),
        }
    }
}
