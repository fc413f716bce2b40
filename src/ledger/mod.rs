//! Ledger Engine
//!
//! Applies deposits and withdrawals with exactly-once semantics and keeps
//! every wallet balance equal to the net of its completed entries.

mod engine;

pub use engine::LedgerEngine;

use std::time::Duration;

/// Tunables for [`LedgerEngine`]
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Confirmations an observed deposit needs before it is credited
    pub min_confirmations: u32,

    /// Bound on each oracle call
    pub oracle_timeout: Duration,

    /// Contention retries per mutation (attempts = retries + 1)
    pub max_retries: u32,

    /// Linear backoff unit between retries
    pub retry_backoff: Duration,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            min_confirmations: 6,
            oracle_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}
