//! Scheduled Jobs
//!
//! Periodic reconciliation sweep over every wallet.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

use crate::reconciliation::ReconciliationEngine;

/// Configuration for the reconciliation sweep
#[derive(Debug, Clone)]
pub struct ReconciliationSchedulerConfig {
    /// Time between sweeps; zero disables the scheduler
    pub interval: Duration,
    /// Each sweep reconciles `[now - lookback, now)`
    pub lookback: Duration,
}

impl Default for ReconciliationSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::ZERO,
            lookback: Duration::from_secs(86_400),
        }
    }
}

/// Report from one sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub matched: u32,
    pub mismatched: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

impl SweepReport {
    pub fn total(&self) -> u32 {
        self.matched + self.mismatched + self.failed
    }
}

/// Runs a reconciliation for every wallet on a fixed interval
pub struct ReconciliationScheduler {
    engine: ReconciliationEngine,
    config: ReconciliationSchedulerConfig,
}

impl ReconciliationScheduler {
    pub fn new(engine: ReconciliationEngine, config: ReconciliationSchedulerConfig) -> Self {
        Self { engine, config }
    }

    pub fn is_enabled(&self) -> bool {
        !self.config.interval.is_zero()
    }

    /// Start the scheduler in the background.
    ///
    /// Returns `None` when the interval is zero. The handle can be used to
    /// abort the scheduler on shutdown.
    pub fn start(self) -> Option<tokio::task::JoinHandle<()>> {
        if !self.is_enabled() {
            tracing::info!("Reconciliation scheduler disabled");
            return None;
        }
        Some(tokio::spawn(async move {
            self.run().await;
        }))
    }

    async fn run(&self) {
        tracing::info!(
            interval_secs = self.config.interval.as_secs(),
            lookback_secs = self.config.lookback.as_secs(),
            "Reconciliation scheduler started"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.sweep_once().await;
            tracing::info!(
                matched = report.matched,
                mismatched = report.mismatched,
                failed = report.failed,
                "Reconciliation sweep finished"
            );
        }
    }

    /// Reconcile every wallet once over the lookback window.
    ///
    /// A failure for one wallet is logged and counted; the sweep goes on.
    pub async fn sweep_once(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let end = Utc::now();
        let lookback = chrono::Duration::from_std(self.config.lookback)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let start = end - lookback;

        let wallets = match self.engine_wallets().await {
            Ok(wallets) => wallets,
            Err(e) => {
                tracing::error!(error = %e, "Could not list wallets for sweep");
                report.errors.push(format!("List wallets: {}", e));
                report.completed_at = Utc::now();
                return report;
            }
        };

        for wallet_id in wallets {
            match self.engine.reconcile(wallet_id, start, end).await {
                Ok(record) if record.is_matched() => report.matched += 1,
                Ok(_) => report.mismatched += 1,
                Err(e) => {
                    tracing::error!(wallet_id = %wallet_id, error = %e, "Reconciliation failed");
                    report.failed += 1;
                    report.errors.push(format!("{}: {}", wallet_id, e));
                }
            }
        }

        report.completed_at = Utc::now();
        report
    }

    async fn engine_wallets(&self) -> crate::LedgerResult<Vec<uuid::Uuid>> {
        Ok(self
            .engine
            .wallets()
            .await?
            .into_iter()
            .map(|w| w.id)
            .collect())
    }
}
