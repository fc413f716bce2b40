use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::entry::net_of;
use crate::domain::reconciliation::classify;
use crate::domain::{
    BalanceMode, Discrepancy, EntryQuery, LedgerEntry, Page, ReconciliationRecord,
    ReconciliationStatus, TimeRange, Wallet,
};
use crate::error::{LedgerError, LedgerResult};
use crate::oracle::{bounded, BalanceOracle, OracleTransaction};
use crate::store::LedgerStore;

use super::ReconciliationConfig;

/// A record together with the entries of its window, oldest first
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationDetail {
    pub record: ReconciliationRecord,
    pub entries: Vec<LedgerEntry>,
}

/// Reconciliation engine. Never mutates balances or entries.
#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn BalanceOracle>,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Arc<dyn BalanceOracle>,
        config: ReconciliationConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            config,
        }
    }

    pub fn config(&self) -> &ReconciliationConfig {
        &self.config
    }

    /// Reconcile `[start, end)` with the configured oracle timeout
    pub async fn reconcile(
        &self,
        wallet_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LedgerResult<ReconciliationRecord> {
        self.reconcile_with_timeout(wallet_id, start, end, self.config.oracle_timeout)
            .await
    }

    /// Reconcile `[start, end)`, bounding each oracle call by `timeout`.
    ///
    /// An oracle timeout or outage fails the run and persists nothing.
    pub async fn reconcile_with_timeout(
        &self,
        wallet_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timeout: Duration,
    ) -> LedgerResult<ReconciliationRecord> {
        let range = TimeRange::new(start, end)?;
        let wallet = self
            .store
            .get_wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))?;

        let entries = self
            .store
            .list_entries(&EntryQuery::window(wallet_id, range))
            .await?;

        let internal_balance = self.internal_balance(&wallet, &entries, range).await?;

        let (external_balance, history) = tokio::try_join!(
            bounded(timeout, self.oracle.balance_at(&wallet.address, range.end)),
            bounded(
                timeout,
                self.oracle
                    .history_between(&wallet.address, range.start, range.end)
            ),
        )
        .map_err(|err| {
            tracing::warn!(wallet_id = %wallet_id, error = %err, "Oracle query failed");
            LedgerError::from(err)
        })?;

        let difference = internal_balance - external_balance;
        let status = classify(difference, self.config.tolerance);
        let explanation = match status {
            ReconciliationStatus::Matched => Vec::new(),
            ReconciliationStatus::Mismatch => explain(&wallet.address, &entries, &history),
        };

        let record = ReconciliationRecord {
            id: Uuid::new_v4(),
            wallet_id,
            window_start: range.start,
            window_end: range.end,
            mode: self.config.mode,
            internal_balance,
            external_balance,
            difference,
            tolerance: self.config.tolerance,
            status,
            explanation,
            entry_count: u32::try_from(entries.len()).unwrap_or(u32::MAX),
            created_at: Utc::now(),
        };

        self.store.save_reconciliation(&record).await?;

        match record.status {
            ReconciliationStatus::Matched => tracing::info!(
                wallet_id = %wallet_id,
                reconciliation_id = %record.id,
                internal = %record.internal_balance,
                external = %record.external_balance,
                "Reconciliation matched"
            ),
            ReconciliationStatus::Mismatch => tracing::warn!(
                wallet_id = %wallet_id,
                reconciliation_id = %record.id,
                internal = %record.internal_balance,
                external = %record.external_balance,
                difference = %record.difference,
                references = ?record
                    .explanation
                    .iter()
                    .map(Discrepancy::reference)
                    .collect::<Vec<_>>(),
                "Reconciliation mismatch"
            ),
        }

        Ok(record)
    }

    /// Balance the ledger says the wallet held at the end of `range`
    async fn internal_balance(
        &self,
        wallet: &Wallet,
        entries: &[LedgerEntry],
        range: TimeRange,
    ) -> LedgerResult<Decimal> {
        match self.config.mode {
            BalanceMode::Live => Ok(wallet.balance.value()),
            BalanceMode::Replay => {
                let initial = match entries.first() {
                    Some(first) => first.balance_before.value(),
                    // Nothing in the window: the next later entry still
                    // carries the balance that held throughout it
                    None => match self.store.first_entry_from(wallet.id, range.start).await? {
                        Some(later) => later.balance_before.value(),
                        None => wallet.balance.value(),
                    },
                };
                Ok(initial + net_of(entries))
            }
        }
    }

    /// Every wallet a sweep should cover
    pub async fn wallets(&self) -> LedgerResult<Vec<Wallet>> {
        Ok(self.store.list_wallets().await?)
    }

    /// Past runs for a wallet, most recent first
    pub async fn history(
        &self,
        wallet_id: Uuid,
        page: Page,
    ) -> LedgerResult<Vec<ReconciliationRecord>> {
        if self.store.get_wallet(wallet_id).await?.is_none() {
            return Err(LedgerError::WalletNotFound(wallet_id));
        }
        Ok(self.store.list_reconciliations(wallet_id, page).await?)
    }

    pub async fn detail(&self, reconciliation_id: Uuid) -> LedgerResult<ReconciliationDetail> {
        let record = self
            .store
            .get_reconciliation(reconciliation_id)
            .await?
            .ok_or(LedgerError::ReconciliationNotFound(reconciliation_id))?;

        let range = TimeRange {
            start: record.window_start,
            end: record.window_end,
        };
        let entries = self
            .store
            .list_entries(&EntryQuery::window(record.wallet_id, range))
            .await?;

        Ok(ReconciliationDetail { record, entries })
    }
}

/// Explain a mismatch by matching entries and oracle transactions on reference
pub fn explain(
    address: &str,
    entries: &[LedgerEntry],
    history: &[OracleTransaction],
) -> Vec<Discrepancy> {
    let external: HashMap<&str, &OracleTransaction> = history
        .iter()
        .map(|tx| (tx.reference.as_str(), tx))
        .collect();

    let mut discrepancies = Vec::new();

    for entry in entries {
        match external.get(entry.external_reference.as_str()) {
            None => discrepancies.push(Discrepancy::MissingExternally {
                reference: entry.external_reference.clone(),
                amount: entry.amount.value(),
            }),
            Some(tx) if tx.amount != entry.amount.value() => {
                discrepancies.push(Discrepancy::AmountMismatch {
                    reference: entry.external_reference.clone(),
                    internal: entry.amount.value(),
                    external: tx.amount,
                })
            }
            Some(_) => {}
        }
    }

    let internal: HashSet<&str> = entries
        .iter()
        .map(|e| e.external_reference.as_str())
        .collect();

    for tx in history {
        if internal.contains(tx.reference.as_str()) {
            continue;
        }
        if let Some(direction) = tx.direction_for(address) {
            discrepancies.push(Discrepancy::UnrecordedExternally {
                reference: tx.reference.clone(),
                amount: tx.amount,
                direction,
            });
        }
    }

    discrepancies
}
