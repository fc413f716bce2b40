//! In-memory Ledger Store
//!
//! Process-local backend used by tests, the stress tool and the default
//! development server. Mutations of one wallet serialize on a per-wallet
//! async mutex; different wallets proceed in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::domain::{
    EntryQuery, LedgerEntry, Mutation, Page, ReconciliationRecord, SortOrder, Wallet,
};

use super::{LedgerStore, StoreError};

/// Default bound on wallet lock acquisition
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// In-memory store
#[derive(Debug)]
pub struct InMemoryLedgerStore {
    wallets: RwLock<HashMap<Uuid, Wallet>>,
    wallet_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
    entries: RwLock<HashMap<Uuid, Vec<LedgerEntry>>>,
    /// Every committed reference, across all wallets
    references: Mutex<HashSet<String>>,
    reconciliations: RwLock<Vec<ReconciliationRecord>>,
    lock_timeout: Duration,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            wallets: RwLock::new(HashMap::new()),
            wallet_locks: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
            references: Mutex::new(HashSet::new()),
            reconciliations: RwLock::new(Vec::new()),
            lock_timeout,
        }
    }

    pub(crate) async fn wallet_lock(
        &self,
        wallet_id: Uuid,
    ) -> Result<Arc<Mutex<()>>, StoreError> {
        self.wallet_locks
            .read()
            .await
            .get(&wallet_id)
            .cloned()
            .ok_or(StoreError::WalletNotFound(wallet_id))
    }

}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        let mut wallets = self.wallets.write().await;

        let taken = wallets
            .values()
            .any(|w| w.owner_id == wallet.owner_id && w.asset == wallet.asset);
        if taken {
            return Err(StoreError::WalletExists {
                owner_id: wallet.owner_id,
                asset: wallet.asset.clone(),
            });
        }

        wallets.insert(wallet.id, wallet.clone());
        self.wallet_locks
            .write()
            .await
            .insert(wallet.id, Arc::new(Mutex::new(())));

        Ok(wallet.clone())
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        Ok(self.wallets.read().await.get(&wallet_id).cloned())
    }

    async fn find_wallet(
        &self,
        owner_id: Uuid,
        asset: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        Ok(self
            .wallets
            .read()
            .await
            .values()
            .find(|w| w.owner_id == owner_id && w.asset == asset)
            .cloned())
    }

    async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let mut wallets: Vec<Wallet> = self.wallets.read().await.values().cloned().collect();
        wallets.sort_by_key(|w| (w.created_at, w.id));
        Ok(wallets)
    }

    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, StoreError> {
        let lock = self.wallet_lock(mutation.wallet_id).await?;
        let _guard = tokio::time::timeout(self.lock_timeout, lock.lock_owned())
            .await
            .map_err(|_| StoreError::Contention(mutation.wallet_id))?;

        // Take every guard up front. Past this point there is no await, so a
        // dropped future either changed nothing or committed everything.
        let mut wallets = self.wallets.write().await;
        let mut entries = self.entries.write().await;
        let mut references = self.references.lock().await;

        if references.contains(&mutation.reference) {
            return Err(StoreError::DuplicateReference(mutation.reference.clone()));
        }

        let current = wallets
            .get(&mutation.wallet_id)
            .ok_or(StoreError::WalletNotFound(mutation.wallet_id))?;
        let (updated, entry) = current.plan_mutation(mutation, Utc::now())?;

        references.insert(mutation.reference.clone());
        wallets.insert(updated.id, updated);
        entries
            .entry(entry.wallet_id)
            .or_default()
            .push(entry.clone());

        Ok(entry)
    }

    async fn find_entry_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .flatten()
            .find(|e| e.external_reference == reference)
            .cloned())
    }

    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        let entries = self.entries.read().await;
        let mut matching: Vec<LedgerEntry> = entries
            .get(&query.wallet_id)
            .map(|list| {
                list.iter()
                    .filter(|e| query.range.contains(e.created_at))
                    .filter(|e| !query.completed_only || e.is_completed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matching.sort_by_key(|e| e.created_at);
        if query.order == SortOrder::Descending {
            matching.reverse();
        }

        Ok(match query.page {
            Some(page) => matching
                .into_iter()
                .skip(page.offset())
                .take(page.limit())
                .collect(),
            None => matching,
        })
    }

    async fn first_entry_from(
        &self,
        wallet_id: Uuid,
        instant: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self.entries.read().await.get(&wallet_id).and_then(|list| {
            // Appended in order, so the first match is the earliest
            list.iter()
                .find(|e| e.is_completed() && e.created_at >= instant)
                .cloned()
        }))
    }

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError> {
        self.reconciliations.write().await.push(record.clone());
        Ok(())
    }

    async fn get_reconciliation(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, StoreError> {
        Ok(self
            .reconciliations
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn list_reconciliations(
        &self,
        wallet_id: Uuid,
        page: Page,
    ) -> Result<Vec<ReconciliationRecord>, StoreError> {
        let records = self.reconciliations.read().await;
        // Stored in insertion order; walk backwards for most recent first
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.wallet_id == wallet_id)
            .skip(page.offset())
            .take(page.limit())
            .cloned()
            .collect())
    }
}
