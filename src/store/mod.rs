//! Ledger Store
//!
//! Durable, transactional storage of wallets, ledger entries and
//! reconciliation records. Every backend exposes one atomic
//! read-modify-write primitive per wallet: [`LedgerStore::apply_mutation`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    DomainError, EntryQuery, LedgerEntry, Mutation, Page, ReconciliationRecord, Wallet,
};

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Errors that can occur in a store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Wallet not found
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    /// (owner_id, asset) already has a wallet
    #[error("Wallet already exists for owner {owner_id} and asset {asset}")]
    WalletExists { owner_id: Uuid, asset: String },

    /// External reference already used by another entry
    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    /// Mutation refused by the wallet's rules (e.g. insufficient balance)
    #[error(transparent)]
    Rejected(#[from] DomainError),

    /// Wallet lock could not be acquired in time, or the database
    /// aborted the transaction because of a conflict
    #[error("Contention on wallet {0}")]
    Contention(Uuid),

    /// Backend cannot be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored data violates a ledger invariant
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Check if this error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Contention(_))
    }
}

/// Durable ledger storage.
///
/// Implementations must guarantee:
/// - `apply_mutation` is atomic per wallet and serialized against other
///   mutations of the same wallet
/// - external references are unique across the whole store
/// - a wallet's balance never goes negative
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // =========================================================================
    // Wallets
    // =========================================================================

    /// Insert a new wallet. Fails with `WalletExists` when (owner, asset) is taken.
    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, StoreError>;

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError>;

    async fn find_wallet(&self, owner_id: Uuid, asset: &str)
        -> Result<Option<Wallet>, StoreError>;

    /// All wallets, oldest first
    async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError>;

    // =========================================================================
    // Entries
    // =========================================================================

    /// Lock the wallet, check the reference, plan the mutation with
    /// [`Wallet::plan_mutation`], then write the balance and the entry as one
    /// unit.
    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, StoreError>;

    async fn find_entry_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Earliest completed entry created at or after `instant`
    async fn first_entry_from(
        &self,
        wallet_id: Uuid,
        instant: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    // =========================================================================
    // Reconciliation records
    // =========================================================================

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError>;

    async fn get_reconciliation(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, StoreError>;

    /// Records for a wallet, most recent first
    async fn list_reconciliations(
        &self,
        wallet_id: Uuid,
        page: Page,
    ) -> Result<Vec<ReconciliationRecord>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_contention_is_retryable() {
        assert!(StoreError::Contention(Uuid::new_v4()).is_retryable());
        assert!(!StoreError::WalletNotFound(Uuid::new_v4()).is_retryable());
        assert!(!StoreError::DuplicateReference("tx".into()).is_retryable());
        assert!(!StoreError::Unavailable("down".into()).is_retryable());
    }
}
