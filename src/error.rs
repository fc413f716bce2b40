//! Error handling module
//!
//! The outcome type of every engine operation. Store and oracle failures are
//! folded into a small set of kinds callers can act on.

use std::time::Duration;
use uuid::Uuid;

use crate::domain::DomainError;
use crate::oracle::OracleError;
use crate::store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Rule violations
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Lookups
    #[error("Wallet not found: {0}")]
    WalletNotFound(Uuid),

    #[error("Wallet already exists for owner {owner_id} and asset {asset}")]
    WalletAlreadyExists { owner_id: Uuid, asset: String },

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Reconciliation not found: {0}")]
    ReconciliationNotFound(Uuid),

    #[error("Transaction not found on oracle: {0}")]
    OracleTransactionNotFound(String),

    // Transient
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Oracle timed out after {0:?}")]
    OracleTimeout(Duration),

    // Server side
    #[error("Internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Transient failures; the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::StoreUnavailable(_)
                | LedgerError::OracleUnavailable(_)
                | LedgerError::OracleTimeout(_)
        )
    }

    /// Caller's fault
    pub fn is_client_error(&self) -> bool {
        match self {
            LedgerError::Domain(err) => err.is_client_error(),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            LedgerError::WalletNotFound(_)
                | LedgerError::EntryNotFound(_)
                | LedgerError::ReconciliationNotFound(_)
                | LedgerError::OracleTransactionNotFound(_)
        )
    }

    pub fn is_conflict(&self) -> bool {
        match self {
            LedgerError::Domain(err) => err.is_conflict_error(),
            LedgerError::WalletAlreadyExists { .. } => true,
            _ => false,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WalletNotFound(id) => LedgerError::WalletNotFound(id),
            StoreError::WalletExists { owner_id, asset } => {
                LedgerError::WalletAlreadyExists { owner_id, asset }
            }
            StoreError::DuplicateReference(reference) => {
                LedgerError::Domain(DomainError::duplicate(reference))
            }
            StoreError::Rejected(domain) => LedgerError::Domain(domain),
            StoreError::Contention(wallet_id) => {
                LedgerError::StoreUnavailable(format!("wallet {wallet_id} is busy"))
            }
            StoreError::Unavailable(msg) => LedgerError::StoreUnavailable(msg),
            StoreError::Database(e) => LedgerError::Internal(format!("database: {e}")),
            StoreError::Serialization(e) => LedgerError::Internal(format!("serialization: {e}")),
            StoreError::Corrupt(msg) => LedgerError::Internal(msg),
        }
    }
}

impl From<OracleError> for LedgerError {
    fn from(err: OracleError) -> Self {
        match err {
            OracleError::Unavailable(msg) => LedgerError::OracleUnavailable(msg),
            OracleError::Timeout(limit) => LedgerError::OracleTimeout(limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_store_errors_map_to_ledger_kinds() {
        let err: LedgerError = StoreError::DuplicateReference("txA".into()).into();
        assert!(matches!(
            err,
            LedgerError::Domain(DomainError::DuplicateTransaction { ref reference }) if reference == "txA"
        ));
        assert!(err.is_conflict());

        let err: LedgerError = StoreError::Rejected(DomainError::insufficient_balance(
            Decimal::ONE,
            Decimal::ZERO,
        ))
        .into();
        assert!(err.is_client_error());

        let err: LedgerError = StoreError::Contention(Uuid::nil()).into();
        assert!(matches!(err, LedgerError::StoreUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_oracle_errors_map_to_ledger_kinds() {
        let err: LedgerError = OracleError::Timeout(Duration::from_secs(1)).into();
        assert!(matches!(err, LedgerError::OracleTimeout(_)));
        assert!(err.is_retryable());

        let err: LedgerError = OracleError::Unavailable("down".into()).into();
        assert!(matches!(err, LedgerError::OracleUnavailable(_)));
    }
}
