//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use super::money::MoneyError;

/// Ledger rule violations.
///
/// These are produced by the pure planning functions on [`crate::domain::Wallet`]
/// and by the engines before any store access. They never depend on the
/// storage or transport layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Zero, negative, malformed or out-of-range amount
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal larger than the current balance
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Idempotency key already applied somewhere in the ledger
    #[error("Duplicate transaction: {reference}")]
    DuplicateTransaction { reference: String },

    /// Oracle-observed deposit has not reached the confirmation threshold
    #[error("Insufficient confirmations for {reference}: {confirmations}/{required}")]
    InsufficientConfirmations {
        reference: String,
        confirmations: u32,
        required: u32,
    },

    /// Oracle-observed deposit was sent to a different address
    #[error("Transaction {reference} was sent to {found}, not to wallet address {expected}")]
    RecipientMismatch {
        reference: String,
        expected: String,
        found: String,
    },

    /// Empty or inverted time window
    #[error("Invalid window: start {start} must be before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// Idempotency key is empty or too long
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Asset code is empty or malformed
    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    /// Transfer destination is empty or the wallet's own address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

impl DomainError {
    /// Create an insufficient balance error
    pub fn insufficient_balance(required: Decimal, available: Decimal) -> Self {
        Self::InsufficientBalance {
            required,
            available,
        }
    }

    /// Create a duplicate transaction error
    pub fn duplicate(reference: impl Into<String>) -> Self {
        Self::DuplicateTransaction {
            reference: reference.into(),
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount(_)
                | Self::InsufficientBalance { .. }
                | Self::InsufficientConfirmations { .. }
                | Self::RecipientMismatch { .. }
                | Self::InvalidWindow { .. }
                | Self::InvalidReference(_)
                | Self::InvalidAsset(_)
                | Self::InvalidAddress(_)
        )
    }

    /// Check if this is a conflict error (state already changed)
    pub fn is_conflict_error(&self) -> bool {
        matches!(self, Self::DuplicateTransaction { .. })
    }
}

impl From<MoneyError> for DomainError {
    fn from(err: MoneyError) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_error() {
        let err = DomainError::insufficient_balance(Decimal::new(100, 0), Decimal::new(50, 0));

        assert!(err.is_client_error());
        assert!(!err.is_conflict_error());
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn test_duplicate_error() {
        let err = DomainError::duplicate("0xabc");

        assert!(!err.is_client_error());
        assert!(err.is_conflict_error());
        assert_eq!(err.to_string(), "Duplicate transaction: 0xabc");
    }

    #[test]
    fn test_money_error_maps_to_invalid_amount() {
        let err: DomainError = MoneyError::NotPositive(Decimal::ZERO).into();
        assert!(matches!(err, DomainError::InvalidAmount(_)));
    }
}
