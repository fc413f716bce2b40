//! Balance Oracle
//!
//! The external source of truth for balances and transaction history: a
//! bank API or a blockchain node. The core only sees this trait.

pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::domain::wallet::same_address;
use crate::domain::FlowDirection;

pub use mock::MockOracle;

/// A transaction as reported by the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleTransaction {
    /// Transaction hash or bank reference; matches `LedgerEntry::external_reference`
    pub reference: String,
    pub from: String,
    pub to: String,
    /// Always positive; direction comes from `from`/`to`
    pub amount: Decimal,
    pub confirmations: u32,
    pub timestamp: DateTime<Utc>,
}

impl OracleTransaction {
    /// Direction relative to `address`, or `None` if it does not touch it
    pub fn direction_for(&self, address: &str) -> Option<FlowDirection> {
        if same_address(&self.to, address) {
            Some(FlowDirection::Inbound)
        } else if same_address(&self.from, address) {
            Some(FlowDirection::Outbound)
        } else {
            None
        }
    }

    /// Balance effect on `address`
    pub fn signed_amount_for(&self, address: &str) -> Decimal {
        match self.direction_for(address) {
            Some(FlowDirection::Inbound) => self.amount,
            Some(FlowDirection::Outbound) => -self.amount,
            None => Decimal::ZERO,
        }
    }
}

/// Errors that can occur when querying the oracle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    #[error("Oracle did not answer within {0:?}")]
    Timeout(Duration),
}

/// Read-only view of the external ledger
#[async_trait]
pub trait BalanceOracle: Send + Sync {
    /// Balance of `address` as of `at`
    async fn balance_at(&self, address: &str, at: DateTime<Utc>) -> Result<Decimal, OracleError>;

    /// Transactions touching `address` with `start <= timestamp < end`
    async fn history_between(
        &self,
        address: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OracleTransaction>, OracleError>;

    /// Look up one transaction by reference
    async fn transaction(&self, reference: &str)
        -> Result<Option<OracleTransaction>, OracleError>;
}

/// Submits outbound transfers to the external ledger
#[async_trait]
pub trait TransferGateway: Send + Sync {
    /// Broadcast `amount` from `from` to `to`; returns the transfer reference
    async fn send_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, OracleError>;
}

/// Bound an oracle call; expiry surfaces as [`OracleError::Timeout`].
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| OracleError::Timeout(limit))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn transfer(from: &str, to: &str) -> OracleTransaction {
        OracleTransaction {
            reference: "0x01".to_string(),
            from: from.to_string(),
            to: to.to_string(),
            amount: dec!(2.5),
            confirmations: 6,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_direction_for() {
        let tx = transfer("0xa", "0xb");
        assert_eq!(tx.direction_for("0xb"), Some(FlowDirection::Inbound));
        assert_eq!(tx.direction_for("0xa"), Some(FlowDirection::Outbound));
        assert_eq!(tx.direction_for("0xc"), None);

        assert_eq!(tx.signed_amount_for("0xb"), dec!(2.5));
        assert_eq!(tx.signed_amount_for("0xa"), dec!(-2.5));
        assert_eq!(tx.signed_amount_for("0xc"), dec!(0));
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), OracleError> = bounded(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert_eq!(result, Err(OracleError::Timeout(Duration::from_millis(10))));
    }
}
