//! Mock Balance Oracle
//!
//! Deterministic in-process stand-in for a bank API or chain node. There are
//! no background tasks: confirmations only move when [`MockOracle::advance_blocks`]
//! is called.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

use super::{BalanceOracle, OracleError, OracleTransaction, TransferGateway};

#[derive(Debug, Default)]
struct MockState {
    transactions: Vec<OracleTransaction>,
    pinned: HashMap<String, Decimal>,
    unavailable: bool,
    latency: Duration,
    nonce: u64,
    height: u64,
}

/// Scriptable oracle for tests and the development server
#[derive(Debug, Default)]
pub struct MockOracle {
    state: RwLock<MockState>,
}

impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Scripting
    // =========================================================================

    /// Record a transfer observed now, with zero confirmations
    pub async fn record_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> OracleTransaction {
        self.record_transfer_at(from, to, amount, Utc::now()).await
    }

    /// Record a transfer at a given time, with zero confirmations
    pub async fn record_transfer_at(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
        timestamp: DateTime<Utc>,
    ) -> OracleTransaction {
        let mut state = self.state.write().await;
        state.nonce += 1;

        let tx = OracleTransaction {
            reference: transfer_reference(from, to, amount, state.nonce),
            from: from.to_string(),
            to: to.to_string(),
            amount,
            confirmations: 0,
            timestamp,
        };
        state.transactions.push(tx.clone());

        tracing::debug!(reference = %tx.reference, %from, %to, %amount, "Mock transfer recorded");
        tx
    }

    /// Seed an arbitrary transaction, replacing one with the same reference
    pub async fn insert_transaction(&self, tx: OracleTransaction) {
        let mut state = self.state.write().await;
        state.transactions.retain(|t| t.reference != tx.reference);
        state.transactions.push(tx);
    }

    /// Mine `blocks` blocks: every known transaction gains that many confirmations
    pub async fn advance_blocks(&self, blocks: u32) {
        let mut state = self.state.write().await;
        state.height += u64::from(blocks);
        for tx in state.transactions.iter_mut() {
            tx.confirmations = tx.confirmations.saturating_add(blocks);
        }
    }

    /// Report a fixed balance for `address` regardless of history
    pub async fn pin_balance(&self, address: &str, balance: Decimal) {
        self.state
            .write()
            .await
            .pinned
            .insert(address.to_string(), balance);
    }

    /// Make every query fail with `OracleError::Unavailable`
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Delay every query by `latency`
    pub async fn set_latency(&self, latency: Duration) {
        self.state.write().await.latency = latency;
    }

    pub async fn block_height(&self) -> u64 {
        self.state.read().await.height
    }

    /// Apply latency and availability before answering
    async fn gate(&self) -> Result<(), OracleError> {
        let (latency, unavailable) = {
            let state = self.state.read().await;
            (state.latency, state.unavailable)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if unavailable {
            return Err(OracleError::Unavailable("mock oracle offline".to_string()));
        }
        Ok(())
    }
}

/// Deterministic `0x`-prefixed SHA-256 reference
fn transfer_reference(from: &str, to: &str, amount: Decimal, nonce: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from.as_bytes());
    hasher.update(b":");
    hasher.update(to.as_bytes());
    hasher.update(b":");
    hasher.update(amount.normalize().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(nonce.to_be_bytes());
    format!("0x{}", hex::encode(hasher.finalize()))
}

#[async_trait]
impl BalanceOracle for MockOracle {
    async fn balance_at(&self, address: &str, at: DateTime<Utc>) -> Result<Decimal, OracleError> {
        self.gate().await?;
        let state = self.state.read().await;

        if let Some(pinned) = state.pinned.get(address) {
            return Ok(*pinned);
        }

        Ok(state
            .transactions
            .iter()
            .filter(|tx| tx.timestamp < at)
            .map(|tx| tx.signed_amount_for(address))
            .sum())
    }

    async fn history_between(
        &self,
        address: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<OracleTransaction>, OracleError> {
        self.gate().await?;
        let state = self.state.read().await;

        let mut history: Vec<OracleTransaction> = state
            .transactions
            .iter()
            .filter(|tx| tx.timestamp >= start && tx.timestamp < end)
            .filter(|tx| tx.direction_for(address).is_some())
            .cloned()
            .collect();
        history.sort_by_key(|tx| tx.timestamp);
        Ok(history)
    }

    async fn transaction(
        &self,
        reference: &str,
    ) -> Result<Option<OracleTransaction>, OracleError> {
        self.gate().await?;
        Ok(self
            .state
            .read()
            .await
            .transactions
            .iter()
            .find(|tx| tx.reference == reference)
            .cloned())
    }
}

#[async_trait]
impl TransferGateway for MockOracle {
    async fn send_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<String, OracleError> {
        self.gate().await?;
        Ok(self.record_transfer(from, to, amount).await.reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_record_transfer_starts_unconfirmed() {
        let oracle = MockOracle::new();
        let tx = oracle.record_transfer("0xa", "0xb", dec!(1.5)).await;

        assert_eq!(tx.confirmations, 0);
        assert!(tx.reference.starts_with("0x"));
        assert_eq!(tx.reference.len(), 66);

        oracle.advance_blocks(6).await;
        let found = oracle.transaction(&tx.reference).await.unwrap().unwrap();
        assert_eq!(found.confirmations, 6);
        assert_eq!(oracle.block_height().await, 6);
    }

    #[tokio::test]
    async fn test_references_are_unique_per_transfer() {
        let oracle = MockOracle::new();
        let a = oracle.record_transfer("0xa", "0xb", dec!(1)).await;
        let b = oracle.record_transfer("0xa", "0xb", dec!(1)).await;
        assert_ne!(a.reference, b.reference);
    }

    #[tokio::test]
    async fn test_balance_derived_from_history() {
        let oracle = MockOracle::new();
        let t0 = Utc::now() - ChronoDuration::minutes(10);

        oracle
            .record_transfer_at("faucet", "0xw", dec!(100), t0)
            .await;
        oracle
            .record_transfer_at("0xw", "0xshop", dec!(30), t0 + ChronoDuration::minutes(1))
            .await;

        let before = oracle
            .balance_at("0xw", t0 + ChronoDuration::seconds(30))
            .await
            .unwrap();
        assert_eq!(before, dec!(100));

        let now = oracle.balance_at("0xw", Utc::now()).await.unwrap();
        assert_eq!(now, dec!(70));

        oracle.pin_balance("0xw", dec!(65)).await;
        assert_eq!(oracle.balance_at("0xw", Utc::now()).await.unwrap(), dec!(65));
    }

    #[tokio::test]
    async fn test_history_filters_window_and_address() {
        let oracle = MockOracle::new();
        let t0 = Utc::now() - ChronoDuration::minutes(10);

        oracle.record_transfer_at("faucet", "0xw", dec!(1), t0).await;
        oracle
            .record_transfer_at("faucet", "0xother", dec!(2), t0)
            .await;
        oracle
            .record_transfer_at("0xw", "0xshop", dec!(3), t0 + ChronoDuration::minutes(5))
            .await;

        let history = oracle
            .history_between("0xw", t0, t0 + ChronoDuration::minutes(5))
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, dec!(1));
    }

    #[tokio::test]
    async fn test_unavailable() {
        let oracle = MockOracle::new();
        oracle.set_unavailable(true).await;

        assert!(matches!(
            oracle.balance_at("0xw", Utc::now()).await,
            Err(OracleError::Unavailable(_))
        ));
        assert!(oracle.send_transfer("0xw", "0xshop", dec!(1)).await.is_err());

        oracle.set_unavailable(false).await;
        assert!(oracle
            .history_between("0xw", DateTime::UNIX_EPOCH, Utc::now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_sent_transfer_is_observable() {
        let oracle = MockOracle::new();
        let reference = oracle
            .send_transfer("0xw", "0xshop", dec!(2.5))
            .await
            .unwrap();

        let tx = oracle.transaction(&reference).await.unwrap().unwrap();
        assert_eq!(tx.to, "0xshop");
        assert_eq!(tx.confirmations, 0);
        let later = Utc::now() + ChronoDuration::seconds(1);
        assert_eq!(oracle.balance_at("0xw", later).await.unwrap(), dec!(-2.5));
    }
}
