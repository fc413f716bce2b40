use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::wallet::{normalize_asset, same_address, validate_asset, validate_reference};
use crate::domain::{
    Amount, Balance, DomainError, EntryQuery, LedgerEntry, Mutation, Page, SortOrder, TimeRange,
    Wallet,
};
use crate::error::{LedgerError, LedgerResult};
use crate::oracle::{bounded, BalanceOracle, TransferGateway};
use crate::store::LedgerStore;

use super::LedgerConfig;

/// Ledger engine over a store and an oracle
#[derive(Clone)]
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    oracle: Arc<dyn BalanceOracle>,
    gateway: Option<Arc<dyn TransferGateway>>,
    config: LedgerConfig,
}

impl LedgerEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        oracle: Arc<dyn BalanceOracle>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            gateway: None,
            config,
        }
    }

    /// Enable outbound transfers through `gateway`
    pub fn with_gateway(mut self, gateway: Arc<dyn TransferGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Open a wallet for (owner, asset). A random address is generated when
    /// none is supplied.
    pub async fn create_wallet(
        &self,
        owner_id: Uuid,
        asset: &str,
        address: Option<String>,
    ) -> LedgerResult<Wallet> {
        validate_asset(asset)?;
        let address = address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());

        let wallet = self
            .store
            .create_wallet(&Wallet::new(owner_id, asset, address))
            .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            owner_id = %wallet.owner_id,
            asset = %wallet.asset,
            "Wallet created"
        );

        Ok(wallet)
    }

    pub async fn get_wallet(&self, wallet_id: Uuid) -> LedgerResult<Wallet> {
        self.store
            .get_wallet(wallet_id)
            .await?
            .ok_or(LedgerError::WalletNotFound(wallet_id))
    }

    pub async fn find_wallet(&self, owner_id: Uuid, asset: &str) -> LedgerResult<Option<Wallet>> {
        Ok(self
            .store
            .find_wallet(owner_id, &normalize_asset(asset))
            .await?)
    }

    pub async fn list_wallets(&self) -> LedgerResult<Vec<Wallet>> {
        Ok(self.store.list_wallets().await?)
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Credit `amount` to the wallet under idempotency key `reference`
    pub async fn deposit(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> LedgerResult<LedgerEntry> {
        let amount = Amount::new(amount).map_err(DomainError::from)?;
        self.apply(Mutation::deposit(wallet_id, amount, reference))
            .await
    }

    /// Debit `amount` from the wallet under idempotency key `reference`
    pub async fn withdraw(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        reference: &str,
    ) -> LedgerResult<LedgerEntry> {
        let amount = Amount::new(amount).map_err(DomainError::from)?;
        self.apply(Mutation::withdraw(wallet_id, amount, reference))
            .await
    }

    /// Send `amount` from the wallet to an external address and book the
    /// withdrawal under the reference the gateway returns.
    ///
    /// The balance is checked before broadcasting and again when booking. A
    /// transfer that goes out but cannot be booked is logged; reconciliation
    /// reports it as an unrecorded outbound transaction.
    pub async fn withdraw_to_address(
        &self,
        wallet_id: Uuid,
        to_address: &str,
        amount: Decimal,
    ) -> LedgerResult<LedgerEntry> {
        let amount = Amount::new(amount).map_err(DomainError::from)?;
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            LedgerError::OracleUnavailable("no transfer gateway configured".to_string())
        })?;

        let to_address = to_address.trim();
        if to_address.is_empty() {
            return Err(
                DomainError::InvalidAddress("destination must not be empty".to_string()).into(),
            );
        }

        let wallet = self.get_wallet(wallet_id).await?;
        if same_address(to_address, &wallet.address) {
            return Err(DomainError::InvalidAddress(format!(
                "{to_address} is the wallet's own address"
            ))
            .into());
        }
        if !wallet.balance.is_sufficient_for(&amount) {
            return Err(
                DomainError::insufficient_balance(amount.value(), wallet.balance.value()).into(),
            );
        }

        let reference = bounded(
            self.config.oracle_timeout,
            gateway.send_transfer(&wallet.address, to_address, amount.value()),
        )
        .await?;

        tracing::info!(
            wallet_id = %wallet.id,
            %reference,
            to = %to_address,
            amount = %amount,
            "Transfer broadcast"
        );

        let mutation = Mutation::withdraw(wallet.id, amount, reference.as_str())
            .with_description(format!("Transfer to {to_address}"));

        self.apply(mutation).await.map_err(|err| {
            tracing::error!(
                wallet_id = %wallet.id,
                %reference,
                error = %err,
                "Broadcast transfer could not be booked"
            );
            err
        })
    }

    /// Apply a prepared mutation.
    ///
    /// Store contention is retried up to `max_retries` times with linear
    /// backoff. A reference that was already applied fails with
    /// `DuplicateTransaction` and leaves the wallet untouched.
    pub async fn apply(&self, mutation: Mutation) -> LedgerResult<LedgerEntry> {
        validate_reference(&mutation.reference)?;

        let max_retries = self.config.max_retries;
        let mut attempt: u32 = 0;

        loop {
            match self.store.apply_mutation(&mutation).await {
                Ok(entry) => {
                    tracing::info!(
                        wallet_id = %entry.wallet_id,
                        reference = %entry.external_reference,
                        kind = %entry.kind,
                        amount = %entry.amount,
                        balance_before = %entry.balance_before,
                        balance_after = %entry.balance_after,
                        "Mutation applied"
                    );
                    return Ok(entry);
                }
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        wallet_id = %mutation.wallet_id,
                        reference = %mutation.reference,
                        "Wallet contention, retrying (attempt {}/{})",
                        attempt,
                        max_retries
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                Err(err) => {
                    let err = LedgerError::from(err);
                    if err.is_conflict() {
                        tracing::info!(reference = %mutation.reference, "Duplicate mutation ignored");
                    } else {
                        tracing::debug!(
                            wallet_id = %mutation.wallet_id,
                            reference = %mutation.reference,
                            error = %err,
                            "Mutation refused"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Credit a deposit observed on the oracle once it has enough
    /// confirmations and was sent to this wallet's address.
    pub async fn credit_observed_deposit(
        &self,
        wallet_id: Uuid,
        reference: &str,
    ) -> LedgerResult<LedgerEntry> {
        validate_reference(reference)?;
        let wallet = self.get_wallet(wallet_id).await?;

        // Fast path; the store re-checks inside the atomic unit
        if self.store.find_entry_by_reference(reference).await?.is_some() {
            return Err(DomainError::duplicate(reference).into());
        }

        let tx = bounded(self.config.oracle_timeout, self.oracle.transaction(reference))
            .await?
            .ok_or_else(|| LedgerError::OracleTransactionNotFound(reference.to_string()))?;

        if tx.confirmations < self.config.min_confirmations {
            tracing::debug!(
                %reference,
                confirmations = tx.confirmations,
                required = self.config.min_confirmations,
                "Deposit not yet confirmed"
            );
            return Err(DomainError::InsufficientConfirmations {
                reference: reference.to_string(),
                confirmations: tx.confirmations,
                required: self.config.min_confirmations,
            }
            .into());
        }

        if !same_address(&tx.to, &wallet.address) {
            return Err(DomainError::RecipientMismatch {
                reference: reference.to_string(),
                expected: wallet.address,
                found: tx.to,
            }
            .into());
        }

        let amount = Amount::new(tx.amount).map_err(DomainError::from)?;
        let mutation = Mutation::deposit(wallet.id, amount, reference)
            .with_description(format!("Observed deposit from {}", tx.from));

        self.apply(mutation).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get_balance(&self, wallet_id: Uuid) -> LedgerResult<Balance> {
        Ok(self.get_wallet(wallet_id).await?.balance)
    }

    pub async fn list_entries(
        &self,
        wallet_id: Uuid,
        range: TimeRange,
        page: Page,
        order: SortOrder,
    ) -> LedgerResult<Vec<LedgerEntry>> {
        // Distinguish "no entries" from "no wallet"
        self.get_wallet(wallet_id).await?;

        Ok(self
            .store
            .list_entries(&EntryQuery::paged(wallet_id, range, page, order))
            .await?)
    }

    /// Look up an entry by its external reference, e.g. after a duplicate signal
    pub async fn find_entry(&self, reference: &str) -> LedgerResult<Option<LedgerEntry>> {
        Ok(self.store.find_entry_by_reference(reference).await?)
    }
}
