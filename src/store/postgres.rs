//! PostgreSQL Ledger Store
//!
//! Each mutation runs in one transaction: the wallet row is locked with
//! `SELECT ... FOR UPDATE` under a bounded `lock_timeout`, the reference and
//! balance are checked, then the balance update and entry insert commit
//! together. The unique index on `external_reference` backs up the
//! in-transaction duplicate check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Amount, Balance, EntryQuery, LedgerEntry, Mutation, Page, ReconciliationRecord, SortOrder,
    Wallet,
};

use super::{LedgerStore, StoreError};

/// Unique index on (owner_id, asset)
const WALLET_OWNER_ASSET_KEY: &str = "wallets_owner_id_asset_key";

type WalletRow = (Uuid, Uuid, String, String, Decimal, DateTime<Utc>, DateTime<Utc>);

type EntryRow = (
    Uuid,
    Uuid,
    String,
    Decimal,
    Decimal,
    Decimal,
    String,
    String,
    Option<String>,
    DateTime<Utc>,
);

type ReconciliationRow = (
    Uuid,
    Uuid,
    DateTime<Utc>,
    DateTime<Utc>,
    String,
    Decimal,
    Decimal,
    Decimal,
    Decimal,
    String,
    serde_json::Value,
    i32,
    DateTime<Utc>,
);

const WALLET_COLUMNS: &str = "id, owner_id, asset, address, balance, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, wallet_id, kind, amount, balance_before, balance_after, \
     status, external_reference, description, created_at";

const RECONCILIATION_COLUMNS: &str = "id, wallet_id, window_start, window_end, mode, \
     internal_balance, external_balance, difference, tolerance, status, explanation, \
     entry_count, created_at";

/// Postgres-backed store
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Single attempt of the atomic mutation
    async fn try_apply(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        mutation: &Mutation,
    ) -> Result<LedgerEntry, StoreError> {
        // SET cannot take bind parameters; the value is an integer we own
        let set_timeout = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&set_timeout).execute(&mut **tx).await?;

        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1 FOR UPDATE"
        ))
        .bind(mutation.wallet_id)
        .fetch_optional(&mut **tx)
        .await?;

        let wallet = match row {
            Some(row) => wallet_from_row(row)?,
            None => return Err(StoreError::WalletNotFound(mutation.wallet_id)),
        };

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM ledger_entries WHERE external_reference = $1)",
        )
        .bind(&mutation.reference)
        .fetch_one(&mut **tx)
        .await?;

        if exists {
            return Err(StoreError::DuplicateReference(mutation.reference.clone()));
        }

        let (updated, entry) = wallet.plan_mutation(mutation, Utc::now())?;

        sqlx::query("UPDATE wallets SET balance = $2, updated_at = $3 WHERE id = $1")
            .bind(updated.id)
            .bind(updated.balance.value())
            .bind(updated.updated_at)
            .execute(&mut **tx)
            .await?;

        sqlx::query(&format!(
            "INSERT INTO ledger_entries ({ENTRY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount.value())
        .bind(entry.balance_before.value())
        .bind(entry.balance_after.value())
        .bind(entry.status.as_str())
        .bind(&entry.external_reference)
        .bind(&entry.description)
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;

        Ok(entry)
    }
}

/// Map sqlx failures of a mutation onto store semantics
fn classify(err: StoreError, wallet_id: Uuid, reference: &str) -> StoreError {
    let StoreError::Database(sqlx_err) = err else {
        return err;
    };

    match &sqlx_err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => StoreError::DuplicateReference(reference.to_string()),
            // serialization_failure, deadlock_detected, lock_not_available
            Some("40001") | Some("40P01") | Some("55P03") => StoreError::Contention(wallet_id),
            _ => StoreError::Database(sqlx_err),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(sqlx_err.to_string())
        }
        _ => StoreError::Database(sqlx_err),
    }
}

fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            db.code().as_deref() == Some("23505") && db.constraint() == Some(constraint)
        }
        _ => false,
    }
}

fn corrupt(what: &str, id: Uuid, detail: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{what} {id}: {detail}"))
}

fn wallet_from_row(row: WalletRow) -> Result<Wallet, StoreError> {
    let (id, owner_id, asset, address, balance, created_at, updated_at) = row;
    Ok(Wallet {
        id,
        owner_id,
        asset,
        address,
        balance: Balance::new(balance).map_err(|e| corrupt("wallet", id, e))?,
        created_at,
        updated_at,
    })
}

fn entry_from_row(row: EntryRow) -> Result<LedgerEntry, StoreError> {
    let (
        id,
        wallet_id,
        kind,
        amount,
        balance_before,
        balance_after,
        status,
        external_reference,
        description,
        created_at,
    ) = row;

    Ok(LedgerEntry {
        id,
        wallet_id,
        kind: kind.parse().map_err(|e: String| corrupt("entry", id, e))?,
        amount: Amount::new(amount).map_err(|e| corrupt("entry", id, e))?,
        balance_before: Balance::new(balance_before).map_err(|e| corrupt("entry", id, e))?,
        balance_after: Balance::new(balance_after).map_err(|e| corrupt("entry", id, e))?,
        status: status.parse().map_err(|e: String| corrupt("entry", id, e))?,
        external_reference,
        description,
        created_at,
    })
}

fn reconciliation_from_row(row: ReconciliationRow) -> Result<ReconciliationRecord, StoreError> {
    let (
        id,
        wallet_id,
        window_start,
        window_end,
        mode,
        internal_balance,
        external_balance,
        difference,
        tolerance,
        status,
        explanation,
        entry_count,
        created_at,
    ) = row;

    Ok(ReconciliationRecord {
        id,
        wallet_id,
        window_start,
        window_end,
        mode: mode
            .parse()
            .map_err(|e: String| corrupt("reconciliation", id, e))?,
        internal_balance,
        external_balance,
        difference,
        tolerance,
        status: status
            .parse()
            .map_err(|e: String| corrupt("reconciliation", id, e))?,
        explanation: serde_json::from_value(explanation)?,
        entry_count: u32::try_from(entry_count)
            .map_err(|e| corrupt("reconciliation", id, e))?,
        created_at,
    })
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create_wallet(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO wallets ({WALLET_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(wallet.id)
        .bind(wallet.owner_id)
        .bind(&wallet.asset)
        .bind(&wallet.address)
        .bind(wallet.balance.value())
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(wallet.clone()),
            Err(e) if is_unique_violation(&e, WALLET_OWNER_ASSET_KEY) => {
                Err(StoreError::WalletExists {
                    owner_id: wallet.owner_id,
                    asset: wallet.asset.clone(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_wallet(&self, wallet_id: Uuid) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> =
            sqlx::query_as(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = $1"))
                .bind(wallet_id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(wallet_from_row).transpose()
    }

    async fn find_wallet(
        &self,
        owner_id: Uuid,
        asset: &str,
    ) -> Result<Option<Wallet>, StoreError> {
        let row: Option<WalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets WHERE owner_id = $1 AND asset = $2"
        ))
        .bind(owner_id)
        .bind(asset)
        .fetch_optional(&self.pool)
        .await?;

        row.map(wallet_from_row).transpose()
    }

    async fn list_wallets(&self) -> Result<Vec<Wallet>, StoreError> {
        let rows: Vec<WalletRow> = sqlx::query_as(&format!(
            "SELECT {WALLET_COLUMNS} FROM wallets ORDER BY created_at ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(wallet_from_row).collect()
    }

    async fn apply_mutation(&self, mutation: &Mutation) -> Result<LedgerEntry, StoreError> {
        let classify_err =
            |e: StoreError| classify(e, mutation.wallet_id, mutation.reference.as_str());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| classify_err(e.into()))?;

        // Dropping the transaction on error rolls it back
        let entry = self.try_apply(&mut tx, mutation).await.map_err(classify_err)?;

        tx.commit().await.map_err(|e| classify_err(e.into()))?;

        tracing::debug!(
            wallet_id = %entry.wallet_id,
            reference = %entry.external_reference,
            balance_after = %entry.balance_after,
            "Mutation committed"
        );

        Ok(entry)
    }

    async fn find_entry_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE external_reference = $1"
        ))
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<LedgerEntry>, StoreError> {
        let direction = match query.order {
            SortOrder::Ascending => "ASC",
            SortOrder::Descending => "DESC",
        };
        let (limit, offset) = match query.page {
            Some(page) => (Some(page.limit() as i64), page.offset() as i64),
            None => (None, 0),
        };

        // LIMIT NULL means no limit
        let rows: Vec<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE wallet_id = $1 AND created_at >= $2 AND created_at < $3 \
               AND ($4 = FALSE OR status = 'completed') \
             ORDER BY created_at {direction}, id {direction} \
             LIMIT $5 OFFSET $6"
        ))
        .bind(query.wallet_id)
        .bind(query.range.start)
        .bind(query.range.end)
        .bind(query.completed_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }

    async fn first_entry_from(
        &self,
        wallet_id: Uuid,
        instant: DateTime<Utc>,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        let row: Option<EntryRow> = sqlx::query_as(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries \
             WHERE wallet_id = $1 AND created_at >= $2 AND status = 'completed' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(wallet_id)
        .bind(instant)
        .fetch_optional(&self.pool)
        .await?;

        row.map(entry_from_row).transpose()
    }

    async fn save_reconciliation(&self, record: &ReconciliationRecord) -> Result<(), StoreError> {
        let explanation = serde_json::to_value(&record.explanation)?;
        let entry_count = i32::try_from(record.entry_count)
            .map_err(|e| corrupt("reconciliation", record.id, e))?;

        sqlx::query(&format!(
            "INSERT INTO reconciliations ({RECONCILIATION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(record.id)
        .bind(record.wallet_id)
        .bind(record.window_start)
        .bind(record.window_end)
        .bind(record.mode.as_str())
        .bind(record.internal_balance)
        .bind(record.external_balance)
        .bind(record.difference)
        .bind(record.tolerance)
        .bind(record.status.as_str())
        .bind(explanation)
        .bind(entry_count)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_reconciliation(
        &self,
        id: Uuid,
    ) -> Result<Option<ReconciliationRecord>, StoreError> {
        let row: Option<ReconciliationRow> = sqlx::query_as(&format!(
            "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(reconciliation_from_row).transpose()
    }

    async fn list_reconciliations(
        &self,
        wallet_id: Uuid,
        page: Page,
    ) -> Result<Vec<ReconciliationRecord>, StoreError> {
        let rows: Vec<ReconciliationRow> = sqlx::query_as(&format!(
            "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations \
             WHERE wallet_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2 OFFSET $3"
        ))
        .bind(wallet_id)
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(reconciliation_from_row).collect()
    }
}
