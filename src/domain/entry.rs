//! Ledger entries
//!
//! Immutable records of balance mutations. Entries are append-only: once
//! written they are never updated or deleted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::money::{Amount, Balance};

/// Maximum length of an external reference (matches the store column)
pub const MAX_REFERENCE_LEN: usize = 128;

/// Direction of a balance mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdraw,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Deposit => "deposit",
            EntryKind::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(EntryKind::Deposit),
            "withdraw" => Ok(EntryKind::Withdraw),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}

/// Lifecycle status of an entry.
///
/// The engine only ever writes `Completed` entries; the other states exist
/// for stores that stage mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Pending => "pending",
            EntryStatus::Completed => "completed",
            EntryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EntryStatus::Pending),
            "completed" => Ok(EntryStatus::Completed),
            "failed" => Ok(EntryStatus::Failed),
            other => Err(format!("unknown entry status: {other}")),
        }
    }
}

/// One applied balance mutation with its before/after snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    /// Magnitude only; direction comes from `kind`
    pub amount: Amount,
    pub balance_before: Balance,
    pub balance_after: Balance,
    pub status: EntryStatus,
    /// Idempotency key, unique across the whole ledger
    pub external_reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Amount with the sign of the mutation (+deposit, -withdraw)
    pub fn signed_amount(&self) -> Decimal {
        match self.kind {
            EntryKind::Deposit => self.amount.value(),
            EntryKind::Withdraw => -self.amount.value(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == EntryStatus::Completed
    }
}

/// A requested mutation, handed to the store's atomic primitive.
///
/// The store plans it against the locked wallet row with
/// [`crate::domain::Wallet::plan_mutation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub wallet_id: Uuid,
    pub kind: EntryKind,
    pub amount: Amount,
    pub reference: String,
    pub description: Option<String>,
}

impl Mutation {
    pub fn deposit(wallet_id: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self {
            wallet_id,
            kind: EntryKind::Deposit,
            amount,
            reference: reference.into(),
            description: None,
        }
    }

    pub fn withdraw(wallet_id: Uuid, amount: Amount, reference: impl Into<String>) -> Self {
        Self {
            wallet_id,
            kind: EntryKind::Withdraw,
            amount,
            reference: reference.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Sum of signed amounts over completed entries.
///
/// This is the value a wallet's balance must always equal.
pub fn net_of<'a>(entries: impl IntoIterator<Item = &'a LedgerEntry>) -> Decimal {
    entries
        .into_iter()
        .filter(|e| e.is_completed())
        .map(LedgerEntry::signed_amount)
        .sum()
}
