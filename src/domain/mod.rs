//! Domain module
//!
//! Core domain types and business rules.

pub mod entry;
pub mod error;
pub mod money;
pub mod query;
pub mod reconciliation;
pub mod wallet;

pub use entry::{EntryKind, EntryStatus, LedgerEntry, Mutation};
pub use error::DomainError;
pub use money::{Amount, Balance, MoneyError};
pub use query::{EntryQuery, Page, SortOrder, TimeRange};
pub use reconciliation::{
    BalanceMode, Discrepancy, FlowDirection, ReconciliationRecord, ReconciliationStatus,
};
pub use wallet::Wallet;
