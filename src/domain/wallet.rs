//! Wallet Aggregate
//!
//! A wallet holds the balance of one owner in one asset. Its balance only
//! changes through [`Wallet::plan_mutation`], which stores call while holding
//! the wallet lock.

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::entry::{EntryKind, EntryStatus, LedgerEntry, Mutation, MAX_REFERENCE_LEN};
use super::error::DomainError;
use super::money::Balance;

/// Wallet aggregate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Unique wallet ID
    pub id: Uuid,

    /// Owner user ID
    pub owner_id: Uuid,

    /// Currency code ("USD") or chain and network ("ETH:mainnet")
    pub asset: String,

    /// Account identifier the balance oracle knows this wallet by
    pub address: String,

    /// Current balance (sum of completed entries)
    pub balance: Balance,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new empty wallet.
    ///
    /// When no address is given a random chain-style address is generated.
    pub fn new(owner_id: Uuid, asset: impl Into<String>, address: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_id,
            asset: normalize_asset(&asset.into()),
            address: address.unwrap_or_else(generate_address),
            balance: Balance::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    // =========================================================================
    // Mutation planning
    // =========================================================================

    /// Plan a mutation against this wallet's current state.
    ///
    /// Returns the updated wallet and the completed entry to append. Stores
    /// call this with the wallet row locked so that the balance check and the
    /// write form one atomic unit.
    pub fn plan_mutation(
        &self,
        mutation: &Mutation,
        now: DateTime<Utc>,
    ) -> Result<(Wallet, LedgerEntry), DomainError> {
        validate_reference(&mutation.reference)?;

        let balance_before = self.balance;
        let balance_after = match mutation.kind {
            EntryKind::Deposit => balance_before.credit(&mutation.amount)?,
            EntryKind::Withdraw => {
                if !balance_before.is_sufficient_for(&mutation.amount) {
                    return Err(DomainError::insufficient_balance(
                        mutation.amount.value(),
                        balance_before.value(),
                    ));
                }
                balance_before.debit(&mutation.amount)?
            }
        };

        let entry = LedgerEntry {
            id: Uuid::new_v4(),
            wallet_id: self.id,
            kind: mutation.kind,
            amount: mutation.amount,
            balance_before,
            balance_after,
            status: EntryStatus::Completed,
            external_reference: mutation.reference.clone(),
            description: mutation.description.clone(),
            created_at: now,
        };

        let wallet = Wallet {
            balance: balance_after,
            updated_at: now,
            ..self.clone()
        };

        Ok((wallet, entry))
    }
}

/// Asset identifiers are case-insensitive; store them upper-cased.
pub fn normalize_asset(asset: &str) -> String {
    asset.trim().to_ascii_uppercase()
}

/// Currency code ("USD") or chain and network ("ETH:MAINNET"), at most 32 chars.
pub fn validate_asset(asset: &str) -> Result<(), DomainError> {
    let asset = asset.trim();
    if asset.is_empty() || asset.len() > 32 {
        return Err(DomainError::InvalidAsset(format!(
            "asset must be 1 to 32 characters (got {:?})",
            asset
        )));
    }
    if !asset
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ':' | '-' | '_'))
    {
        return Err(DomainError::InvalidAsset(format!(
            "unexpected character in {asset:?}"
        )));
    }
    Ok(())
}

/// Reject empty or oversized idempotency keys before they reach a store.
pub fn validate_reference(reference: &str) -> Result<(), DomainError> {
    if reference.trim().is_empty() {
        return Err(DomainError::InvalidReference(
            "reference must not be empty".to_string(),
        ));
    }
    if reference.len() > MAX_REFERENCE_LEN {
        return Err(DomainError::InvalidReference(format!(
            "reference longer than {MAX_REFERENCE_LEN} bytes"
        )));
    }
    Ok(())
}

/// Address equality. `0x` hex addresses compare case-insensitively, since
/// checksummed forms differ only in letter case; other identifiers must match
/// exactly.
pub fn same_address(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    if is_hex_address(a) && is_hex_address(b) {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn is_hex_address(address: &str) -> bool {
    match address.strip_prefix("0x").or_else(|| address.strip_prefix("0X")) {
        Some(digits) => !digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Random `0x`-prefixed 20-byte hex address
pub fn generate_address() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}
