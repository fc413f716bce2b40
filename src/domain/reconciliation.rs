//! Reconciliation records
//!
//! The immutable outcome of comparing a wallet's internal balance with the
//! balance reported by the oracle over a window.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    Matched,
    Mismatch,
}

impl ReconciliationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconciliationStatus::Matched => "matched",
            ReconciliationStatus::Mismatch => "mismatch",
        }
    }
}

impl fmt::Display for ReconciliationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconciliationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "matched" => Ok(Self::Matched),
            "mismatch" => Ok(Self::Mismatch),
            other => Err(format!("unknown reconciliation status: {other}")),
        }
    }
}

/// How the internal balance was derived
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceMode {
    /// Wallet balance at the time of the run
    Live,
    /// Balance at window end, replayed from entry snapshots
    #[default]
    Replay,
}

impl BalanceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceMode::Live => "live",
            BalanceMode::Replay => "replay",
        }
    }
}

impl fmt::Display for BalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BalanceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "replay" => Ok(Self::Replay),
            other => Err(format!("unknown balance mode: {other}")),
        }
    }
}

/// Direction of an oracle transaction relative to the wallet address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    Inbound,
    Outbound,
}

/// One explained difference between ledger and oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Discrepancy {
    /// Entry present internally, absent from oracle history
    MissingExternally { reference: String, amount: Decimal },

    /// Reference known to both sides with different amounts
    AmountMismatch {
        reference: String,
        internal: Decimal,
        external: Decimal,
    },

    /// Oracle transaction the ledger never booked
    UnrecordedExternally {
        reference: String,
        amount: Decimal,
        direction: FlowDirection,
    },
}

impl Discrepancy {
    pub fn reference(&self) -> &str {
        match self {
            Discrepancy::MissingExternally { reference, .. }
            | Discrepancy::AmountMismatch { reference, .. }
            | Discrepancy::UnrecordedExternally { reference, .. } => reference,
        }
    }
}

impl fmt::Display for Discrepancy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discrepancy::MissingExternally { reference, .. } => {
                write!(f, "{reference} present internally, absent externally")
            }
            Discrepancy::AmountMismatch {
                reference,
                internal,
                external,
            } => write!(
                f,
                "amount mismatch for {reference}: internal={internal} external={external}"
            ),
            Discrepancy::UnrecordedExternally {
                reference,
                amount,
                direction,
            } => {
                let side = match direction {
                    FlowDirection::Inbound => "inbound",
                    FlowDirection::Outbound => "outbound",
                };
                write!(
                    f,
                    "{reference} present externally ({side} {amount}), absent internally"
                )
            }
        }
    }
}

/// Result of one reconciliation run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationRecord {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub mode: BalanceMode,
    pub internal_balance: Decimal,
    pub external_balance: Decimal,
    /// internal - external
    pub difference: Decimal,
    pub tolerance: Decimal,
    pub status: ReconciliationStatus,
    /// Empty when matched
    pub explanation: Vec<Discrepancy>,
    /// Completed entries found in the window
    pub entry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ReconciliationRecord {
    pub fn is_matched(&self) -> bool {
        self.status == ReconciliationStatus::Matched
    }
}

/// Symmetric tolerance check: matched iff |difference| <= tolerance
pub fn classify(difference: Decimal, tolerance: Decimal) -> ReconciliationStatus {
    if difference.abs() <= tolerance {
        ReconciliationStatus::Matched
    } else {
        ReconciliationStatus::Mismatch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_classify_is_symmetric() {
        let tolerance = dec!(0.0001);
        assert_eq!(classify(dec!(0), tolerance), ReconciliationStatus::Matched);
        assert_eq!(
            classify(dec!(0.0001), tolerance),
            ReconciliationStatus::Matched
        );
        assert_eq!(
            classify(dec!(-0.0001), tolerance),
            ReconciliationStatus::Matched
        );
        assert_eq!(classify(dec!(5), tolerance), ReconciliationStatus::Mismatch);
        assert_eq!(
            classify(dec!(-5), tolerance),
            ReconciliationStatus::Mismatch
        );
    }

    #[test]
    fn test_discrepancy_display() {
        let missing = Discrepancy::MissingExternally {
            reference: "txB".to_string(),
            amount: dec!(30.00),
        };
        assert_eq!(
            missing.to_string(),
            "txB present internally, absent externally"
        );

        let mismatch = Discrepancy::AmountMismatch {
            reference: "txA".to_string(),
            internal: dec!(100.00),
            external: dec!(99.50),
        };
        assert_eq!(
            mismatch.to_string(),
            "amount mismatch for txA: internal=100.00 external=99.50"
        );
    }

    #[test]
    fn test_discrepancy_json_is_tagged() {
        let unrecorded = Discrepancy::UnrecordedExternally {
            reference: "0x01".to_string(),
            amount: dec!(5),
            direction: FlowDirection::Inbound,
        };
        let json = serde_json::to_value(&unrecorded).unwrap();
        assert_eq!(json["kind"], "unrecorded_externally");
        assert_eq!(json["direction"], "inbound");
        assert_eq!(json["amount"], "5");

        let back: Discrepancy = serde_json::from_value(json).unwrap();
        assert_eq!(back, unrecorded);
    }

    #[test]
    fn test_balance_mode_parse() {
        assert_eq!("REPLAY".parse::<BalanceMode>().unwrap(), BalanceMode::Replay);
        assert_eq!("live".parse::<BalanceMode>().unwrap(), BalanceMode::Live);
        assert!("nightly".parse::<BalanceMode>().is_err());
    }
}
