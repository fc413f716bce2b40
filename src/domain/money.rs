//! Money types
//!
//! Exact decimal primitives for transaction magnitudes and wallet balances.
//! Both are validated at construction time so an invalid value cannot reach
//! the ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum representable balance or amount (1 trillion units)
const MAX_UNITS: i64 = 1_000_000_000_000;

/// Maximum decimal places (8)
const MAX_SCALE: u32 = 8;

/// Amount is the magnitude of a single ledger mutation.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 8 decimal places
/// - Maximum value is 1 trillion
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use wallet_ledger::domain::Amount;
///
/// let amount: Amount = "100.00".parse().unwrap();
/// assert_eq!(amount.value(), Decimal::new(10000, 2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount or Balance
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Too many decimal places (max {MAX_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Value exceeds maximum allowed ({MAX_UNITS})")]
    Overflow,

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `MoneyError::NotPositive` if value <= 0
    /// - `MoneyError::TooManyDecimals` if more than 8 decimal places
    /// - `MoneyError::Overflow` if value > 1 trillion
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value <= Decimal::ZERO {
            return Err(MoneyError::NotPositive(value));
        }
        check_bounds(value)?;
        Ok(Self(value))
    }

    /// Create an Amount from an integer number of whole units.
    pub fn from_integer(value: i64) -> Result<Self, MoneyError> {
        Self::new(Decimal::from(value))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

fn check_bounds(value: Decimal) -> Result<(), MoneyError> {
    if value.scale() > MAX_SCALE {
        // Trailing zeros beyond the limit carry no information
        let normalized = value.normalize();
        if normalized.scale() > MAX_SCALE {
            return Err(MoneyError::TooManyDecimals(value.scale()));
        }
    }
    if value.abs() > Decimal::from(MAX_UNITS) {
        return Err(MoneyError::Overflow);
    }
    Ok(())
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal =
            Decimal::from_str(s.trim()).map_err(|e| MoneyError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.0.to_string()
    }
}

/// Balance of a wallet. Unlike Amount, Balance can be zero but never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, MoneyError> {
        if value < Decimal::ZERO {
            return Err(MoneyError::Negative(value));
        }
        check_bounds(value)?;
        Ok(Self(value))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Check if balance covers a withdrawal of `amount`
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, MoneyError> {
        Balance::new(self.0 + amount.value())
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, MoneyError> {
        Balance::new(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Balance {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Balance::new(value)
    }
}

impl From<Balance> for Decimal {
    fn from(balance: Balance) -> Self {
        balance.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_must_be_positive() {
        assert_eq!(Amount::new(dec!(0.00000001)).unwrap().value(), dec!(0.00000001));

        for value in [Decimal::ZERO, dec!(-100)] {
            assert!(matches!(Amount::new(value), Err(MoneyError::NotPositive(_))));
        }
    }

    #[test]
    fn test_amount_rejects_ninth_decimal() {
        let amount = Amount::new(Decimal::new(123456789, 9));
        assert!(matches!(amount, Err(MoneyError::TooManyDecimals(9))));
    }

    #[test]
    fn test_amount_trailing_zeros_accepted() {
        // 1.5000000000 normalizes to 1.5
        let amount = Amount::new(Decimal::new(15_000_000_000, 10)).unwrap();
        assert_eq!(amount.value(), dec!(1.5));
    }

    #[test]
    fn test_amount_upper_bound() {
        assert!(matches!(
            Amount::new(dec!(1000000000001)),
            Err(MoneyError::Overflow)
        ));
        assert!(Amount::new(dec!(1000000000000)).is_ok());
    }

    #[test]
    fn test_amount_parses_trimmed_input() {
        let amount: Amount = " 123.456 ".parse().unwrap();
        assert_eq!(amount.value(), dec!(123.456));

        assert!(matches!(
            "abc".parse::<Amount>(),
            Err(MoneyError::ParseError(_))
        ));
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount: Amount = "30.00".parse().unwrap();
        assert_eq!(serde_json::to_string(&amount).unwrap(), r#""30.00""#);

        let back: Amount = serde_json::from_str(r#""30.00""#).unwrap();
        assert_eq!(back, amount);
        assert!(serde_json::from_str::<Amount>(r#""-1""#).is_err());
    }

    #[test]
    fn test_balance_follows_txa_txb() {
        let balance = Balance::zero();
        let balance = balance.credit(&Amount::new(dec!(100.00)).unwrap()).unwrap();
        assert_eq!(balance.value(), dec!(100.00));

        let balance = balance.debit(&Amount::new(dec!(30.00)).unwrap()).unwrap();
        assert_eq!(balance.value(), dec!(70.00));
    }

    #[test]
    fn test_balance_never_goes_negative() {
        let balance = Balance::new(dec!(50)).unwrap();
        let amount = Amount::new(dec!(100)).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(
            balance.debit(&amount),
            Err(MoneyError::Negative(_))
        ));
    }

    #[test]
    fn test_balance_exact_debit_reaches_zero() {
        let balance = Balance::new(dec!(42.5)).unwrap();
        let amount = Amount::new(dec!(42.5)).unwrap();
        assert!(balance.is_sufficient_for(&amount));
        assert!(balance.debit(&amount).unwrap().is_zero());
    }
}
