//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::BalanceMode;
use crate::ledger::LedgerConfig;
use crate::reconciliation::ReconciliationConfig;

/// Which Ledger Store backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Postgres,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,

    /// Database connection URL (required for the postgres backend)
    pub database_url: Option<String>,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Confirmations an oracle-observed deposit needs before it is credited
    pub min_confirmations: u32,

    /// Largest |internal - external| still classified as matched
    pub reconciliation_tolerance: Decimal,

    pub reconciliation_mode: BalanceMode,

    pub oracle_timeout: Duration,

    /// Contention retries per mutation
    pub store_max_retries: u32,
    pub store_retry_backoff: Duration,
    pub store_lock_timeout: Duration,

    /// Zero disables the periodic sweep
    pub reconcile_interval: Duration,
    pub reconcile_lookback: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_backend = parse_or("STORE_BACKEND", StoreBackend::Memory)?;

        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingEnv("DATABASE_URL"));
        }

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let reconciliation_tolerance: Decimal =
            parse_or("RECONCILIATION_TOLERANCE", Decimal::new(1, 4))?;
        if reconciliation_tolerance.is_sign_negative() {
            return Err(ConfigError::InvalidValue("RECONCILIATION_TOLERANCE"));
        }

        Ok(Self {
            store_backend,
            database_url,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            host,
            port: parse_or("PORT", 3000)?,
            environment,
            min_confirmations: parse_or("MIN_CONFIRMATIONS", 6)?,
            reconciliation_tolerance,
            reconciliation_mode: parse_or("RECONCILIATION_MODE", BalanceMode::Replay)?,
            oracle_timeout: positive_millis("ORACLE_TIMEOUT_MS", 5000)?,
            store_max_retries: parse_or("STORE_MAX_RETRIES", 3)?,
            store_retry_backoff: Duration::from_millis(parse_or("STORE_RETRY_BACKOFF_MS", 50)?),
            store_lock_timeout: positive_millis("STORE_LOCK_TIMEOUT_MS", 2000)?,
            reconcile_interval: Duration::from_secs(parse_or("RECONCILE_INTERVAL_SECS", 0)?),
            reconcile_lookback: Duration::from_secs(parse_or("RECONCILE_LOOKBACK_SECS", 86_400)?),
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn ledger(&self) -> LedgerConfig {
        LedgerConfig {
            min_confirmations: self.min_confirmations,
            oracle_timeout: self.oracle_timeout,
            max_retries: self.store_max_retries,
            retry_backoff: self.store_retry_backoff,
        }
    }

    pub fn reconciliation(&self) -> ReconciliationConfig {
        ReconciliationConfig {
            tolerance: self.reconciliation_tolerance,
            mode: self.reconciliation_mode,
            oracle_timeout: self.oracle_timeout,
        }
    }
}

/// Read `key`, falling back to `default` when unset
fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key)),
        Err(_) => Ok(default),
    }
}

/// Millisecond duration that must be non-zero
fn positive_millis(key: &'static str, default: u64) -> Result<Duration, ConfigError> {
    match parse_or(key, default)? {
        0 => Err(ConfigError::InvalidValue(key)),
        ms => Ok(Duration::from_millis(ms)),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parse() {
        assert_eq!("Memory".parse::<StoreBackend>(), Ok(StoreBackend::Memory));
        assert_eq!("postgres".parse::<StoreBackend>(), Ok(StoreBackend::Postgres));
        assert!("sqlite".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        env::set_var("WALLET_LEDGER_TEST_ZERO_TIMEOUT_MS", "0");
        assert!(matches!(
            positive_millis("WALLET_LEDGER_TEST_ZERO_TIMEOUT_MS", 5000),
            Err(ConfigError::InvalidValue("WALLET_LEDGER_TEST_ZERO_TIMEOUT_MS"))
        ));

        env::set_var("WALLET_LEDGER_TEST_SHORT_TIMEOUT_MS", "15");
        assert_eq!(
            positive_millis("WALLET_LEDGER_TEST_SHORT_TIMEOUT_MS", 5000).unwrap(),
            Duration::from_millis(15)
        );
        assert_eq!(
            positive_millis("WALLET_LEDGER_TEST_UNSET_TIMEOUT_MS", 2000).unwrap(),
            Duration::from_secs(2)
        );
    }

    #[test]
    fn test_parse_or_default_when_unset() {
        let value: u32 = parse_or("WALLET_LEDGER_TEST_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
