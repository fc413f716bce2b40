//! HTTP error mapping
//!
//! Converts ledger outcomes into `{error, error_code, details}` JSON bodies.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::domain::DomainError;
use crate::error::LedgerError;

/// API-level Result type
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors surfaced by HTTP handlers
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Request could not be bound (malformed body, path id or query string)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Ledger(LedgerError::Domain(err))
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn domain_status(err: &DomainError) -> (StatusCode, &'static str, Option<String>) {
    match err {
        DomainError::InvalidAmount(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_amount", Some(msg.clone()))
        }
        DomainError::InsufficientBalance { .. } => {
            (StatusCode::BAD_REQUEST, "insufficient_balance", Some(err.to_string()))
        }
        DomainError::DuplicateTransaction { reference } => {
            (StatusCode::CONFLICT, "duplicate_transaction", Some(reference.clone()))
        }
        DomainError::InsufficientConfirmations { .. } => (
            StatusCode::BAD_REQUEST,
            "insufficient_confirmations",
            Some(err.to_string()),
        ),
        DomainError::RecipientMismatch { .. } => {
            (StatusCode::BAD_REQUEST, "recipient_mismatch", Some(err.to_string()))
        }
        DomainError::InvalidWindow { .. } => {
            (StatusCode::BAD_REQUEST, "invalid_window", Some(err.to_string()))
        }
        DomainError::InvalidReference(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_reference", Some(msg.clone()))
        }
        DomainError::InvalidAsset(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_asset", Some(msg.clone()))
        }
        DomainError::InvalidAddress(msg) => {
            (StatusCode::BAD_REQUEST, "invalid_address", Some(msg.clone()))
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            ApiError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            ApiError::Ledger(err) => match err {
                LedgerError::Domain(domain_err) => domain_status(domain_err),

                // 404 Not Found
                LedgerError::WalletNotFound(id) => {
                    (StatusCode::NOT_FOUND, "wallet_not_found", Some(id.to_string()))
                }
                LedgerError::EntryNotFound(reference) => {
                    (StatusCode::NOT_FOUND, "entry_not_found", Some(reference.clone()))
                }
                LedgerError::ReconciliationNotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "reconciliation_not_found",
                    Some(id.to_string()),
                ),
                LedgerError::OracleTransactionNotFound(reference) => (
                    StatusCode::NOT_FOUND,
                    "oracle_transaction_not_found",
                    Some(reference.clone()),
                ),

                // 409 Conflict
                LedgerError::WalletAlreadyExists { .. } => {
                    (StatusCode::CONFLICT, "wallet_already_exists", None)
                }

                // 503 / 504
                LedgerError::StoreUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", None)
                }
                LedgerError::OracleUnavailable(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "oracle_unavailable", None)
                }
                LedgerError::OracleTimeout(_) => {
                    (StatusCode::GATEWAY_TIMEOUT, "oracle_timeout", None)
                }

                // 500 Internal Server Error
                LedgerError::Internal(msg) => {
                    tracing::error!("Internal error: {}", msg);
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
                }
            },
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use uuid::Uuid;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        err.into().into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(DomainError::insufficient_balance(Decimal::ONE, Decimal::ZERO)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::duplicate("txA")),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LedgerError::WalletNotFound(Uuid::nil())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(LedgerError::StoreUnavailable("busy".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status_of(LedgerError::OracleTimeout(Duration::from_secs(1))),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(ApiError::InvalidRequest("page".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
