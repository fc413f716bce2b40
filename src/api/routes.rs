//! API Routes
//!
//! HTTP endpoint definitions. Handlers bind requests and delegate to the
//! engines; no ledger rule lives here.

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{
    Amount, Balance, DomainError, LedgerEntry, Mutation, Page, ReconciliationRecord, SortOrder,
    TimeRange, Wallet,
};
use crate::error::LedgerError;
use crate::ledger::LedgerEngine;
use crate::oracle::{MockOracle, OracleTransaction};
use crate::reconciliation::{ReconciliationDetail, ReconciliationEngine};

use super::error::{ApiError, ApiResult};
use super::extract::{AppJson, AppPath, AppQuery};

/// Longest oracle timeout a caller may request
const MAX_CALLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub ledger: LedgerEngine,
    pub reconciliation: ReconciliationEngine,
    /// Scriptable oracle behind `/sandbox` routes; `None` disables them
    pub sandbox: Option<Arc<MockOracle>>,
}

impl AppState {
    pub fn new(ledger: LedgerEngine, reconciliation: ReconciliationEngine) -> Self {
        Self {
            ledger,
            reconciliation,
            sandbox: None,
        }
    }

    pub fn with_sandbox(mut self, oracle: Arc<MockOracle>) -> Self {
        self.sandbox = Some(oracle);
        self
    }
}

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWalletRequest {
    pub owner_id: Uuid,
    pub asset: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub wallet_id: Uuid,
    pub asset: String,
    pub balance: Balance,
}

#[derive(Debug, Deserialize)]
pub struct MutationRequest {
    /// Decimal string, e.g. "100.00"
    pub amount: String,
    pub reference: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransferOutRequest {
    /// Decimal string, e.g. "0.25"
    pub amount: String,
    pub to_address: String,
}

#[derive(Debug, Deserialize)]
pub struct ObservedDepositRequest {
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct EntriesQuery {
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

#[derive(Debug, Serialize)]
pub struct EntriesResponse {
    pub wallet_id: Uuid,
    pub page: u32,
    pub page_size: u32,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Overrides the configured oracle timeout for this run
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageQuery {
    fn to_page(&self) -> Page {
        let default = Page::default();
        Page::new(
            self.page.unwrap_or(default.page),
            self.page_size.unwrap_or(default.page_size),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ReconciliationHistoryResponse {
    pub wallet_id: Uuid,
    pub page: u32,
    pub page_size: u32,
    pub records: Vec<ReconciliationRecord>,
}

#[derive(Debug, Deserialize)]
pub struct SandboxTransferRequest {
    pub from: String,
    pub to: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct SandboxBlocksRequest {
    pub blocks: u32,
}

#[derive(Debug, Serialize)]
pub struct SandboxBlocksResponse {
    pub height: u64,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/wallets", post(create_wallet))
        .route("/wallets/:wallet_id", get(get_wallet))
        .route("/wallets/:wallet_id/balance", get(get_balance))
        .route("/wallets/:wallet_id/deposits", post(deposit))
        .route("/wallets/:wallet_id/deposits/observed", post(credit_observed_deposit))
        .route("/wallets/:wallet_id/withdrawals", post(withdraw))
        .route("/wallets/:wallet_id/withdrawals/onchain", post(withdraw_to_address))
        .route("/wallets/:wallet_id/entries", get(list_entries))
        .route(
            "/wallets/:wallet_id/reconciliations",
            post(reconcile).get(reconciliation_history),
        )
        .route("/reconciliations/:reconciliation_id", get(reconciliation_detail))
        .route("/entries/:reference", get(find_entry))
}

/// Routes that script the sandbox oracle: external transfers and mining
pub fn sandbox_router() -> Router<AppState> {
    Router::new()
        .route("/sandbox/transfers", post(sandbox_transfer))
        .route("/sandbox/blocks", post(sandbox_mine))
}

// =========================================================================
// Wallets
// =========================================================================

async fn create_wallet(
    State(state): State<AppState>,
    AppJson(request): AppJson<CreateWalletRequest>,
) -> ApiResult<(StatusCode, Json<Wallet>)> {
    let wallet = state
        .ledger
        .create_wallet(request.owner_id, &request.asset, request.address)
        .await?;

    Ok((StatusCode::CREATED, Json(wallet)))
}

async fn get_wallet(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(state.ledger.get_wallet(wallet_id).await?))
}

async fn get_balance(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
) -> ApiResult<Json<BalanceResponse>> {
    let wallet = state.ledger.get_wallet(wallet_id).await?;

    Ok(Json(BalanceResponse {
        wallet_id: wallet.id,
        asset: wallet.asset,
        balance: wallet.balance,
    }))
}

// =========================================================================
// Mutations
// =========================================================================

fn build_mutation(
    wallet_id: Uuid,
    request: MutationRequest,
    build: fn(Uuid, Amount, String) -> Mutation,
) -> ApiResult<Mutation> {
    let amount: Amount = request.amount.parse().map_err(DomainError::from)?;
    let mutation = build(wallet_id, amount, request.reference);

    Ok(match request.description {
        Some(description) => mutation.with_description(description),
        None => mutation,
    })
}

async fn deposit(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppJson(request): AppJson<MutationRequest>,
) -> ApiResult<(StatusCode, Json<LedgerEntry>)> {
    let mutation = build_mutation(wallet_id, request, |w, a, r| Mutation::deposit(w, a, r))?;
    let entry = state.ledger.apply(mutation).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn withdraw(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppJson(request): AppJson<MutationRequest>,
) -> ApiResult<(StatusCode, Json<LedgerEntry>)> {
    let mutation = build_mutation(wallet_id, request, |w, a, r| Mutation::withdraw(w, a, r))?;
    let entry = state.ledger.apply(mutation).await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn withdraw_to_address(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppJson(request): AppJson<TransferOutRequest>,
) -> ApiResult<(StatusCode, Json<LedgerEntry>)> {
    let amount: Amount = request.amount.parse().map_err(DomainError::from)?;
    let entry = state
        .ledger
        .withdraw_to_address(wallet_id, &request.to_address, amount.value())
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

async fn credit_observed_deposit(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppJson(request): AppJson<ObservedDepositRequest>,
) -> ApiResult<(StatusCode, Json<LedgerEntry>)> {
    let entry = state
        .ledger
        .credit_observed_deposit(wallet_id, &request.reference)
        .await?;

    Ok((StatusCode::CREATED, Json(entry)))
}

// =========================================================================
// Entries
// =========================================================================

async fn list_entries(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<EntriesQuery>,
) -> ApiResult<Json<EntriesResponse>> {
    let default_range = TimeRange::until_now();
    let range = TimeRange::new(
        query.start.unwrap_or(default_range.start),
        query.end.unwrap_or(default_range.end),
    )?;
    let page = PageQuery {
        page: query.page,
        page_size: query.page_size,
    }
    .to_page();
    let order = query.order.unwrap_or_default();

    let entries = state
        .ledger
        .list_entries(wallet_id, range, page, order)
        .await?;

    Ok(Json(EntriesResponse {
        wallet_id,
        page: page.page,
        page_size: page.page_size,
        entries,
    }))
}

async fn find_entry(
    State(state): State<AppState>,
    AppPath(reference): AppPath<String>,
) -> ApiResult<Json<LedgerEntry>> {
    state
        .ledger
        .find_entry(&reference)
        .await?
        .map(Json)
        .ok_or_else(|| LedgerError::EntryNotFound(reference).into())
}

// =========================================================================
// Reconciliation
// =========================================================================

async fn reconcile(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppJson(request): AppJson<ReconcileRequest>,
) -> ApiResult<(StatusCode, Json<ReconciliationRecord>)> {
    let timeout = match request.timeout_ms {
        Some(0) => {
            return Err(ApiError::InvalidRequest(
                "timeout_ms must be positive".to_string(),
            ))
        }
        Some(ms) => Duration::from_millis(ms).min(MAX_CALLER_TIMEOUT),
        None => state.reconciliation.config().oracle_timeout,
    };

    let record = state
        .reconciliation
        .reconcile_with_timeout(wallet_id, request.start, request.end, timeout)
        .await?;

    Ok((StatusCode::CREATED, Json(record)))
}

async fn reconciliation_history(
    State(state): State<AppState>,
    AppPath(wallet_id): AppPath<Uuid>,
    AppQuery(query): AppQuery<PageQuery>,
) -> ApiResult<Json<ReconciliationHistoryResponse>> {
    let page = query.to_page();
    let records = state.reconciliation.history(wallet_id, page).await?;

    Ok(Json(ReconciliationHistoryResponse {
        wallet_id,
        page: page.page,
        page_size: page.page_size,
        records,
    }))
}

async fn reconciliation_detail(
    State(state): State<AppState>,
    AppPath(reconciliation_id): AppPath<Uuid>,
) -> ApiResult<Json<ReconciliationDetail>> {
    Ok(Json(state.reconciliation.detail(reconciliation_id).await?))
}

// =========================================================================
// Sandbox
// =========================================================================

fn sandbox_oracle(state: &AppState) -> ApiResult<&Arc<MockOracle>> {
    state
        .sandbox
        .as_ref()
        .ok_or_else(|| ApiError::InvalidRequest("sandbox is disabled".to_string()))
}

/// Record an external transfer, e.g. a deposit arriving from outside
async fn sandbox_transfer(
    State(state): State<AppState>,
    AppJson(request): AppJson<SandboxTransferRequest>,
) -> ApiResult<(StatusCode, Json<OracleTransaction>)> {
    let oracle = sandbox_oracle(&state)?;
    let amount: Amount = request.amount.parse().map_err(DomainError::from)?;
    let tx = oracle
        .record_transfer(request.from.trim(), request.to.trim(), amount.value())
        .await;

    Ok((StatusCode::CREATED, Json(tx)))
}

async fn sandbox_mine(
    State(state): State<AppState>,
    AppJson(request): AppJson<SandboxBlocksRequest>,
) -> ApiResult<Json<SandboxBlocksResponse>> {
    let oracle = sandbox_oracle(&state)?;
    oracle.advance_blocks(request.blocks).await;

    Ok(Json(SandboxBlocksResponse {
        height: oracle.block_height().await,
    }))
}
