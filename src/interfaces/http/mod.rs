//! HTTP edge of the ledger core. Thin: every handler maps a JSON body to an
//! orchestrator call and the result (or error) back to a status code.

use crate::application::orchestrator::{
    MovementOrchestrator, MovementRequest, OpenAccountRequest, Receipt,
};
use crate::domain::account::{Account, AccountId, AccountStatus, Amount};
use crate::domain::movement::{Movement, MovementKind, MovementStatus, WithdrawChannel};
use crate::domain::ports::HistoryFilter;
use crate::domain::record::{Direction, RecordStatus, TransactionRecord};
use crate::error::LedgerError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const MAX_HISTORY_PAGE: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<MovementOrchestrator>,
}

pub fn router(orchestrator: Arc<MovementOrchestrator>) -> Router {
    Router::new()
        .route("/accounts", post(open_account).get(list_accounts))
        .route("/accounts/{account_id}", get(get_account))
        .route("/accounts/{account_id}/transactions", get(list_transactions))
        .route("/movements", post(request_movement))
        .route("/movements/{movement_id}", get(get_movement))
        .route("/movements/{movement_id}/otp/verify", post(verify_otp))
        .route("/movements/{movement_id}/otp/resend", post(resend_otp))
        .with_state(AppState { orchestrator })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OpenAccountBody {
    owner_id: String,
    #[serde(default)]
    initial_balance: Amount,
    daily_transfer_limit: Option<Amount>,
    monthly_transfer_limit: Option<Amount>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountView {
    account_id: String,
    owner_id: String,
    balance: Amount,
    status: AccountStatus,
    daily_transfer_limit: Amount,
    monthly_transfer_limit: Amount,
}

impl From<Account> for AccountView {
    fn from(account: Account) -> Self {
        Self {
            account_id: account.account_id.to_string(),
            owner_id: account.owner_id,
            balance: account.balance,
            status: account.status,
            daily_transfer_limit: account.daily_transfer_limit,
            monthly_transfer_limit: account.monthly_transfer_limit,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MovementBody {
    idempotency_key: Uuid,
    kind: MovementKind,
    channel: Option<WithdrawChannel>,
    source_account_id: String,
    destination_account_id: Option<String>,
    principal_amount: Amount,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MovementView {
    movement_id: Uuid,
    kind: MovementKind,
    status: MovementStatus,
    source_account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_account_id: Option<String>,
    principal_amount: Amount,
    fee_amount: Amount,
    total_amount: Amount,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    committed_at: Option<DateTime<Utc>>,
}

impl From<Movement> for MovementView {
    fn from(movement: Movement) -> Self {
        Self {
            movement_id: movement.movement_id,
            kind: movement.kind,
            status: movement.status,
            source_account_id: movement.source_account_id.to_string(),
            destination_account_id: movement.destination_account_id.map(|d| d.to_string()),
            principal_amount: movement.principal,
            fee_amount: movement.fee,
            total_amount: movement.total,
            created_at: movement.created_at,
            committed_at: movement.committed_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyBody {
    code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReceiptView {
    movement_id: Uuid,
    reference: String,
    status: MovementStatus,
    kind: MovementKind,
    principal_amount: Amount,
    fee_amount: Amount,
    total_amount: Amount,
    balance_after: Amount,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_balance_after: Option<Amount>,
    committed_at: DateTime<Utc>,
}

impl From<Receipt> for ReceiptView {
    fn from(receipt: Receipt) -> Self {
        Self {
            movement_id: receipt.movement_id,
            reference: receipt.reference,
            status: MovementStatus::Committed,
            kind: receipt.kind,
            principal_amount: receipt.principal,
            fee_amount: receipt.fee,
            total_amount: receipt.total,
            balance_after: receipt.source_balance_after,
            destination_balance_after: receipt.destination_balance_after,
            committed_at: receipt.committed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ResendView {
    challenge_id: Uuid,
    new_expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordView {
    record_id: Uuid,
    movement_id: Uuid,
    account_id: String,
    direction: Direction,
    amount: Amount,
    balance_before: Amount,
    balance_after: Amount,
    reference: String,
    timestamp: DateTime<Utc>,
    status: RecordStatus,
}

impl From<TransactionRecord> for RecordView {
    fn from(record: TransactionRecord) -> Self {
        Self {
            record_id: record.record_id,
            movement_id: record.movement_id,
            account_id: record.account_id.to_string(),
            direction: record.direction,
            amount: record.amount,
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            reference: record.reference,
            timestamp: record.timestamp,
            status: record.status,
        }
    }
}

async fn open_account(
    State(state): State<AppState>,
    Json(body): Json<OpenAccountBody>,
) -> Result<(StatusCode, Json<AccountView>), ApiError> {
    let account = state
        .orchestrator
        .open_account(OpenAccountRequest {
            owner_id: body.owner_id,
            initial_balance: body.initial_balance,
            daily_transfer_limit: body.daily_transfer_limit,
            monthly_transfer_limit: body.monthly_transfer_limit,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(account.into())))
}

async fn list_accounts(State(state): State<AppState>) -> Result<Json<Vec<AccountView>>, ApiError> {
    let accounts = state.orchestrator.list_accounts().await?;
    Ok(Json(accounts.into_iter().map(AccountView::from).collect()))
}

async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountView>, ApiError> {
    let account = state
        .orchestrator
        .account(&AccountId::new(account_id))
        .await?;
    Ok(Json(account.into()))
}

async fn request_movement(
    State(state): State<AppState>,
    Json(body): Json<MovementBody>,
) -> Result<(StatusCode, Json<MovementView>), ApiError> {
    let movement = state
        .orchestrator
        .request_movement(MovementRequest {
            movement_id: body.idempotency_key,
            kind: body.kind,
            channel: body.channel,
            source_account_id: AccountId::new(body.source_account_id),
            destination_account_id: body.destination_account_id.map(AccountId::new),
            principal: body.principal_amount,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(movement.into())))
}

async fn get_movement(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> Result<Json<MovementView>, ApiError> {
    let movement = state.orchestrator.movement(movement_id).await?;
    Ok(Json(movement.into()))
}

async fn verify_otp(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<ReceiptView>, ApiError> {
    let receipt = state
        .orchestrator
        .confirm_movement(movement_id, &body.code)
        .await?;
    Ok(Json(receipt.into()))
}

async fn resend_otp(
    State(state): State<AppState>,
    Path(movement_id): Path<Uuid>,
) -> Result<Json<ResendView>, ApiError> {
    let challenge = state.orchestrator.resend_otp(movement_id).await?;
    Ok(Json(ResendView {
        challenge_id: challenge.challenge_id,
        new_expires_at: challenge.expires_at,
    }))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<RecordView>>, ApiError> {
    let filter = HistoryFilter {
        since: query.since,
        limit: query.limit.unwrap_or(50).min(MAX_HISTORY_PAGE),
    };
    let records = state
        .orchestrator
        .transactions(&AccountId::new(account_id), &filter)
        .await?;
    Ok(Json(records.into_iter().map(RecordView::from).collect()))
}

/// Maps ledger errors onto HTTP statuses.
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            LedgerError::Validation(_) | LedgerError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
            LedgerError::AccountNotFound { .. }
            | LedgerError::MovementNotFound { .. }
            | LedgerError::ChallengeNotFound { .. } => StatusCode::NOT_FOUND,
            LedgerError::AccountFrozen { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::LimitExceeded { .. }
            | LedgerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            LedgerError::WrongCode { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::OtpExpired | LedgerError::OtpExhausted | LedgerError::OtpAlreadyUsed => {
                StatusCode::GONE
            }
            LedgerError::ResendCooldown { .. } => StatusCode::TOO_MANY_REQUESTS,
            LedgerError::VersionConflict { .. } | LedgerError::Concurrency { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            LedgerError::CommitFailed(_)
            | LedgerError::Storage(_)
            | LedgerError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            #[cfg(feature = "storage-rocksdb")]
            LedgerError::RocksDb(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let mut body = serde_json::json!({ "error": self.0.to_string() });
        match &self.0 {
            LedgerError::WrongCode { attempts_remaining } => {
                body["attemptsRemaining"] = (*attempts_remaining).into();
            }
            LedgerError::ResendCooldown { until } => {
                body["retryAt"] = serde_json::json!(until);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}
