use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{
    ConvertRequest, CreditRequest, DebitRequest, PageQuery, TransactionResponse, TransferRequest,
};
use crate::models::enums::{Currency, TransactionKind, TransactionStatus};
use crate::money;
use crate::services::ledger_service::LedgerService;
use crate::worker::TransactionJob;
use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[utoipa::path(
    post,
    path = "/api/transactions/credit",
    request_body = CreditRequest,
    responses(
        (status = 201, description = "Credit applied", body = TransactionResponse),
        (status = 400, description = "Invalid input"),
        (status = 422, description = "Limit exceeded")
    ),
    tag = "Transactions"
)]
pub async fn credit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreditRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), LedgerError> {
    let tx = LedgerService::credit(&state, req).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[utoipa::path(
    post,
    path = "/api/transactions/debit",
    request_body = DebitRequest,
    responses(
        (status = 201, description = "Debit applied", body = TransactionResponse),
        (status = 422, description = "Insufficient funds or limit exceeded")
    ),
    tag = "Transactions"
)]
pub async fn debit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DebitRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), LedgerError> {
    let tx = LedgerService::debit(&state, req).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[utoipa::path(
    post,
    path = "/api/transactions/transfer",
    request_body = TransferRequest,
    responses(
        (status = 201, description = "Transfer applied", body = TransactionResponse),
        (status = 422, description = "Insufficient funds or limit exceeded")
    ),
    tag = "Transactions"
)]
pub async fn transfer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TransferRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), LedgerError> {
    let tx = LedgerService::transfer(&state, req).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[utoipa::path(
    post,
    path = "/api/transactions/convert",
    request_body = ConvertRequest,
    responses(
        (status = 201, description = "Conversion applied", body = TransactionResponse),
        (status = 404, description = "No exchange rate for the pair")
    ),
    tag = "Transactions"
)]
pub async fn convert(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConvertRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), LedgerError> {
    let tx = LedgerService::convert(&state, req).await?;
    Ok((StatusCode::CREATED, Json(tx)))
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AsyncJobRequest {
    pub kind: TransactionKind,
    pub user_id: Uuid,
    #[serde(default)]
    pub counterparty_id: Option<Uuid>,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[serde(default)]
    pub to_currency: Option<String>,
    #[validate(length(min = 1))]
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/transactions/async",
    request_body = AsyncJobRequest,
    responses(
        (status = 202, description = "Job queued"),
        (status = 503, description = "Worker pool unavailable")
    ),
    tag = "Transactions"
)]
pub async fn submit_async(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AsyncJobRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>), LedgerError> {
    req.validate()?;
    let currency = Currency::parse(&req.currency)?;
    let to_currency = req.to_currency.as_deref().map(Currency::parse).transpose()?;
    let amount = money::parse_amount(&req.amount)?;

    let Some(pool) = state.worker_pool() else {
        return Err(LedgerError::Internal("worker pool is not running".to_string()));
    };

    pool.submit(TransactionJob {
        kind: req.kind,
        user_id: req.user_id,
        counterparty_id: req.counterparty_id,
        currency,
        to_currency,
        amount,
        description: req.description.unwrap_or_default(),
        reference_id: req.reference_id,
    })
    .await;

    Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "queued": true }))))
}

#[utoipa::path(
    get,
    path = "/api/transactions/{transaction_id}",
    params(("transaction_id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction", body = TransactionResponse),
        (status = 404, description = "Unknown transaction")
    ),
    tag = "Transactions"
)]
pub async fn get_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, LedgerError> {
    Ok(Json(LedgerService::get_transaction(&state, transaction_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/transactions",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("limit" = i64, Query, description = "Page size"),
        ("offset" = i64, Query, description = "Page offset")
    ),
    responses((status = 200, description = "Transactions", body = [TransactionResponse])),
    tag = "Transactions"
)]
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<TransactionResponse>>, LedgerError> {
    Ok(Json(
        LedgerService::list_transactions(&state, user_id, page.limit, page.offset).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/transactions/{transaction_id}/cancel",
    params(("transaction_id" = Uuid, Path, description = "Transaction id")),
    responses(
        (status = 200, description = "Transaction cancelled", body = TransactionResponse),
        (status = 400, description = "Not cancellable from its current state")
    ),
    tag = "Transactions"
)]
pub async fn cancel_transaction(
    State(state): State<Arc<AppState>>,
    Path(transaction_id): Path<Uuid>,
) -> Result<Json<TransactionResponse>, LedgerError> {
    let tx = LedgerService::update_transaction_status(
        &state,
        transaction_id,
        TransactionStatus::Cancelled,
        Some("cancelled via API".to_string()),
    )
    .await?;
    Ok(Json(tx.into()))
}
