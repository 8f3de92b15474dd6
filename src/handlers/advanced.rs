//! Scheduled, batch, limit, and exchange-rate endpoints.

use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{
    BatchRequest, BatchResponse, ExchangeRateResponse, LimitRequest, LimitResponse,
    ScheduleRequest, ScheduledTransactionResponse, SweepOutcome, UpdateScheduleRequest,
};
use crate::models::entities::{NewExchangeRate, NewTransactionLimit};
use crate::models::enums::Currency;
use crate::money;
use crate::repositories::exchange_rate_repository::ExchangeRateRepository;
use crate::repositories::limit_repository::LimitRepository;
use crate::services::batch_service::BatchService;
use crate::services::ledger_service::LedgerService;
use crate::services::scheduled_service::ScheduledService;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use http::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// ---- scheduled transactions -------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/scheduled",
    request_body = ScheduleRequest,
    responses(
        (status = 201, description = "Scheduled", body = ScheduledTransactionResponse),
        (status = 400, description = "Scheduled time not in the future")
    ),
    tag = "Scheduled"
)]
pub async fn create_scheduled(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ScheduleRequest>,
) -> Result<(StatusCode, Json<ScheduledTransactionResponse>), LedgerError> {
    let scheduled = ScheduledService::create(&state, req).await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

#[utoipa::path(
    get,
    path = "/api/scheduled/{id}",
    params(("id" = Uuid, Path, description = "Scheduled transaction id")),
    responses(
        (status = 200, description = "Scheduled transaction", body = ScheduledTransactionResponse),
        (status = 404, description = "Unknown scheduled transaction")
    ),
    tag = "Scheduled"
)]
pub async fn get_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ScheduledTransactionResponse>, LedgerError> {
    Ok(Json(ScheduledService::get(&state, id).await?))
}

#[utoipa::path(
    put,
    path = "/api/scheduled/{id}",
    params(("id" = Uuid, Path, description = "Scheduled transaction id")),
    request_body = UpdateScheduleRequest,
    responses(
        (status = 200, description = "Scheduled transaction updated", body = ScheduledTransactionResponse),
        (status = 400, description = "Not pending, or scheduled time not in the future"),
        (status = 404, description = "Unknown scheduled transaction")
    ),
    tag = "Scheduled"
)]
pub async fn update_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<ScheduledTransactionResponse>, LedgerError> {
    Ok(Json(ScheduledService::update(&state, id, req).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/scheduled",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "Scheduled transactions", body = [ScheduledTransactionResponse])),
    tag = "Scheduled"
)]
pub async fn list_scheduled(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<ScheduledTransactionResponse>>, LedgerError> {
    Ok(Json(ScheduledService::list_for_user(&state, user_id).await?))
}

#[utoipa::path(
    post,
    path = "/api/scheduled/{id}/cancel",
    params(("id" = Uuid, Path, description = "Scheduled transaction id")),
    responses(
        (status = 204, description = "Cancelled"),
        (status = 400, description = "Not cancellable")
    ),
    tag = "Scheduled"
)]
pub async fn cancel_scheduled(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, LedgerError> {
    ScheduledService::cancel(&state, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/scheduled/sweep",
    responses((status = 200, description = "Sweep outcome", body = SweepOutcome)),
    tag = "Scheduled"
)]
pub async fn sweep_scheduled(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SweepOutcome>, LedgerError> {
    Ok(Json(ScheduledService::sweep(&state).await?))
}

// ---- batch transactions -----------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/batches",
    request_body = BatchRequest,
    responses(
        (status = 201, description = "Batch created", body = BatchResponse),
        (status = 400, description = "Empty or oversized batch")
    ),
    tag = "Batches"
)]
pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchResponse>), LedgerError> {
    let batch = BatchService::create(&state, req).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

#[utoipa::path(
    get,
    path = "/api/batches/{id}",
    params(("id" = Uuid, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Batch with items", body = BatchResponse),
        (status = 404, description = "Unknown batch")
    ),
    tag = "Batches"
)]
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, LedgerError> {
    Ok(Json(BatchService::get(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/process",
    params(("id" = Uuid, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Batch processed", body = BatchResponse),
        (status = 400, description = "Batch is not pending")
    ),
    tag = "Batches"
)]
pub async fn process_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, LedgerError> {
    Ok(Json(BatchService::process(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/api/batches/{id}/cancel",
    params(("id" = Uuid, Path, description = "Batch id")),
    responses(
        (status = 200, description = "Batch cancelled", body = BatchResponse),
        (status = 400, description = "Only pending batches can be cancelled")
    ),
    tag = "Batches"
)]
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, LedgerError> {
    Ok(Json(BatchService::cancel(&state, id).await?))
}

// ---- transaction limits -----------------------------------------------------

#[utoipa::path(
    put,
    path = "/api/limits",
    request_body = LimitRequest,
    responses((status = 200, description = "Limit stored", body = LimitResponse)),
    tag = "Limits"
)]
pub async fn upsert_limit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LimitRequest>,
) -> Result<Json<LimitResponse>, LedgerError> {
    req.validate()?;
    let currency = Currency::parse(&req.currency)?;
    let new_limit = NewTransactionLimit {
        user_id: req.user_id,
        currency,
        daily_limit: money::parse_amount(&req.daily_limit)?,
        weekly_limit: money::parse_amount(&req.weekly_limit)?,
        monthly_limit: money::parse_amount(&req.monthly_limit)?,
        single_limit: money::parse_amount(&req.single_limit)?,
        last_reset_date: Utc::now(),
        is_active: true,
    };

    let mut conn = state.cluster.master_conn()?;
    let limit = LimitRepository::upsert(&mut conn, new_limit)?;
    Ok(Json(limit.into()))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/limits/{currency}",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("currency" = String, Path, description = "Currency code")
    ),
    responses(
        (status = 200, description = "Limit", body = LimitResponse),
        (status = 404, description = "No limit configured")
    ),
    tag = "Limits"
)]
pub async fn get_limit(
    State(state): State<Arc<AppState>>,
    Path((user_id, currency)): Path<(Uuid, String)>,
) -> Result<Json<LimitResponse>, LedgerError> {
    let currency = Currency::parse(&currency)?;
    let mut conn = state.cluster.replica_conn()?;
    LimitRepository::find(&mut conn, user_id, currency)?
        .map(|limit| Json(limit.into()))
        .ok_or(LedgerError::LimitNotFound)
}

// ---- exchange rates ---------------------------------------------------------

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RateRequest {
    #[validate(length(min = 3, max = 3))]
    pub from_currency: String,
    #[validate(length(min = 3, max = 3))]
    pub to_currency: String,
    #[validate(length(min = 1))]
    pub rate: String,
    #[serde(default)]
    pub source: Option<String>,
}

#[utoipa::path(
    put,
    path = "/api/exchange_rates",
    request_body = RateRequest,
    responses((status = 200, description = "Rate stored", body = ExchangeRateResponse)),
    tag = "Rates"
)]
pub async fn upsert_rate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RateRequest>,
) -> Result<Json<ExchangeRateResponse>, LedgerError> {
    req.validate()?;
    let from = Currency::parse(&req.from_currency)?;
    let to = Currency::parse(&req.to_currency)?;
    if from == to {
        return Err(LedgerError::InvalidState("rate endpoints must differ".to_string()));
    }
    let rate = money::parse_rate(&req.rate)?;

    let mut conn = state.cluster.master_conn()?;
    let stored = ExchangeRateRepository::upsert(
        &mut conn,
        NewExchangeRate {
            from_currency: from,
            to_currency: to,
            rate,
            last_updated: Utc::now(),
            source: req.source.as_deref().unwrap_or("manual"),
        },
    )?;
    state.fallback.invalidate(&format!("rate:{}:{}", from, to));
    Ok(Json(stored.into()))
}

#[utoipa::path(
    get,
    path = "/api/exchange_rates/{from}/{to}",
    params(
        ("from" = String, Path, description = "Source currency"),
        ("to" = String, Path, description = "Target currency")
    ),
    responses(
        (status = 200, description = "Freshest rate", body = ExchangeRateResponse),
        (status = 404, description = "No rate for the pair")
    ),
    tag = "Rates"
)]
pub async fn get_rate(
    State(state): State<Arc<AppState>>,
    Path((from, to)): Path<(String, String)>,
) -> Result<Json<ExchangeRateResponse>, LedgerError> {
    let from = Currency::parse(&from)?;
    let to = Currency::parse(&to)?;
    Ok(Json(LedgerService::get_exchange_rate(&state, from, to).await?))
}
