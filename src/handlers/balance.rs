use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::BalanceResponse;
use crate::models::enums::Currency;
use crate::services::ledger_service::LedgerService;
use axum::extract::{Path, State};
use axum::Json;
use std::sync::Arc;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/balances",
    params(("user_id" = Uuid, Path, description = "User id")),
    responses((status = 200, description = "All balances", body = [BalanceResponse])),
    tag = "Balances"
)]
pub async fn list_balances(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<Vec<BalanceResponse>>, LedgerError> {
    Ok(Json(LedgerService::list_balances(&state, user_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/users/{user_id}/balances/{currency}",
    params(
        ("user_id" = Uuid, Path, description = "User id"),
        ("currency" = String, Path, description = "Currency code")
    ),
    responses(
        (status = 200, description = "Balance", body = BalanceResponse),
        (status = 404, description = "No balance for this currency")
    ),
    tag = "Balances"
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Path((user_id, currency)): Path<(Uuid, String)>,
) -> Result<Json<BalanceResponse>, LedgerError> {
    let currency = Currency::parse(&currency)?;
    Ok(Json(LedgerService::get_balance(&state, user_id, currency).await?))
}
