use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::resilience::BreakerStats;
use axum::extract::{Path, State};
use axum::Json;
use http::StatusCode;
use std::sync::Arc;

/// One snapshot across the resilience components: cluster topology,
/// breakers, fallback cache, and worker pool.
#[utoipa::path(
    get,
    path = "/api/stats",
    responses((status = 200, description = "Component statistics")),
    tag = "System"
)]
pub async fn component_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let worker = state.worker_pool().map(|pool| pool.stats());
    Ok(Json(serde_json::json!({
        "cluster": state.cluster.stats(),
        "read_breaker": state.read_breaker.stats(),
        "breakers": state.breakers.stats(),
        "fallback": state.fallback.stats(),
        "worker_pool": worker,
        "cache_entries": state.cache.entry_count().await,
        "event_subscribers": state.events.subscriber_count(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/breakers",
    responses((status = 200, description = "Every registered breaker")),
    tag = "System"
)]
pub async fn list_breakers(State(state): State<Arc<AppState>>) -> Json<Vec<BreakerStats>> {
    Json(state.breakers.stats())
}

/// Admin override: `force_open`, `force_close`, or `reset` a named breaker.
#[utoipa::path(
    post,
    path = "/api/breakers/{name}/{action}",
    params(
        ("name" = String, Path, description = "Breaker name"),
        ("action" = String, Path, description = "force_open | force_close | reset")
    ),
    responses(
        (status = 200, description = "Breaker state after the override"),
        (status = 400, description = "Unknown action"),
        (status = 404, description = "Unknown breaker")
    ),
    tag = "System"
)]
pub async fn breaker_action(
    State(state): State<Arc<AppState>>,
    Path((name, action)): Path<(String, String)>,
) -> Result<Json<BreakerStats>, (StatusCode, String)> {
    let Some(breaker) = state.breakers.get(&name) else {
        return Err((StatusCode::NOT_FOUND, format!("no breaker named {name:?}")));
    };

    match action.as_str() {
        "force_open" => breaker.force_open(),
        "force_close" => breaker.force_close(),
        "reset" => breaker.reset(),
        other => {
            return Err((
                StatusCode::BAD_REQUEST,
                format!("unknown breaker action {other:?}"),
            ))
        }
    }

    Ok(Json(breaker.stats()))
}

#[utoipa::path(
    post,
    path = "/api/cluster/failover",
    responses((status = 200, description = "Promotion attempted, current topology returned")),
    tag = "System"
)]
pub async fn trigger_failover(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    state.cluster.trigger_failover();
    Ok(Json(serde_json::json!({ "cluster": state.cluster.stats() })))
}
