use crate::models::app_state::AppState;
use axum::extract::State;
use axum::Json;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/api/health",
    responses((status = 200, description = "Service is up")),
    tag = "System"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "master_active": state.cluster.stats().master_active,
    }))
}
