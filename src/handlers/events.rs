//! Event store reads and replay triggers.

use crate::error::LedgerError;
use crate::models::aggregate::Projection;
use crate::models::app_state::AppState;
use crate::models::dtos::{EventResponse, PageQuery, TimeRangeQuery};
use crate::models::events::DomainEvent;
use crate::repositories::event_store::{EventStore, EventStoreStatistics};
use crate::services::replay_service::ReplayService;
use axum::extract::{Path, Query, State};
use axum::Json;
use http::StatusCode;
use std::sync::Arc;
use uuid::Uuid;

fn to_response(event: DomainEvent) -> EventResponse {
    EventResponse {
        id: event.id,
        event_type: event.event_type.to_string(),
        aggregate_id: event.aggregate_id,
        version: event.version,
        occurred_at: event.occurred_at,
        data: event.data,
        metadata: event.metadata,
    }
}

#[utoipa::path(
    get,
    path = "/api/events/{aggregate_id}",
    params(("aggregate_id" = Uuid, Path, description = "Aggregate id")),
    responses((status = 200, description = "Events in version order", body = [EventResponse])),
    tag = "Events"
)]
pub async fn events_for_aggregate(
    State(state): State<Arc<AppState>>,
    Path(aggregate_id): Path<Uuid>,
) -> Result<Json<Vec<EventResponse>>, LedgerError> {
    let mut conn = state.cluster.replica_conn()?;
    let events = EventStore::by_aggregate(&mut conn, aggregate_id)?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

#[utoipa::path(
    get,
    path = "/api/events/{aggregate_id}/count",
    params(("aggregate_id" = Uuid, Path, description = "Aggregate id")),
    responses((status = 200, description = "Event count")),
    tag = "Events"
)]
pub async fn event_count(
    State(state): State<Arc<AppState>>,
    Path(aggregate_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, LedgerError> {
    let mut conn = state.cluster.replica_conn()?;
    let count = EventStore::count(&mut conn, aggregate_id)?;
    Ok(Json(serde_json::json!({ "aggregate_id": aggregate_id, "count": count })))
}

#[utoipa::path(
    get,
    path = "/api/events/type/{event_type}",
    params(
        ("event_type" = String, Path, description = "Event type tag"),
        ("limit" = i64, Query, description = "Page size"),
        ("offset" = i64, Query, description = "Page offset")
    ),
    responses((status = 200, description = "Events in timestamp order", body = [EventResponse])),
    tag = "Events"
)]
pub async fn events_by_type(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<EventResponse>>, LedgerError> {
    let mut conn = state.cluster.replica_conn()?;
    let events = EventStore::by_type(&mut conn, &event_type, page.limit, page.offset)?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

#[utoipa::path(
    get,
    path = "/api/events",
    params(
        ("limit" = i64, Query, description = "Page size"),
        ("offset" = i64, Query, description = "Page offset")
    ),
    responses((status = 200, description = "All events in timestamp order", body = [EventResponse])),
    tag = "Events"
)]
pub async fn all_events(
    State(state): State<Arc<AppState>>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<EventResponse>>, LedgerError> {
    let mut conn = state.cluster.replica_conn()?;
    let events = EventStore::all(&mut conn, page.limit, page.offset)?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

#[utoipa::path(
    get,
    path = "/api/events/range",
    params(
        ("start" = String, Query, description = "Window start (RFC 3339)"),
        ("end" = String, Query, description = "Window end (RFC 3339)")
    ),
    responses((status = 200, description = "Events in the window", body = [EventResponse])),
    tag = "Events"
)]
pub async fn events_in_range(
    State(state): State<Arc<AppState>>,
    Query(range): Query<TimeRangeQuery>,
) -> Result<Json<Vec<EventResponse>>, LedgerError> {
    let mut conn = state.cluster.replica_conn()?;
    let events = EventStore::in_range(&mut conn, range.start, range.end)?;
    Ok(Json(events.into_iter().map(to_response).collect()))
}

#[utoipa::path(
    post,
    path = "/api/replay/aggregate/{aggregate_id}",
    params(("aggregate_id" = Uuid, Path, description = "Aggregate id")),
    responses(
        (status = 200, description = "Projection rebuilt from events"),
        (status = 404, description = "No events for this aggregate")
    ),
    tag = "Replay"
)]
pub async fn replay_aggregate(
    State(state): State<Arc<AppState>>,
    Path(aggregate_id): Path<Uuid>,
) -> Result<Json<Projection>, (StatusCode, String)> {
    let replayed = ReplayService::replay_aggregate(&state, aggregate_id)
        .await
        .map_err(Into::<(StatusCode, String)>::into)?;
    match replayed {
        Some(projection) => Ok(Json(projection)),
        None => Err(replay_not_found(aggregate_id)),
    }
}

#[utoipa::path(
    post,
    path = "/api/replay/type/{event_type}",
    params(
        ("event_type" = String, Path, description = "Event type tag"),
        ("limit" = i64, Query, description = "Page size"),
        ("offset" = i64, Query, description = "Page offset")
    ),
    responses((status = 200, description = "Projections for every touched aggregate")),
    tag = "Replay"
)]
pub async fn replay_by_type(
    State(state): State<Arc<AppState>>,
    Path(event_type): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<Projection>>, LedgerError> {
    Ok(Json(
        ReplayService::replay_by_type(&state, &event_type, page.limit, page.offset).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/api/replay/range",
    params(
        ("start" = String, Query, description = "Window start (RFC 3339)"),
        ("end" = String, Query, description = "Window end (RFC 3339)")
    ),
    responses((status = 200, description = "Projections for every touched aggregate")),
    tag = "Replay"
)]
pub async fn replay_range(
    State(state): State<Arc<AppState>>,
    Query(range): Query<TimeRangeQuery>,
) -> Result<Json<Vec<Projection>>, LedgerError> {
    Ok(Json(
        ReplayService::replay_time_range(&state, range.start, range.end).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/replay/statistics",
    responses((status = 200, description = "Event store rollup")),
    tag = "Replay"
)]
pub async fn replay_statistics(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EventStoreStatistics>, LedgerError> {
    Ok(Json(ReplayService::statistics(&state).await?))
}

fn replay_not_found(aggregate_id: Uuid) -> (StatusCode, String) {
    (
        StatusCode::NOT_FOUND,
        format!("no events recorded for aggregate {}", aggregate_id),
    )
}
