use crate::handlers::{
    advanced::{
        cancel_batch, cancel_scheduled, create_batch, create_scheduled, get_batch, get_limit,
        get_rate, get_scheduled, list_scheduled, process_batch, sweep_scheduled, update_scheduled,
        upsert_limit, upsert_rate,
    },
    balance::{get_balance, list_balances},
    events::{
        all_events, event_count, events_by_type, events_for_aggregate, events_in_range,
        replay_aggregate, replay_by_type, replay_range, replay_statistics,
    },
    health::health_check,
    stats::{breaker_action, component_stats, list_breakers, trigger_failover},
    transaction::{
        cancel_transaction, convert, credit, debit, get_transaction, list_transactions,
        submit_async, transfer,
    },
    users::{create_user, get_user, update_user},
};
use crate::models::app_state::AppState;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_prometheus::{metrics_exporter_prometheus::PrometheusHandle, PrometheusMetricLayer};
use std::sync::Arc;
use tower::ServiceBuilder;
use std::time::Duration;
use tower_http::{
    request_id::{MakeRequestUuid, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health::health_check,
        crate::handlers::users::create_user,
        crate::handlers::users::get_user,
        crate::handlers::users::update_user,
        crate::handlers::balance::list_balances,
        crate::handlers::balance::get_balance,
        crate::handlers::transaction::credit,
        crate::handlers::transaction::debit,
        crate::handlers::transaction::transfer,
        crate::handlers::transaction::convert,
        crate::handlers::transaction::submit_async,
        crate::handlers::transaction::get_transaction,
        crate::handlers::transaction::list_transactions,
        crate::handlers::transaction::cancel_transaction,
        crate::handlers::advanced::create_scheduled,
        crate::handlers::advanced::get_scheduled,
        crate::handlers::advanced::update_scheduled,
        crate::handlers::advanced::list_scheduled,
        crate::handlers::advanced::cancel_scheduled,
        crate::handlers::advanced::sweep_scheduled,
        crate::handlers::advanced::create_batch,
        crate::handlers::advanced::get_batch,
        crate::handlers::advanced::process_batch,
        crate::handlers::advanced::cancel_batch,
        crate::handlers::advanced::upsert_limit,
        crate::handlers::advanced::get_limit,
        crate::handlers::advanced::upsert_rate,
        crate::handlers::advanced::get_rate,
        crate::handlers::events::events_for_aggregate,
        crate::handlers::events::event_count,
        crate::handlers::events::events_by_type,
        crate::handlers::events::all_events,
        crate::handlers::events::events_in_range,
        crate::handlers::events::replay_aggregate,
        crate::handlers::events::replay_by_type,
        crate::handlers::events::replay_range,
        crate::handlers::events::replay_statistics,
        crate::handlers::stats::component_stats,
        crate::handlers::stats::list_breakers,
        crate::handlers::stats::breaker_action,
        crate::handlers::stats::trigger_failover,
    ),
    info(
        title = "Tally ledger API",
        description = "Transaction processing core: balances, transfers, event sourcing"
    )
)]
pub struct ApiDoc;

pub fn create_router(
    state: Arc<AppState>,
    metric_layer: PrometheusMetricLayer<'static>,
    metric_handle: PrometheusHandle,
) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/stats", get(component_stats))
        .route("/api/breakers", get(list_breakers))
        .route("/api/breakers/{name}/{action}", post(breaker_action))
        .route("/api/cluster/failover", post(trigger_failover))
        .route("/api/users", post(create_user))
        .route("/api/users/{user_id}", get(get_user).put(update_user))
        .route("/api/users/{user_id}/balances", get(list_balances))
        .route("/api/users/{user_id}/balances/{currency}", get(get_balance))
        .route("/api/users/{user_id}/transactions", get(list_transactions))
        .route("/api/users/{user_id}/scheduled", get(list_scheduled))
        .route("/api/users/{user_id}/limits/{currency}", get(get_limit))
        .route("/api/transactions/credit", post(credit))
        .route("/api/transactions/debit", post(debit))
        .route("/api/transactions/transfer", post(transfer))
        .route("/api/transactions/convert", post(convert))
        .route("/api/transactions/async", post(submit_async))
        .route("/api/transactions/{transaction_id}", get(get_transaction))
        .route(
            "/api/transactions/{transaction_id}/cancel",
            post(cancel_transaction),
        )
        .route("/api/scheduled", post(create_scheduled))
        .route("/api/scheduled/sweep", post(sweep_scheduled))
        .route("/api/scheduled/{id}", get(get_scheduled).put(update_scheduled))
        .route("/api/scheduled/{id}/cancel", post(cancel_scheduled))
        .route("/api/batches", post(create_batch))
        .route("/api/batches/{id}", get(get_batch))
        .route("/api/batches/{id}/process", post(process_batch))
        .route("/api/batches/{id}/cancel", post(cancel_batch))
        .route("/api/limits", put(upsert_limit))
        .route("/api/exchange_rates", put(upsert_rate))
        .route("/api/exchange_rates/{from}/{to}", get(get_rate))
        .route("/api/events", get(all_events))
        .route("/api/events/range", get(events_in_range))
        .route("/api/events/type/{event_type}", get(events_by_type))
        .route("/api/events/{aggregate_id}", get(events_for_aggregate))
        .route("/api/events/{aggregate_id}/count", get(event_count))
        .route("/api/replay/aggregate/{aggregate_id}", post(replay_aggregate))
        .route("/api/replay/type/{event_type}", post(replay_by_type))
        .route("/api/replay/range", post(replay_range))
        .route("/api/replay/statistics", get(replay_statistics))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .route(
            "/metrics",
            get(move || async move { metric_handle.render() }),
        )
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(Duration::from_secs(30))),
        )
        .layer(metric_layer)
        .with_state(state)
}
