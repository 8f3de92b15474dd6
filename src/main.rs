use axum_prometheus::PrometheusMetricLayer;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use std::sync::Arc;
use std::time::Duration;
use tally::cluster::DbCluster;
use tally::config::AppConfig;
use tally::logging::setup_logging;
use tally::models::app_state::AppState;
use tally::services::cache_service::InMemoryCache;
use tally::services::ledger_service::LedgerProcessor;
use tally::services::scheduled_service::ScheduledService;
use tally::worker::WorkerPool;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), eyre::Error> {
    setup_logging();

    if dotenvy::dotenv().is_ok() {
        info!("Loaded .env file");
    } else {
        info!("No .env file found, using system environment");
    }

    let config = AppConfig::from_env()?;

    let cluster = DbCluster::connect(config.cluster.clone())
        .map_err(|e| eyre::eyre!("database cluster: {e}"))?;
    cluster.start();

    {
        let mut conn = cluster
            .master_conn()
            .map_err(|e| eyre::eyre!("master connection: {e}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| eyre::eyre!("migrations: {e}"))?;
        info!("Migrations are up to date");
    }

    let cache = InMemoryCache::new(CACHE_CLEANUP_INTERVAL);
    let state = AppState::new(Arc::clone(&cluster), cache.clone(), config.clone());

    match tally::services::cache_service::warm_balances(&state, 500).await {
        Ok(count) => info!(count, "cache warmed"),
        Err(e) => tracing::warn!(error = %e, "cache warm-up failed, continuing cold"),
    }

    let processor = LedgerProcessor::new(Arc::clone(&state));
    let pool = WorkerPool::start(config.worker.clone(), processor);
    state.attach_worker_pool(Arc::clone(&pool));

    // periodic sweep of due scheduled transactions
    let sweep_state = Arc::clone(&state);
    let sweep_handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_state.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = ScheduledService::sweep(&sweep_state).await {
                error!(error = %e, "scheduled sweep failed");
            }
        }
    });

    let (metric_layer, metric_handle) = PrometheusMetricLayer::pair();
    let router = tally::app::create_router(Arc::clone(&state), metric_layer, metric_handle);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %config.bind_addr, "tally listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    sweep_handle.abort();
    pool.shutdown(config.shutdown_grace).await;
    state.breakers.close_all();
    state.fallback.close();
    cache.close();
    cluster.close(config.shutdown_grace).await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
