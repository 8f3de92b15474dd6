#![allow(dead_code)] // not every test binary uses every helper

use axum::Router;
use axum_prometheus::{metrics_exporter_prometheus::PrometheusHandle, PrometheusMetricLayer};
use secrecy::SecretString;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tally::cluster::DbCluster;
use tally::config::{
    AppConfig, BreakerConfig, ClusterConfig, FallbackConfig, NodeConfig, WorkerConfig,
};
use tally::models::app_state::AppState;
use tally::services::cache_service::InMemoryCache;

/// Node pointing at nothing; pools are built unchecked so no test here ever
/// needs a live database.
pub fn node(name: &str, weight: u32) -> NodeConfig {
    NodeConfig {
        name: name.to_string(),
        url: SecretString::from(format!("postgres://localhost:1/{name}")),
        weight,
    }
}

pub fn test_cluster_config(replica_weights: &[u32], read_weights: &[u32]) -> ClusterConfig {
    ClusterConfig {
        master: node("master", 1),
        replicas: replica_weights
            .iter()
            .enumerate()
            .map(|(i, w)| node(&format!("replica-{i}"), *w))
            .collect(),
        read_replicas: read_weights
            .iter()
            .enumerate()
            .map(|(i, w)| node(&format!("read-{i}"), *w))
            .collect(),
        max_connections: 2,
        min_idle: None,
        conn_max_lifetime: Duration::from_secs(300),
        health_check_interval: Duration::from_secs(3600),
        ping_timeout: Duration::from_secs(1),
        failover_enabled: true,
    }
}

pub fn test_app_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        cluster: test_cluster_config(&[], &[]),
        breaker: BreakerConfig::default(),
        fallback: FallbackConfig {
            enable_caching: false,
            ..FallbackConfig::default()
        },
        worker: WorkerConfig {
            worker_count: 2,
            queue_capacity: 16,
        },
        sweep_interval: Duration::from_secs(3600),
        batch_concurrency: 1,
        shutdown_grace: Duration::from_secs(5),
    }
}

pub fn create_test_state() -> Arc<AppState> {
    let config = test_app_config();
    let cluster = DbCluster::connect_lazy(config.cluster.clone());
    let cache = InMemoryCache::new(Duration::from_secs(60));
    AppState::new(cluster, cache, config)
}

/// The prometheus recorder can only be installed once per process.
fn metric_pair() -> (PrometheusMetricLayer<'static>, PrometheusHandle) {
    static PAIR: OnceLock<(PrometheusMetricLayer<'static>, PrometheusHandle)> = OnceLock::new();
    PAIR.get_or_init(PrometheusMetricLayer::pair).clone()
}

pub fn create_test_app(state: Arc<AppState>) -> Router {
    let (metric_layer, metric_handle) = metric_pair();
    tally::app::create_router(state, metric_layer, metric_handle)
}
