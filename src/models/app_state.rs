use crate::cluster::DbCluster;
use crate::config::AppConfig;
use crate::resilience::{BreakerRegistry, CircuitBreaker, FallbackExecutor, FallbackStrategy};
use crate::services::cache_service::LedgerCache;
use crate::services::event_publisher::EventBus;
use crate::worker::WorkerPool;
use std::sync::{Arc, OnceLock};

pub struct AppState {
    pub cluster: Arc<DbCluster>,
    pub cache: Arc<dyn LedgerCache>,
    /// One breaker per unreliable dependency, addressable by name.
    pub breakers: BreakerRegistry,
    /// Breaker in front of the replica read path.
    pub read_breaker: Arc<CircuitBreaker>,
    /// Fallback executor for lookups that tolerate cached results.
    pub fallback: Arc<FallbackExecutor>,
    /// Committed events fan out to in-process subscribers here.
    pub events: EventBus,
    pub config: AppConfig,
    worker_pool: OnceLock<Arc<WorkerPool>>,
}

impl AppState {
    pub fn new(
        cluster: Arc<DbCluster>,
        cache: Arc<dyn LedgerCache>,
        config: AppConfig,
    ) -> Arc<Self> {
        let breakers = BreakerRegistry::new(config.breaker.clone());
        let read_breaker = breakers.get_or_create("ledger-reads");
        let fallback = FallbackExecutor::new(config.fallback.clone(), FallbackStrategy::Degradation);

        Arc::new(Self {
            cluster,
            cache,
            breakers,
            read_breaker,
            fallback,
            events: EventBus::default(),
            config,
            worker_pool: OnceLock::new(),
        })
    }

    /// The pool is created after the state (it processes jobs through the
    /// ledger, which needs the state), so it is attached once here.
    pub fn attach_worker_pool(&self, pool: Arc<WorkerPool>) {
        if self.worker_pool.set(pool).is_err() {
            tracing::warn!("worker pool already attached");
        }
    }

    pub fn worker_pool(&self) -> Option<Arc<WorkerPool>> {
        self.worker_pool.get().cloned()
    }
}
