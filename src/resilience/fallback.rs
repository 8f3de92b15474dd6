//! Fallback executor: run a primary operation and, when it fails, a chain
//! of fallbacks under one of three strategies. Successful results are cached
//! (JSON-encoded) with a per-entry TTL; a background sweep purges expired
//! entries once per minute.

use crate::config::FallbackConfig;
use crate::error::LedgerError;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    Sequential,
    Parallel,
    Degradation,
}

struct CacheEntry {
    value: JsonValue,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_fresh(&self) -> bool {
        self.stored_at.elapsed() <= self.ttl
    }
}

pub struct FallbackExecutor {
    config: FallbackConfig,
    strategy: FallbackStrategy,
    cache: RwLock<HashMap<String, CacheEntry>>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct FallbackStats {
    pub cache_size: usize,
    pub enable_caching: bool,
    pub enable_degradation: bool,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
    pub cache_ttl_secs: u64,
}

impl FallbackExecutor {
    pub fn new(config: FallbackConfig, strategy: FallbackStrategy) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let executor = Arc::new(Self {
            config,
            strategy,
            cache: RwLock::new(HashMap::new()),
            shutdown_tx,
            sweeper: Mutex::new(None),
        });

        if executor.config.enable_caching {
            let sweeper_ref = Arc::downgrade(&executor);
            let mut shutdown_rx = executor.shutdown_tx.subscribe();
            let handle = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(60));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let Some(executor) = sweeper_ref.upgrade() else { return };
                            executor.cleanup();
                        }
                        _ = shutdown_rx.changed() => return,
                    }
                }
            });
            *executor.sweeper.lock().expect("sweeper lock poisoned") = Some(handle);
        }

        executor
    }

    /// Run `primary`, falling back per the configured strategy. `key`
    /// addresses the result cache; a fresh cached value short-circuits the
    /// primary entirely.
    pub async fn execute<T>(
        &self,
        key: &str,
        primary: BoxFuture<'_, Result<T, LedgerError>>,
        fallbacks: Vec<BoxFuture<'_, Result<T, LedgerError>>>,
    ) -> Result<T, LedgerError>
    where
        T: Serialize + DeserializeOwned + Send,
    {
        if self.config.enable_caching {
            if let Some(value) = self.cache_get(key) {
                debug!(key, "fallback cache hit");
                return serde_json::from_value(value).map_err(Into::into);
            }
        }

        let result = match self.strategy {
            FallbackStrategy::Sequential => self.run_sequential(key, primary, fallbacks).await,
            FallbackStrategy::Parallel => self.run_parallel(key, primary, fallbacks).await,
            FallbackStrategy::Degradation => self.run_degradation(key, primary, fallbacks).await,
        }?;

        if self.config.enable_caching {
            self.cache_set(key, serde_json::to_value(&result)?);
        }

        Ok(result)
    }

    async fn run_sequential<T>(
        &self,
        key: &str,
        primary: BoxFuture<'_, Result<T, LedgerError>>,
        fallbacks: Vec<BoxFuture<'_, Result<T, LedgerError>>>,
    ) -> Result<T, LedgerError> {
        match primary.await {
            Ok(value) => return Ok(value),
            Err(e) => debug!(key, error = %e, "primary failed, trying fallbacks"),
        }

        for (i, fallback) in fallbacks.into_iter().enumerate() {
            if i > 0 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match fallback.await {
                Ok(value) => return Ok(value),
                Err(e) => debug!(key, fallback = i, error = %e, "fallback failed"),
            }
        }

        Err(LedgerError::AllFallbacksFailed)
    }

    async fn run_parallel<T>(
        &self,
        key: &str,
        primary: BoxFuture<'_, Result<T, LedgerError>>,
        fallbacks: Vec<BoxFuture<'_, Result<T, LedgerError>>>,
    ) -> Result<T, LedgerError>
    where
        T: Send,
    {
        let primary_err = match primary.await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if fallbacks.is_empty() {
            return Err(primary_err);
        }

        let race = async {
            let mut pending: FuturesUnordered<_> = fallbacks.into_iter().collect();
            while let Some(result) = pending.next().await {
                if let Ok(value) = result {
                    return Ok(value);
                }
            }
            Err(LedgerError::AllFallbacksFailed)
        };

        match tokio::time::timeout(self.config.timeout, race).await {
            Ok(result) => result,
            Err(_) => {
                debug!(key, "parallel fallbacks timed out");
                Err(LedgerError::Timeout)
            }
        }
    }

    async fn run_degradation<T>(
        &self,
        key: &str,
        primary: BoxFuture<'_, Result<T, LedgerError>>,
        fallbacks: Vec<BoxFuture<'_, Result<T, LedgerError>>>,
    ) -> Result<T, LedgerError> {
        let primary_err = match primary.await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if !self.config.enable_degradation {
            return Err(primary_err);
        }

        for (i, fallback) in fallbacks.into_iter().enumerate() {
            if i > 0 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
            if let Ok(value) = fallback.await {
                info!(key, fallback = i, primary_error = %primary_err, "degradation activated");
                return Ok(value);
            }
        }

        Err(LedgerError::AllFallbacksFailed)
    }

    /// A cached value counts only while `now - stored_at <= ttl`; expired
    /// entries are removed on read and treated as absent.
    fn cache_get(&self, key: &str) -> Option<JsonValue> {
        {
            let cache = self.cache.read().expect("cache lock poisoned");
            match cache.get(key) {
                Some(entry) if entry.is_fresh() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.cache.write().expect("cache lock poisoned").remove(key);
        None
    }

    fn cache_set(&self, key: &str, value: JsonValue) {
        self.cache.write().expect("cache lock poisoned").insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl: self.config.cache_ttl,
            },
        );
    }

    /// Drop a cached result, e.g. after the underlying row changed.
    pub fn invalidate(&self, key: &str) {
        self.cache.write().expect("cache lock poisoned").remove(key);
    }

    fn cleanup(&self) {
        let mut cache = self.cache.write().expect("cache lock poisoned");
        let before = cache.len();
        cache.retain(|_, entry| entry.is_fresh());
        let removed = before - cache.len();
        if removed > 0 {
            debug!(removed, "fallback cache sweep");
        }
    }

    pub fn stats(&self) -> FallbackStats {
        FallbackStats {
            cache_size: self.cache.read().expect("cache lock poisoned").len(),
            enable_caching: self.config.enable_caching,
            enable_degradation: self.config.enable_degradation,
            max_retries: self.config.max_retries,
            retry_delay_ms: self.config.retry_delay.as_millis() as u64,
            timeout_secs: self.config.timeout.as_secs(),
            cache_ttl_secs: self.config.cache_ttl.as_secs(),
        }
    }

    /// Stop the cache sweeper.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.sweeper.lock().expect("sweeper lock poisoned").take() {
            handle.abort();
        }
    }
}
