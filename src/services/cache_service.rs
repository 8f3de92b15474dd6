//! Read-through cache collaborator. The ledger owns the key scheme and
//! invalidates exactly the keys a successful commit touched; a miss falls
//! through to the database router. Entries never outlive an invalidation.

use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::BalanceResponse;
use crate::models::enums::Currency;
use crate::repositories::balance_repository::BalanceRepository;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

pub fn balance_key(user_id: Uuid, currency: Currency) -> String {
    format!("balance:{}:{}", user_id, currency)
}

pub fn transactions_key(user_id: Uuid) -> String {
    format!("transactions:{}", user_id)
}

/// TTL for warmed entries; the ledger invalidates eagerly on commit.
const WARM_TTL: Duration = Duration::from_secs(30);

/// Pre-load the hottest balances at startup so first reads hit the cache.
pub async fn warm_balances(state: &AppState, limit: i64) -> Result<usize, LedgerError> {
    let balances = {
        let mut conn = state.cluster.read_conn()?;
        BalanceRepository::recently_updated(&mut conn, limit)?
    };

    let mut entries = Vec::with_capacity(balances.len());
    for balance in balances {
        let key = balance_key(balance.user_id, balance.currency);
        let response = BalanceResponse::from(balance);
        entries.push((key, serde_json::to_value(&response)?));
    }

    let count = entries.len();
    state.cache.warm(entries, WARM_TTL).await;
    Ok(count)
}

#[async_trait]
pub trait LedgerCache: Send + Sync {
    /// A hit is only returned while the entry is fresh; expiry and
    /// invalidation both read as a miss (the miss itself never surfaces
    /// past this layer).
    async fn get(&self, key: &str) -> Option<JsonValue>;
    async fn set(&self, key: &str, value: JsonValue, ttl: Duration);
    async fn invalidate(&self, key: &str);
    async fn invalidate_prefix(&self, prefix: &str);
    /// Pre-populate entries, e.g. hot balances at startup.
    async fn warm(&self, entries: Vec<(String, JsonValue)>, ttl: Duration);
    async fn entry_count(&self) -> usize;
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

pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    shutdown_tx: watch::Sender<bool>,
    cleaner: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl InMemoryCache {
    pub fn new(cleanup_interval: Duration) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let cache = Arc::new(Self {
            entries: RwLock::new(HashMap::new()),
            shutdown_tx,
            cleaner: std::sync::Mutex::new(None),
        });

        let cleaner_ref = Arc::downgrade(&cache);
        let mut shutdown_rx = cache.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cleanup_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cache) = cleaner_ref.upgrade() else { return };
                        let mut entries = cache.entries.write().await;
                        let before = entries.len();
                        entries.retain(|_, entry| entry.is_fresh());
                        let removed = before - entries.len();
                        if removed > 0 {
                            debug!(removed, "ledger cache sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        });
        *cache.cleaner.lock().expect("cleaner lock poisoned") = Some(handle);

        cache
    }

    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.cleaner.lock().expect("cleaner lock poisoned").take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl LedgerCache for InMemoryCache {
    async fn get(&self, key: &str) -> Option<JsonValue> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_fresh() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.entries.write().await.remove(key);
        None
    }

    async fn set(&self, key: &str, value: JsonValue, ttl: Duration) {
        self.entries.write().await.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.entries
            .write()
            .await
            .retain(|key, _| !key.starts_with(prefix));
    }

    async fn warm(&self, entries: Vec<(String, JsonValue)>, ttl: Duration) {
        let mut map = self.entries.write().await;
        for (key, value) in entries {
            map.insert(
                key,
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                    ttl,
                },
            );
        }
    }

    async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn miss_after_invalidation() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        let key = balance_key(Uuid::new_v4(), Currency::USD);

        cache.set(&key, json!({"amount": "10.0000"}), Duration::from_secs(60)).await;
        assert!(cache.get(&key).await.is_some());

        cache.invalidate(&key).await;
        assert!(cache.get(&key).await.is_none());
        cache.close();
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let cache = InMemoryCache::new(Duration::from_secs(60));
        cache.set("k", json!(1), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.entry_count().await, 0);
        cache.close();
    }

    #[tokio::test]
    async fn prefix_invalidation_clears_only_matching_keys() {
        let user = Uuid::new_v4();
        let cache = InMemoryCache::new(Duration::from_secs(60));
        cache.set(&balance_key(user, Currency::USD), json!(1), Duration::from_secs(60)).await;
        cache.set(&balance_key(user, Currency::EUR), json!(2), Duration::from_secs(60)).await;
        cache.set("other", json!(3), Duration::from_secs(60)).await;

        cache.invalidate_prefix(&format!("balance:{}", user)).await;
        assert_eq!(cache.entry_count().await, 1);
        assert!(cache.get("other").await.is_some());
        cache.close();
    }
}
