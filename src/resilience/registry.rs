//! Named circuit-breaker registry. Each dependency gets its own breaker
//! instance; admin endpoints address them by name.

use crate::config::BreakerConfig;
use crate::resilience::circuit_breaker::{BreakerStats, CircuitBreaker};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub struct BreakerRegistry {
    default_config: BreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(default_config: BreakerConfig) -> Self {
        Self {
            default_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The breaker for `name`, created with the default config on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().expect("registry lock poisoned").get(name) {
            return Arc::clone(breaker);
        }

        let mut breakers = self.breakers.write().expect("registry lock poisoned");
        // re-check: another writer may have won the race
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }
        let breaker = CircuitBreaker::new(name.to_string(), self.default_config.clone());
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Register a breaker with a non-default config (e.g. strict for a
    /// flaky dependency). Replaces any existing breaker of the same name.
    pub fn register(&self, name: &str, config: BreakerConfig) -> Arc<CircuitBreaker> {
        let breaker = CircuitBreaker::new(name.to_string(), config);
        let previous = self
            .breakers
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_string(), Arc::clone(&breaker));
        if let Some(previous) = previous {
            previous.close();
        }
        breaker
    }

    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
    }

    pub fn stats(&self) -> Vec<BreakerStats> {
        let mut stats: Vec<BreakerStats> = self
            .breakers
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|b| b.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Stop every breaker's background ticker.
    pub fn close_all(&self) {
        for breaker in self.breakers.read().expect("registry lock poisoned").values() {
            breaker.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::circuit_breaker::BreakerState;

    #[tokio::test]
    async fn get_or_create_returns_the_same_instance() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let first = registry.get_or_create("db-reads");
        let second = registry.get_or_create("db-reads");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.stats().len(), 1);
        registry.close_all();
    }

    #[tokio::test]
    async fn register_replaces_and_closes_previous() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        let original = registry.get_or_create("cache");
        original.force_open();

        let replacement = registry.register("cache", BreakerConfig::strict());
        assert!(!Arc::ptr_eq(&original, &replacement));
        assert_eq!(replacement.state(), BreakerState::Closed);
        assert_eq!(registry.get("cache").unwrap().state(), BreakerState::Closed);
        registry.close_all();
    }

    #[tokio::test]
    async fn stats_are_sorted_by_name() {
        let registry = BreakerRegistry::new(BreakerConfig::default());
        registry.get_or_create("zeta");
        registry.get_or_create("alpha");

        let names: Vec<String> = registry.stats().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
        registry.close_all();
    }
}
