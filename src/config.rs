use secrecy::SecretString;
use std::env;
use std::time::Duration;

/// A single database node in the replication topology. Read replicas carry a
/// selection weight; everything defaults to weight 1.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub url: SecretString,
    pub weight: u32,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub master: NodeConfig,
    pub replicas: Vec<NodeConfig>,
    pub read_replicas: Vec<NodeConfig>,
    pub max_connections: u32,
    pub min_idle: Option<u32>,
    pub conn_max_lifetime: Duration,
    pub health_check_interval: Duration,
    pub ping_timeout: Duration,
    pub failover_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct BreakerConfig {
    pub failure_threshold: u64,
    pub success_threshold: u64,
    pub timeout: Duration,
    pub half_open_max_requests: u64,
    pub min_request_count: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
            min_request_count: 10,
        }
    }
}

impl BreakerConfig {
    pub fn strict() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 5,
            timeout: Duration::from_secs(30),
            half_open_max_requests: 2,
            min_request_count: 5,
        }
    }

    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 2,
            timeout: Duration::from_secs(120),
            half_open_max_requests: 5,
            min_request_count: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub enable_caching: bool,
    pub cache_ttl: Duration,
    pub enable_degradation: bool,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            enable_caching: true,
            cache_ttl: Duration::from_secs(300),
            enable_degradation: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_count: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub cluster: ClusterConfig,
    pub breaker: BreakerConfig,
    pub fallback: FallbackConfig,
    pub worker: WorkerConfig,
    /// Interval for the scheduled-transaction sweep loop.
    pub sweep_interval: Duration,
    /// Bounded parallelism for batch item processing; 1 means strictly serial.
    pub batch_concurrency: usize,
    /// Bounded wait for background loops on shutdown.
    pub shutdown_grace: Duration,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

/// Parse "name=url|weight" node lists, comma separated. Weight defaults to 1
/// and the name defaults to a positional one.
fn parse_nodes(raw: &str, prefix: &str) -> Vec<NodeConfig> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, entry)| {
            let (url, weight) = match entry.rsplit_once('|') {
                Some((u, w)) => (u, w.parse().unwrap_or(1)),
                None => (entry, 1),
            };
            NodeConfig {
                name: format!("{}-{}", prefix, i),
                url: SecretString::from(url.to_string()),
                weight,
            }
        })
        .collect()
}

impl AppConfig {
    pub fn from_env() -> eyre::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| eyre::eyre!("DATABASE_URL must be set"))?;

        let replicas = env::var("REPLICA_URLS")
            .map(|v| parse_nodes(&v, "replica"))
            .unwrap_or_default();
        let read_replicas = env::var("READ_REPLICA_URLS")
            .map(|v| parse_nodes(&v, "read"))
            .unwrap_or_default();

        let cluster = ClusterConfig {
            master: NodeConfig {
                name: "master".to_string(),
                url: SecretString::from(database_url),
                weight: 1,
            },
            replicas,
            read_replicas,
            max_connections: env_u64("DB_MAX_CONNECTIONS", 20) as u32,
            min_idle: env::var("DB_MAX_IDLE_CONNS").ok().and_then(|v| v.parse().ok()),
            conn_max_lifetime: Duration::from_secs(env_u64("DB_CONN_MAX_LIFETIME_SECS", 1800)),
            health_check_interval: Duration::from_secs(env_u64("DB_HEALTH_CHECK_INTERVAL_SECS", 30)),
            ping_timeout: Duration::from_secs(5),
            failover_enabled: env_bool("DB_FAILOVER_ENABLED", true),
        };

        let breaker = BreakerConfig {
            failure_threshold: env_u64("BREAKER_FAILURE_THRESHOLD", 5),
            success_threshold: env_u64("BREAKER_SUCCESS_THRESHOLD", 3),
            timeout: Duration::from_secs(env_u64("BREAKER_TIMEOUT_SECS", 60)),
            half_open_max_requests: env_u64("BREAKER_HALF_OPEN_MAX_REQUESTS", 3),
            min_request_count: env_u64("BREAKER_MIN_REQUEST_COUNT", 10),
        };

        let fallback = FallbackConfig {
            max_retries: env_u64("FALLBACK_MAX_RETRIES", 3) as u32,
            retry_delay: Duration::from_millis(env_u64("FALLBACK_RETRY_DELAY_MS", 1000)),
            timeout: Duration::from_secs(env_u64("FALLBACK_TIMEOUT_SECS", 30)),
            enable_caching: env_bool("FALLBACK_ENABLE_CACHING", true),
            cache_ttl: Duration::from_secs(env_u64("FALLBACK_CACHE_TTL_SECS", 300)),
            enable_degradation: env_bool("FALLBACK_ENABLE_DEGRADATION", true),
        };

        let worker = WorkerConfig {
            worker_count: env_u64("WORKER_COUNT", 4) as usize,
            queue_capacity: env_u64("WORKER_QUEUE_CAPACITY", 1000) as usize,
        };

        Ok(Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            cluster,
            breaker,
            fallback,
            worker,
            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 60)),
            batch_concurrency: env_u64("BATCH_CONCURRENCY", 1) as usize,
            shutdown_grace: Duration::from_secs(env_u64("SHUTDOWN_GRACE_SECS", 30)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn parses_weighted_node_lists() {
        let nodes = parse_nodes(
            "postgres://a/db|3, postgres://b/db ,postgres://c/db|0",
            "read",
        );
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0].weight, 3);
        assert_eq!(nodes[1].weight, 1);
        assert_eq!(nodes[2].weight, 0);
        assert_eq!(nodes[1].name, "read-1");
        assert_eq!(nodes[1].url.expose_secret(), "postgres://b/db");
    }

    #[test]
    fn breaker_defaults_match_documented_knobs() {
        let cfg = BreakerConfig::default();
        assert_eq!(cfg.failure_threshold, 5);
        assert_eq!(cfg.success_threshold, 3);
        assert_eq!(cfg.timeout, Duration::from_secs(60));
        assert_eq!(cfg.half_open_max_requests, 3);
        assert_eq!(cfg.min_request_count, 10);
    }
}
