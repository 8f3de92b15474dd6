//! Replicated-database router: writes go to the master, reads are spread
//! over replicas (round-robin) and read replicas (weighted random), a
//! background prober tracks node health, and a failed master is replaced by
//! the heaviest healthy replica when failover is enabled.

use crate::config::{ClusterConfig, NodeConfig};
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use rand::Rng;
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConn = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    Master,
    Replica,
    ReadReplica,
}

pub struct NodeHandle {
    pub name: String,
    pub weight: u32,
    pool: DbPool,
    active: AtomicBool,
    latency_ms: AtomicU64,
    last_ping: Mutex<Option<DateTime<Utc>>>,
}

impl NodeHandle {
    pub fn new(name: String, weight: u32, pool: DbPool) -> Arc<Self> {
        Arc::new(Self {
            name,
            weight,
            pool,
            active: AtomicBool::new(true),
            latency_ms: AtomicU64::new(0),
            last_ping: Mutex::new(None),
        })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }

    fn record_probe(&self, active: bool, latency: Duration) {
        self.active.store(active, Ordering::Release);
        self.latency_ms.store(latency.as_millis() as u64, Ordering::Release);
        *self.last_ping.lock().expect("last_ping lock poisoned") = Some(Utc::now());
    }

    fn stats(&self, role: NodeRole) -> NodeStats {
        NodeStats {
            name: self.name.clone(),
            role,
            weight: self.weight,
            is_active: self.is_active(),
            latency_ms: self.latency_ms.load(Ordering::Acquire),
            last_ping: *self.last_ping.lock().expect("last_ping lock poisoned"),
        }
    }
}

struct Topology {
    master: Arc<NodeHandle>,
    replicas: Vec<Arc<NodeHandle>>,
    read_replicas: Vec<Arc<NodeHandle>>,
}

pub struct DbCluster {
    config: ClusterConfig,
    topology: RwLock<Topology>,
    rr_cursor: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub name: String,
    pub role: NodeRole,
    pub weight: u32,
    pub is_active: bool,
    pub latency_ms: u64,
    pub last_ping: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClusterStats {
    pub master_active: bool,
    pub replica_count: usize,
    pub active_replicas: usize,
    pub read_replica_count: usize,
    pub active_read_replicas: usize,
    pub failover_enabled: bool,
    pub nodes: Vec<NodeStats>,
}

impl DbCluster {
    /// Connect to every configured node. The master must be reachable;
    /// replicas that fail to connect are skipped with a warning.
    pub fn connect(config: ClusterConfig) -> Result<Arc<Self>, LedgerError> {
        let master_pool = build_pool(&config, &config.master, true)?;
        let master = NodeHandle::new(config.master.name.clone(), config.master.weight, master_pool);

        let mut replicas = Vec::new();
        for node in &config.replicas {
            match build_pool(&config, node, true) {
                Ok(pool) => replicas.push(NodeHandle::new(node.name.clone(), node.weight, pool)),
                Err(e) => warn!(node = %node.name, error = %e, "skipping unreachable replica"),
            }
        }

        let mut read_replicas = Vec::new();
        for node in &config.read_replicas {
            match build_pool(&config, node, true) {
                Ok(pool) => {
                    read_replicas.push(NodeHandle::new(node.name.clone(), node.weight, pool))
                }
                Err(e) => warn!(node = %node.name, error = %e, "skipping unreachable read replica"),
            }
        }

        Ok(Self::from_parts(config, master, replicas, read_replicas))
    }

    /// Build the cluster without probing any node. Used by tests and by
    /// deployments that prefer lazy connections.
    pub fn connect_lazy(config: ClusterConfig) -> Arc<Self> {
        let master_pool = build_pool(&config, &config.master, false)
            .expect("unchecked pool construction cannot fail");
        let master = NodeHandle::new(config.master.name.clone(), config.master.weight, master_pool);

        let replicas = config
            .replicas
            .iter()
            .map(|node| {
                let pool = build_pool(&config, node, false)
                    .expect("unchecked pool construction cannot fail");
                NodeHandle::new(node.name.clone(), node.weight, pool)
            })
            .collect();
        let read_replicas = config
            .read_replicas
            .iter()
            .map(|node| {
                let pool = build_pool(&config, node, false)
                    .expect("unchecked pool construction cannot fail");
                NodeHandle::new(node.name.clone(), node.weight, pool)
            })
            .collect();

        Self::from_parts(config, master, replicas, read_replicas)
    }

    fn from_parts(
        config: ClusterConfig,
        master: Arc<NodeHandle>,
        replicas: Vec<Arc<NodeHandle>>,
        read_replicas: Vec<Arc<NodeHandle>>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            topology: RwLock::new(Topology {
                master,
                replicas,
                read_replicas,
            }),
            rr_cursor: AtomicUsize::new(0),
            shutdown_tx,
            health_task: Mutex::new(None),
        })
    }

    /// The master pool; writes only.
    pub fn master(&self) -> DbPool {
        self.topology.read().expect("topology lock poisoned").master.pool()
    }

    pub fn master_conn(&self) -> Result<DbConn, LedgerError> {
        self.master().get().map_err(Into::into)
    }

    /// Round-robin over active replicas, falling back to the master when
    /// none are active.
    pub fn replica(&self) -> DbPool {
        let topology = self.topology.read().expect("topology lock poisoned");
        let active: Vec<_> = topology.replicas.iter().filter(|n| n.is_active()).collect();
        if active.is_empty() {
            return topology.master.pool();
        }
        let index = self.rr_cursor.fetch_add(1, Ordering::Relaxed) % active.len();
        active[index].pool()
    }

    pub fn replica_conn(&self) -> Result<DbConn, LedgerError> {
        self.replica().get().map_err(Into::into)
    }

    /// Weighted random selection over active read replicas. Zero total
    /// weight (or no read replicas at all) delegates to `replica()`.
    pub fn read_replica(&self) -> DbPool {
        let picked = {
            let topology = self.topology.read().expect("topology lock poisoned");
            let active: Vec<_> = topology
                .read_replicas
                .iter()
                .filter(|n| n.is_active())
                .cloned()
                .collect();
            let total: u64 = active.iter().map(|n| n.weight as u64).sum();
            if total == 0 {
                None
            } else {
                let index = rand::rng().random_range(0..total);
                pick_weighted(&active, index).map(|n| n.pool())
            }
        };
        picked.unwrap_or_else(|| self.replica())
    }

    pub fn read_conn(&self) -> Result<DbConn, LedgerError> {
        self.read_replica().get().map_err(Into::into)
    }

    /// Start the background health prober.
    pub fn start(self: &Arc<Self>) {
        let cluster = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cluster.config.health_check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cluster.probe_all().await,
                    _ = shutdown_rx.changed() => {
                        info!("db cluster health prober stopping");
                        return;
                    }
                }
            }
        });
        *self.health_task.lock().expect("health_task lock poisoned") = Some(handle);
    }

    async fn probe_all(&self) {
        let (master, replicas, read_replicas) = {
            let topology = self.topology.read().expect("topology lock poisoned");
            (
                Arc::clone(&topology.master),
                topology.replicas.clone(),
                topology.read_replicas.clone(),
            )
        };

        let mut probes = Vec::new();
        probes.push(probe_node(Arc::clone(&master), self.config.ping_timeout));
        for node in replicas.iter().chain(read_replicas.iter()) {
            probes.push(probe_node(Arc::clone(node), self.config.ping_timeout));
        }
        futures::future::join_all(probes).await;

        if !master.is_active() && self.config.failover_enabled {
            self.failover();
        }
    }

    /// Promote the heaviest active replica to master and demote the failed
    /// master to a replica. One atomic topology change; best effort — with
    /// no eligible replacement the master stays in place.
    fn failover(&self) {
        let mut topology = self.topology.write().expect("topology lock poisoned");
        if topology.master.is_active() {
            return; // recovered between probe and promotion
        }

        let candidate = topology
            .replicas
            .iter()
            .filter(|n| n.is_active())
            .max_by_key(|n| n.weight)
            .cloned();

        let Some(new_master) = candidate else {
            error!("master is down and no active replica is eligible for promotion");
            return;
        };

        topology.replicas.retain(|n| !Arc::ptr_eq(n, &new_master));
        let old_master = std::mem::replace(&mut topology.master, new_master);
        topology.replicas.push(Arc::clone(&old_master));

        info!(
            promoted = %topology.master.name,
            demoted = %old_master.name,
            "failover completed"
        );
    }

    /// Operator-initiated failover; same promotion rule as the health loop.
    pub fn trigger_failover(&self) {
        self.failover();
    }

    pub fn stats(&self) -> ClusterStats {
        let topology = self.topology.read().expect("topology lock poisoned");
        let mut nodes = vec![topology.master.stats(NodeRole::Master)];
        nodes.extend(topology.replicas.iter().map(|n| n.stats(NodeRole::Replica)));
        nodes.extend(
            topology
                .read_replicas
                .iter()
                .map(|n| n.stats(NodeRole::ReadReplica)),
        );

        ClusterStats {
            master_active: topology.master.is_active(),
            replica_count: topology.replicas.len(),
            active_replicas: topology.replicas.iter().filter(|n| n.is_active()).count(),
            read_replica_count: topology.read_replicas.len(),
            active_read_replicas: topology
                .read_replicas
                .iter()
                .filter(|n| n.is_active())
                .count(),
            failover_enabled: self.config.failover_enabled,
            nodes,
        }
    }

    /// Stop the health prober, waiting up to `grace` for it to finish.
    pub async fn close(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.health_task.lock().expect("health_task lock poisoned").take();
        if let Some(handle) = handle {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("db cluster health prober did not stop within the grace period");
            }
        }
    }

    /// Test-only access to topology internals.
    #[doc(hidden)]
    pub fn read_replica_handles(&self) -> Vec<Arc<NodeHandle>> {
        self.topology
            .read()
            .expect("topology lock poisoned")
            .read_replicas
            .clone()
    }

    #[doc(hidden)]
    pub fn replica_handles(&self) -> Vec<Arc<NodeHandle>> {
        self.topology
            .read()
            .expect("topology lock poisoned")
            .replicas
            .clone()
    }

    #[doc(hidden)]
    pub fn master_handle(&self) -> Arc<NodeHandle> {
        Arc::clone(&self.topology.read().expect("topology lock poisoned").master)
    }
}

/// Cumulative-weight scan: returns the node whose cumulative slice covers
/// `index` (0-based, uniform over the total weight of `nodes`).
pub fn pick_weighted(nodes: &[Arc<NodeHandle>], index: u64) -> Option<Arc<NodeHandle>> {
    let mut cumulative = 0u64;
    for node in nodes {
        cumulative += node.weight as u64;
        if index < cumulative {
            return Some(Arc::clone(node));
        }
    }
    None
}

fn build_pool(
    config: &ClusterConfig,
    node: &NodeConfig,
    checked: bool,
) -> Result<DbPool, LedgerError> {
    let manager = ConnectionManager::<PgConnection>::new(node.url.expose_secret());
    let builder = Pool::builder()
        .max_size(config.max_connections)
        .min_idle(config.min_idle)
        .max_lifetime(Some(config.conn_max_lifetime));

    if checked {
        builder.build(manager).map_err(Into::into)
    } else {
        Ok(builder.build_unchecked(manager))
    }
}

async fn probe_node(node: Arc<NodeHandle>, ping_timeout: Duration) {
    let pool = node.pool();
    let started = Instant::now();

    let ping = tokio::task::spawn_blocking(move || -> Result<(), String> {
        let mut conn = pool.get().map_err(|e| e.to_string())?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .map_err(|e| e.to_string())?;
        Ok(())
    });

    let outcome = match tokio::time::timeout(ping_timeout, ping).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(e),
        Ok(Err(join_err)) => Err(join_err.to_string()),
        Err(_) => Err("ping timeout".to_string()),
    };

    let latency = started.elapsed();
    match outcome {
        Ok(()) => node.record_probe(true, latency),
        Err(e) => {
            warn!(node = %node.name, error = %e, "health probe failed");
            node.record_probe(false, latency);
        }
    }
}
