//! Bounded-concurrency worker pool for queued ledger jobs. N workers share
//! one bounded queue; submissions during shutdown are dropped silently, and
//! shutdown waits for in-flight jobs while abandoning queued ones.

use crate::config::WorkerConfig;
use crate::error::LedgerError;
use crate::models::enums::{Currency, TransactionKind};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct TransactionJob {
    pub kind: TransactionKind,
    pub user_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    pub currency: Currency,
    pub to_currency: Option<Currency>,
    pub amount: i64,
    pub description: String,
    pub reference_id: Option<String>,
}

/// Seam between the pool and the ledger; lets tests drive workers with a
/// stub processor.
#[async_trait]
pub trait ProcessJob: Send + Sync + 'static {
    async fn process(&self, job: TransactionJob) -> Result<Uuid, LedgerError>;
}

#[derive(Default)]
struct LatencyAccum {
    total_micros: u128,
    samples: u64,
}

struct PoolCounters {
    processed: AtomicU64,
    failed: AtomicU64,
    amount_total: AtomicI64,
    latency: Mutex<LatencyAccum>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub processed: u64,
    pub failed: u64,
    pub amount_total: i64,
    pub average_latency_ms: f64,
}

pub struct WorkerPool {
    job_tx: Mutex<Option<mpsc::Sender<TransactionJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<PoolCounters>,
    shutdown_tx: watch::Sender<bool>,
    config: WorkerConfig,
}

impl WorkerPool {
    pub fn start(config: WorkerConfig, processor: Arc<dyn ProcessJob>) -> Arc<Self> {
        let (job_tx, job_rx) = mpsc::channel::<TransactionJob>(config.queue_capacity.max(1));
        let job_rx = Arc::new(tokio::sync::Mutex::new(job_rx));
        let (shutdown_tx, _) = watch::channel(false);

        let counters = Arc::new(PoolCounters {
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            amount_total: AtomicI64::new(0),
            latency: Mutex::new(LatencyAccum::default()),
        });

        let mut handles = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let processor = Arc::clone(&processor);
            let counters = Arc::clone(&counters);
            let mut shutdown_rx = shutdown_tx.subscribe();

            handles.push(tokio::spawn(async move {
                loop {
                    let job = {
                        let mut rx = job_rx.lock().await;
                        tokio::select! {
                            job = rx.recv() => job,
                            _ = shutdown_rx.changed() => None,
                        }
                    };

                    let Some(job) = job else {
                        debug!(worker_id, "worker stopping");
                        return;
                    };

                    let started = Instant::now();
                    let amount = job.amount;
                    match processor.process(job).await {
                        Ok(transaction_id) => {
                            counters.processed.fetch_add(1, Ordering::Relaxed);
                            counters.amount_total.fetch_add(amount, Ordering::Relaxed);
                            debug!(worker_id, %transaction_id, "job processed");
                        }
                        Err(e) => {
                            counters.failed.fetch_add(1, Ordering::Relaxed);
                            error!(worker_id, error = %e, "job failed");
                        }
                    }

                    let mut latency = counters.latency.lock().expect("latency lock poisoned");
                    latency.total_micros += started.elapsed().as_micros();
                    latency.samples += 1;
                }
            }));
        }

        info!(workers = config.worker_count, capacity = config.queue_capacity, "worker pool started");

        Arc::new(Self {
            job_tx: Mutex::new(Some(job_tx)),
            handles: Mutex::new(handles),
            counters,
            shutdown_tx,
            config,
        })
    }

    /// Enqueue a job. Waits for queue space, but never blocks on a pool
    /// that is shutting down — the job is dropped silently instead.
    pub async fn submit(&self, job: TransactionJob) {
        if *self.shutdown_tx.borrow() {
            debug!("pool shutting down, job dropped");
            return;
        }

        let sender = self.job_tx.lock().expect("job_tx lock poisoned").clone();
        let Some(sender) = sender else {
            debug!("pool shutting down, job dropped");
            return;
        };

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        tokio::select! {
            result = sender.send(job) => {
                if result.is_err() {
                    debug!("job queue closed, job dropped");
                }
            }
            _ = shutdown_rx.changed() => {
                debug!("pool shutting down, job dropped");
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        let latency = self.counters.latency.lock().expect("latency lock poisoned");
        let average_latency_ms = if latency.samples > 0 {
            latency.total_micros as f64 / latency.samples as f64 / 1000.0
        } else {
            0.0
        };

        WorkerPoolStats {
            worker_count: self.config.worker_count,
            queue_capacity: self.config.queue_capacity,
            processed: self.counters.processed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            amount_total: self.counters.amount_total.load(Ordering::Relaxed),
            average_latency_ms,
        }
    }

    /// Signal shutdown, close the queue, and join every worker. In-flight
    /// jobs finish; queued-but-unstarted jobs may be abandoned.
    pub async fn shutdown(&self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        self.job_tx.lock().expect("job_tx lock poisoned").take();

        let handles: Vec<_> = {
            let mut guard = self.handles.lock().expect("handles lock poisoned");
            guard.drain(..).collect()
        };
        for handle in handles {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("worker did not stop within the grace period");
            }
        }
        info!("worker pool stopped");
    }
}
