//! Three-state circuit breaker. Counters live under their own lock so
//! stats readers and result recording never block state transitions.
//! OPEN -> HALF_OPEN happens lazily on `ready()` and from a 1 s background
//! ticker; counters reset on every state entry.

use crate::config::BreakerConfig;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Default, Clone)]
struct Counts {
    requests: u64,
    total_errors: u64,
    consecutive_errors: u64,
    consecutive_successes: u64,
    last_error: Option<String>,
    last_error_time: Option<DateTime<Utc>>,
}

struct StateCell {
    state: BreakerState,
    changed_at: Instant,
    changed_at_utc: DateTime<Utc>,
}

pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    state: RwLock<StateCell>,
    counts: Mutex<Counts>,
    shutdown_tx: watch::Sender<bool>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreakerStats {
    pub name: String,
    pub state: BreakerState,
    pub last_state_change: DateTime<Utc>,
    pub requests: u64,
    pub total_errors: u64,
    pub consecutive_errors: u64,
    pub consecutive_successes: u64,
    pub error_rate: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        let breaker = Arc::new(Self {
            name: name.into(),
            config,
            state: RwLock::new(StateCell {
                state: BreakerState::Closed,
                changed_at: Instant::now(),
                changed_at_utc: Utc::now(),
            }),
            counts: Mutex::new(Counts::default()),
            shutdown_tx,
            ticker: Mutex::new(None),
        });

        let monitor = Arc::downgrade(&breaker);
        let mut shutdown_rx = breaker.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(breaker) = monitor.upgrade() else { return };
                        breaker.check_open_expiry();
                    }
                    _ = shutdown_rx.changed() => return,
                }
            }
        });
        *breaker.ticker.lock().expect("ticker lock poisoned") = Some(handle);

        breaker
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> BreakerState {
        self.state.read().expect("state lock poisoned").state
    }

    /// Whether a call would currently be admitted.
    pub fn ready(&self) -> bool {
        let (state, changed_at) = {
            let cell = self.state.read().expect("state lock poisoned");
            (cell.state, cell.changed_at)
        };

        match state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                if changed_at.elapsed() >= self.config.timeout {
                    self.transition(BreakerState::HalfOpen);
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                let counts = self.counts.lock().expect("counts lock poisoned");
                counts.requests < self.config.half_open_max_requests
            }
        }
    }

    /// Run `operation` under the breaker. Fails fast with `BreakerOpen`
    /// without invoking the operation when not ready.
    pub async fn execute<T, F>(&self, operation: F) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        if !self.ready() {
            return Err(LedgerError::BreakerOpen(self.name.clone()));
        }

        self.counts.lock().expect("counts lock poisoned").requests += 1;

        let started = Instant::now();
        let result = operation.await;
        let latency = started.elapsed();

        self.record_result(result.as_ref().err().map(|e| e.to_string()), latency);
        result
    }

    /// Like `execute` but aborts when the deadline fires; the deadline is
    /// recorded as an error.
    pub async fn execute_with_timeout<T, F>(
        &self,
        deadline: Duration,
        operation: F,
    ) -> Result<T, LedgerError>
    where
        F: Future<Output = Result<T, LedgerError>>,
    {
        if !self.ready() {
            return Err(LedgerError::BreakerOpen(self.name.clone()));
        }

        self.counts.lock().expect("counts lock poisoned").requests += 1;

        let started = Instant::now();
        let result = match tokio::time::timeout(deadline, operation).await {
            Ok(inner) => inner,
            Err(_) => Err(LedgerError::Timeout),
        };
        let latency = started.elapsed();

        self.record_result(result.as_ref().err().map(|e| e.to_string()), latency);
        result
    }

    fn record_result(&self, error: Option<String>, _latency: Duration) {
        let state = self.state();

        let decision = {
            let mut counts = self.counts.lock().expect("counts lock poisoned");
            match error {
                Some(message) => {
                    counts.total_errors += 1;
                    counts.consecutive_errors += 1;
                    counts.consecutive_successes = 0;
                    counts.last_error = Some(message);
                    counts.last_error_time = Some(Utc::now());

                    if state == BreakerState::HalfOpen {
                        Some(BreakerState::Open)
                    } else if counts.requests >= self.config.min_request_count
                        && counts.consecutive_errors >= self.config.failure_threshold
                    {
                        Some(BreakerState::Open)
                    } else {
                        None
                    }
                }
                None => {
                    counts.consecutive_successes += 1;
                    counts.consecutive_errors = 0;

                    if state == BreakerState::HalfOpen
                        && counts.consecutive_successes >= self.config.success_threshold
                    {
                        Some(BreakerState::Closed)
                    } else {
                        None
                    }
                }
            }
        };

        if let Some(next) = decision {
            self.transition(next);
        }
    }

    fn check_open_expiry(&self) {
        let (state, changed_at) = {
            let cell = self.state.read().expect("state lock poisoned");
            (cell.state, cell.changed_at)
        };
        if state == BreakerState::Open && changed_at.elapsed() >= self.config.timeout {
            self.transition(BreakerState::HalfOpen);
        }
    }

    fn transition(&self, next: BreakerState) {
        {
            let mut cell = self.state.write().expect("state lock poisoned");
            if cell.state == next {
                return;
            }
            // HALF_OPEN is only reachable from OPEN
            if next == BreakerState::HalfOpen && cell.state != BreakerState::Open {
                return;
            }
            info!(breaker = %self.name, from = %cell.state, to = %next, "circuit breaker transition");
            cell.state = next;
            cell.changed_at = Instant::now();
            cell.changed_at_utc = Utc::now();
        }
        self.reset_counts(false);
    }

    fn reset_counts(&self, clear_error: bool) {
        let mut counts = self.counts.lock().expect("counts lock poisoned");
        counts.requests = 0;
        counts.total_errors = 0;
        counts.consecutive_errors = 0;
        counts.consecutive_successes = 0;
        if clear_error {
            counts.last_error = None;
            counts.last_error_time = None;
        }
    }

    pub fn force_open(&self) {
        warn!(breaker = %self.name, "circuit breaker forced open");
        self.set_state(BreakerState::Open);
        self.reset_counts(false);
    }

    pub fn force_close(&self) {
        warn!(breaker = %self.name, "circuit breaker forced closed");
        self.set_state(BreakerState::Closed);
        self.reset_counts(false);
    }

    /// Zero all counters and return to CLOSED.
    pub fn reset(&self) {
        info!(breaker = %self.name, "circuit breaker reset");
        self.set_state(BreakerState::Closed);
        self.reset_counts(true);
    }

    fn set_state(&self, next: BreakerState) {
        let mut cell = self.state.write().expect("state lock poisoned");
        cell.state = next;
        cell.changed_at = Instant::now();
        cell.changed_at_utc = Utc::now();
    }

    pub fn stats(&self) -> BreakerStats {
        let (state, changed_at_utc) = {
            let cell = self.state.read().expect("state lock poisoned");
            (cell.state, cell.changed_at_utc)
        };
        let counts = self.counts.lock().expect("counts lock poisoned").clone();

        let error_rate = if counts.requests > 0 {
            counts.total_errors as f64 / counts.requests as f64
        } else {
            0.0
        };

        BreakerStats {
            name: self.name.clone(),
            state,
            last_state_change: changed_at_utc,
            requests: counts.requests,
            total_errors: counts.total_errors,
            consecutive_errors: counts.consecutive_errors,
            consecutive_successes: counts.consecutive_successes,
            error_rate,
            last_error: counts.last_error,
            last_error_time: counts.last_error_time,
        }
    }

    /// Stop the background ticker.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.ticker.lock().expect("ticker lock poisoned").take() {
            handle.abort();
        }
    }
}
