//! Tally: a multi-user financial ledger core. Atomic credits, debits, and
//! transfers over per-user balances, an append-only event store with
//! optimistic-concurrency writes, and the resilience plumbing (circuit
//! breaker, fallback executor, replicated-DB router, worker pool) that keeps
//! request paths alive under partial failure.

pub mod app;
pub mod cluster;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod money;
pub mod repositories;
pub mod resilience;
pub mod schema;
pub mod services;
pub mod worker;

pub use error::LedgerError;
pub use models::app_state::AppState;
