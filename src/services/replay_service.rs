//! Event replay: rebuild aggregate projections by folding their event
//! history, plus the multi-aggregate forms (by type, by time range) and the
//! one-pass statistics rollup.

use crate::error::LedgerError;
use crate::models::aggregate::{replay, Projection};
use crate::models::app_state::AppState;
use crate::repositories::event_store::{EventStore, EventStoreStatistics};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct ReplayService;

impl ReplayService {
    /// Fold one aggregate's history. `None` when the aggregate has no
    /// events.
    pub async fn replay_aggregate(
        state: &AppState,
        aggregate_id: Uuid,
    ) -> Result<Option<Projection>, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        let events = EventStore::by_aggregate(&mut conn, aggregate_id)?;
        if events.is_empty() {
            return Ok(None);
        }
        debug!(aggregate = %aggregate_id, events = events.len(), "replaying aggregate");
        replay(&events).map(Some)
    }

    /// Replay every aggregate that has at least one event of `event_type`
    /// in the window addressed by limit/offset. Each aggregate is rebuilt
    /// from its full history; broken histories are skipped with a warning.
    pub async fn replay_by_type(
        state: &AppState,
        event_type: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Projection>, LedgerError> {
        let aggregate_ids = {
            let mut conn = state.cluster.replica_conn()?;
            let events = EventStore::by_type(&mut conn, event_type, limit, offset)?;
            dedup_aggregates(events.iter().map(|e| e.aggregate_id))
        };
        Self::replay_each(state, aggregate_ids).await
    }

    pub async fn replay_time_range(
        state: &AppState,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Projection>, LedgerError> {
        let aggregate_ids = {
            let mut conn = state.cluster.replica_conn()?;
            let events = EventStore::in_range(&mut conn, start, end)?;
            dedup_aggregates(events.iter().map(|e| e.aggregate_id))
        };
        Self::replay_each(state, aggregate_ids).await
    }

    async fn replay_each(
        state: &AppState,
        aggregate_ids: Vec<Uuid>,
    ) -> Result<Vec<Projection>, LedgerError> {
        let mut projections = Vec::with_capacity(aggregate_ids.len());
        for aggregate_id in aggregate_ids {
            match Self::replay_aggregate(state, aggregate_id).await {
                Ok(Some(projection)) => projections.push(projection),
                Ok(None) => {}
                Err(e) => {
                    warn!(aggregate = %aggregate_id, error = %e, "replay failed, skipping aggregate");
                }
            }
        }
        Ok(projections)
    }

    pub async fn statistics(state: &AppState) -> Result<EventStoreStatistics, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        EventStore::statistics(&mut conn)
    }
}

/// Unique aggregate ids in encounter order.
fn dedup_aggregates(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut seen = std::collections::HashSet::new();
    let mut unique = Vec::new();
    for id in ids {
        if seen.insert(id) {
            unique.push(id);
        }
    }
    unique
}
