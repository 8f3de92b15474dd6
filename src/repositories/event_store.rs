//! Append-only event log with optimistic-concurrency writes. The version
//! check and the inserts share one database transaction; a mismatch between
//! the observed and expected version aborts the whole append.

use crate::error::LedgerError;
use crate::models::entities::EventRecord;
use crate::models::events::{AggregateKind, DomainEvent};
use crate::schema::event_store;
use chrono::{DateTime, Utc};
use diesel::dsl::max;
use diesel::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

const STATS_PAGE_SIZE: i64 = 1000;

pub struct EventStore;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EventStoreStatistics {
    pub total_events: i64,
    pub total_aggregates: i64,
    pub event_type_counts: HashMap<String, i64>,
    pub aggregate_kind_counts: HashMap<String, i64>,
}

impl EventStore {
    /// Greatest version recorded for the aggregate, 0 when it has none.
    pub fn current_version(
        conn: &mut PgConnection,
        aggregate_id: Uuid,
    ) -> Result<i64, LedgerError> {
        let version: Option<i64> = event_store::table
            .filter(event_store::aggregate_id.eq(aggregate_id))
            .select(max(event_store::version))
            .first(conn)
            .map_err(LedgerError::Database)?;
        Ok(version.unwrap_or(0))
    }

    /// Append `events` with versions `expected_version + 1 ..`. Must run
    /// inside an open transaction: the version read and the inserts have to
    /// commit together. Returns the events with their assigned versions.
    pub fn append(
        conn: &mut PgConnection,
        aggregate_id: Uuid,
        events: Vec<DomainEvent>,
        expected_version: i64,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        if events.is_empty() {
            return Ok(events);
        }

        let actual = Self::current_version(conn, aggregate_id)?;
        if actual != expected_version {
            return Err(LedgerError::ConcurrentModification {
                expected: expected_version,
                actual,
            });
        }

        let mut versioned = Vec::with_capacity(events.len());
        let mut records = Vec::with_capacity(events.len());
        for (i, mut event) in events.into_iter().enumerate() {
            let version = expected_version + i as i64 + 1;
            event.version = version;
            records.push(event.clone().into_record(version));
            versioned.push(event);
        }

        diesel::insert_into(event_store::table)
            .values(&records)
            .execute(conn)
            .map_err(LedgerError::Database)?;

        Ok(versioned)
    }

    /// `append` wrapped in its own transaction, for callers outside a unit
    /// of work.
    pub fn append_atomic(
        conn: &mut PgConnection,
        aggregate_id: Uuid,
        events: Vec<DomainEvent>,
        expected_version: i64,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        conn.transaction(|conn| Self::append(conn, aggregate_id, events, expected_version))
    }

    /// All events for one aggregate in strictly ascending version order.
    pub fn by_aggregate(
        conn: &mut PgConnection,
        aggregate_id: Uuid,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let records: Vec<EventRecord> = event_store::table
            .filter(event_store::aggregate_id.eq(aggregate_id))
            .order(event_store::version.asc())
            .load(conn)
            .map_err(LedgerError::Database)?;
        records.into_iter().map(DomainEvent::from_record).collect()
    }

    /// Events of one type in timestamp order with a stable tiebreak on
    /// (timestamp, aggregate id, version).
    pub fn by_type(
        conn: &mut PgConnection,
        event_type: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let records: Vec<EventRecord> = event_store::table
            .filter(event_store::event_type.eq(event_type))
            .order((
                event_store::occurred_at.asc(),
                event_store::aggregate_id.asc(),
                event_store::version.asc(),
            ))
            .limit(limit)
            .offset(offset)
            .load(conn)
            .map_err(LedgerError::Database)?;
        records.into_iter().map(DomainEvent::from_record).collect()
    }

    pub fn in_range(
        conn: &mut PgConnection,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let records: Vec<EventRecord> = event_store::table
            .filter(event_store::occurred_at.between(start, end))
            .order((
                event_store::occurred_at.asc(),
                event_store::aggregate_id.asc(),
                event_store::version.asc(),
            ))
            .load(conn)
            .map_err(LedgerError::Database)?;
        records.into_iter().map(DomainEvent::from_record).collect()
    }

    pub fn all(
        conn: &mut PgConnection,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let records: Vec<EventRecord> = event_store::table
            .order((
                event_store::occurred_at.asc(),
                event_store::aggregate_id.asc(),
                event_store::version.asc(),
            ))
            .limit(limit)
            .offset(offset)
            .load(conn)
            .map_err(LedgerError::Database)?;
        records.into_iter().map(DomainEvent::from_record).collect()
    }

    pub fn count(conn: &mut PgConnection, aggregate_id: Uuid) -> Result<i64, LedgerError> {
        event_store::table
            .filter(event_store::aggregate_id.eq(aggregate_id))
            .count()
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    /// Per-type counts, distinct aggregate count, and per-aggregate-kind
    /// rollups, computed in one paged pass over the log.
    pub fn statistics(conn: &mut PgConnection) -> Result<EventStoreStatistics, LedgerError> {
        let mut stats = EventStoreStatistics::default();
        let mut seen_aggregates: HashSet<Uuid> = HashSet::new();
        let mut offset = 0;

        loop {
            let page = Self::all(conn, STATS_PAGE_SIZE, offset)?;
            if page.is_empty() {
                break;
            }

            for event in &page {
                stats.total_events += 1;
                *stats
                    .event_type_counts
                    .entry(event.event_type.to_string())
                    .or_insert(0) += 1;

                if seen_aggregates.insert(event.aggregate_id) {
                    let kind: AggregateKind = event.aggregate_kind();
                    *stats
                        .aggregate_kind_counts
                        .entry(kind.to_string())
                        .or_insert(0) += 1;
                }
            }

            offset += STATS_PAGE_SIZE;
        }

        stats.total_aggregates = seen_aggregates.len() as i64;
        Ok(stats)
    }
}
