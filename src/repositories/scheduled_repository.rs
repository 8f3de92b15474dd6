use crate::error::LedgerError;
use crate::models::entities::{NewScheduledTransaction, ScheduledTransaction};
use crate::models::enums::{Currency, ScheduledStatus, TransactionKind};
use crate::schema::scheduled_transactions;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Full rewrite of the schedulable template fields. `None` clears the
/// nullable columns rather than skipping them.
#[derive(AsChangeset, Debug, Clone)]
#[diesel(table_name = scheduled_transactions, treat_none_as_null = true)]
pub struct ScheduledChanges<'a> {
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: &'a str,
    pub reference_id: Option<&'a str>,
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub recurring_type: Option<&'a str>,
    pub recurring_config: Option<JsonValue>,
    pub max_retries: i32,
}

pub struct ScheduledRepository;

impl ScheduledRepository {
    pub fn create(
        conn: &mut PgConnection,
        new_scheduled: NewScheduledTransaction<'_>,
    ) -> Result<ScheduledTransaction, LedgerError> {
        diesel::insert_into(scheduled_transactions::table)
            .values(new_scheduled)
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    pub fn find_by_id(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<ScheduledTransaction>, LedgerError> {
        scheduled_transactions::table
            .find(id)
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    /// Locked load for callers about to rewrite or re-status the row.
    pub fn lock(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<ScheduledTransaction, LedgerError> {
        scheduled_transactions::table
            .find(id)
            .for_update()
            .first(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::ScheduledTransactionNotFound,
                other => LedgerError::Database(other),
            })
    }

    /// Replace the template of a scheduled transaction. Status and retry
    /// bookkeeping are untouched; use the status setters for those.
    pub fn update(
        conn: &mut PgConnection,
        id: Uuid,
        changes: ScheduledChanges<'_>,
    ) -> Result<ScheduledTransaction, LedgerError> {
        diesel::update(scheduled_transactions::table.find(id))
            .set((changes, scheduled_transactions::updated_at.eq(Utc::now())))
            .get_result(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::ScheduledTransactionNotFound,
                other => LedgerError::Database(other),
            })
    }

    pub fn list_by_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Vec<ScheduledTransaction>, LedgerError> {
        scheduled_transactions::table
            .filter(scheduled_transactions::user_id.eq(user_id))
            .order(scheduled_transactions::scheduled_at.asc())
            .load(conn)
            .map_err(LedgerError::Database)
    }

    /// Everything eligible for execution: pending rows that are due, plus
    /// failed rows with retry budget remaining. Ascending `scheduled_at`.
    pub fn due(
        conn: &mut PgConnection,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTransaction>, LedgerError> {
        scheduled_transactions::table
            .filter(scheduled_transactions::scheduled_at.le(now))
            .filter(
                scheduled_transactions::status.eq(ScheduledStatus::Pending).or(
                    scheduled_transactions::status
                        .eq(ScheduledStatus::Failed)
                        .and(
                            scheduled_transactions::retry_count
                                .lt(scheduled_transactions::max_retries),
                        ),
                ),
            )
            .order(scheduled_transactions::scheduled_at.asc())
            .load(conn)
            .map_err(LedgerError::Database)
    }

    pub fn mark_completed(conn: &mut PgConnection, id: Uuid) -> Result<(), LedgerError> {
        diesel::update(scheduled_transactions::table.find(id))
            .set((
                scheduled_transactions::status.eq(ScheduledStatus::Completed),
                scheduled_transactions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;
        Ok(())
    }

    /// Record a failed execution attempt: bump the retry counter, stamp the
    /// attempt, and either park the row as failed (retryable) or cancel it
    /// once the budget is spent.
    pub fn mark_attempt_failed(
        conn: &mut PgConnection,
        scheduled: &ScheduledTransaction,
        now: DateTime<Utc>,
    ) -> Result<ScheduledStatus, LedgerError> {
        let retries = scheduled.retry_count + 1;
        let next_status = if retries >= scheduled.max_retries {
            ScheduledStatus::Cancelled
        } else {
            ScheduledStatus::Failed
        };

        diesel::update(scheduled_transactions::table.find(scheduled.id))
            .set((
                scheduled_transactions::retry_count.eq(retries),
                scheduled_transactions::status.eq(next_status),
                scheduled_transactions::last_retry_at.eq(Some(now)),
                scheduled_transactions::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;

        Ok(next_status)
    }

    pub fn update_status(
        conn: &mut PgConnection,
        id: Uuid,
        status: ScheduledStatus,
    ) -> Result<(), LedgerError> {
        diesel::update(scheduled_transactions::table.find(id))
            .set((
                scheduled_transactions::status.eq(status),
                scheduled_transactions::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;
        Ok(())
    }
}
