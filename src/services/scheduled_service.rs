//! Scheduled transactions: create/cancel plus the caller-invokable sweep
//! that executes everything due. Retries are driven by the sweep — the
//! ledger itself never retries.

use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{
    ScheduleRequest, ScheduledTransactionResponse, SweepOutcome, UpdateScheduleRequest,
};
use crate::models::entities::{NewScheduledTransaction, ScheduledTransaction};
use crate::models::enums::{Currency, ScheduledStatus, TransactionKind};
use crate::money;
use crate::repositories::scheduled_repository::{ScheduledChanges, ScheduledRepository};
use crate::services::ledger_service::LedgerService;
use chrono::Utc;
use diesel::Connection;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

const DEFAULT_MAX_RETRIES: i32 = 3;

pub struct ScheduledService;

impl ScheduledService {
    pub async fn create(
        state: &AppState,
        req: ScheduleRequest,
    ) -> Result<ScheduledTransactionResponse, LedgerError> {
        req.validate()?;
        let currency = Currency::parse(&req.currency)?;
        let amount = money::parse_amount(&req.amount)?;

        if req.scheduled_at <= Utc::now() {
            return Err(LedgerError::InvalidScheduledTime);
        }
        if req.kind == TransactionKind::Transfer && req.to_user_id.is_none() {
            return Err(LedgerError::InvalidState(
                "scheduled transfer requires to_user_id".to_string(),
            ));
        }

        let mut conn = state.cluster.master_conn()?;
        let row = ScheduledRepository::create(
            &mut conn,
            NewScheduledTransaction {
                user_id: req.user_id,
                kind: req.kind,
                amount,
                currency,
                description: req.description.as_deref().unwrap_or(""),
                reference_id: req.reference_id.as_deref(),
                to_user_id: req.to_user_id,
                scheduled_at: req.scheduled_at,
                status: ScheduledStatus::Pending,
                recurring_type: req.recurring_type.as_deref(),
                recurring_config: req.recurring_config,
                max_retries: req.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            },
        )?;

        info!(id = %row.id, user = %row.user_id, scheduled_at = %row.scheduled_at, "scheduled transaction created");
        Ok(row.into())
    }

    pub async fn get(
        state: &AppState,
        id: Uuid,
    ) -> Result<ScheduledTransactionResponse, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        ScheduledRepository::find_by_id(&mut conn, id)?
            .map(Into::into)
            .ok_or(LedgerError::ScheduledTransactionNotFound)
    }

    pub async fn list_for_user(
        state: &AppState,
        user_id: Uuid,
    ) -> Result<Vec<ScheduledTransactionResponse>, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        let rows = ScheduledRepository::list_by_user(&mut conn, user_id)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Rewrite the template of a still-pending scheduled transaction; the
    /// same admission rules apply as at creation.
    pub async fn update(
        state: &AppState,
        id: Uuid,
        req: UpdateScheduleRequest,
    ) -> Result<ScheduledTransactionResponse, LedgerError> {
        req.validate()?;
        let currency = Currency::parse(&req.currency)?;
        let amount = money::parse_amount(&req.amount)?;

        if req.scheduled_at <= Utc::now() {
            return Err(LedgerError::InvalidScheduledTime);
        }
        if req.kind == TransactionKind::Transfer && req.to_user_id.is_none() {
            return Err(LedgerError::InvalidState(
                "scheduled transfer requires to_user_id".to_string(),
            ));
        }

        let mut conn = state.cluster.master_conn()?;
        let row = conn.transaction::<_, LedgerError, _>(|conn| {
            let current = ScheduledRepository::lock(conn, id)?;
            if current.status != ScheduledStatus::Pending {
                return Err(LedgerError::InvalidState(format!(
                    "cannot update a {} scheduled transaction",
                    current.status
                )));
            }

            ScheduledRepository::update(
                conn,
                id,
                ScheduledChanges {
                    kind: req.kind,
                    amount,
                    currency,
                    description: req.description.as_deref().unwrap_or(""),
                    reference_id: req.reference_id.as_deref(),
                    to_user_id: req.to_user_id,
                    scheduled_at: req.scheduled_at,
                    recurring_type: req.recurring_type.as_deref(),
                    recurring_config: req.recurring_config.clone(),
                    max_retries: req.max_retries.unwrap_or(current.max_retries),
                },
            )
        })?;

        info!(id = %row.id, scheduled_at = %row.scheduled_at, "scheduled transaction updated");
        Ok(row.into())
    }

    pub async fn cancel(state: &AppState, id: Uuid) -> Result<(), LedgerError> {
        let mut conn = state.cluster.master_conn()?;
        let row = ScheduledRepository::find_by_id(&mut conn, id)?
            .ok_or(LedgerError::ScheduledTransactionNotFound)?;
        if row.status != ScheduledStatus::Pending {
            return Err(LedgerError::InvalidState(format!(
                "cannot cancel a {} scheduled transaction",
                row.status
            )));
        }
        ScheduledRepository::update_status(&mut conn, id, ScheduledStatus::Cancelled)
    }

    /// Execute everything due, oldest first. Failures consume retry budget;
    /// rows out of budget are cancelled, the rest are parked as failed for
    /// the next sweep.
    pub async fn sweep(state: &AppState) -> Result<SweepOutcome, LedgerError> {
        let now = Utc::now();
        let due = {
            let mut conn = state.cluster.master_conn()?;
            ScheduledRepository::due(&mut conn, now)?
        };

        let mut outcome = SweepOutcome { executed: 0, failed: 0, cancelled: 0 };

        for scheduled in due {
            match Self::execute_one(state, &scheduled).await {
                Ok(transaction_id) => {
                    let mut conn = state.cluster.master_conn()?;
                    ScheduledRepository::mark_completed(&mut conn, scheduled.id)?;
                    outcome.executed += 1;
                    debug!(id = %scheduled.id, %transaction_id, "scheduled transaction executed");
                    Self::evaluate_recurrence(&scheduled);
                }
                Err(e) => {
                    warn!(id = %scheduled.id, error = %e, "scheduled transaction failed");
                    let mut conn = state.cluster.master_conn()?;
                    let status =
                        ScheduledRepository::mark_attempt_failed(&mut conn, &scheduled, now)?;
                    if status == ScheduledStatus::Cancelled {
                        outcome.cancelled += 1;
                    } else {
                        outcome.failed += 1;
                    }
                }
            }
        }

        if outcome.executed + outcome.failed + outcome.cancelled > 0 {
            info!(
                executed = outcome.executed,
                failed = outcome.failed,
                cancelled = outcome.cancelled,
                "scheduled sweep finished"
            );
        }
        Ok(outcome)
    }

    async fn execute_one(
        state: &AppState,
        scheduled: &ScheduledTransaction,
    ) -> Result<Uuid, LedgerError> {
        let tx = match scheduled.kind {
            TransactionKind::Credit => {
                LedgerService::credit_units(
                    state,
                    scheduled.user_id,
                    scheduled.currency,
                    scheduled.amount,
                    &scheduled.description,
                    scheduled.reference_id.as_deref(),
                )
                .await?
            }
            TransactionKind::Debit => {
                LedgerService::debit_units(
                    state,
                    scheduled.user_id,
                    scheduled.currency,
                    scheduled.amount,
                    &scheduled.description,
                    scheduled.reference_id.as_deref(),
                )
                .await?
            }
            TransactionKind::Transfer => {
                let to_user = scheduled.to_user_id.ok_or_else(|| {
                    LedgerError::InvalidState("scheduled transfer lost its to_user_id".to_string())
                })?;
                LedgerService::transfer_units(
                    state,
                    scheduled.user_id,
                    to_user,
                    scheduled.currency,
                    scheduled.currency,
                    scheduled.amount,
                    &scheduled.description,
                    scheduled.reference_id.as_deref(),
                )
                .await?
            }
        };
        Ok(tx.id)
    }

    /// Recurrence hook. Calendar arithmetic is deliberately not evaluated;
    /// the config is persisted for an external scheduler to act on.
    fn evaluate_recurrence(scheduled: &ScheduledTransaction) {
        if let Some(recurring_type) = &scheduled.recurring_type {
            debug!(
                id = %scheduled.id,
                recurring_type,
                "recurring schedule present, evaluation not performed"
            );
        }
    }
}
