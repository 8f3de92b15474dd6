//! Batch transactions: a parent row plus 1..=1000 items, each executed
//! through the matching single ledger operation. The parent status is
//! derived from the item outcomes: completed iff all completed, failed iff
//! all failed, partial when mixed.

use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{BatchRequest, BatchResponse};
use crate::models::entities::{BatchTransactionItem, NewBatchTransaction, NewBatchTransactionItem};
use crate::models::enums::{BatchStatus, Currency, TransactionKind};
use crate::money;
use crate::repositories::batch_repository::BatchRepository;
use crate::services::ledger_service::LedgerService;
use diesel::Connection;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

pub const MAX_BATCH_ITEMS: usize = 1000;

pub struct BatchService;

impl BatchService {
    pub async fn create(
        state: &AppState,
        req: BatchRequest,
    ) -> Result<BatchResponse, LedgerError> {
        req.validate()?;
        let currency = Currency::parse(&req.currency)?;

        if req.items.is_empty() {
            return Err(LedgerError::InvalidBatchItems);
        }
        if req.items.len() > MAX_BATCH_ITEMS {
            return Err(LedgerError::BatchSizeExceeded);
        }

        let mut amounts = Vec::with_capacity(req.items.len());
        let mut total: i64 = 0;
        for item in &req.items {
            let amount = money::parse_amount(&item.amount)?;
            total = total
                .checked_add(amount)
                .ok_or_else(|| LedgerError::InvalidAmount("batch total overflow".to_string()))?;
            amounts.push(amount);
        }

        let mut conn = state.cluster.master_conn()?;
        let (batch, items) = conn.transaction::<_, LedgerError, _>(|conn| {
            let batch = BatchRepository::create(
                conn,
                NewBatchTransaction {
                    user_id: req.user_id,
                    kind: req.kind,
                    currency,
                    description: req.description.as_deref().unwrap_or(""),
                    status: BatchStatus::Pending,
                    total_amount: total,
                    item_count: req.items.len() as i32,
                },
            )?;

            let new_items: Vec<NewBatchTransactionItem<'_>> = req
                .items
                .iter()
                .zip(&amounts)
                .map(|(item, amount)| NewBatchTransactionItem {
                    batch_id: batch.id,
                    amount: *amount,
                    description: item.description.as_deref().unwrap_or(""),
                    reference_id: item.reference_id.as_deref(),
                    status: BatchStatus::Pending,
                })
                .collect();
            BatchRepository::create_items(conn, new_items)?;

            let items = BatchRepository::items(conn, batch.id)?;
            Ok((batch, items))
        })?;

        info!(id = %batch.id, user = %batch.user_id, items = batch.item_count, "batch created");
        Ok(BatchResponse::from_parts(batch, items))
    }

    pub async fn get(state: &AppState, batch_id: Uuid) -> Result<BatchResponse, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        let batch = BatchRepository::find_by_id(&mut conn, batch_id)?
            .ok_or(LedgerError::BatchTransactionNotFound)?;
        let items = BatchRepository::items(&mut conn, batch_id)?;
        Ok(BatchResponse::from_parts(batch, items))
    }

    /// Process a pending batch: items run in stored order through the single
    /// operation path with bounded parallelism (1 = strictly serial).
    pub async fn process(state: &AppState, batch_id: Uuid) -> Result<BatchResponse, LedgerError> {
        let batch = {
            let mut conn = state.cluster.master_conn()?;
            let batch = BatchRepository::lock(&mut conn, batch_id)?;
            if batch.status != BatchStatus::Pending {
                return Err(LedgerError::InvalidState(format!(
                    "batch is {}, only pending batches can be processed",
                    batch.status
                )));
            }
            BatchRepository::update_status(&mut conn, batch_id, BatchStatus::Processing)?
        };

        let items = {
            let mut conn = state.cluster.master_conn()?;
            BatchRepository::items(&mut conn, batch_id)?
        };

        let concurrency = state.config.batch_concurrency.max(1);
        let outcomes: Vec<bool> = stream::iter(items)
            .map(|item| Self::process_item(state, &batch.user_id, batch.kind, batch.currency, item))
            .buffered(concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let failed = outcomes.len() - succeeded;

        let final_status = if failed == 0 {
            BatchStatus::Completed
        } else if succeeded == 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Partial
        };

        let mut conn = state.cluster.master_conn()?;
        let batch = BatchRepository::update_status(&mut conn, batch_id, final_status)?;
        let items = BatchRepository::items(&mut conn, batch_id)?;
        info!(id = %batch_id, status = %final_status, succeeded, failed, "batch processed");
        Ok(BatchResponse::from_parts(batch, items))
    }

    pub async fn cancel(state: &AppState, batch_id: Uuid) -> Result<BatchResponse, LedgerError> {
        let mut conn = state.cluster.master_conn()?;
        let batch = BatchRepository::lock(&mut conn, batch_id)?;
        if batch.status != BatchStatus::Pending {
            return Err(LedgerError::InvalidState(
                "only pending batches can be cancelled".to_string(),
            ));
        }
        let batch = BatchRepository::update_status(&mut conn, batch_id, BatchStatus::Cancelled)?;
        Ok(batch.into())
    }

    async fn process_item(
        state: &AppState,
        user_id: &Uuid,
        kind: TransactionKind,
        currency: Currency,
        item: BatchTransactionItem,
    ) -> bool {
        let result = match kind {
            TransactionKind::Credit => {
                LedgerService::credit_units(
                    state,
                    *user_id,
                    currency,
                    item.amount,
                    &item.description,
                    item.reference_id.as_deref(),
                )
                .await
            }
            TransactionKind::Debit => {
                LedgerService::debit_units(
                    state,
                    *user_id,
                    currency,
                    item.amount,
                    &item.description,
                    item.reference_id.as_deref(),
                )
                .await
            }
            TransactionKind::Transfer => Err(LedgerError::InvalidState(
                "batch transfers are not supported".to_string(),
            )),
        };

        let mut conn = match state.cluster.master_conn() {
            Ok(conn) => conn,
            Err(e) => {
                warn!(item = %item.id, error = %e, "cannot record batch item outcome");
                return false;
            }
        };

        match result {
            Ok(tx) => {
                if let Err(e) = BatchRepository::mark_item_completed(&mut conn, item.id, tx.id) {
                    warn!(item = %item.id, error = %e, "failed to mark batch item completed");
                }
                true
            }
            Err(e) => {
                if let Err(mark_err) =
                    BatchRepository::mark_item_failed(&mut conn, item.id, &e.to_string())
                {
                    warn!(item = %item.id, error = %mark_err, "failed to mark batch item failed");
                }
                false
            }
        }
    }
}
