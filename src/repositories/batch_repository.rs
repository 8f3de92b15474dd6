use crate::error::LedgerError;
use crate::models::entities::{
    BatchTransaction, BatchTransactionItem, NewBatchTransaction, NewBatchTransactionItem,
};
use crate::models::enums::BatchStatus;
use crate::schema::{batch_transaction_items, batch_transactions};
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

pub struct BatchRepository;

impl BatchRepository {
    pub fn create(
        conn: &mut PgConnection,
        new_batch: NewBatchTransaction<'_>,
    ) -> Result<BatchTransaction, LedgerError> {
        diesel::insert_into(batch_transactions::table)
            .values(new_batch)
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    pub fn create_items(
        conn: &mut PgConnection,
        items: Vec<NewBatchTransactionItem<'_>>,
    ) -> Result<usize, LedgerError> {
        diesel::insert_into(batch_transaction_items::table)
            .values(&items)
            .execute(conn)
            .map_err(LedgerError::Database)
    }

    pub fn find_by_id(
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> Result<Option<BatchTransaction>, LedgerError> {
        batch_transactions::table
            .find(batch_id)
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    /// Locked load used when the batch status is about to change.
    pub fn lock(conn: &mut PgConnection, batch_id: Uuid) -> Result<BatchTransaction, LedgerError> {
        batch_transactions::table
            .find(batch_id)
            .for_update()
            .first(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::BatchTransactionNotFound,
                other => LedgerError::Database(other),
            })
    }

    /// Items in their stored (creation) order.
    pub fn items(
        conn: &mut PgConnection,
        batch_id: Uuid,
    ) -> Result<Vec<BatchTransactionItem>, LedgerError> {
        batch_transaction_items::table
            .filter(batch_transaction_items::batch_id.eq(batch_id))
            .order(batch_transaction_items::created_at.asc())
            .then_order_by(batch_transaction_items::id.asc())
            .load(conn)
            .map_err(LedgerError::Database)
    }

    pub fn update_status(
        conn: &mut PgConnection,
        batch_id: Uuid,
        status: BatchStatus,
    ) -> Result<BatchTransaction, LedgerError> {
        let now = Utc::now();
        let processed_at = matches!(
            status,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Partial
        )
        .then_some(now);

        diesel::update(batch_transactions::table.find(batch_id))
            .set((
                batch_transactions::status.eq(status),
                batch_transactions::processed_at.eq(processed_at),
                batch_transactions::updated_at.eq(now),
            ))
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    pub fn mark_item_completed(
        conn: &mut PgConnection,
        item_id: Uuid,
        transaction_id: Uuid,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        diesel::update(batch_transaction_items::table.find(item_id))
            .set((
                batch_transaction_items::status.eq(BatchStatus::Completed),
                batch_transaction_items::transaction_id.eq(Some(transaction_id)),
                batch_transaction_items::processed_at.eq(Some(now)),
                batch_transaction_items::error_message.eq(None::<String>),
                batch_transaction_items::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;
        Ok(())
    }

    pub fn mark_item_failed(
        conn: &mut PgConnection,
        item_id: Uuid,
        error_message: &str,
    ) -> Result<(), LedgerError> {
        let now = Utc::now();
        diesel::update(batch_transaction_items::table.find(item_id))
            .set((
                batch_transaction_items::status.eq(BatchStatus::Failed),
                batch_transaction_items::error_message.eq(Some(error_message)),
                batch_transaction_items::processed_at.eq(Some(now)),
                batch_transaction_items::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;
        Ok(())
    }
}
