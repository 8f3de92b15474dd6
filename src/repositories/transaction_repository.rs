use crate::error::LedgerError;
use crate::models::entities::{NewTransaction, Transaction};
use crate::models::enums::TransactionStatus;
use crate::schema::transactions;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

pub struct TransactionRepository;

impl TransactionRepository {
    pub fn create(
        conn: &mut PgConnection,
        new_transaction: NewTransaction<'_>,
    ) -> Result<Transaction, LedgerError> {
        diesel::insert_into(transactions::table)
            .values(new_transaction)
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    pub fn find_by_id(
        conn: &mut PgConnection,
        transaction_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        transactions::table
            .find(transaction_id)
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    pub fn find_for_user(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Transaction>, LedgerError> {
        transactions::table
            .find(transaction_id)
            .filter(transactions::user_id.eq(user_id))
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    pub fn list_by_user(
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>, LedgerError> {
        transactions::table
            .filter(transactions::user_id.eq(user_id))
            .order(transactions::created_at.desc())
            .limit(limit)
            .offset(offset)
            .load(conn)
            .map_err(LedgerError::Database)
    }

    /// Locked status transition enforcing the pending-to-terminal state
    /// machine.
    pub fn update_status(
        conn: &mut PgConnection,
        transaction_id: Uuid,
        next: TransactionStatus,
    ) -> Result<Transaction, LedgerError> {
        let current: Transaction = transactions::table
            .find(transaction_id)
            .for_update()
            .first(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::TransactionNotFound,
                other => LedgerError::Database(other),
            })?;

        let next = current.status.transition_to(next)?;

        diesel::update(transactions::table.find(transaction_id))
            .set((
                transactions::status.eq(next),
                transactions::updated_at.eq(Utc::now()),
            ))
            .get_result(conn)
            .map_err(LedgerError::Database)
    }
}
