use crate::error::LedgerError;
use crate::models::entities::{Balance, NewBalance};
use crate::models::enums::Currency;
use crate::schema::balances;
use chrono::Utc;
use diesel::prelude::*;
use uuid::Uuid;

pub struct BalanceRepository;

impl BalanceRepository {
    pub fn find_all_by_user(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Vec<Balance>, LedgerError> {
        balances::table
            .filter(balances::user_id.eq(user_id))
            .order(balances::created_at.asc())
            .load(conn)
            .map_err(LedgerError::Database)
    }

    pub fn find_by_user_and_currency(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Option<Balance>, LedgerError> {
        balances::table
            .filter(balances::user_id.eq(user_id))
            .filter(balances::currency.eq(currency))
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    /// Row-locked load; serializes every mutation of one (user, currency)
    /// against all others for the same key.
    pub fn lock(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Balance, LedgerError> {
        balances::table
            .filter(balances::user_id.eq(user_id))
            .filter(balances::currency.eq(currency))
            .for_update()
            .first(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => LedgerError::BalanceNotFound,
                other => LedgerError::Database(other),
            })
    }

    /// Lock the (user, currency) row, creating it with a zero amount when
    /// absent. Returns the locked row plus whether it was created now.
    pub fn lock_or_create(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<(Balance, bool), LedgerError> {
        let inserted = diesel::insert_into(balances::table)
            .values(NewBalance {
                user_id,
                currency,
                amount: 0,
            })
            .on_conflict((balances::user_id, balances::currency))
            .do_nothing()
            .execute(conn)
            .map_err(LedgerError::Database)?;

        let balance = Self::lock(conn, user_id, currency)?;
        Ok((balance, inserted > 0))
    }

    /// Most recently touched balances, for cache warm-up.
    pub fn recently_updated(
        conn: &mut PgConnection,
        limit: i64,
    ) -> Result<Vec<Balance>, LedgerError> {
        balances::table
            .order(balances::updated_at.desc())
            .limit(limit)
            .load(conn)
            .map_err(LedgerError::Database)
    }

    /// Overwrite the amount of a locked row. Callers compute the new amount
    /// from the locked snapshot, so the write is a plain assignment.
    pub fn set_amount(
        conn: &mut PgConnection,
        balance_id: Uuid,
        new_amount: i64,
    ) -> Result<(), LedgerError> {
        if new_amount < 0 {
            return Err(LedgerError::InsufficientFunds);
        }
        diesel::update(balances::table.find(balance_id))
            .set((
                balances::amount.eq(new_amount),
                balances::updated_at.eq(Utc::now()),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;
        Ok(())
    }
}
