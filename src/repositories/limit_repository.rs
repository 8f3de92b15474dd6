//! Per-(user, currency) transaction limits with rolling windows. The daily
//! window resets 24 h after `last_reset_date`; weekly and monthly windows
//! reset on ISO-week and calendar-month boundaries.

use crate::error::LedgerError;
use crate::models::entities::{NewTransactionLimit, TransactionLimit};
use crate::models::enums::Currency;
use crate::schema::transaction_limits;
use chrono::{DateTime, Datelike, Duration, Utc};
use diesel::prelude::*;
use uuid::Uuid;

/// Hard cap on transactions per day, independent of the monetary caps.
pub const DAILY_COUNT_CAP: i32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowReset {
    pub daily: bool,
    pub weekly: bool,
    pub monthly: bool,
}

/// Which counters must be zeroed before checking `now` against the caps.
pub fn compute_reset(last_reset: DateTime<Utc>, now: DateTime<Utc>) -> WindowReset {
    let daily = now - last_reset >= Duration::hours(24);
    let weekly = (now.iso_week().year(), now.iso_week().week())
        != (last_reset.iso_week().year(), last_reset.iso_week().week());
    let monthly = (now.year(), now.month()) != (last_reset.year(), last_reset.month());
    WindowReset { daily, weekly, monthly }
}

pub struct LimitRepository;

impl LimitRepository {
    pub fn find(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Option<TransactionLimit>, LedgerError> {
        transaction_limits::table
            .filter(transaction_limits::user_id.eq(user_id))
            .filter(transaction_limits::currency.eq(currency))
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    fn find_for_update(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Option<TransactionLimit>, LedgerError> {
        transaction_limits::table
            .filter(transaction_limits::user_id.eq(user_id))
            .filter(transaction_limits::currency.eq(currency))
            .for_update()
            .first(conn)
            .optional()
            .map_err(LedgerError::Database)
    }

    pub fn upsert(
        conn: &mut PgConnection,
        new_limit: NewTransactionLimit,
    ) -> Result<TransactionLimit, LedgerError> {
        diesel::insert_into(transaction_limits::table)
            .values(&new_limit)
            .on_conflict((transaction_limits::user_id, transaction_limits::currency))
            .do_update()
            .set((
                transaction_limits::daily_limit.eq(new_limit.daily_limit),
                transaction_limits::weekly_limit.eq(new_limit.weekly_limit),
                transaction_limits::monthly_limit.eq(new_limit.monthly_limit),
                transaction_limits::single_limit.eq(new_limit.single_limit),
                transaction_limits::is_active.eq(new_limit.is_active),
                transaction_limits::updated_at.eq(Utc::now()),
            ))
            .get_result(conn)
            .map_err(LedgerError::Database)
    }

    /// Check every cap for `amount` and record the usage, inside the
    /// caller's transaction. Absent or inactive limit rows admit everything.
    pub fn check_and_record(
        conn: &mut PgConnection,
        user_id: Uuid,
        currency: Currency,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let Some(limit) = Self::find_for_update(conn, user_id, currency)? else {
            return Ok(());
        };
        if !limit.is_active {
            return Ok(());
        }

        let reset = compute_reset(limit.last_reset_date, now);
        let (daily_amount, daily_count) = if reset.daily {
            (0, 0)
        } else {
            (limit.daily_amount, limit.daily_count)
        };
        let (weekly_amount, weekly_count) = if reset.weekly {
            (0, 0)
        } else {
            (limit.weekly_amount, limit.weekly_count)
        };
        let (monthly_amount, monthly_count) = if reset.monthly {
            (0, 0)
        } else {
            (limit.monthly_amount, limit.monthly_count)
        };

        check_caps(&limit, amount, daily_amount, daily_count, weekly_amount, monthly_amount)?;

        let last_reset_date = if reset.daily { now } else { limit.last_reset_date };

        diesel::update(transaction_limits::table.find(limit.id))
            .set((
                transaction_limits::daily_amount.eq(daily_amount + amount),
                transaction_limits::daily_count.eq(daily_count + 1),
                transaction_limits::weekly_amount.eq(weekly_amount + amount),
                transaction_limits::weekly_count.eq(weekly_count + 1),
                transaction_limits::monthly_amount.eq(monthly_amount + amount),
                transaction_limits::monthly_count.eq(monthly_count + 1),
                transaction_limits::last_reset_date.eq(last_reset_date),
                transaction_limits::updated_at.eq(now),
            ))
            .execute(conn)
            .map_err(LedgerError::Database)?;

        Ok(())
    }
}

/// Pure cap evaluation over the post-reset counters.
pub fn check_caps(
    limit: &TransactionLimit,
    amount: i64,
    daily_amount: i64,
    daily_count: i32,
    weekly_amount: i64,
    monthly_amount: i64,
) -> Result<(), LedgerError> {
    if amount > limit.single_limit {
        return Err(LedgerError::TransactionLimitExceeded);
    }
    if daily_count >= DAILY_COUNT_CAP {
        return Err(LedgerError::DailyCountExceeded);
    }
    if daily_amount + amount > limit.daily_limit {
        return Err(LedgerError::DailyLimitExceeded);
    }
    if weekly_amount + amount > limit.weekly_limit {
        return Err(LedgerError::WeeklyLimitExceeded);
    }
    if monthly_amount + amount > limit.monthly_limit {
        return Err(LedgerError::MonthlyLimitExceeded);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn limit_row(single: i64, daily: i64, weekly: i64, monthly: i64) -> TransactionLimit {
        TransactionLimit {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency: Currency::USD,
            daily_limit: daily,
            weekly_limit: weekly,
            monthly_limit: monthly,
            single_limit: single,
            daily_count: 0,
            weekly_count: 0,
            monthly_count: 0,
            daily_amount: 0,
            weekly_amount: 0,
            monthly_amount: 0,
            last_reset_date: Utc::now(),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn daily_window_resets_after_24_hours() {
        let anchor = Utc.with_ymd_and_hms(2026, 3, 10, 8, 0, 0).unwrap();
        assert!(!compute_reset(anchor, anchor + Duration::hours(23)).daily);
        assert!(compute_reset(anchor, anchor + Duration::hours(24)).daily);
    }

    #[test]
    fn weekly_window_resets_on_iso_week_boundary() {
        // 2026-03-08 is a Sunday, 2026-03-09 a Monday: new ISO week.
        let sunday = Utc.with_ymd_and_hms(2026, 3, 8, 23, 0, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2026, 3, 9, 1, 0, 0).unwrap();
        assert!(compute_reset(sunday, monday).weekly);
        assert!(!compute_reset(monday, monday + Duration::days(3)).weekly);
    }

    #[test]
    fn monthly_window_resets_on_calendar_month() {
        let march = Utc.with_ymd_and_hms(2026, 3, 31, 12, 0, 0).unwrap();
        let april = Utc.with_ymd_and_hms(2026, 4, 1, 0, 30, 0).unwrap();
        assert!(compute_reset(march, april).monthly);
        assert!(!compute_reset(april, april + Duration::days(20)).monthly);
    }

    #[test]
    fn single_cap_beats_window_caps() {
        let limit = limit_row(100, 1_000, 10_000, 100_000);
        assert!(matches!(
            check_caps(&limit, 101, 0, 0, 0, 0),
            Err(LedgerError::TransactionLimitExceeded)
        ));
        assert!(check_caps(&limit, 100, 0, 0, 0, 0).is_ok());
    }

    #[test]
    fn projected_daily_sum_is_checked() {
        let limit = limit_row(1_000, 1_000, 10_000, 100_000);
        assert!(check_caps(&limit, 400, 600, 1, 600, 600).is_ok());
        assert!(matches!(
            check_caps(&limit, 401, 600, 1, 600, 600),
            Err(LedgerError::DailyLimitExceeded)
        ));
    }

    #[test]
    fn daily_count_cap_applies() {
        let limit = limit_row(1_000, 1_000_000, 10_000_000, 100_000_000);
        assert!(matches!(
            check_caps(&limit, 1, 0, DAILY_COUNT_CAP, 0, 0),
            Err(LedgerError::DailyCountExceeded)
        ));
    }
}
