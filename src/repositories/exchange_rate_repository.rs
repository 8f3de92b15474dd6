use crate::error::LedgerError;
use crate::models::entities::{ExchangeRate, NewExchangeRate};
use crate::models::enums::Currency;
use crate::schema::exchange_rates;
use diesel::prelude::*;

pub struct ExchangeRateRepository;

impl ExchangeRateRepository {
    /// The freshest stored rate for the pair (greatest `last_updated` wins).
    pub fn freshest(
        conn: &mut PgConnection,
        from: Currency,
        to: Currency,
    ) -> Result<ExchangeRate, LedgerError> {
        exchange_rates::table
            .filter(exchange_rates::from_currency.eq(from))
            .filter(exchange_rates::to_currency.eq(to))
            .order(exchange_rates::last_updated.desc())
            .first(conn)
            .map_err(|e| match e {
                diesel::result::Error::NotFound => {
                    LedgerError::ExchangeRateNotFound(format!("{}->{}", from, to))
                }
                other => LedgerError::Database(other),
            })
    }

    pub fn list(conn: &mut PgConnection) -> Result<Vec<ExchangeRate>, LedgerError> {
        exchange_rates::table
            .order((
                exchange_rates::from_currency.asc(),
                exchange_rates::to_currency.asc(),
            ))
            .load(conn)
            .map_err(LedgerError::Database)
    }

    pub fn upsert(
        conn: &mut PgConnection,
        new_rate: NewExchangeRate<'_>,
    ) -> Result<ExchangeRate, LedgerError> {
        diesel::insert_into(exchange_rates::table)
            .values(&new_rate)
            .on_conflict((exchange_rates::from_currency, exchange_rates::to_currency))
            .do_update()
            .set((
                exchange_rates::rate.eq(new_rate.rate),
                exchange_rates::last_updated.eq(new_rate.last_updated),
                exchange_rates::source.eq(new_rate.source),
            ))
            .get_result(conn)
            .map_err(LedgerError::Database)
    }
}
