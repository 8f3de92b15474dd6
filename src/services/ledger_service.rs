//! The ledger: atomic credit / debit / transfer / conversion over per-user,
//! per-currency balances. Every mutating operation is one database
//! transaction through five phases — admit (row locks), check (caps and
//! funds), mutate (integer arithmetic), emit (event appends), commit.
//! Nothing outside this service writes to balances.

use crate::error::LedgerError;
use crate::models::app_state::AppState;
use crate::models::dtos::{
    BalanceResponse, ConvertRequest, CreditRequest, DebitRequest, ExchangeRateResponse,
    TransactionResponse, TransferRequest,
};
use crate::models::entities::{Balance, NewTransaction, Transaction};
use crate::models::enums::{Currency, TransactionKind, TransactionStatus};
use crate::models::events::{BalanceOperation, ConversionDetail, DomainEvent};
use crate::money;
use crate::repositories::balance_repository::BalanceRepository;
use crate::repositories::event_store::EventStore;
use crate::repositories::exchange_rate_repository::ExchangeRateRepository;
use crate::repositories::limit_repository::LimitRepository;
use crate::repositories::transaction_repository::TransactionRepository;
use crate::repositories::user_repository::UserRepository;
use crate::services::cache_service::{balance_key, transactions_key};
use crate::worker::{ProcessJob, TransactionJob};
use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// TTL for read-through cache entries; commits invalidate eagerly, so this
/// only bounds staleness against out-of-band writes.
const READ_CACHE_TTL: Duration = Duration::from_secs(30);

pub struct LedgerService;

impl LedgerService {
    // ---- boundary operations ------------------------------------------------

    pub async fn credit(
        state: &AppState,
        req: CreditRequest,
    ) -> Result<TransactionResponse, LedgerError> {
        req.validate()?;
        let currency = Currency::parse(&req.currency)?;
        let amount = money::parse_amount(&req.amount)?;
        let tx = Self::credit_units(
            state,
            req.user_id,
            currency,
            amount,
            req.description.as_deref().unwrap_or(""),
            req.reference_id.as_deref(),
        )
        .await?;
        Ok(tx.into())
    }

    pub async fn debit(
        state: &AppState,
        req: DebitRequest,
    ) -> Result<TransactionResponse, LedgerError> {
        req.validate()?;
        let currency = Currency::parse(&req.currency)?;
        let amount = money::parse_amount(&req.amount)?;
        let tx = Self::debit_units(
            state,
            req.user_id,
            currency,
            amount,
            req.description.as_deref().unwrap_or(""),
            req.reference_id.as_deref(),
        )
        .await?;
        Ok(tx.into())
    }

    pub async fn transfer(
        state: &AppState,
        req: TransferRequest,
    ) -> Result<TransactionResponse, LedgerError> {
        req.validate()?;
        let from_currency = Currency::parse(&req.currency)?;
        let to_currency = match &req.to_currency {
            Some(code) => Currency::parse(code)?,
            None => from_currency,
        };
        let amount = money::parse_amount(&req.amount)?;
        let tx = Self::transfer_units(
            state,
            req.from_user_id,
            req.to_user_id,
            from_currency,
            to_currency,
            amount,
            req.description.as_deref().unwrap_or(""),
            req.reference_id.as_deref(),
        )
        .await?;
        Ok(tx.into())
    }

    /// Currency conversion inside one user's balances: a transfer to self in
    /// another currency.
    pub async fn convert(
        state: &AppState,
        req: ConvertRequest,
    ) -> Result<TransactionResponse, LedgerError> {
        req.validate()?;
        let from_currency = Currency::parse(&req.from_currency)?;
        let to_currency = Currency::parse(&req.to_currency)?;
        if from_currency == to_currency {
            return Err(LedgerError::InvalidState(
                "conversion currencies must differ".to_string(),
            ));
        }
        let amount = money::parse_amount(&req.amount)?;
        let tx = Self::transfer_units(
            state,
            req.user_id,
            req.user_id,
            from_currency,
            to_currency,
            amount,
            "currency conversion",
            None,
        )
        .await?;
        Ok(tx.into())
    }

    // ---- unit-of-work operations --------------------------------------------

    /// Credit never rejects for insufficiency; the balance row is created
    /// lazily with amount 0.
    pub async fn credit_units(
        state: &AppState,
        user_id: Uuid,
        currency: Currency,
        amount: i64,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        let mut conn = state.cluster.master_conn()?;
        let now = Utc::now();

        let (tx, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            // admit
            if !UserRepository::exists(conn, user_id)? {
                return Err(LedgerError::UserNotFound);
            }
            let (balance, created) = BalanceRepository::lock_or_create(conn, user_id, currency)?;

            // check
            LimitRepository::check_and_record(conn, user_id, currency, amount, now)?;
            let new_amount = balance
                .amount
                .checked_add(amount)
                .ok_or_else(|| LedgerError::InvalidAmount("balance overflow".to_string()))?;

            // mutate
            BalanceRepository::set_amount(conn, balance.id, new_amount)?;

            let tx = TransactionRepository::create(
                conn,
                NewTransaction {
                    id: Uuid::new_v4(),
                    user_id,
                    kind: TransactionKind::Credit,
                    amount,
                    currency,
                    description,
                    reference_id,
                    counterparty_id: None,
                    balance_after: new_amount,
                    status: TransactionStatus::Completed,
                },
            )?;

            // emit
            let mut committed = Self::emit_balance_events(
                conn,
                &balance,
                created,
                new_amount,
                BalanceOperation::Credit,
                tx.id,
                None,
            )?;
            committed.extend(Self::emit_transaction_events(conn, &tx, new_amount)?);

            Ok((tx, committed))
        })?;

        Self::invalidate_after_commit(state, &[(user_id, currency)]).await;
        state.events.publish_all(committed);
        info!(user = %user_id, %currency, amount, "credit committed");
        Ok(tx)
    }

    pub async fn debit_units(
        state: &AppState,
        user_id: Uuid,
        currency: Currency,
        amount: i64,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        let mut conn = state.cluster.master_conn()?;
        let now = Utc::now();

        let (tx, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            // admit
            let balance = BalanceRepository::lock(conn, user_id, currency)?;

            // check
            LimitRepository::check_and_record(conn, user_id, currency, amount, now)?;
            if balance.amount < amount {
                return Err(LedgerError::InsufficientFunds);
            }
            let new_amount = balance.amount - amount;

            // mutate
            BalanceRepository::set_amount(conn, balance.id, new_amount)?;

            let tx = TransactionRepository::create(
                conn,
                NewTransaction {
                    id: Uuid::new_v4(),
                    user_id,
                    kind: TransactionKind::Debit,
                    amount,
                    currency,
                    description,
                    reference_id,
                    counterparty_id: None,
                    balance_after: new_amount,
                    status: TransactionStatus::Completed,
                },
            )?;

            // emit
            let mut committed = Self::emit_balance_events(
                conn,
                &balance,
                false,
                new_amount,
                BalanceOperation::Debit,
                tx.id,
                None,
            )?;
            committed.extend(Self::emit_transaction_events(conn, &tx, new_amount)?);

            Ok((tx, committed))
        })?;

        Self::invalidate_after_commit(state, &[(user_id, currency)]).await;
        state.events.publish_all(committed);
        info!(user = %user_id, %currency, amount, "debit committed");
        Ok(tx)
    }

    /// Atomic two-row transfer. The two (user, currency) keys are locked in
    /// ascending lexicographic order; cross-currency legs read the freshest
    /// stored rate at admit time and record it in the event payload.
    #[allow(clippy::too_many_arguments)]
    pub async fn transfer_units(
        state: &AppState,
        from_user_id: Uuid,
        to_user_id: Uuid,
        from_currency: Currency,
        to_currency: Currency,
        amount: i64,
        description: &str,
        reference_id: Option<&str>,
    ) -> Result<Transaction, LedgerError> {
        if from_user_id == to_user_id && from_currency == to_currency {
            return Err(LedgerError::InvalidState(
                "transfer endpoints must differ".to_string(),
            ));
        }

        let mut conn = state.cluster.master_conn()?;
        let now = Utc::now();

        let (tx, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            // admit: deadlock-free lock ordering over the two balance keys
            if !UserRepository::exists(conn, to_user_id)? {
                return Err(LedgerError::UserNotFound);
            }
            let payer_key = (from_user_id, from_currency);
            let payee_key = (to_user_id, to_currency);
            let (payer, payee, payee_created) = if payer_key <= payee_key {
                let payer = BalanceRepository::lock(conn, from_user_id, from_currency)?;
                let (payee, created) =
                    BalanceRepository::lock_or_create(conn, to_user_id, to_currency)?;
                (payer, payee, created)
            } else {
                let (payee, created) =
                    BalanceRepository::lock_or_create(conn, to_user_id, to_currency)?;
                let payer = BalanceRepository::lock(conn, from_user_id, from_currency)?;
                (payer, payee, created)
            };

            let conversion = if from_currency == to_currency {
                None
            } else {
                let rate = ExchangeRateRepository::freshest(conn, from_currency, to_currency)?;
                Some(rate)
            };
            let to_amount = match &conversion {
                Some(rate) => {
                    let converted = money::convert(amount, rate.rate)?;
                    if converted <= 0 {
                        return Err(LedgerError::InvalidAmount(
                            "converted amount rounds to zero".to_string(),
                        ));
                    }
                    converted
                }
                None => amount,
            };

            // check: payer limits and funds
            LimitRepository::check_and_record(conn, from_user_id, from_currency, amount, now)?;
            if payer.amount < amount {
                return Err(LedgerError::InsufficientFunds);
            }
            let payer_after = payer.amount - amount;
            let payee_after = payee
                .amount
                .checked_add(to_amount)
                .ok_or_else(|| LedgerError::InvalidAmount("balance overflow".to_string()))?;

            // mutate
            BalanceRepository::set_amount(conn, payer.id, payer_after)?;
            BalanceRepository::set_amount(conn, payee.id, payee_after)?;

            // one TRANSFER row, owned by the payer
            let mut new_tx = NewTransaction {
                id: Uuid::new_v4(),
                user_id: from_user_id,
                kind: TransactionKind::Transfer,
                amount,
                currency: from_currency,
                description,
                reference_id,
                counterparty_id: Some(to_user_id),
                balance_after: payer_after,
                status: TransactionStatus::Completed,
            };
            if from_user_id == to_user_id {
                new_tx.counterparty_id = None;
            }
            let tx = TransactionRepository::create(conn, new_tx)?;

            // emit
            let mut committed = Self::emit_balance_events(
                conn,
                &payer,
                false,
                payer_after,
                BalanceOperation::Debit,
                tx.id,
                None,
            )?;
            let detail = conversion.as_ref().map(|rate| ConversionDetail {
                from_currency,
                from_amount: amount,
                rate: rate.rate,
                rounding: money::ROUNDING_POLICY.to_string(),
            });
            committed.extend(Self::emit_balance_events(
                conn,
                &payee,
                payee_created,
                payee_after,
                BalanceOperation::Credit,
                tx.id,
                detail,
            )?);

            let metadata = conversion.as_ref().map(|rate| {
                json!({
                    "to_currency": to_currency,
                    "to_amount": to_amount,
                    "rate": money::format_rate(rate.rate),
                    "rounding": money::ROUNDING_POLICY,
                })
            });
            committed.extend(Self::emit_transaction_events_with_metadata(
                conn,
                &tx,
                payer_after,
                metadata,
            )?);

            Ok((tx, committed))
        })?;

        Self::invalidate_after_commit(
            state,
            &[(from_user_id, from_currency), (to_user_id, to_currency)],
        )
        .await;
        state.events.publish_all(committed);
        info!(
            from = %from_user_id,
            to = %to_user_id,
            %from_currency,
            %to_currency,
            amount,
            "transfer committed"
        );
        Ok(tx)
    }

    /// Terminal status change for a pending transaction, with the matching
    /// event appended in the same commit.
    pub async fn update_transaction_status(
        state: &AppState,
        transaction_id: Uuid,
        next: TransactionStatus,
        reason: Option<String>,
    ) -> Result<Transaction, LedgerError> {
        let mut conn = state.cluster.master_conn()?;

        let (tx, committed) = conn.transaction::<_, LedgerError, _>(|conn| {
            let updated = TransactionRepository::update_status(conn, transaction_id, next)?;

            let expected = EventStore::current_version(conn, transaction_id)?;
            let event = DomainEvent::transaction_state_changed(
                transaction_id,
                updated.user_id,
                TransactionStatus::Pending,
                next,
                None,
                reason,
            )?;
            let committed = EventStore::append(conn, transaction_id, vec![event], expected)?;

            Ok((updated, committed))
        })?;

        Self::invalidate_after_commit(state, &[(tx.user_id, tx.currency)]).await;
        state.events.publish_all(committed);
        Ok(tx)
    }

    // ---- read paths ---------------------------------------------------------

    /// Balance read: ledger cache, then a replica query behind the read
    /// breaker, with the master as the degraded path.
    pub async fn get_balance(
        state: &AppState,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<BalanceResponse, LedgerError> {
        let key = balance_key(user_id, currency);
        if let Some(value) = state.cache.get(&key).await {
            return serde_json::from_value(value).map_err(Into::into);
        }

        // a missing row is an answer, not a dependency failure, so it must
        // not count against the breaker
        let cluster = Arc::clone(&state.cluster);
        let response = state
            .read_breaker
            .execute(async move {
                match Self::load_balance(cluster.read_replica(), user_id, currency) {
                    Ok(balance) => Ok(balance),
                    Err(e) => {
                        warn!(error = %e, "replica balance read failed, degrading to master");
                        Self::load_balance(cluster.master(), user_id, currency)
                    }
                }
            })
            .await?
            .ok_or(LedgerError::BalanceNotFound)?;

        state
            .cache
            .set(&key, serde_json::to_value(&response)?, READ_CACHE_TTL)
            .await;
        Ok(response)
    }

    pub async fn list_balances(
        state: &AppState,
        user_id: Uuid,
    ) -> Result<Vec<BalanceResponse>, LedgerError> {
        let mut conn = state.cluster.read_conn()?;
        let balances = BalanceRepository::find_all_by_user(&mut conn, user_id)?;
        Ok(balances.into_iter().map(Into::into).collect())
    }

    pub async fn get_transaction(
        state: &AppState,
        transaction_id: Uuid,
    ) -> Result<TransactionResponse, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        TransactionRepository::find_by_id(&mut conn, transaction_id)?
            .map(Into::into)
            .ok_or(LedgerError::TransactionNotFound)
    }

    pub async fn list_transactions(
        state: &AppState,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<TransactionResponse>, LedgerError> {
        let mut conn = state.cluster.replica_conn()?;
        let rows = TransactionRepository::list_by_user(&mut conn, user_id, limit, offset)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Exchange-rate lookup through the breaker and fallback executor:
    /// replica first, master as fallback, results cached by the executor.
    pub async fn get_exchange_rate(
        state: &AppState,
        from: Currency,
        to: Currency,
    ) -> Result<ExchangeRateResponse, LedgerError> {
        let key = format!("rate:{}:{}", from, to);
        let replica = state.cluster.read_replica();
        let master = state.cluster.master();

        let fallback = Arc::clone(&state.fallback);
        state
            .read_breaker
            .execute(async move {
                fallback
                    .execute(
                        &key,
                        Box::pin(async move { Self::load_rate(replica, from, to) }),
                        vec![Box::pin(async move { Self::load_rate(master, from, to) })],
                    )
                    .await
            })
            .await?
            .ok_or_else(|| LedgerError::ExchangeRateNotFound(format!("{}->{}", from, to)))
    }

    // ---- helpers ------------------------------------------------------------

    fn load_balance(
        pool: crate::cluster::DbPool,
        user_id: Uuid,
        currency: Currency,
    ) -> Result<Option<BalanceResponse>, LedgerError> {
        let mut conn = pool.get().map_err(|e| LedgerError::DatabaseConnection(e.to_string()))?;
        Ok(BalanceRepository::find_by_user_and_currency(&mut conn, user_id, currency)?
            .map(Into::into))
    }

    fn load_rate(
        pool: crate::cluster::DbPool,
        from: Currency,
        to: Currency,
    ) -> Result<Option<ExchangeRateResponse>, LedgerError> {
        let mut conn = pool.get().map_err(|e| LedgerError::DatabaseConnection(e.to_string()))?;
        match ExchangeRateRepository::freshest(&mut conn, from, to) {
            Ok(rate) => Ok(Some(rate.into())),
            Err(LedgerError::ExchangeRateNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Returns the appended events (with assigned versions) so callers can
    /// publish them after the commit.
    fn emit_balance_events(
        conn: &mut PgConnection,
        balance: &Balance,
        created_now: bool,
        new_amount: i64,
        operation: BalanceOperation,
        transaction_id: Uuid,
        conversion: Option<ConversionDetail>,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let expected = EventStore::current_version(conn, balance.id)?;
        let mut events = Vec::with_capacity(2);
        if created_now {
            events.push(DomainEvent::balance_created(balance)?);
        }
        events.push(DomainEvent::balance_updated(
            balance.id,
            balance.user_id,
            balance.currency,
            balance.amount,
            new_amount,
            operation,
            transaction_id,
            conversion,
        )?);
        EventStore::append(conn, balance.id, events, expected)
    }

    fn emit_transaction_events(
        conn: &mut PgConnection,
        tx: &Transaction,
        balance_after: i64,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        Self::emit_transaction_events_with_metadata(conn, tx, balance_after, None)
    }

    fn emit_transaction_events_with_metadata(
        conn: &mut PgConnection,
        tx: &Transaction,
        balance_after: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<Vec<DomainEvent>, LedgerError> {
        let mut created = DomainEvent::transaction_created(tx)?;
        if let Some(metadata) = metadata {
            created = created.with_metadata(metadata);
        }
        let completed = DomainEvent::transaction_state_changed(
            tx.id,
            tx.user_id,
            TransactionStatus::Pending,
            TransactionStatus::Completed,
            Some(balance_after),
            None,
        )?;
        EventStore::append(conn, tx.id, vec![created, completed], 0)
    }

    /// Invalidate exactly the cache keys touched by a successful commit.
    async fn invalidate_after_commit(state: &AppState, touched: &[(Uuid, Currency)]) {
        for (user_id, currency) in touched {
            state.cache.invalidate(&balance_key(*user_id, *currency)).await;
            state.cache.invalidate(&transactions_key(*user_id)).await;
        }
    }
}

/// Adapter that lets the worker pool drive the ledger.
pub struct LedgerProcessor {
    state: Arc<AppState>,
}

impl LedgerProcessor {
    pub fn new(state: Arc<AppState>) -> Arc<Self> {
        Arc::new(Self { state })
    }
}

#[async_trait]
impl ProcessJob for LedgerProcessor {
    async fn process(&self, job: TransactionJob) -> Result<Uuid, LedgerError> {
        let tx = match job.kind {
            TransactionKind::Credit => {
                LedgerService::credit_units(
                    &self.state,
                    job.user_id,
                    job.currency,
                    job.amount,
                    &job.description,
                    job.reference_id.as_deref(),
                )
                .await?
            }
            TransactionKind::Debit => {
                LedgerService::debit_units(
                    &self.state,
                    job.user_id,
                    job.currency,
                    job.amount,
                    &job.description,
                    job.reference_id.as_deref(),
                )
                .await?
            }
            TransactionKind::Transfer => {
                let counterparty = job.counterparty_id.ok_or_else(|| {
                    LedgerError::InvalidState("transfer job requires a counterparty".to_string())
                })?;
                LedgerService::transfer_units(
                    &self.state,
                    job.user_id,
                    counterparty,
                    job.currency,
                    job.to_currency.unwrap_or(job.currency),
                    job.amount,
                    &job.description,
                    job.reference_id.as_deref(),
                )
                .await?
            }
        };
        Ok(tx.id)
    }
}
