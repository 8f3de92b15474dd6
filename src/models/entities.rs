use crate::models::enums::{
    BatchStatus, Currency, ScheduledStatus, TransactionKind, TransactionStatus, UserRole,
};
use crate::schema::*;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = users)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub role: UserRole,
}

/// One balance row per (user, currency), lazily created on first credit.
/// The amount is i64 micro-units and must never be observed negative.
#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = balances)]
pub struct Balance {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = balances)]
pub struct NewBalance {
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: i64,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = transactions)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub reference_id: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub balance_after: i64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = transactions)]
pub struct NewTransaction<'a> {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: &'a str,
    pub reference_id: Option<&'a str>,
    pub counterparty_id: Option<Uuid>,
    pub balance_after: i64,
    pub status: TransactionStatus,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = scheduled_transactions)]
pub struct ScheduledTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub reference_id: Option<String>,
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub recurring_type: Option<String>,
    pub recurring_config: Option<JsonValue>,
    pub max_retries: i32,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTransaction {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ScheduledStatus::Pending && self.scheduled_at <= now
    }

    pub fn can_retry(&self) -> bool {
        self.status == ScheduledStatus::Failed && self.retry_count < self.max_retries
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = scheduled_transactions)]
pub struct NewScheduledTransaction<'a> {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: &'a str,
    pub reference_id: Option<&'a str>,
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub recurring_type: Option<&'a str>,
    pub recurring_config: Option<JsonValue>,
    pub max_retries: i32,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = batch_transactions)]
pub struct BatchTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub currency: Currency,
    pub description: String,
    pub status: BatchStatus,
    pub total_amount: i64,
    pub item_count: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = batch_transactions)]
pub struct NewBatchTransaction<'a> {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub currency: Currency,
    pub description: &'a str,
    pub status: BatchStatus,
    pub total_amount: i64,
    pub item_count: i32,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = batch_transaction_items)]
pub struct BatchTransactionItem {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub amount: i64,
    pub description: String,
    pub reference_id: Option<String>,
    pub status: BatchStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = batch_transaction_items)]
pub struct NewBatchTransactionItem<'a> {
    pub batch_id: Uuid,
    pub amount: i64,
    pub description: &'a str,
    pub reference_id: Option<&'a str>,
    pub status: BatchStatus,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = transaction_limits)]
pub struct TransactionLimit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub daily_limit: i64,
    pub weekly_limit: i64,
    pub monthly_limit: i64,
    pub single_limit: i64,
    pub daily_count: i32,
    pub weekly_count: i32,
    pub monthly_count: i32,
    pub daily_amount: i64,
    pub weekly_amount: i64,
    pub monthly_amount: i64,
    pub last_reset_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = transaction_limits)]
pub struct NewTransactionLimit {
    pub user_id: Uuid,
    pub currency: Currency,
    pub daily_limit: i64,
    pub weekly_limit: i64,
    pub monthly_limit: i64,
    pub single_limit: i64,
    pub last_reset_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Queryable, Insertable, Selectable, Identifiable, Debug, Clone, Serialize, ToSchema)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = exchange_rates)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub from_currency: Currency,
    pub to_currency: Currency,
    /// Micro-rate units: 1.000000 == 1_000_000.
    pub rate: i64,
    pub last_updated: DateTime<Utc>,
    pub source: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = exchange_rates)]
pub struct NewExchangeRate<'a> {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: i64,
    pub last_updated: DateTime<Utc>,
    pub source: &'a str,
}

/// Persisted event row. The domain-facing shape lives in `models::events`.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone, Serialize, Deserialize)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(table_name = event_store)]
pub struct EventRecord {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
    pub data: JsonValue,
    pub metadata: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = event_store)]
pub struct NewEventRecord {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
    pub data: JsonValue,
    pub metadata: Option<JsonValue>,
}
