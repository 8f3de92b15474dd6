use crate::models::entities::{
    Balance, BatchTransaction, BatchTransactionItem, ExchangeRate, ScheduledTransaction,
    Transaction, TransactionLimit, User,
};
use crate::models::enums::{
    BatchStatus, Currency, ScheduledStatus, TransactionKind, TransactionStatus, UserRole,
};
use crate::money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// Monetary amounts cross the boundary as decimal strings ("100.00") so the
// money path never touches binary floating point.

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, message = "password must be at least 8 characters"))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(email)]
    #[serde(default)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    #[serde(default)]
    pub first_name: Option<String>,
    #[validate(length(min = 1))]
    #[serde(default)]
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreditRequest {
    pub user_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct DebitRequest {
    pub user_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    /// When set and different from `currency`, the payee is credited in this
    /// currency at the freshest stored exchange rate.
    #[serde(default)]
    pub to_currency: Option<String>,
    #[validate(length(min = 1))]
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ConvertRequest {
    pub user_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub from_currency: String,
    #[validate(length(min = 3, max = 3))]
    pub to_currency: String,
    #[validate(length(min = 1))]
    pub amount: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: String,
    pub currency: Currency,
    pub description: String,
    pub reference_id: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub balance_after: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            id: tx.id,
            user_id: tx.user_id,
            kind: tx.kind,
            amount: money::format_amount(tx.amount),
            currency: tx.currency,
            description: tx.description,
            reference_id: tx.reference_id,
            counterparty_id: tx.counterparty_id,
            balance_after: money::format_amount(tx.balance_after),
            status: tx.status,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            user_id: balance.user_id,
            currency: balance.currency,
            amount: money::format_amount(balance.amount),
            updated_at: balance.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ScheduleRequest {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    #[validate(length(min = 1))]
    pub amount: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurring_type: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub recurring_config: Option<JsonValue>,
    #[serde(default)]
    pub max_retries: Option<i32>,
}

/// Full rewrite of a still-pending scheduled transaction; every field of the
/// template is replaced, including the optional ones.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateScheduleRequest {
    pub kind: TransactionKind,
    #[validate(length(min = 1))]
    pub amount: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    #[serde(default)]
    pub recurring_type: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub recurring_config: Option<JsonValue>,
    #[serde(default)]
    pub max_retries: Option<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduledTransactionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: String,
    pub currency: Currency,
    pub description: String,
    pub to_user_id: Option<Uuid>,
    pub scheduled_at: DateTime<Utc>,
    pub status: ScheduledStatus,
    pub recurring_type: Option<String>,
    pub max_retries: i32,
    pub retry_count: i32,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<ScheduledTransaction> for ScheduledTransactionResponse {
    fn from(st: ScheduledTransaction) -> Self {
        Self {
            id: st.id,
            user_id: st.user_id,
            kind: st.kind,
            amount: money::format_amount(st.amount),
            currency: st.currency,
            description: st.description,
            to_user_id: st.to_user_id,
            scheduled_at: st.scheduled_at,
            status: st.status,
            recurring_type: st.recurring_type,
            max_retries: st.max_retries,
            retry_count: st.retry_count,
            last_retry_at: st.last_retry_at,
            created_at: st.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SweepOutcome {
    pub executed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchItemRequest {
    #[validate(length(min = 1))]
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BatchRequest {
    pub user_id: Uuid,
    pub kind: TransactionKind,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(nested)]
    pub items: Vec<BatchItemRequest>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchItemResponse {
    pub id: Uuid,
    pub transaction_id: Option<Uuid>,
    pub amount: String,
    pub description: String,
    pub status: BatchStatus,
    pub error_message: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<BatchTransactionItem> for BatchItemResponse {
    fn from(item: BatchTransactionItem) -> Self {
        Self {
            id: item.id,
            transaction_id: item.transaction_id,
            amount: money::format_amount(item.amount),
            description: item.description,
            status: item.status,
            error_message: item.error_message,
            processed_at: item.processed_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BatchResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub currency: Currency,
    pub status: BatchStatus,
    pub total_amount: String,
    pub item_count: i32,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<BatchItemResponse>,
}

impl BatchResponse {
    pub fn from_parts(batch: BatchTransaction, items: Vec<BatchTransactionItem>) -> Self {
        Self {
            id: batch.id,
            user_id: batch.user_id,
            kind: batch.kind,
            currency: batch.currency,
            status: batch.status,
            total_amount: money::format_amount(batch.total_amount),
            item_count: batch.item_count,
            processed_at: batch.processed_at,
            created_at: batch.created_at,
            items: items.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<BatchTransaction> for BatchResponse {
    fn from(batch: BatchTransaction) -> Self {
        Self::from_parts(batch, Vec::new())
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LimitRequest {
    pub user_id: Uuid,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub daily_limit: String,
    #[validate(length(min = 1))]
    pub weekly_limit: String,
    #[validate(length(min = 1))]
    pub monthly_limit: String,
    #[validate(length(min = 1))]
    pub single_limit: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LimitResponse {
    pub user_id: Uuid,
    pub currency: Currency,
    pub daily_limit: String,
    pub weekly_limit: String,
    pub monthly_limit: String,
    pub single_limit: String,
    pub daily_amount: String,
    pub weekly_amount: String,
    pub monthly_amount: String,
    pub daily_count: i32,
    pub is_active: bool,
}

impl From<TransactionLimit> for LimitResponse {
    fn from(limit: TransactionLimit) -> Self {
        Self {
            user_id: limit.user_id,
            currency: limit.currency,
            daily_limit: money::format_amount(limit.daily_limit),
            weekly_limit: money::format_amount(limit.weekly_limit),
            monthly_limit: money::format_amount(limit.monthly_limit),
            single_limit: money::format_amount(limit.single_limit),
            daily_amount: money::format_amount(limit.daily_amount),
            weekly_amount: money::format_amount(limit.weekly_amount),
            monthly_amount: money::format_amount(limit.monthly_amount),
            daily_count: limit.daily_count,
            is_active: limit.is_active,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ExchangeRateResponse {
    pub from_currency: Currency,
    pub to_currency: Currency,
    pub rate: String,
    pub last_updated: DateTime<Utc>,
    pub source: String,
}

impl From<ExchangeRate> for ExchangeRateResponse {
    fn from(rate: ExchangeRate) -> Self {
        Self {
            from_currency: rate.from_currency,
            to_currency: rate.to_currency,
            rate: money::format_rate(rate.rate),
            last_updated: rate.last_updated,
            source: rate.source,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EventResponse {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
    #[schema(value_type = Object)]
    pub data: JsonValue,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PageQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TimeRangeQuery {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
