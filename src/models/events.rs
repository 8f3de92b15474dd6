use crate::error::LedgerError;
use crate::models::entities::{Balance, EventRecord, NewEventRecord, Transaction, User};
use crate::models::enums::{Currency, TransactionKind, TransactionStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Closed set of event type tags as persisted in the `event_store.event_type`
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum EventType {
    #[strum(serialize = "transaction.created")]
    #[serde(rename = "transaction.created")]
    TransactionCreated,
    #[strum(serialize = "transaction.completed")]
    #[serde(rename = "transaction.completed")]
    TransactionCompleted,
    #[strum(serialize = "transaction.failed")]
    #[serde(rename = "transaction.failed")]
    TransactionFailed,
    #[strum(serialize = "transaction.cancelled")]
    #[serde(rename = "transaction.cancelled")]
    TransactionCancelled,
    #[strum(serialize = "transaction.rolled_back")]
    #[serde(rename = "transaction.rolled_back")]
    TransactionRolledBack,
    #[strum(serialize = "balance.created")]
    #[serde(rename = "balance.created")]
    BalanceCreated,
    #[strum(serialize = "balance.updated")]
    #[serde(rename = "balance.updated")]
    BalanceUpdated,
    #[strum(serialize = "balance.debited")]
    #[serde(rename = "balance.debited")]
    BalanceDebited,
    #[strum(serialize = "balance.credited")]
    #[serde(rename = "balance.credited")]
    BalanceCredited,
    #[strum(serialize = "user.created")]
    #[serde(rename = "user.created")]
    UserCreated,
    #[strum(serialize = "user.updated")]
    #[serde(rename = "user.updated")]
    UserUpdated,
}

impl EventType {
    pub fn for_status(status: TransactionStatus) -> Option<EventType> {
        match status {
            TransactionStatus::Completed => Some(EventType::TransactionCompleted),
            TransactionStatus::Failed => Some(EventType::TransactionFailed),
            TransactionStatus::Cancelled => Some(EventType::TransactionCancelled),
            TransactionStatus::Pending => None,
        }
    }
}

/// The aggregate family an event type belongs to; selects the applier at
/// replay time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AggregateKind {
    Transaction,
    Balance,
    User,
}

impl From<EventType> for AggregateKind {
    fn from(event_type: EventType) -> Self {
        match event_type {
            EventType::TransactionCreated
            | EventType::TransactionCompleted
            | EventType::TransactionFailed
            | EventType::TransactionCancelled
            | EventType::TransactionRolledBack => AggregateKind::Transaction,
            EventType::BalanceCreated
            | EventType::BalanceUpdated
            | EventType::BalanceDebited
            | EventType::BalanceCredited => AggregateKind::Balance,
            EventType::UserCreated | EventType::UserUpdated => AggregateKind::User,
        }
    }
}

/// A domain event. Version 0 means "not yet appended"; the event store
/// assigns contiguous versions at append time.
#[derive(Debug, Clone, Serialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: EventType,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub occurred_at: DateTime<Utc>,
    pub data: JsonValue,
    pub metadata: Option<JsonValue>,
}

impl DomainEvent {
    fn new(event_type: EventType, aggregate_id: Uuid, data: JsonValue) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            aggregate_id,
            version: 0,
            occurred_at: Utc::now(),
            data,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: JsonValue) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn aggregate_kind(&self) -> AggregateKind {
        AggregateKind::from(self.event_type)
    }

    /// Stable ordering key for multi-aggregate reads.
    pub fn sort_key(&self) -> (DateTime<Utc>, Uuid, i64) {
        (self.occurred_at, self.aggregate_id, self.version)
    }

    pub fn from_record(record: EventRecord) -> Result<Self, LedgerError> {
        let event_type = EventType::from_str(&record.event_type).map_err(|_| {
            LedgerError::Internal(format!("unknown event type in store: {}", record.event_type))
        })?;
        Ok(Self {
            id: record.id,
            event_type,
            aggregate_id: record.aggregate_id,
            version: record.version,
            occurred_at: record.occurred_at,
            data: record.data,
            metadata: record.metadata,
        })
    }

    pub fn into_record(self, version: i64) -> NewEventRecord {
        NewEventRecord {
            id: self.id,
            event_type: self.event_type.to_string(),
            aggregate_id: self.aggregate_id,
            version,
            occurred_at: self.occurred_at,
            data: self.data,
            metadata: self.metadata,
        }
    }

    pub fn transaction_created(tx: &Transaction) -> Result<Self, LedgerError> {
        let payload = TransactionCreatedPayload {
            transaction_id: tx.id,
            user_id: tx.user_id,
            kind: tx.kind,
            amount: tx.amount,
            currency: tx.currency,
            description: tx.description.clone(),
            reference_id: tx.reference_id.clone(),
            counterparty_id: tx.counterparty_id,
        };
        Ok(Self::new(
            EventType::TransactionCreated,
            tx.id,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn transaction_state_changed(
        tx_id: Uuid,
        user_id: Uuid,
        old_status: TransactionStatus,
        new_status: TransactionStatus,
        balance_after: Option<i64>,
        reason: Option<String>,
    ) -> Result<Self, LedgerError> {
        let event_type = EventType::for_status(new_status).ok_or_else(|| {
            LedgerError::InvalidState(format!("{} is not a terminal status", new_status))
        })?;
        let payload = TransactionStateChangedPayload {
            transaction_id: tx_id,
            user_id,
            old_status,
            new_status,
            balance_after,
            reason,
        };
        Ok(Self::new(event_type, tx_id, serde_json::to_value(payload)?))
    }

    pub fn balance_created(balance: &Balance) -> Result<Self, LedgerError> {
        let payload = BalanceCreatedPayload {
            balance_id: balance.id,
            user_id: balance.user_id,
            currency: balance.currency,
            amount: balance.amount,
        };
        Ok(Self::new(
            EventType::BalanceCreated,
            balance.id,
            serde_json::to_value(payload)?,
        ))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn balance_updated(
        balance_id: Uuid,
        user_id: Uuid,
        currency: Currency,
        old_amount: i64,
        new_amount: i64,
        operation: BalanceOperation,
        transaction_id: Uuid,
        conversion: Option<ConversionDetail>,
    ) -> Result<Self, LedgerError> {
        let payload = BalanceUpdatedPayload {
            balance_id,
            user_id,
            currency,
            old_amount,
            new_amount,
            change: new_amount - old_amount,
            operation,
            transaction_id,
            conversion,
        };
        Ok(Self::new(
            EventType::BalanceUpdated,
            balance_id,
            serde_json::to_value(payload)?,
        ))
    }

    pub fn user_created(user: &User) -> Result<Self, LedgerError> {
        let payload = UserCreatedPayload {
            user_id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        };
        Ok(Self::new(
            EventType::UserCreated,
            user.id,
            serde_json::to_value(payload)?,
        ))
    }

    /// Carries only the fields that actually changed.
    pub fn user_updated(
        user_id: Uuid,
        email: Option<String>,
        first_name: Option<String>,
        last_name: Option<String>,
    ) -> Result<Self, LedgerError> {
        let payload = UserUpdatedPayload {
            user_id,
            email,
            first_name,
            last_name,
        };
        Ok(Self::new(
            EventType::UserUpdated,
            user_id,
            serde_json::to_value(payload)?,
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BalanceOperation {
    Credit,
    Debit,
}

/// Rate applied to a cross-currency leg, recorded so replay is deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionDetail {
    pub from_currency: Currency,
    pub from_amount: i64,
    /// Micro-rate units.
    pub rate: i64,
    pub rounding: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCreatedPayload {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub reference_id: Option<String>,
    pub counterparty_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStateChangedPayload {
    pub transaction_id: Uuid,
    pub user_id: Uuid,
    pub old_status: TransactionStatus,
    pub new_status: TransactionStatus,
    pub balance_after: Option<i64>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceCreatedPayload {
    pub balance_id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdatedPayload {
    pub balance_id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub old_amount: i64,
    pub new_amount: i64,
    pub change: i64,
    pub operation: BalanceOperation,
    pub transaction_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversion: Option<ConversionDetail>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCreatedPayload {
    pub user_id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserUpdatedPayload {
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_tags_round_trip() {
        for (tag, event_type) in [
            ("transaction.created", EventType::TransactionCreated),
            ("transaction.rolled_back", EventType::TransactionRolledBack),
            ("balance.updated", EventType::BalanceUpdated),
            ("user.created", EventType::UserCreated),
        ] {
            assert_eq!(event_type.to_string(), tag);
            assert_eq!(EventType::from_str(tag).unwrap(), event_type);
        }
        assert!(EventType::from_str("balance.deleted").is_err());
    }

    #[test]
    fn event_types_map_to_aggregate_kinds() {
        assert_eq!(
            AggregateKind::from(EventType::TransactionFailed),
            AggregateKind::Transaction
        );
        assert_eq!(
            AggregateKind::from(EventType::BalanceCredited),
            AggregateKind::Balance
        );
        assert_eq!(AggregateKind::from(EventType::UserUpdated), AggregateKind::User);
    }

    #[test]
    fn state_change_rejects_pending_target() {
        let err = DomainEvent::transaction_state_changed(
            Uuid::new_v4(),
            Uuid::new_v4(),
            TransactionStatus::Pending,
            TransactionStatus::Pending,
            None,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }
}
