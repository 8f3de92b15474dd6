//! Aggregate projections rebuilt by folding event history.
//!
//! An aggregate is just `(identity, apply function)`: the event type tag
//! selects the applier, and replay is a pure fold over the version-ordered
//! event list. Re-running the fold over the same list yields an identical
//! projection.

use crate::error::LedgerError;
use crate::models::enums::{Currency, TransactionKind, TransactionStatus};
use crate::models::events::{
    AggregateKind, BalanceCreatedPayload, BalanceUpdatedPayload, DomainEvent, EventType,
    TransactionCreatedPayload, TransactionStateChangedPayload, UserCreatedPayload,
    UserUpdatedPayload,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "aggregate_kind", rename_all = "lowercase")]
pub enum Projection {
    Transaction(TransactionProjection),
    Balance(BalanceProjection),
    User(UserProjection),
}

impl Projection {
    pub fn version(&self) -> i64 {
        match self {
            Projection::Transaction(p) => p.version,
            Projection::Balance(p) => p.version,
            Projection::User(p) => p.version,
        }
    }
}

/// Fold a version-ordered event list into the projection for its aggregate.
/// The list must be non-empty, single-aggregate, and contiguous from 1.
pub fn replay(events: &[DomainEvent]) -> Result<Projection, LedgerError> {
    let first = events
        .first()
        .ok_or_else(|| LedgerError::Internal("cannot replay an empty event list".to_string()))?;

    match first.aggregate_kind() {
        AggregateKind::Transaction => {
            let mut projection = TransactionProjection::empty(first.aggregate_id);
            for event in events {
                projection.apply(event)?;
            }
            Ok(Projection::Transaction(projection))
        }
        AggregateKind::Balance => {
            let mut projection = BalanceProjection::empty(first.aggregate_id);
            for event in events {
                projection.apply(event)?;
            }
            Ok(Projection::Balance(projection))
        }
        AggregateKind::User => {
            let mut projection = UserProjection::empty(first.aggregate_id);
            for event in events {
                projection.apply(event)?;
            }
            Ok(Projection::User(projection))
        }
    }
}

fn check_sequence(aggregate_id: Uuid, current: i64, event: &DomainEvent) -> Result<(), LedgerError> {
    if event.aggregate_id != aggregate_id {
        return Err(LedgerError::Internal(format!(
            "event {} belongs to aggregate {}, not {}",
            event.id, event.aggregate_id, aggregate_id
        )));
    }
    if event.version != current + 1 {
        return Err(LedgerError::Internal(format!(
            "non-contiguous event history for {}: version {} after {}",
            aggregate_id, event.version, current
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionProjection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: TransactionKind,
    pub amount: i64,
    pub currency: Currency,
    pub description: String,
    pub reference_id: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub balance_after: Option<i64>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl TransactionProjection {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            user_id: Uuid::nil(),
            kind: TransactionKind::Credit,
            amount: 0,
            currency: Currency::USD,
            description: String::new(),
            reference_id: None,
            counterparty_id: None,
            balance_after: None,
            status: TransactionStatus::Pending,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
        }
    }

    pub fn apply(&mut self, event: &DomainEvent) -> Result<(), LedgerError> {
        check_sequence(self.id, self.version, event)?;

        match event.event_type {
            EventType::TransactionCreated => {
                let payload: TransactionCreatedPayload =
                    serde_json::from_value(event.data.clone())?;
                self.user_id = payload.user_id;
                self.kind = payload.kind;
                self.amount = payload.amount;
                self.currency = payload.currency;
                self.description = payload.description;
                self.reference_id = payload.reference_id;
                self.counterparty_id = payload.counterparty_id;
                self.status = TransactionStatus::Pending;
                self.created_at = event.occurred_at;
                self.updated_at = event.occurred_at;
            }
            EventType::TransactionCompleted
            | EventType::TransactionFailed
            | EventType::TransactionCancelled => {
                let payload: TransactionStateChangedPayload =
                    serde_json::from_value(event.data.clone())?;
                self.status = self.status.transition_to(payload.new_status)?;
                if payload.balance_after.is_some() {
                    self.balance_after = payload.balance_after;
                }
                self.updated_at = event.occurred_at;
            }
            EventType::TransactionRolledBack => {
                let payload: TransactionStateChangedPayload =
                    serde_json::from_value(event.data.clone())?;
                self.status = payload.new_status;
                self.updated_at = event.occurred_at;
            }
            other => {
                return Err(LedgerError::Internal(format!(
                    "event type {} cannot apply to a transaction aggregate",
                    other
                )))
            }
        }

        self.version = event.version;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceProjection {
    pub id: Uuid,
    pub user_id: Uuid,
    pub currency: Currency,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl BalanceProjection {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            user_id: Uuid::nil(),
            currency: Currency::USD,
            amount: 0,
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
        }
    }

    pub fn apply(&mut self, event: &DomainEvent) -> Result<(), LedgerError> {
        check_sequence(self.id, self.version, event)?;

        match event.event_type {
            EventType::BalanceCreated => {
                let payload: BalanceCreatedPayload = serde_json::from_value(event.data.clone())?;
                self.user_id = payload.user_id;
                self.currency = payload.currency;
                self.amount = payload.amount;
                self.created_at = event.occurred_at;
                self.updated_at = event.occurred_at;
            }
            EventType::BalanceUpdated | EventType::BalanceDebited | EventType::BalanceCredited => {
                let payload: BalanceUpdatedPayload = serde_json::from_value(event.data.clone())?;
                self.amount = payload.new_amount;
                self.updated_at = event.occurred_at;
            }
            other => {
                return Err(LedgerError::Internal(format!(
                    "event type {} cannot apply to a balance aggregate",
                    other
                )))
            }
        }

        self.version = event.version;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProjection {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl UserProjection {
    fn empty(id: Uuid) -> Self {
        Self {
            id,
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            created_at: DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime::<Utc>::MIN_UTC,
            version: 0,
        }
    }

    pub fn apply(&mut self, event: &DomainEvent) -> Result<(), LedgerError> {
        check_sequence(self.id, self.version, event)?;

        match event.event_type {
            EventType::UserCreated => {
                let payload: UserCreatedPayload = serde_json::from_value(event.data.clone())?;
                self.email = payload.email;
                self.first_name = payload.first_name;
                self.last_name = payload.last_name;
                self.created_at = event.occurred_at;
                self.updated_at = event.occurred_at;
            }
            EventType::UserUpdated => {
                let payload: UserUpdatedPayload = serde_json::from_value(event.data.clone())?;
                if let Some(email) = payload.email {
                    self.email = email;
                }
                if let Some(first_name) = payload.first_name {
                    self.first_name = first_name;
                }
                if let Some(last_name) = payload.last_name {
                    self.last_name = last_name;
                }
                self.updated_at = event.occurred_at;
            }
            other => {
                return Err(LedgerError::Internal(format!(
                    "event type {} cannot apply to a user aggregate",
                    other
                )))
            }
        }

        self.version = event.version;
        Ok(())
    }
}
