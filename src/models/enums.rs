use crate::error::LedgerError;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use utoipa::ToSchema;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    DbEnum,
    Display,
    EnumString,
    ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::CurrencyCode"]
#[strum(serialize_all = "UPPERCASE")]
pub enum Currency {
    USD,
    EUR,
    TRY,
    GBP,
}

impl Currency {
    pub const ALL: [Currency; 4] = [Currency::USD, Currency::EUR, Currency::TRY, Currency::GBP];

    pub fn parse(input: &str) -> Result<Self, LedgerError> {
        let normalized = input.trim().to_uppercase();
        Currency::from_str(&normalized)
            .map_err(|_| LedgerError::CurrencyNotSupported(input.to_string()))
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, Display, EnumString, ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::TransactionKind"]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Credit,
    Debit,
    Transfer,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, Display, EnumString, ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::TransactionStatus"]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// The transaction state machine: pending fans out to the three terminal
    /// states, terminal states are absorbing.
    pub fn can_transition_to(self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (
                TransactionStatus::Pending,
                TransactionStatus::Completed
                    | TransactionStatus::Failed
                    | TransactionStatus::Cancelled
            )
        )
    }

    pub fn transition_to(self, next: TransactionStatus) -> Result<TransactionStatus, LedgerError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(LedgerError::InvalidState(format!("{} -> {}", self, next)))
        }
    }

    pub fn is_terminal(self) -> bool {
        self != TransactionStatus::Pending
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, Display, EnumString, ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::ScheduledStatus"]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ScheduledStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, Display, EnumString, ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::BatchStatus"]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Partial,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum, Display, EnumString, ToSchema,
)]
#[ExistingTypePath = "crate::schema::sql_types::UserRole"]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_parse_is_case_insensitive() {
        assert_eq!(Currency::parse("usd").unwrap(), Currency::USD);
        assert_eq!(Currency::parse(" GBP ").unwrap(), Currency::GBP);
        assert!(matches!(
            Currency::parse("JPY"),
            Err(LedgerError::CurrencyNotSupported(_))
        ));
    }

    #[test]
    fn pending_fans_out_to_all_terminal_states() {
        for next in [
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            assert!(TransactionStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn terminal_states_are_absorbing() {
        for from in [
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            for to in [
                TransactionStatus::Pending,
                TransactionStatus::Completed,
                TransactionStatus::Failed,
                TransactionStatus::Cancelled,
            ] {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn invalid_transition_yields_invalid_state() {
        let err = TransactionStatus::Completed
            .transition_to(TransactionStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }
}
