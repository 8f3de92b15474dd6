use chrono::{TimeZone, Utc};
use tally::error::LedgerError;
use tally::models::aggregate::{replay, Projection};
use tally::models::entities::{Balance, Transaction};
use tally::models::enums::{Currency, TransactionKind, TransactionStatus};
use tally::models::events::{BalanceOperation, DomainEvent};
use tally::money;
use uuid::Uuid;

fn balance_row(id: Uuid, user_id: Uuid, amount: i64) -> Balance {
    Balance {
        id,
        user_id,
        currency: Currency::USD,
        amount,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn transaction_row(id: Uuid, user_id: Uuid, amount: i64, balance_after: i64) -> Transaction {
    Transaction {
        id,
        user_id,
        kind: TransactionKind::Credit,
        amount,
        currency: Currency::USD,
        description: "top-up".to_string(),
        reference_id: None,
        counterparty_id: None,
        balance_after,
        status: TransactionStatus::Completed,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// The credit-then-debit history from an empty balance: created(0),
/// updated(+100), updated(-40).
fn balance_history(balance_id: Uuid, user_id: Uuid) -> Vec<DomainEvent> {
    let credit = money::parse_amount("100.00").unwrap();
    let debit = money::parse_amount("40.00").unwrap();

    let mut created = DomainEvent::balance_created(&balance_row(balance_id, user_id, 0)).unwrap();
    created.version = 1;

    let mut credited = DomainEvent::balance_updated(
        balance_id,
        user_id,
        Currency::USD,
        0,
        credit,
        BalanceOperation::Credit,
        Uuid::new_v4(),
        None,
    )
    .unwrap();
    credited.version = 2;

    let mut debited = DomainEvent::balance_updated(
        balance_id,
        user_id,
        Currency::USD,
        credit,
        credit - debit,
        BalanceOperation::Debit,
        Uuid::new_v4(),
        None,
    )
    .unwrap();
    debited.version = 3;

    vec![created, credited, debited]
}

#[test]
fn balance_fold_reproduces_final_amount() {
    let balance_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let events = balance_history(balance_id, user_id);

    let Projection::Balance(projection) = replay(&events).unwrap() else {
        panic!("expected a balance projection");
    };

    assert_eq!(projection.id, balance_id);
    assert_eq!(projection.user_id, user_id);
    assert_eq!(money::format_amount(projection.amount), "60.0000");
    assert_eq!(projection.version, 3);
}

#[test]
fn replay_is_a_pure_fold() {
    let events = balance_history(Uuid::new_v4(), Uuid::new_v4());
    let first = replay(&events).unwrap();
    let second = replay(&events).unwrap();
    assert_eq!(first, second);
}

#[test]
fn transaction_fold_tracks_status_and_balance_after() {
    let tx_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();
    let amount = money::parse_amount("40.00").unwrap();
    let after = money::parse_amount("60.00").unwrap();

    let mut created =
        DomainEvent::transaction_created(&transaction_row(tx_id, user_id, amount, after)).unwrap();
    created.version = 1;
    let mut completed = DomainEvent::transaction_state_changed(
        tx_id,
        user_id,
        TransactionStatus::Pending,
        TransactionStatus::Completed,
        Some(after),
        None,
    )
    .unwrap();
    completed.version = 2;

    let Projection::Transaction(projection) = replay(&[created, completed]).unwrap() else {
        panic!("expected a transaction projection");
    };

    assert_eq!(projection.status, TransactionStatus::Completed);
    assert_eq!(projection.balance_after, Some(after));
    assert_eq!(money::format_amount(projection.amount), "40.0000");
    assert_eq!(projection.version, 2);
}

#[test]
fn version_gaps_are_rejected() {
    let mut events = balance_history(Uuid::new_v4(), Uuid::new_v4());
    events[2].version = 4; // 1, 2, 4
    let err = replay(&events).unwrap_err();
    assert!(matches!(err, LedgerError::Internal(_)));
    assert!(err.to_string().contains("non-contiguous"));
}

#[test]
fn foreign_aggregate_events_are_rejected() {
    let mut events = balance_history(Uuid::new_v4(), Uuid::new_v4());
    events[1].aggregate_id = Uuid::new_v4();
    assert!(replay(&events).is_err());
}

#[test]
fn terminal_state_cannot_be_left_during_replay() {
    let tx_id = Uuid::new_v4();
    let user_id = Uuid::new_v4();

    let mut created =
        DomainEvent::transaction_created(&transaction_row(tx_id, user_id, 1, 1)).unwrap();
    created.version = 1;
    let mut cancelled = DomainEvent::transaction_state_changed(
        tx_id,
        user_id,
        TransactionStatus::Pending,
        TransactionStatus::Cancelled,
        None,
        None,
    )
    .unwrap();
    cancelled.version = 2;
    let mut completed = DomainEvent::transaction_state_changed(
        tx_id,
        user_id,
        TransactionStatus::Cancelled,
        TransactionStatus::Completed,
        None,
        None,
    )
    .unwrap();
    completed.version = 3;

    let err = replay(&[created, cancelled, completed]).unwrap_err();
    assert!(matches!(err, LedgerError::InvalidState(_)));
}

#[test]
fn empty_history_cannot_be_replayed() {
    assert!(replay(&[]).is_err());
}

#[test]
fn multi_aggregate_ordering_breaks_ties_deterministically() {
    let instant = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
    let aggregate_a = Uuid::from_u128(1);
    let aggregate_b = Uuid::from_u128(2);

    let mut events = Vec::new();
    for (aggregate_id, version) in [(aggregate_b, 1), (aggregate_a, 2), (aggregate_a, 1)] {
        let mut event =
            DomainEvent::balance_created(&balance_row(aggregate_id, Uuid::new_v4(), 0)).unwrap();
        event.version = version;
        event.occurred_at = instant;
        events.push(event);
    }

    events.sort_by_key(|e| e.sort_key());

    let order: Vec<(Uuid, i64)> = events.iter().map(|e| (e.aggregate_id, e.version)).collect();
    assert_eq!(
        order,
        vec![(aggregate_a, 1), (aggregate_a, 2), (aggregate_b, 1)]
    );
}
