//! In-process publication of committed events. The store is the source of
//! truth; the bus only tells live subscribers (projections, websockets,
//! audit tails) that something new is durable. Events are published strictly
//! after commit, so a subscriber never sees a rolled-back event.

use crate::models::events::DomainEvent;
use tokio::sync::broadcast;
use tracing::debug;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DomainEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Fire-and-forget: lagging or absent subscribers never block a commit.
    pub fn publish(&self, event: DomainEvent) {
        match self.tx.send(event) {
            Ok(receivers) => debug!(receivers, "event published"),
            Err(_) => {} // no subscribers
        }
    }

    pub fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entities::Balance;
    use crate::models::enums::Currency;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_event() -> DomainEvent {
        let balance = Balance {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            currency: Currency::USD,
            amount: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        DomainEvent::balance_created(&balance).unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let event = sample_event();
        let id = event.id;
        bus.publish(event);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, id);
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_a_noop() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(sample_event()); // must not panic or block
    }

    #[tokio::test]
    async fn publish_all_preserves_order() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let events: Vec<DomainEvent> = (0..3).map(|_| sample_event()).collect();
        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        bus.publish_all(events);

        for expected in ids {
            assert_eq!(rx.recv().await.unwrap().id, expected);
        }
    }
}
