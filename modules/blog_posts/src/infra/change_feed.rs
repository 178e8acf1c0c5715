use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::events::PostDomainEvent;
use crate::domain::ports::EventPublisher;

/// Broadcast fan-out of committed post changes to every open live query.
#[derive(Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<PostDomainEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PostDomainEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventPublisher<PostDomainEvent> for ChangeFeed {
    fn publish(&self, event: &PostDomainEvent) {
        // No receivers simply means no live query is open.
        let delivered = self.tx.send(event.clone()).unwrap_or(0);
        trace!(receivers = delivered, "Published post change");
    }
}
