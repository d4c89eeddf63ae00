use tokio::sync::broadcast;

use agora_types::StoreEvent;

/// Fan-out of store events to live subscribers. Every subscriber receives
/// every event; filtering by room happens at the subscription edge.
#[derive(Clone)]
pub struct Dispatcher {
    tx: broadcast::Sender<StoreEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. A send error only means there are currently no
    /// subscribers.
    pub fn publish(&self, event: StoreEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
