use tokio::sync::broadcast;
use uuid::Uuid;

/// Emitted by the sync job for presentation listeners
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A cycle finished writing rows
    DataUpdated { cycle_id: Uuid, written: usize },
    /// The quote source could not resolve a watched symbol; it was dropped
    InvalidSymbol { symbol: String },
}

/// Fire-and-forget fan-out of [`SyncEvent`]s
#[derive(Debug, Clone)]
pub struct SyncEvents {
    sender: broadcast::Sender<SyncEvent>,
}

impl SyncEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        if self.sender.send(event).is_err() {
            log::trace!("Sync event dropped, no listeners");
        }
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new(64)
    }
}
