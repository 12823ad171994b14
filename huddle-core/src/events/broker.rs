use std::sync::Arc;

use tokio::sync::broadcast;

use super::types::Envelope;

/// Default capacity of the broadcast ring buffer.
///
/// Receivers that fall further behind than this skip the oldest envelopes.
pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

pub type BrokerReceiver = broadcast::Receiver<Arc<Envelope>>;

/// Fan-out of realtime envelopes to every live connection.
#[derive(Debug, Clone)]
pub struct Broker {
    tx: broadcast::Sender<Arc<Envelope>>,
}

impl Broker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an envelope; returns how many receivers it reached.
    /// Publishing with nobody connected is not an error.
    pub fn publish(&self, envelope: Envelope) -> usize {
        self.tx.send(Arc::new(envelope)).unwrap_or(0)
    }

    pub fn subscribe(&self) -> BrokerReceiver {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
