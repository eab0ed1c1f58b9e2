use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::registry::{Line, Registry};

/// Outcome of a single [`Broadcaster::broadcast`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Clients whose inbox accepted the line.
    pub delivered: usize,
    /// Clients whose inbox was full; the line was discarded for them only.
    pub dropped: usize,
    /// Clients whose handler had already gone away.
    pub disconnected: usize,
}

impl Delivery {
    pub fn attempted(&self) -> usize {
        self.delivered + self.dropped + self.disconnected
    }
}

/// Pushes lines into every registered inbox without ever waiting on a client.
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Offers `line` to every active client.
    ///
    /// Each inbox is tried once. A full inbox loses this line and nothing else
    /// is affected; a slow client can only fall behind, it can never hold up
    /// the caller.
    pub fn broadcast(&self, line: Line) -> Delivery {
        let subscribers = self.registry.snapshot();
        let mut delivery = Delivery::default();

        if subscribers.is_empty() {
            debug!("no clients are connected, discarding line");
            return delivery;
        }

        for subscriber in subscribers {
            match subscriber.sender.try_send(Arc::clone(&line)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    trace!(client = subscriber.id, "inbox full, line dropped");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    self.registry.unregister(subscriber.id);
                    delivery.disconnected += 1;
                }
            }
        }

        debug!(
            delivered = delivery.delivered,
            dropped = delivery.dropped,
            disconnected = delivery.disconnected,
            "line broadcast"
        );
        delivery
    }
}
