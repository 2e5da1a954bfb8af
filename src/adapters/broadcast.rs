//! In-process pub/sub for the `monitor-updates` channel.
//!
//! Backed by a tokio broadcast channel; publishing never blocks and a
//! publish with no subscribers is not an error. Messages serialize to
//! the wire shape `{serverId, status, latency, lastChecked}`.

use tokio::sync::broadcast;

use crate::domain::ports::{StatusUpdate, UpdatePublisher};

/// Channel name, for subscribers bridging to external transports.
pub const MONITOR_UPDATES_CHANNEL: &str = "monitor-updates";

pub struct BroadcastPublisher {
    tx: broadcast::Sender<StatusUpdate>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to live status updates. Slow subscribers lag and drop
    /// old messages rather than slowing publishers down.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl UpdatePublisher for BroadcastPublisher {
    fn publish(&self, update: StatusUpdate) {
        // send() only fails when there are no subscribers; that is fine.
        let _ = self.tx.send(update);
    }
}
