//! Outbound mission lifecycle notifications.

use skyfleet_protocol::{Envelope, MissionEvent};
use tokio::sync::broadcast;
use tracing::debug;

/// Fire-and-forget delivery of lifecycle events.
///
/// Implementations must not block and must swallow transport failures.
pub trait NotificationSink: Send + Sync {
    fn emit(&self, event: MissionEvent);
}

/// Sink used when no transport is wired up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn emit(&self, _event: MissionEvent) {}
}

/// Broadcasts every event to all current subscribers.
///
/// Subscribers that fall more than `capacity` events behind lose the oldest
/// ones. Events emitted while nobody is subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    sender: broadcast::Sender<Envelope>,
}

impl BroadcastSink {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }

    #[must_use]
    pub fn listeners(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for BroadcastSink {
    fn emit(&self, event: MissionEvent) {
        let event_type = event.event_type();
        let mission_id = event.mission_id();
        if self.sender.send(Envelope::new(event)).is_err() {
            debug!(%mission_id, event_type, "no listeners for notification");
        }
    }
}
