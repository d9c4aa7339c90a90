//! Broadcast event bus for handoff lifecycle notifications.
//!
//! UI surfaces (QR display, spinner, status line) subscribe here
//! instead of sharing state with the poller. Slow or absent
//! subscribers never block publication; a lagging receiver skips
//! ahead and misses intermediate events, which is acceptable for a
//! status display.

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use qlh_core::SessionStatus;

#[derive(Debug, Clone)]
pub enum HandoffEvent {
    /// A session was generated and its QR payload is ready to render.
    Generated {
        session_id: String,
        expires_at: DateTime<Utc>,
    },
    /// The server reported a status different from the last observed.
    StatusChanged {
        session_id: String,
        status: SessionStatus,
    },
    /// The session was exchanged for a credential on another device.
    Completed { session_id: String },
    /// The session lapsed before a claimant finished.
    Expired { session_id: String },
    /// A poll attempt failed; the poller keeps going.
    PollFailed { session_id: String, attempt: u32 },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<HandoffEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<HandoffEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers. No subscribers is not an
    /// error.
    pub fn publish(&self, event: HandoffEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
