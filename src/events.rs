use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Events emitted by a scanning session for the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A detected code was matched against the registry and confirmed
    Confirmed {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// A detected code was already confirmed, either earlier in this
    /// session or while its confirmation was still in flight
    Duplicate {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// A detected code has no record in the registry
    Unknown {
        text: String,
        timestamp: DateTime<Utc>,
    },
    /// A confirmation round-trip failed; the code is retried on its next
    /// detection
    ConfirmFailed {
        text: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
    /// The decoder reported a fault for one frame; the session continues
    DecodeFault {
        detail: String,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SessionEvent::Confirmed { timestamp, .. } => *timestamp,
            SessionEvent::Duplicate { timestamp, .. } => *timestamp,
            SessionEvent::Unknown { timestamp, .. } => *timestamp,
            SessionEvent::ConfirmFailed { timestamp, .. } => *timestamp,
            SessionEvent::DecodeFault { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string for filtering and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::Confirmed { .. } => "confirmed",
            SessionEvent::Duplicate { .. } => "duplicate",
            SessionEvent::Unknown { .. } => "unknown",
            SessionEvent::ConfirmFailed { .. } => "confirm_failed",
            SessionEvent::DecodeFault { .. } => "decode_fault",
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SessionEvent::Confirmed { text, .. } => {
                format!("confirmed {}", text)
            }
            SessionEvent::Duplicate { text, .. } => {
                format!("duplicate scan of {}", text)
            }
            SessionEvent::Unknown { text, .. } => {
                format!("{} is not in the registry", text)
            }
            SessionEvent::ConfirmFailed { text, error, .. } => {
                format!("confirm failed for {}: {}", text, error)
            }
            SessionEvent::DecodeFault { detail, .. } => {
                format!("decoder fault: {}", detail)
            }
        }
    }
}

/// Broadcast bus carrying session events from the engine to any number of
/// observers. Publishing without subscribers is not an error; a scan
/// session must run headless.
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: SessionEvent) -> usize {
        match &event {
            SessionEvent::Confirmed { text, .. } => {
                info!("confirmed {}", text);
            }
            SessionEvent::ConfirmFailed { text, error, .. } => {
                warn!("confirm failed for {}: {}", text, error);
            }
            SessionEvent::DecodeFault { detail, .. } => {
                warn!("decoder fault: {}", detail);
            }
            _ => {
                debug!("event: {}", event.description());
            }
        }

        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}
