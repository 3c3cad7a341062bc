//! Session event system.
//!
//! Every open session publishes what happens on its link: connects,
//! disconnects, status updates and frames it could not use. Subscribers
//! get their own broadcast receiver and may lag without slowing the session.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use eqiva_types::{StatusReport, Weekday};

/// Events emitted by a session.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum SessionEvent {
    /// The link is up and notifications are subscribed.
    Connected { address: String },
    /// The link went down.
    Disconnected {
        address: String,
        reason: DisconnectReason,
    },
    /// A status frame updated the cached state.
    Status {
        address: String,
        report: StatusReport,
    },
    /// A day program was read back or confirmed.
    Schedule { address: String, day: Weekday },
    /// A frame with no known layout arrived.
    Unrecognized {
        address: String,
        opcode: u8,
        payload: Vec<u8>,
    },
    /// A frame could not be decoded; cached state was not touched.
    DecodeFailed { address: String, error: String },
}

/// Reason for disconnection.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Normal disconnection requested by the caller.
    UserRequested,
    /// The transport reported the link gone.
    LinkLost,
}

/// Receiver for session events.
pub type EventReceiver = broadcast::Receiver<SessionEvent>;

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: SessionEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eqiva_types::Temperature;

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::Disconnected {
            address: "00:1A:22:0A:0B:0C".to_string(),
            reason: DisconnectReason::LinkLost,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"disconnected\""));
        assert!(json.contains("LinkLost"));

        let back: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::default();
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        let report = StatusReport::new(Temperature::new(20.0).unwrap());
        dispatcher.send(SessionEvent::Status {
            address: "dev".to_string(),
            report: report.clone(),
        });

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                SessionEvent::Status { report: got, .. } => assert_eq!(got, report),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_send_without_receivers() {
        EventDispatcher::new(4).send(SessionEvent::Connected {
            address: "dev".to_string(),
        });
    }
}
