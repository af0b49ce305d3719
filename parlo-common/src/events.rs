//! Event types for the parlo event system
//!
//! Provides the shared event definitions and the EventBus.
//!
//! parlo uses hybrid communication:
//! - **EventBus** (tokio::broadcast): one-to-many event broadcasting, also
//!   serialized onto the SSE endpoint for connected clients
//! - **Bounded mpsc queues**: stage-to-stage frame/segment hand-off
//! - **Shared state** behind short-lived locks: controller status reads

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session controller state.
///
/// The controller is always in exactly one of these states; `failed` is
/// terminal and recoverable only through an explicit stop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Starting => write!(f, "starting"),
            SessionState::Active => write!(f, "active"),
            SessionState::Stopping => write!(f, "stopping"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Explicit stop request on the control surface
    ClientStop,
    /// The streaming peer disconnected
    PeerDisconnected,
    /// No inbound audio within the configured idle timeout
    IdleTimeout,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EndReason::ClientStop => write!(f, "client_stop"),
            EndReason::PeerDisconnected => write!(f, "peer_disconnected"),
            EndReason::IdleTimeout => write!(f, "idle_timeout"),
        }
    }
}

/// parlo event types
///
/// Events are broadcast via EventBus and can be serialized for SSE
/// transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ParloEvent {
    /// Session controller state changed
    SessionStateChanged {
        old_state: SessionState,
        new_state: SessionState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session started and is ready for a streaming peer
    SessionStarted {
        session_id: Uuid,
        /// Path of the WebSocket audio channel for this session
        stream_path: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session ended and the controller returned to idle
    SessionEnded {
        session_id: Uuid,
        reason: EndReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A session failed; the controller stays failed until stopped
    SessionFailed {
        session_id: Uuid,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The streaming peer connected to the audio channel
    PeerConnected {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The streaming peer disconnected from the audio channel
    PeerDisconnected {
        session_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Interim recognition result (may be superseded; not translated)
    InterimTranscript {
        session_id: Uuid,
        seq: u64,
        text: String,
        language: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Finalized recognition result (forwarded to translation)
    FinalTranscript {
        session_id: Uuid,
        seq: u64,
        text: String,
        language: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment finished translation (forwarded to synthesis)
    TranslationProduced {
        session_id: Uuid,
        seq: u64,
        text: String,
        language: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A segment was dropped after local recovery (stream continues)
    SegmentSkipped {
        session_id: Uuid,
        seq: u64,
        stage: String,
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ParloEvent {
    /// Get event type as string for SSE event naming and filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            ParloEvent::SessionStateChanged { .. } => "SessionStateChanged",
            ParloEvent::SessionStarted { .. } => "SessionStarted",
            ParloEvent::SessionEnded { .. } => "SessionEnded",
            ParloEvent::SessionFailed { .. } => "SessionFailed",
            ParloEvent::PeerConnected { .. } => "PeerConnected",
            ParloEvent::PeerDisconnected { .. } => "PeerDisconnected",
            ParloEvent::InterimTranscript { .. } => "InterimTranscript",
            ParloEvent::FinalTranscript { .. } => "FinalTranscript",
            ParloEvent::TranslationProduced { .. } => "TranslationProduced",
            ParloEvent::SegmentSkipped { .. } => "SegmentSkipped",
        }
    }
}

/// Broadcast bus for [`ParloEvent`]s.
///
/// Wraps `tokio::sync::broadcast`; subscribers receive events emitted after
/// they subscribe, and slow subscribers lag rather than block emitters.
pub struct EventBus {
    tx: broadcast::Sender<ParloEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<ParloEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns `Ok(subscriber_count)`, or `Err` if no subscriber is
    /// currently listening.
    pub fn emit(
        &self,
        event: ParloEvent,
    ) -> Result<usize, broadcast::error::SendError<ParloEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscribers case.
    pub fn emit_lossy(&self, event: ParloEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_subscribe() {
        let bus = EventBus::new(100);
        let _rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = ParloEvent::SessionStateChanged {
            old_state: SessionState::Idle,
            new_state: SessionState::Starting,
            timestamp: chrono::Utc::now(),
        };

        // Should return error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = Arc::new(EventBus::new(100));
        let mut rx = bus.subscribe();

        let event = ParloEvent::SessionStateChanged {
            old_state: SessionState::Idle,
            new_state: SessionState::Starting,
            timestamp: chrono::Utc::now(),
        };

        assert!(bus.emit(event).is_ok());

        let received = rx.recv().await.unwrap();
        match received {
            ParloEvent::SessionStateChanged {
                old_state,
                new_state,
                ..
            } => {
                assert_eq!(old_state, SessionState::Idle);
                assert_eq!(new_state, SessionState::Starting);
            }
            _ => panic!("Wrong event type received"),
        }
    }

    #[tokio::test]
    async fn test_eventbus_emit_lossy() {
        let bus = EventBus::new(100);
        let event = ParloEvent::PeerConnected {
            session_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
        };

        // Should not panic even without subscribers
        bus.emit_lossy(event);
    }

    #[test]
    fn test_session_state_serde_lowercase() {
        let json = serde_json::to_string(&SessionState::Active).unwrap();
        assert_eq!(json, "\"active\"");
        let back: SessionState = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(back, SessionState::Failed);
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_event_serialization_tagged() {
        let event = ParloEvent::FinalTranscript {
            session_id: Uuid::new_v4(),
            seq: 7,
            text: "hello".to_string(),
            language: "bn".to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"FinalTranscript\""));
        assert!(json.contains("\"seq\":7"));

        let back: ParloEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "FinalTranscript");
    }

    #[test]
    fn test_end_reason_serde() {
        let json = serde_json::to_string(&EndReason::PeerDisconnected).unwrap();
        assert_eq!(json, "\"peer_disconnected\"");
    }
}
