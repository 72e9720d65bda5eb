//! Event types for the Lull playback engine
//!
//! Hosts subscribe to a broadcast bus of `PlayerEvent` values. Discrete
//! transitions arrive here; continuously-valued observables (position,
//! buffering percent, the full status snapshot) are additionally exposed as
//! watch channels by the engine itself.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::status::ErrorKind;

/// Coarse engine state as observed by hosts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    /// No stream loaded, or stream stopped
    Idle,
    /// Stream load/prepare in progress
    Buffering,
    /// Enough data buffered; rendering (or paused) with known duration
    Ready,
    /// Stream exhausted without loop
    Ended,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlaybackState::Idle => write!(f, "idle"),
            PlaybackState::Buffering => write!(f, "buffering"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Ended => write!(f, "ended"),
        }
    }
}

/// Lull event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Engine state transition
    StateChanged {
        state: PlaybackState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stream reached Ready and began rendering
    TrackStarted {
        url: String,
        title: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A stream finished (end of stream, or stop)
    TrackFinished {
        url: String,
        /// true when the stream played to its end
        completed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Playback position update (sent every 500 ms while active)
    Progress {
        position_ms: u64,
        duration_ms: Option<u64>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Buffering progress update (sent every 200 ms while buffering)
    BufferingProgress {
        percent: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Output volume changed
    VolumeChanged {
        volume: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Sleep timer countdown tick
    SleepTimerTick {
        minutes_remaining: u32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Sleep timer reached zero; fade-out and stop follow
    SleepTimerExpired {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Unrecoverable playback failure surfaced to the host
    PlaybackFailed {
        kind: ErrorKind,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Audio focus acquired or lost
    FocusChanged {
        held: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PlayerEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::StateChanged { .. } => "StateChanged",
            PlayerEvent::TrackStarted { .. } => "TrackStarted",
            PlayerEvent::TrackFinished { .. } => "TrackFinished",
            PlayerEvent::Progress { .. } => "Progress",
            PlayerEvent::BufferingProgress { .. } => "BufferingProgress",
            PlayerEvent::VolumeChanged { .. } => "VolumeChanged",
            PlayerEvent::SleepTimerTick { .. } => "SleepTimerTick",
            PlayerEvent::SleepTimerExpired { .. } => "SleepTimerExpired",
            PlayerEvent::PlaybackFailed { .. } => "PlaybackFailed",
            PlayerEvent::FocusChanged { .. } => "FocusChanged",
        }
    }
}

/// Broadcast bus for `PlayerEvent`.
///
/// Thin wrapper over `tokio::sync::broadcast`: non-blocking publish,
/// independent subscribers, lagged-subscriber detection. Slow consumers
/// drop old events rather than back-pressuring the engine.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PlayerEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; errors when no subscriber is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PlayerEvent,
    ) -> Result<usize, broadcast::error::SendError<PlayerEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case.
    pub fn emit_lossy(&self, event: PlayerEvent) {
        let _ = self.tx.send(event);
    }

    /// Configured channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(100);
        let event = PlayerEvent::StateChanged {
            state: PlaybackState::Buffering,
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(100);
        let mut rx = bus.subscribe();

        let event = PlayerEvent::VolumeChanged {
            volume: 0.5,
            timestamp: chrono::Utc::now(),
        };
        assert!(bus.emit(event).is_ok());

        match rx.recv().await.unwrap() {
            PlayerEvent::VolumeChanged { volume, .. } => assert_eq!(volume, 0.5),
            other => panic!("wrong event: {}", other.event_type()),
        }
    }

    #[test]
    fn test_eventbus_emit_lossy_without_subscribers() {
        let bus = EventBus::new(10);
        bus.emit_lossy(PlayerEvent::SleepTimerExpired {
            timestamp: chrono::Utc::now(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = PlayerEvent::PlaybackFailed {
            kind: ErrorKind::NotFound,
            message: ErrorKind::NotFound.message().to_string(),
            timestamp: chrono::Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"PlaybackFailed\""));
        assert!(json.contains("\"kind\":\"not_found\""));
    }

    #[test]
    fn test_event_type_names() {
        let event = PlayerEvent::Progress {
            position_ms: 1000,
            duration_ms: Some(60_000),
            timestamp: chrono::Utc::now(),
        };
        assert_eq!(event.event_type(), "Progress");
    }

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::Idle.to_string(), "idle");
        assert_eq!(PlaybackState::Buffering.to_string(), "buffering");
        assert_ne!(PlaybackState::Ready, PlaybackState::Ended);
    }
}
