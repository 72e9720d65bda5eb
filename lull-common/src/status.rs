//! Player status snapshot and error classification
//!
//! `PlayerStatus` is the single observable value hosts render from. The
//! engine re-creates it on every change (functional update); consumers
//! always see a consistent whole.

use serde::{Deserialize, Serialize};

/// Stable classification for playback failures.
///
/// Each kind maps to a fixed human-readable message surfaced through
/// `PlayerStatus::error_message`. Hosts may match on the kind; the message
/// strings are stable and safe to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// No network connectivity to the source host
    NetworkUnavailable,
    /// Connect or read exceeded the configured bound
    Timeout,
    /// Non-success HTTP status from the source
    BadResponse,
    /// Source resource does not exist
    NotFound,
    /// Container or codec not supported by the decoder
    UnsupportedFormat,
    /// Any other I/O failure
    Io,
}

impl ErrorKind {
    /// Fixed user-facing message for this classification.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::NetworkUnavailable => "No network connection",
            ErrorKind::Timeout => "Network timed out",
            ErrorKind::BadResponse => "Server returned an error",
            ErrorKind::NotFound => "Stream not found",
            ErrorKind::UnsupportedFormat => "Audio format not supported",
            ErrorKind::Io => "Playback failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Snapshot of the complete observable playback state.
///
/// Owned exclusively by the engine; read-only to callers. Never mutated in
/// place — every state change publishes a freshly built value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub is_playing: bool,
    pub is_looping: bool,
    pub is_buffering: bool,
    /// Output volume, 0.0–1.0
    pub volume: f32,
    pub current_url: Option<String>,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub sleep_timer_armed: bool,
    pub sleep_timer_minutes_remaining: u32,
    pub has_error: bool,
    pub error_message: Option<String>,
    /// Set while paused by a focus loss, so regain can auto-resume
    pub was_playing_before_focus_loss: bool,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            is_playing: false,
            is_looping: false,
            is_buffering: false,
            volume: 1.0,
            current_url: None,
            title: None,
            subtitle: None,
            sleep_timer_armed: false,
            sleep_timer_minutes_remaining: 0,
            has_error: false,
            error_message: None,
            was_playing_before_focus_loss: false,
        }
    }
}

impl PlayerStatus {
    /// Snapshot with the error fields populated from a classification.
    pub fn with_error(self, kind: ErrorKind) -> Self {
        Self {
            has_error: true,
            error_message: Some(kind.message().to_string()),
            ..self
        }
    }

    /// Snapshot with the error fields cleared.
    pub fn without_error(self) -> Self {
        Self {
            has_error: false,
            error_message: None,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status() {
        let status = PlayerStatus::default();
        assert!(!status.is_playing);
        assert!(!status.has_error);
        assert_eq!(status.volume, 1.0);
        assert_eq!(status.sleep_timer_minutes_remaining, 0);
    }

    #[test]
    fn test_with_error_sets_classified_message() {
        let status = PlayerStatus::default().with_error(ErrorKind::Timeout);
        assert!(status.has_error);
        assert_eq!(status.error_message.as_deref(), Some("Network timed out"));
    }

    #[test]
    fn test_without_error_clears_fields() {
        let status = PlayerStatus::default()
            .with_error(ErrorKind::NotFound)
            .without_error();
        assert!(!status.has_error);
        assert!(status.error_message.is_none());
    }

    #[test]
    fn test_status_serialization_round_trip() {
        let status = PlayerStatus {
            is_playing: true,
            current_url: Some("https://example.com/a.mp3".to_string()),
            title: Some("Rain".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"is_playing\":true"));

        let back: PlayerStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_error_kind_messages_are_stable() {
        assert_eq!(ErrorKind::NetworkUnavailable.message(), "No network connection");
        assert_eq!(ErrorKind::BadResponse.message(), "Server returned an error");
        assert_eq!(ErrorKind::UnsupportedFormat.to_string(), "Audio format not supported");
    }
}
