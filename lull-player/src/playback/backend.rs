//! Backend seam between orchestration and the decode/render pipeline
//!
//! The engine never talks to codecs or devices directly. It issues
//! commands through [`AudioBackend`] and listens for [`BackendEvent`]s on
//! an mpsc channel the backend was handed at construction. Commands must
//! return promptly; every slow outcome arrives as an event.

use crate::error::Result;
use lull_common::ErrorKind;

/// Load command passed to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    /// Stream URL to open.
    pub url: String,
    /// Starting position within the stream.
    pub start_ms: u64,
}

/// Asynchronous notifications from the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    /// A load started, or a mid-stream stall forced a rebuffer.
    Buffering,
    /// Pre-roll satisfied; duration is known where the container provides it.
    Ready { duration_ms: Option<u64> },
    /// Rendering started or stopped.
    PlayingChanged { playing: bool },
    /// The stream played to its natural end.
    Ended,
    /// Unrecoverable failure for the current stream.
    Failed { kind: ErrorKind },
}

/// Decode/render pipeline driven by the engine.
///
/// Implementations own their threads and devices. All methods are
/// non-blocking: `load` kicks off an asynchronous session and later
/// reports `Buffering`/`Ready`/`Failed`; `play`/`pause`/`stop`/`seek_to`
/// only flip session state. The accessor methods read atomics published
/// by the session and are safe to call from timers.
pub trait AudioBackend: Send + Sync + 'static {
    /// Begin loading a stream, replacing any active session.
    fn load(&self, request: LoadRequest) -> Result<()>;

    /// Start or resume rendering.
    fn play(&self) -> Result<()>;

    /// Pause rendering, keeping the session and buffer alive.
    fn pause(&self) -> Result<()>;

    /// Tear down the active session.
    fn stop(&self) -> Result<()>;

    /// Jump to a position in the current stream.
    fn seek_to(&self, position_ms: u64) -> Result<()>;

    /// Set the output volume, 0.0 to 1.0.
    fn set_volume(&self, volume: f32);

    fn volume(&self) -> f32;

    /// Current playhead position.
    fn position_ms(&self) -> u64;

    /// Total duration, if the container declares one.
    fn duration_ms(&self) -> Option<u64>;

    /// Buffer fill relative to the active threshold, 0 to 100.
    fn buffered_percent(&self) -> u8;

    fn is_playing(&self) -> bool;
}
