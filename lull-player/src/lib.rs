//! # lull-player
//!
//! Streaming audio playback engine: one active stream, resilient
//! buffering, silent backup-URL fallback, audio-focus sharing, a sleep
//! timer with fade-out, and observable status.
//!
//! ```no_run
//! use lull_player::{EngineConfig, Player, PlaybackRequest};
//! use lull_player::audio::AlwaysGranted;
//! use std::sync::Arc;
//!
//! # async fn run() -> lull_player::Result<()> {
//! let player = Player::new(EngineConfig::default(), Arc::new(AlwaysGranted))?;
//! player
//!     .play(
//!         PlaybackRequest::new("https://streams.example.com/rain.mp3")
//!             .with_backup("https://backup.example.com/rain.mp3")
//!             .looping(true),
//!     )
//!     .await?;
//! player.set_sleep_timer(30).await;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod playback;
pub mod state;

pub use config::{BufferingConfig, EngineConfig};
pub use error::{Error, Result};
pub use playback::{AudioBackend, BackendEvent, LoadRequest, PlaybackRequest, Player};
pub use state::SharedState;

// Re-export the shared vocabulary so hosts need only this crate.
pub use lull_common::{ErrorKind, EventBus, PlaybackState, PlayerEvent, PlayerStatus};
