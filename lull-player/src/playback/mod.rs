//! Playback orchestration: engine, retry, timers and monitoring

pub mod backend;
pub mod engine;
pub mod monitor;
pub mod retry;
pub mod sleep_timer;
pub mod types;

pub use backend::{AudioBackend, BackendEvent, LoadRequest};
pub use engine::Player;
pub use retry::RetryContext;
pub use types::PlaybackRequest;
