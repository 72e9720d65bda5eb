//! # Lull shared types (lull-common)
//!
//! Types shared between the playback engine (`lull-player`) and whatever
//! host embeds it: the observable status snapshot, the event enum and bus,
//! the stable error classification, and the fade ramp math.

pub mod events;
pub mod fade;
pub mod status;

pub use events::{EventBus, PlaybackState, PlayerEvent};
pub use status::{ErrorKind, PlayerStatus};
