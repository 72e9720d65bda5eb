//! Audio pipeline: HTTP source, decoder, device output, focus

pub mod backend;
pub mod decoder;
pub mod focus;
pub mod net;
pub mod output;
pub mod resampler;

pub use backend::CpalBackend;
pub use focus::{AlwaysGranted, FocusChange, FocusCoordinator};
