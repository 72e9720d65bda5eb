//! Error types for the playback engine

use lull_common::ErrorKind;
use thiserror::Error;

/// Engine error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The network is unreachable or the connection was refused
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A network operation exceeded its deadline
    #[error("Network timeout: {0}")]
    Timeout(String),

    /// The server answered with a non-success status
    #[error("Bad response (HTTP {status}) for {url}")]
    BadResponse { status: u16, url: String },

    /// The stream no longer exists on the server
    #[error("Stream not found: {0}")]
    NotFound(String),

    /// The container or codec could not be decoded
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Audio device or output stream error
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Decode pipeline error
    #[error("Playback error: {0}")]
    Playback(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Coarse classification carried on status snapshots and failure
    /// events so callers can present a stable message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NetworkUnavailable(_) => ErrorKind::NetworkUnavailable,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::BadResponse { .. } => ErrorKind::BadResponse,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Error::Config(_)
            | Error::AudioOutput(_)
            | Error::Playback(_)
            | Error::Io(_) => ErrorKind::Io,
        }
    }
}

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_stable_messages() {
        let err = Error::BadResponse {
            status: 503,
            url: "http://example.com/a.mp3".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::BadResponse);
        assert_eq!(err.kind().message(), "Server returned an error");

        let err = Error::Timeout("read".to_string());
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let err = Error::NotFound("http://example.com/gone.mp3".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn io_errors_fold_into_io_kind() {
        let err = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(err.kind(), ErrorKind::Io);
        let err = Error::Playback("decoder died".to_string());
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
