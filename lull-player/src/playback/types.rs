//! Playback request types

/// Immutable description of a single play request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackRequest {
    /// Primary stream URL.
    pub url: String,
    /// Optional backup URL tried when the primary fails.
    pub backup_url: Option<String>,
    /// Display title, if any.
    pub title: Option<String>,
    /// Display subtitle (artist, series, ...), if any.
    pub subtitle: Option<String>,
    /// Restart from the beginning when the stream ends.
    pub looping: bool,
}

impl PlaybackRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            backup_url: None,
            title: None,
            subtitle: None,
            looping: false,
        }
    }

    pub fn with_backup(mut self, url: impl Into<String>) -> Self {
        self.backup_url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_optional_fields() {
        let request = PlaybackRequest::new("http://example.com/live.mp3")
            .with_backup("http://backup.example.com/live.mp3")
            .with_title("Night Rain")
            .looping(true);
        assert_eq!(request.url, "http://example.com/live.mp3");
        assert_eq!(
            request.backup_url.as_deref(),
            Some("http://backup.example.com/live.mp3")
        );
        assert_eq!(request.title.as_deref(), Some("Night Rain"));
        assert!(request.subtitle.is_none());
        assert!(request.looping);
    }
}
