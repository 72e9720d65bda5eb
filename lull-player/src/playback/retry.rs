//! Retry and backup-URL fallback bookkeeping
//!
//! One `RetryContext` exists per play request. A failure consumes the
//! backup URL (if any) for a silent retry; a successful `Ready` resets
//! the attempt counter so later mid-stream failures get a fresh budget.
//! Fallback is single-level: the backup never chains to another backup.

use crate::playback::types::PlaybackRequest;

#[derive(Debug, Clone)]
pub struct RetryContext {
    request: PlaybackRequest,
    attempts: u32,
    max_retries: u32,
}

impl RetryContext {
    pub fn new(request: PlaybackRequest, max_retries: u32) -> Self {
        Self {
            request,
            attempts: 0,
            max_retries,
        }
    }

    /// The request currently being played (the backup once fallback ran).
    pub fn request(&self) -> &PlaybackRequest {
        &self.request
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Called when the stream reaches Ready, so mid-stream failures start
    /// from a clean attempt count.
    pub fn record_ready(&mut self) {
        self.attempts = 0;
    }

    /// Consume the backup URL for a silent fallback attempt. Returns
    /// `None` when the budget is spent or no backup remains; the caller
    /// surfaces the error in that case.
    pub fn next_fallback(&mut self) -> Option<PlaybackRequest> {
        if self.attempts >= self.max_retries {
            return None;
        }
        let backup = self.request.backup_url.take()?;
        self.attempts += 1;
        self.request = PlaybackRequest {
            url: backup,
            backup_url: None,
            ..self.request.clone()
        };
        Some(self.request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_with_backup() -> PlaybackRequest {
        PlaybackRequest::new("http://primary.example.com/a.mp3")
            .with_backup("http://backup.example.com/a.mp3")
            .with_title("Rain")
    }

    #[test]
    fn fallback_consumes_backup_once() {
        let mut ctx = RetryContext::new(request_with_backup(), 2);
        let fallback = ctx.next_fallback().expect("backup should be offered");
        assert_eq!(fallback.url, "http://backup.example.com/a.mp3");
        assert!(fallback.backup_url.is_none());
        assert_eq!(fallback.title.as_deref(), Some("Rain"));
        assert_eq!(ctx.attempts(), 1);

        // backup has no backup of its own
        assert!(ctx.next_fallback().is_none());
    }

    #[test]
    fn no_backup_means_no_fallback() {
        let mut ctx = RetryContext::new(PlaybackRequest::new("http://x/a.mp3"), 2);
        assert!(ctx.next_fallback().is_none());
        assert_eq!(ctx.attempts(), 0);
    }

    #[test]
    fn exhausted_budget_refuses_fallback() {
        let mut ctx = RetryContext::new(request_with_backup(), 0);
        assert!(ctx.next_fallback().is_none());
    }

    #[test]
    fn ready_resets_attempts_but_not_consumed_backup() {
        let mut ctx = RetryContext::new(request_with_backup(), 2);
        ctx.next_fallback().unwrap();
        ctx.record_ready();
        assert_eq!(ctx.attempts(), 0);
        // backup already consumed; a later failure on it surfaces
        assert!(ctx.next_fallback().is_none());
    }
}
