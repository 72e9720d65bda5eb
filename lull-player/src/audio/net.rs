//! HTTP stream source
//!
//! Buffered range reader over HTTP, exposed to the decoder as a
//! `MediaSource`. Fetches fixed-size blocks with Range requests, follows
//! redirects, and cooperates with session cancellation through a shared
//! flag. Because `MediaSource` reads can only fail with `io::Error`, the
//! precise failure classification is parked in a [`FailureTap`] the
//! session inspects after the decoder gives up.

use crate::config::BufferingConfig;
use lull_common::ErrorKind;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use symphonia::core::io::MediaSource;
use tracing::{debug, warn};

/// Bytes fetched per Range request.
const BLOCK_SIZE: usize = 256 * 1024;

/// Shared slot carrying the classification of the most recent network
/// failure out of the `io::Error`-only `Read` path.
#[derive(Clone, Default)]
pub(crate) struct FailureTap(Arc<Mutex<Option<ErrorKind>>>);

impl FailureTap {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn record(&self, kind: ErrorKind) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(kind);
    }

    /// The recorded failure, or `fallback` when the slot is empty.
    pub(crate) fn take_or(&self, fallback: ErrorKind) -> ErrorKind {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or(fallback)
    }
}

pub(crate) struct HttpSource {
    url: String,
    user_agent: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_redirects: u32,
    pos: u64,
    len: Option<u64>,
    block: Vec<u8>,
    block_start: u64,
    cancel: Arc<AtomicBool>,
    tap: FailureTap,
}

impl HttpSource {
    pub(crate) fn new(
        url: String,
        config: &BufferingConfig,
        cancel: Arc<AtomicBool>,
        tap: FailureTap,
    ) -> Self {
        Self {
            url,
            user_agent: config.user_agent.clone(),
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            max_redirects: config.max_redirects,
            pos: 0,
            len: None,
            block: Vec::new(),
            block_start: 0,
            cancel,
            tap,
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Issue one Range request and return the body plus the total stream
    /// length when the server reveals it.
    fn fetch_range(&self, start: u64, end: u64) -> io::Result<(Vec<u8>, Option<u64>)> {
        let range = format!("bytes={start}-{end}");
        let response = ureq::get(&self.url)
            .config()
            .timeout_per_call(Some(self.read_timeout))
            .timeout_connect(Some(self.connect_timeout))
            .max_redirects(self.max_redirects)
            .build()
            .header("User-Agent", &self.user_agent)
            .header("Range", &range)
            .call()
            .map_err(|e| {
                let kind = classify(&e);
                self.tap.record(kind);
                warn!(url = %self.url, range = %range, error = %e, "range fetch failed");
                io::Error::new(io::ErrorKind::Other, format!("range fetch failed: {e}"))
            })?;

        let status = response.status();
        let content_range = response
            .headers()
            .get("Content-Range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let content_length = response
            .headers()
            .get("Content-Length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());

        let mut body = Vec::new();
        let (_, reader) = response.into_parts();
        reader.into_reader().read_to_end(&mut body).map_err(|e| {
            self.tap.record(ErrorKind::NetworkUnavailable);
            io::Error::new(io::ErrorKind::Other, format!("body read failed: {e}"))
        })?;

        let total = match status {
            ureq::http::StatusCode::PARTIAL_CONTENT => content_range
                .as_deref()
                .and_then(content_range_total)
                .or(content_length),
            // server ignored the Range header and sent everything
            ureq::http::StatusCode::OK => content_length,
            _ => None,
        };
        debug!(
            url = %self.url,
            range = %range,
            bytes = body.len(),
            "range fetch complete"
        );
        Ok((body, total))
    }

    fn refill(&mut self) -> io::Result<()> {
        if self.cancelled() {
            return Ok(());
        }
        let start = self.pos;
        let mut end = start.saturating_add(BLOCK_SIZE as u64).saturating_sub(1);
        if let Some(len) = self.len {
            if len > 0 {
                end = end.min(len.saturating_sub(1));
            }
        }
        let (block, total) = self.fetch_range(start, end)?;
        if total.is_some() {
            self.len = total;
        }
        self.block = block;
        self.block_start = start;
        Ok(())
    }

    fn probe_len(&mut self) -> io::Result<u64> {
        if let Some(len) = self.len {
            return Ok(len);
        }
        let (block, total) = self.fetch_range(0, 0)?;
        let len = total.ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "stream length unavailable")
        })?;
        self.block = block;
        self.block_start = 0;
        self.len = Some(len);
        Ok(len)
    }
}

impl Read for HttpSource {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.cancelled() || out.is_empty() {
            return Ok(0);
        }
        if let Some(len) = self.len {
            if self.pos >= len {
                return Ok(0);
            }
        }
        let in_block = !self.block.is_empty()
            && self.pos >= self.block_start
            && self.pos < self.block_start.saturating_add(self.block.len() as u64);
        if !in_block {
            self.refill()?;
        }
        if self.block.is_empty() {
            return Ok(0);
        }
        let offset = self.pos.saturating_sub(self.block_start) as usize;
        if offset >= self.block.len() {
            return Ok(0);
        }
        let n = (self.block.len() - offset).min(out.len());
        out[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for HttpSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.pos = match pos {
            SeekFrom::Start(offset) => offset,
            SeekFrom::Current(delta) => offset_by(self.pos, delta),
            SeekFrom::End(delta) => {
                let len = self.probe_len()?;
                offset_by(len, delta)
            }
        };
        Ok(self.pos)
    }
}

impl MediaSource for HttpSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.len
    }
}

/// Map a transport error onto the engine's stable error vocabulary.
fn classify(err: &ureq::Error) -> ErrorKind {
    match err {
        ureq::Error::StatusCode(code) if *code == 404 || *code == 410 => ErrorKind::NotFound,
        ureq::Error::StatusCode(_) => ErrorKind::BadResponse,
        ureq::Error::TooManyRedirects => ErrorKind::BadResponse,
        ureq::Error::Timeout(_) => ErrorKind::Timeout,
        ureq::Error::HostNotFound => ErrorKind::NetworkUnavailable,
        ureq::Error::ConnectionFailed => ErrorKind::NetworkUnavailable,
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => ErrorKind::Timeout,
        ureq::Error::Io(_) => ErrorKind::NetworkUnavailable,
        _ => ErrorKind::Io,
    }
}

/// "bytes start-end/total" -> total
fn content_range_total(header: &str) -> Option<u64> {
    let (_, total) = header.split_once('/')?;
    total.parse::<u64>().ok()
}

fn offset_by(base: u64, delta: i64) -> u64 {
    if delta >= 0 {
        base.saturating_add(delta as u64)
    } else {
        base.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_total_parses_valid_header() {
        assert_eq!(content_range_total("bytes 0-1023/40960"), Some(40960));
    }

    #[test]
    fn content_range_total_rejects_wildcard_and_garbage() {
        assert_eq!(content_range_total("bytes 0-1023/*"), None);
        assert_eq!(content_range_total("bytes 0-1023"), None);
        assert_eq!(content_range_total("nonsense"), None);
    }

    #[test]
    fn offset_by_saturates_both_directions() {
        assert_eq!(offset_by(10, 5), 15);
        assert_eq!(offset_by(10, -3), 7);
        assert_eq!(offset_by(5, -10), 0);
        assert_eq!(offset_by(u64::MAX, 1), u64::MAX);
    }

    #[test]
    fn failure_tap_returns_fallback_when_empty() {
        let tap = FailureTap::new();
        assert_eq!(tap.take_or(ErrorKind::Io), ErrorKind::Io);
        tap.record(ErrorKind::Timeout);
        assert_eq!(tap.take_or(ErrorKind::Io), ErrorKind::Timeout);
        // consumed
        assert_eq!(tap.take_or(ErrorKind::Io), ErrorKind::Io);
    }

    #[test]
    fn cancelled_source_reads_as_eof() {
        let cancel = Arc::new(AtomicBool::new(true));
        let mut source = HttpSource::new(
            "http://example.com/a.mp3".to_string(),
            &BufferingConfig::default(),
            cancel,
            FailureTap::new(),
        );
        let mut buf = [0u8; 16];
        assert_eq!(source.read(&mut buf).unwrap(), 0);
    }
}
