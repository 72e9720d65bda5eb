//! Default audio backend: HTTP source, symphonia decode, cpal output
//!
//! Each load spawns a session thread that owns the whole pipeline for
//! one stream: fetch, decode into a ring buffer, render from the audio
//! callback. Commands flip atomics the session and callback observe;
//! replacing a session sets its cancel flag and detaches the join so
//! callers never block. Seeking restarts the session at the target
//! position, which keeps the decoder and the ring buffer consistent.

use crate::audio::decoder::StreamDecoder;
use crate::audio::net::{FailureTap, HttpSource};
use crate::audio::output::DeviceOutput;
use crate::audio::resampler;
use crate::config::BufferingConfig;
use crate::error::{Error, Result};
use crate::playback::backend::{AudioBackend, BackendEvent, LoadRequest};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Kept small so gate flips take effect within a few callbacks.
const DECODE_IDLE: Duration = Duration::from_millis(50);
const MIN_PUSH_ROOM: usize = 8192;

struct SessionShared {
    /// Rendering intent: true between play and pause/stop.
    playing: AtomicBool,
    paused: AtomicBool,
    position_ms: AtomicU64,
    /// 0 means unknown.
    duration_ms: AtomicU64,
    buffer_percent: AtomicU32,
}

impl SessionShared {
    fn reset(&self, start_ms: u64) {
        self.position_ms.store(start_ms, Ordering::Relaxed);
        self.duration_ms.store(0, Ordering::Relaxed);
        self.buffer_percent.store(0, Ordering::Relaxed);
    }
}

struct SessionHandle {
    cancel: Arc<AtomicBool>,
    join: std::thread::JoinHandle<()>,
}

pub struct CpalBackend {
    config: BufferingConfig,
    events: mpsc::UnboundedSender<BackendEvent>,
    shared: Arc<SessionShared>,
    volume: Arc<Mutex<f32>>,
    session: Mutex<Option<SessionHandle>>,
    current: Mutex<Option<LoadRequest>>,
}

impl CpalBackend {
    pub fn new(config: BufferingConfig, events: mpsc::UnboundedSender<BackendEvent>) -> Self {
        Self {
            config,
            events,
            shared: Arc::new(SessionShared {
                playing: AtomicBool::new(false),
                paused: AtomicBool::new(true),
                position_ms: AtomicU64::new(0),
                duration_ms: AtomicU64::new(0),
                buffer_percent: AtomicU32::new(0),
            }),
            volume: Arc::new(Mutex::new(1.0)),
            session: Mutex::new(None),
            current: Mutex::new(None),
        }
    }

    fn emit(&self, event: BackendEvent) {
        let _ = self.events.send(event);
    }

    fn start_session(&self, request: LoadRequest) {
        let mut session = lock(&self.session);
        cancel_session(&mut session);
        self.shared.reset(request.start_ms);
        self.emit(BackendEvent::Buffering);

        let cancel = Arc::new(AtomicBool::new(false));
        let join = {
            let url = request.url.clone();
            let start_ms = request.start_ms;
            let config = self.config.clone();
            let shared = Arc::clone(&self.shared);
            let volume = Arc::clone(&self.volume);
            let events = self.events.clone();
            let cancel = Arc::clone(&cancel);
            std::thread::spawn(move || {
                session_main(url, start_ms, config, shared, volume, cancel, events)
            })
        };
        *session = Some(SessionHandle { cancel, join });
        *lock(&self.current) = Some(request);
    }
}

impl AudioBackend for CpalBackend {
    fn load(&self, request: LoadRequest) -> Result<()> {
        info!(url = %request.url, start_ms = request.start_ms, "loading stream");
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.paused.store(true, Ordering::Relaxed);
        self.start_session(request);
        Ok(())
    }

    fn play(&self) -> Result<()> {
        if lock(&self.session).is_none() {
            return Err(Error::Playback("no stream loaded".to_string()));
        }
        self.shared.playing.store(true, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.emit(BackendEvent::PlayingChanged { playing: true });
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.shared.paused.store(true, Ordering::Relaxed);
        self.shared.playing.store(false, Ordering::Relaxed);
        self.emit(BackendEvent::PlayingChanged { playing: false });
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut session = lock(&self.session);
        cancel_session(&mut session);
        *lock(&self.current) = None;
        self.shared.playing.store(false, Ordering::Relaxed);
        self.shared.paused.store(true, Ordering::Relaxed);
        self.shared.reset(0);
        Ok(())
    }

    fn seek_to(&self, position_ms: u64) -> Result<()> {
        let request = lock(&self.current).clone();
        let Some(mut request) = request else {
            return Err(Error::Playback("no stream loaded".to_string()));
        };
        let duration = self.shared.duration_ms.load(Ordering::Relaxed);
        request.start_ms = if duration > 0 {
            position_ms.min(duration)
        } else {
            position_ms
        };
        debug!(position_ms = request.start_ms, "seek requested, restarting session");
        self.start_session(request);
        Ok(())
    }

    fn set_volume(&self, volume: f32) {
        *lock(&self.volume) = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        *lock(&self.volume)
    }

    fn position_ms(&self) -> u64 {
        self.shared.position_ms.load(Ordering::Relaxed)
    }

    fn duration_ms(&self) -> Option<u64> {
        match self.shared.duration_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }

    fn buffered_percent(&self) -> u8 {
        self.shared.buffer_percent.load(Ordering::Relaxed).min(100) as u8
    }

    fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Relaxed) && !self.shared.paused.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flag the old session and detach its join so callers never block on
/// thread teardown.
fn cancel_session(session: &mut Option<SessionHandle>) {
    if let Some(old) = session.take() {
        old.cancel.store(true, Ordering::SeqCst);
        std::thread::spawn(move || {
            let _ = old.join.join();
        });
    }
}

#[allow(clippy::too_many_arguments)]
fn session_main(
    url: String,
    start_ms: u64,
    config: BufferingConfig,
    shared: Arc<SessionShared>,
    volume: Arc<Mutex<f32>>,
    cancel: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<BackendEvent>,
) {
    let tap = FailureTap::new();
    let source = HttpSource::new(url.clone(), &config, Arc::clone(&cancel), tap.clone());
    let mut decoder = match StreamDecoder::open(Box::new(source), &url) {
        Ok(decoder) => decoder,
        Err(e) => {
            if cancel.load(Ordering::SeqCst) {
                return;
            }
            warn!(url = %url, error = %e, "stream open failed");
            let _ = events.send(BackendEvent::Failed {
                kind: tap.take_or(e.kind()),
            });
            return;
        }
    };
    if start_ms > 0 {
        if let Err(e) = decoder.seek_ms(start_ms) {
            warn!(error = %e, "seek failed, starting from beginning");
        }
    }

    let stream_rate = decoder.sample_rate();
    let duration_ms = decoder.duration_ms();
    if let Some(ms) = duration_ms {
        shared.duration_ms.store(ms, Ordering::Relaxed);
    }

    let mut output = match DeviceOutput::open(stream_rate, volume) {
        Ok(output) => output,
        Err(e) => {
            if !cancel.load(Ordering::SeqCst) {
                let _ = events.send(BackendEvent::Failed { kind: e.kind() });
            }
            return;
        }
    };
    // The ring holds samples at the device rate; chunks are resampled on
    // the way in when the device could not match the stream rate.
    let device_rate = output.sample_rate();
    if device_rate != stream_rate {
        info!(stream_rate, device_rate, "resampling session audio");
    }

    let samples_per_sec = device_rate as usize * 2;
    let ring = HeapRb::<f32>::new(config.max_buffer_secs as usize * samples_per_sec);
    let (mut producer, mut consumer) = ring.split();

    // Shared with the audio callback.
    let gate_open = Arc::new(AtomicBool::new(false));
    let starved = Arc::new(AtomicBool::new(false));
    let rendered_frames = Arc::new(AtomicU64::new(0));

    {
        let shared = Arc::clone(&shared);
        let gate_open = Arc::clone(&gate_open);
        let starved = Arc::clone(&starved);
        let rendered = Arc::clone(&rendered_frames);
        let result = output.start(move || {
            if !gate_open.load(Ordering::Relaxed) || shared.paused.load(Ordering::Relaxed) {
                return (0.0, 0.0);
            }
            let mut frame = [0.0f32; 2];
            if consumer.pop_slice(&mut frame) < 2 {
                starved.store(true, Ordering::Relaxed);
                return (0.0, 0.0);
            }
            rendered.fetch_add(1, Ordering::Relaxed);
            (frame[0], frame[1])
        });
        if let Err(e) = result {
            if !cancel.load(Ordering::SeqCst) {
                let _ = events.send(BackendEvent::Failed { kind: e.kind() });
            }
            return;
        }
    }

    let preroll_samples = (config.pre_roll_secs as usize * samples_per_sec).max(1);
    let rebuffer_samples = (config.post_rebuffer_secs as usize * samples_per_sec).max(1);
    let mut fill_target = preroll_samples;
    let mut eof = false;
    let mut device_pause_sent = false;
    let mut chunk: Vec<f32> = Vec::new();

    loop {
        if cancel.load(Ordering::SeqCst) {
            output.stop();
            return;
        }

        if output.has_error() && !device_pause_sent {
            warn!("output device error, pausing session");
            shared.paused.store(true, Ordering::Relaxed);
            shared.playing.store(false, Ordering::Relaxed);
            device_pause_sent = true;
            let _ = events.send(BackendEvent::PlayingChanged { playing: false });
        }

        let position = start_ms
            + rendered_frames.load(Ordering::Relaxed) * 1000 / device_rate.max(1) as u64;
        shared.position_ms.store(position, Ordering::Relaxed);

        // Mid-stream underrun: close the gate and rebuffer.
        if starved.swap(false, Ordering::Relaxed) && !eof && gate_open.load(Ordering::Relaxed) {
            debug!("buffer underrun, rebuffering");
            gate_open.store(false, Ordering::Relaxed);
            fill_target = rebuffer_samples;
            let _ = events.send(BackendEvent::Buffering);
        }

        let occupied = producer.occupied_len();
        if !gate_open.load(Ordering::Relaxed) {
            shared
                .buffer_percent
                .store(fill_percent(occupied, fill_target), Ordering::Relaxed);
            if occupied >= fill_target || (eof && occupied > 0) {
                shared.buffer_percent.store(100, Ordering::Relaxed);
                gate_open.store(true, Ordering::Relaxed);
                let _ = events.send(BackendEvent::Ready { duration_ms });
            }
        } else {
            shared.buffer_percent.store(100, Ordering::Relaxed);
        }

        if eof {
            if producer.occupied_len() == 0 {
                info!("stream drained");
                shared.playing.store(false, Ordering::Relaxed);
                output.stop();
                let _ = events.send(BackendEvent::Ended);
                return;
            }
            std::thread::sleep(DECODE_IDLE);
            continue;
        }

        if producer.vacant_len() < MIN_PUSH_ROOM {
            std::thread::sleep(DECODE_IDLE);
            continue;
        }

        chunk.clear();
        match decoder.next_chunk(&mut chunk) {
            Ok(Some(_)) => {
                if device_rate != stream_rate {
                    match resampler::resample_chunk(&chunk, stream_rate, device_rate) {
                        Ok(converted) => push_all(&mut producer, &converted, &cancel),
                        Err(e) => {
                            warn!(error = %e, "resampling failed mid-stream");
                            output.stop();
                            let _ = events.send(BackendEvent::Failed { kind: e.kind() });
                            return;
                        }
                    }
                } else {
                    push_all(&mut producer, &chunk, &cancel);
                }
            }
            Ok(None) => {
                eof = true;
            }
            Err(e) => {
                if cancel.load(Ordering::SeqCst) {
                    output.stop();
                    return;
                }
                warn!(error = %e, "decode failed mid-stream");
                output.stop();
                let _ = events.send(BackendEvent::Failed {
                    kind: tap.take_or(e.kind()),
                });
                return;
            }
        }
    }
}

/// Push a whole chunk, waiting for ring space as the callback drains it.
fn push_all(producer: &mut HeapProd<f32>, mut data: &[f32], cancel: &AtomicBool) {
    while !data.is_empty() {
        if cancel.load(Ordering::SeqCst) {
            return;
        }
        let pushed = producer.push_slice(data);
        data = &data[pushed..];
        if !data.is_empty() {
            std::thread::sleep(DECODE_IDLE);
        }
    }
}

/// How full the ring is relative to the current gate target, capped at 100.
fn fill_percent(occupied: usize, fill_target: usize) -> u32 {
    if fill_target == 0 {
        return 100;
    }
    ((occupied * 100) / fill_target).min(100) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_percent_tracks_the_gate_target() {
        assert_eq!(fill_percent(0, 1000), 0);
        assert_eq!(fill_percent(250, 1000), 25);
        assert_eq!(fill_percent(999, 1000), 99);
        assert_eq!(fill_percent(1000, 1000), 100);
    }

    #[test]
    fn fill_percent_caps_overshoot() {
        assert_eq!(fill_percent(5000, 1000), 100);
        assert_eq!(fill_percent(1, 0), 100);
    }
}
