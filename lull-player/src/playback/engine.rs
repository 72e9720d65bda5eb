//! Playback engine and public facade
//!
//! [`Player`] is the single entry point hosts talk to. Every mutating
//! call and every backend notification funnels through one control lock,
//! so state transitions are serialized no matter which thread calls in.
//! The backend reports outcomes on an mpsc channel consumed by a
//! dedicated event loop task; observers watch the channels exposed by
//! [`SharedState`].
//!
//! Lock discipline: the sleep-timer slot is never cancelled while the
//! control lock is held, because the fade task takes the control lock
//! for its final stop. Callers interrupt the timer first, then lock
//! control.

use crate::audio::focus::{FocusChange, FocusCoordinator, FocusGate};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::playback::backend::{AudioBackend, BackendEvent, LoadRequest};
use crate::playback::monitor::{self, TaskSlot};
use crate::playback::retry::RetryContext;
use crate::playback::sleep_timer;
use crate::playback::types::PlaybackRequest;
use crate::state::SharedState;
use chrono::Utc;
use lull_common::{ErrorKind, PlaybackState, PlayerEvent, PlayerStatus};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mutable engine state, guarded by the control lock.
struct Control {
    machine: PlaybackState,
    retry: Option<RetryContext>,
    focus: FocusGate,
    /// Set by pause so a Ready arriving later does not autoplay.
    pause_requested: bool,
    /// TrackStarted already emitted for the active load; rebuffers must
    /// not announce the track again.
    announced: bool,
    position_sampler: TaskSlot,
    buffer_sampler: TaskSlot,
}

pub(crate) struct PlayerInner {
    pub(crate) config: EngineConfig,
    pub(crate) backend: Arc<dyn AudioBackend>,
    pub(crate) state: Arc<SharedState>,
    /// Output volume captured at the start of a fade, restored when the
    /// fade completes or is interrupted.
    pub(crate) pre_fade_volume: Mutex<Option<f32>>,
    control: Mutex<Control>,
    sleep_slot: Mutex<TaskSlot>,
}

/// Streaming audio player.
///
/// One instance drives one active stream at a time; a new `play` replaces
/// whatever was loaded. Commands return promptly and slow outcomes are
/// observable through [`Player::subscribe_status`] and friends.
pub struct Player {
    inner: Arc<PlayerInner>,
    event_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Create a player over the default cpal/symphonia backend.
    pub fn new(config: EngineConfig, coordinator: Arc<dyn FocusCoordinator>) -> Result<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let backend = Arc::new(crate::audio::backend::CpalBackend::new(
            config.buffering.clone(),
            events_tx,
        ));
        Self::with_backend(config, backend, events_rx, coordinator)
    }

    /// Create a player over a caller-supplied backend. The receiver must
    /// be the other end of the channel the backend emits on.
    pub fn with_backend(
        config: EngineConfig,
        backend: Arc<dyn AudioBackend>,
        events: mpsc::UnboundedReceiver<BackendEvent>,
        coordinator: Arc<dyn FocusCoordinator>,
    ) -> Result<Self> {
        config.validate()?;
        let state = Arc::new(SharedState::new(config.event_capacity));
        let inner = Arc::new(PlayerInner {
            config,
            backend,
            state,
            pre_fade_volume: Mutex::new(None),
            control: Mutex::new(Control {
                machine: PlaybackState::Idle,
                retry: None,
                focus: FocusGate::new(coordinator),
                pause_requested: false,
                announced: false,
                position_sampler: TaskSlot::new(),
                buffer_sampler: TaskSlot::new(),
            }),
            sleep_slot: Mutex::new(TaskSlot::new()),
        });
        let event_loop = tokio::spawn(run_event_loop(inner.clone(), events));
        Ok(Self {
            inner,
            event_loop: Mutex::new(Some(event_loop)),
        })
    }

    /// Start playing a stream, replacing any current one. Network and
    /// decode errors surface through the status observable after silent
    /// fallback to the backup URL is exhausted; a denied focus request is
    /// non-fatal. An armed sleep timer stays armed.
    pub async fn play(&self, request: PlaybackRequest) -> Result<()> {
        let mut control = self.inner.control.lock().await;
        let held = control.focus.acquire();
        self.inner.state.emit(PlayerEvent::FocusChanged {
            held,
            timestamp: Utc::now(),
        });
        control.retry = Some(RetryContext::new(
            request.clone(),
            self.inner.config.max_retries,
        ));
        control.pause_requested = false;
        info!(url = %request.url, "play requested");
        if let Err(e) = self.inner.begin_load(&mut control, &request).await {
            let kind = e.kind();
            self.inner.attempt_fallbacks(&mut control, kind).await;
        }
        Ok(())
    }

    /// Pause rendering, keeping the stream loaded.
    pub async fn pause(&self) -> Result<()> {
        let mut control = self.inner.control.lock().await;
        control.pause_requested = true;
        self.inner.backend.pause()?;
        self.inner
            .state
            .update_status(|s| PlayerStatus {
                is_playing: false,
                ..s
            });
        Ok(())
    }

    /// Resume a paused stream. A no-op when nothing is loaded; while
    /// buffering it re-arms autoplay for the upcoming Ready.
    pub async fn resume(&self) -> Result<()> {
        let mut control = self.inner.control.lock().await;
        control.pause_requested = false;
        if matches!(control.machine, PlaybackState::Ready) {
            self.inner.backend.play()?;
            self.inner
                .state
                .update_status(|s| PlayerStatus {
                    is_playing: true,
                    ..s
                });
            self.inner.start_position_sampler(&mut control).await;
        }
        Ok(())
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        if self.inner.state.status().is_playing {
            self.pause().await
        } else {
            self.resume().await
        }
    }

    /// Stop playback, release audio focus and disarm the sleep timer. A
    /// stop during the fade-out interrupts the fade within one step.
    pub async fn stop(&self) -> Result<()> {
        self.inner.cancel_sleep_internal().await;
        let mut control = self.inner.control.lock().await;
        self.inner.stop_locked(&mut control, false).await;
        Ok(())
    }

    /// Seek to an absolute position, clamped to the known duration.
    pub async fn seek_to(&self, position_ms: u64) -> Result<()> {
        let _control = self.inner.control.lock().await;
        let clamped = match self.inner.backend.duration_ms() {
            Some(duration) => position_ms.min(duration),
            None => position_ms,
        };
        self.inner.backend.seek_to(clamped)?;
        self.inner.state.set_position(clamped);
        Ok(())
    }

    pub async fn seek_forward(&self) -> Result<()> {
        let position = self.inner.backend.position_ms();
        self.seek_to(position.saturating_add(self.inner.config.seek_step_ms))
            .await
    }

    pub async fn seek_backward(&self) -> Result<()> {
        let position = self.inner.backend.position_ms();
        self.seek_to(position.saturating_sub(self.inner.config.seek_step_ms))
            .await
    }

    /// Set the output volume, clamped to [0.0, 1.0].
    pub async fn set_volume(&self, volume: f32) {
        let _control = self.inner.control.lock().await;
        let volume = volume.clamp(0.0, 1.0);
        self.inner.backend.set_volume(volume);
        self.inner
            .state
            .update_status(|s| PlayerStatus { volume, ..s });
        self.inner.state.emit(PlayerEvent::VolumeChanged {
            volume,
            timestamp: Utc::now(),
        });
    }

    pub fn volume(&self) -> f32 {
        self.inner.state.status().volume
    }

    /// Enable or disable looping for the active stream. Takes effect at
    /// the next end-of-stream.
    pub async fn set_loop(&self, looping: bool) {
        let _control = self.inner.control.lock().await;
        self.inner
            .state
            .update_status(|s| PlayerStatus {
                is_looping: looping,
                ..s
            });
    }

    /// Flip looping; returns the new setting.
    pub async fn toggle_loop(&self) -> bool {
        let _control = self.inner.control.lock().await;
        let next = !self.inner.state.status().is_looping;
        self.inner
            .state
            .update_status(|s| PlayerStatus {
                is_looping: next,
                ..s
            });
        next
    }

    /// Arm the sleep timer. Re-arming replaces the previous countdown;
    /// zero minutes cancels. The timer survives track changes.
    pub async fn set_sleep_timer(&self, minutes: u32) {
        self.inner.cancel_sleep_internal().await;
        if minutes == 0 {
            return;
        }
        self.inner.state.update_status(|s| PlayerStatus {
            sleep_timer_armed: true,
            sleep_timer_minutes_remaining: minutes,
            ..s
        });
        let token = CancellationToken::new();
        let handle = sleep_timer::spawn_countdown(self.inner.clone(), minutes, token.clone());
        self.inner.sleep_slot.lock().await.replace(token, handle).await;
    }

    /// Disarm the sleep timer. Playback is unaffected; if a fade was in
    /// progress the pre-fade volume is restored.
    pub async fn cancel_sleep_timer(&self) {
        self.inner.cancel_sleep_internal().await;
    }

    pub fn is_playing(&self) -> bool {
        self.inner.state.status().is_playing
    }

    pub fn status(&self) -> PlayerStatus {
        self.inner.state.status()
    }

    pub fn position_ms(&self) -> u64 {
        self.inner.state.position()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.inner.state.duration()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.inner.state.subscribe_status()
    }

    pub fn subscribe_position(&self) -> watch::Receiver<u64> {
        self.inner.state.subscribe_position()
    }

    pub fn subscribe_duration(&self) -> watch::Receiver<Option<u64>> {
        self.inner.state.subscribe_duration()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe_loading()
    }

    pub fn subscribe_buffer_percent(&self) -> watch::Receiver<u8> {
        self.inner.state.subscribe_buffer_percent()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlayerEvent> {
        self.inner.state.events().subscribe()
    }

    /// React to a focus change reported by the host.
    pub async fn on_focus_change(&self, change: FocusChange) {
        let mut control = self.inner.control.lock().await;
        let status = self.inner.state.status();
        match change {
            FocusChange::PermanentLoss => {
                info!("audio focus lost permanently");
                if status.is_playing {
                    if let Err(e) = self.inner.backend.pause() {
                        warn!(error = %e, "pause on focus loss failed");
                    }
                }
                control.focus.mark_lost();
                control.pause_requested = true;
                self.inner.state.update_status(|s| PlayerStatus {
                    is_playing: false,
                    was_playing_before_focus_loss: status.is_playing,
                    ..s
                });
                self.inner.state.emit(PlayerEvent::FocusChanged {
                    held: false,
                    timestamp: Utc::now(),
                });
            }
            FocusChange::TransientLoss => {
                debug!("audio focus lost transiently");
                if status.is_playing {
                    if let Err(e) = self.inner.backend.pause() {
                        warn!(error = %e, "pause on focus loss failed");
                    }
                }
                control.pause_requested = true;
                self.inner.state.update_status(|s| PlayerStatus {
                    is_playing: false,
                    was_playing_before_focus_loss: status.is_playing,
                    ..s
                });
            }
            FocusChange::TransientLossCanDuck => {
                debug!("ducking for transient focus loss");
                let duck = self.inner.config.duck_volume;
                self.inner.backend.set_volume(duck);
                self.inner
                    .state
                    .update_status(|s| PlayerStatus { volume: duck, ..s });
                self.inner.state.emit(PlayerEvent::VolumeChanged {
                    volume: duck,
                    timestamp: Utc::now(),
                });
            }
            FocusChange::Regain => {
                debug!("audio focus regained");
                self.inner.backend.set_volume(1.0);
                let resume = status.was_playing_before_focus_loss;
                if resume {
                    control.pause_requested = false;
                    if let Err(e) = self.inner.backend.play() {
                        warn!(error = %e, "resume on focus regain failed");
                    }
                }
                self.inner.state.update_status(|s| PlayerStatus {
                    volume: 1.0,
                    is_playing: resume || s.is_playing,
                    was_playing_before_focus_loss: false,
                    ..s
                });
                self.inner.state.emit(PlayerEvent::VolumeChanged {
                    volume: 1.0,
                    timestamp: Utc::now(),
                });
                if resume {
                    self.inner.start_position_sampler(&mut control).await;
                }
            }
        }
    }

    /// React to the output device disappearing (headphones unplugged,
    /// device removed). Pauses rather than blaring from a fallback device.
    pub async fn on_device_unavailable(&self) {
        let mut control = self.inner.control.lock().await;
        if self.inner.state.status().is_playing {
            info!("output device unavailable, pausing");
            control.pause_requested = true;
            if let Err(e) = self.inner.backend.pause() {
                warn!(error = %e, "pause on device loss failed");
            }
            self.inner
                .state
                .update_status(|s| PlayerStatus {
                    is_playing: false,
                    ..s
                });
        }
    }

    /// Tear everything down: stop playback, disarm timers, release focus
    /// and end the event loop. The player is inert afterwards.
    pub async fn release(&self) {
        self.inner.cancel_sleep_internal().await;
        {
            let mut control = self.inner.control.lock().await;
            control.position_sampler.cancel().await;
            control.buffer_sampler.cancel().await;
            self.inner.stop_locked(&mut control, false).await;
        }
        if let Some(handle) = self.event_loop.lock().await.take() {
            handle.abort();
        }
        info!("player released");
    }
}

async fn run_event_loop(
    inner: Arc<PlayerInner>,
    mut events: mpsc::UnboundedReceiver<BackendEvent>,
) {
    while let Some(event) = events.recv().await {
        inner.handle_backend_event(event).await;
    }
    debug!("backend event channel closed");
}

impl PlayerInner {
    async fn handle_backend_event(&self, event: BackendEvent) {
        let mut control = self.control.lock().await;
        match event {
            BackendEvent::Buffering => {
                if matches!(control.machine, PlaybackState::Ready) {
                    debug!("mid-stream stall, rebuffering");
                }
                control.machine = PlaybackState::Buffering;
                self.state.set_loading(true);
                self.state.update_status(|s| PlayerStatus {
                    is_buffering: true,
                    ..s
                });
                self.state.emit(PlayerEvent::StateChanged {
                    state: PlaybackState::Buffering,
                    timestamp: Utc::now(),
                });
                self.start_buffer_sampler(&mut control).await;
                self.start_position_sampler(&mut control).await;
            }
            BackendEvent::Ready { duration_ms } => {
                control.machine = PlaybackState::Ready;
                if let Some(retry) = control.retry.as_mut() {
                    retry.record_ready();
                }
                self.state.set_duration(duration_ms);
                self.state.set_loading(false);
                self.state.set_buffer_percent(100);
                self.state.update_status(|s| PlayerStatus {
                    is_buffering: false,
                    ..s.without_error()
                });
                self.state.emit(PlayerEvent::StateChanged {
                    state: PlaybackState::Ready,
                    timestamp: Utc::now(),
                });
                if !control.announced {
                    control.announced = true;
                    if let Some(request) = control.retry.as_ref().map(|r| r.request().clone()) {
                        self.state.emit(PlayerEvent::TrackStarted {
                            url: request.url,
                            title: request.title,
                            timestamp: Utc::now(),
                        });
                    }
                }
                if !control.pause_requested {
                    match self.backend.play() {
                        Ok(()) => {
                            self.state.update_status(|s| PlayerStatus {
                                is_playing: true,
                                ..s
                            });
                        }
                        Err(e) => warn!(error = %e, "autoplay after ready failed"),
                    }
                }
                self.start_position_sampler(&mut control).await;
            }
            BackendEvent::PlayingChanged { playing } => {
                self.state.update_status(|s| PlayerStatus {
                    is_playing: playing,
                    ..s
                });
                if playing {
                    self.start_position_sampler(&mut control).await;
                }
            }
            BackendEvent::Ended => {
                let status = self.state.status();
                if status.is_looping && !matches!(control.machine, PlaybackState::Idle) {
                    debug!("stream ended, looping back to start");
                    self.state.set_position(0);
                    match self.backend.seek_to(0) {
                        Ok(()) => {
                            if let Err(e) = self.backend.play() {
                                warn!(error = %e, "loop restart play failed");
                            }
                            self.start_position_sampler(&mut control).await;
                        }
                        Err(e) => {
                            let kind = e.kind();
                            warn!(error = %e, "loop restart seek failed");
                            self.attempt_fallbacks(&mut control, kind).await;
                        }
                    }
                } else {
                    info!("stream ended");
                    control.machine = PlaybackState::Ended;
                    let held = control.focus.held();
                    control.focus.release();
                    self.state.set_loading(false);
                    if let Some(duration) = self.state.duration() {
                        self.state.set_position(duration);
                    }
                    self.state.update_status(|s| PlayerStatus {
                        is_playing: false,
                        is_buffering: false,
                        ..s
                    });
                    self.state.emit(PlayerEvent::StateChanged {
                        state: PlaybackState::Ended,
                        timestamp: Utc::now(),
                    });
                    if let Some(url) = status.current_url {
                        self.state.emit(PlayerEvent::TrackFinished {
                            url,
                            completed: true,
                            timestamp: Utc::now(),
                        });
                    }
                    if held {
                        self.state.emit(PlayerEvent::FocusChanged {
                            held: false,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
            BackendEvent::Failed { kind } => {
                self.attempt_fallbacks(&mut control, kind).await;
            }
        }
    }

    /// Reset observables and hand the request to the backend. Shared by
    /// fresh plays and silent fallback attempts.
    async fn begin_load(&self, control: &mut Control, request: &PlaybackRequest) -> Result<()> {
        if let Err(e) = self.backend.stop() {
            warn!(error = %e, "backend stop before load failed");
        }
        self.state.set_position(0);
        self.state.set_duration(None);
        self.state.set_buffer_percent(0);
        self.state.set_loading(true);
        let req = request.clone();
        self.state.update_status(move |s| PlayerStatus {
            current_url: Some(req.url),
            title: req.title,
            subtitle: req.subtitle,
            is_looping: req.looping,
            is_buffering: true,
            is_playing: false,
            was_playing_before_focus_loss: false,
            ..s.without_error()
        });
        control.machine = PlaybackState::Buffering;
        control.announced = false;
        self.state.emit(PlayerEvent::StateChanged {
            state: PlaybackState::Buffering,
            timestamp: Utc::now(),
        });
        self.start_buffer_sampler(control).await;
        self.start_position_sampler(control).await;
        self.backend.load(LoadRequest {
            url: request.url.clone(),
            start_ms: 0,
        })
    }

    /// Walk the fallback chain until a load starts or the budget runs
    /// out, then surface the last failure.
    async fn attempt_fallbacks(&self, control: &mut Control, kind: ErrorKind) {
        let mut kind = kind;
        loop {
            let fallback = control.retry.as_mut().and_then(|r| r.next_fallback());
            match fallback {
                Some(request) => {
                    warn!(kind = %kind, url = %request.url, "stream failed, trying backup");
                    match self.begin_load(control, &request).await {
                        Ok(()) => return,
                        Err(e) => {
                            kind = e.kind();
                        }
                    }
                }
                None => {
                    self.surface_failure(control, kind);
                    return;
                }
            }
        }
    }

    fn surface_failure(&self, control: &mut Control, kind: ErrorKind) {
        error!(kind = %kind, "playback failed, no fallback left");
        control.machine = PlaybackState::Idle;
        let held = control.focus.held();
        control.focus.release();
        self.state.set_loading(false);
        self.state.update_status(|s| PlayerStatus {
            is_playing: false,
            is_buffering: false,
            ..s.with_error(kind)
        });
        self.state.emit(PlayerEvent::PlaybackFailed {
            kind,
            message: kind.message().to_string(),
            timestamp: Utc::now(),
        });
        self.state.emit(PlayerEvent::StateChanged {
            state: PlaybackState::Idle,
            timestamp: Utc::now(),
        });
        if held {
            self.state.emit(PlayerEvent::FocusChanged {
                held: false,
                timestamp: Utc::now(),
            });
        }
    }

    async fn stop_locked(&self, control: &mut Control, completed: bool) {
        if let Err(e) = self.backend.stop() {
            warn!(error = %e, "backend stop failed");
        }
        let previous = self.state.status();
        let was_active = !matches!(control.machine, PlaybackState::Idle);
        control.machine = PlaybackState::Idle;
        let held = control.focus.held();
        control.focus.release();
        self.state.set_loading(false);
        self.state.update_status(|s| PlayerStatus {
            is_playing: false,
            is_buffering: false,
            ..s
        });
        if was_active {
            self.state.emit(PlayerEvent::StateChanged {
                state: PlaybackState::Idle,
                timestamp: Utc::now(),
            });
            if let Some(url) = previous.current_url {
                self.state.emit(PlayerEvent::TrackFinished {
                    url,
                    completed,
                    timestamp: Utc::now(),
                });
            }
        }
        if held {
            self.state.emit(PlayerEvent::FocusChanged {
                held: false,
                timestamp: Utc::now(),
            });
        }
    }

    /// Final leg of the sleep timer: stop playback, then restore the
    /// pre-fade volume so the next play starts audible. Called from the
    /// fade task, which never holds the control lock before this point.
    pub(crate) async fn finish_sleep_stop(&self) {
        let restore = self.pre_fade_volume.lock().await.take();
        let mut control = self.control.lock().await;
        self.stop_locked(&mut control, false).await;
        drop(control);
        if let Some(volume) = restore {
            self.backend.set_volume(volume);
            self.state
                .update_status(|s| PlayerStatus { volume, ..s });
        }
        self.state.update_status(|s| PlayerStatus {
            sleep_timer_armed: false,
            sleep_timer_minutes_remaining: 0,
            ..s
        });
        info!("sleep timer stop complete");
    }

    /// Interrupt the countdown or fade and restore state. Must not be
    /// called with the control lock held.
    pub(crate) async fn cancel_sleep_internal(&self) {
        let mut slot = self.sleep_slot.lock().await;
        slot.cancel().await;
        drop(slot);
        if let Some(volume) = self.pre_fade_volume.lock().await.take() {
            self.backend.set_volume(volume);
            self.state
                .update_status(|s| PlayerStatus { volume, ..s });
            self.state.emit(PlayerEvent::VolumeChanged {
                volume,
                timestamp: Utc::now(),
            });
        }
        self.state.update_status(|s| PlayerStatus {
            sleep_timer_armed: false,
            sleep_timer_minutes_remaining: 0,
            ..s
        });
    }

    async fn start_position_sampler(&self, control: &mut Control) {
        if control.position_sampler.is_running() {
            return;
        }
        let token = CancellationToken::new();
        let handle = monitor::spawn_position_sampler(
            self.state.clone(),
            self.backend.clone(),
            self.config.progress_interval(),
            token.clone(),
        );
        control.position_sampler.replace(token, handle).await;
    }

    async fn start_buffer_sampler(&self, control: &mut Control) {
        if control.buffer_sampler.is_running() {
            return;
        }
        let token = CancellationToken::new();
        let handle = monitor::spawn_buffer_sampler(
            self.state.clone(),
            self.backend.clone(),
            self.config.buffering_sample_interval(),
            token.clone(),
        );
        control.buffer_sampler.replace(token, handle).await;
    }
}
