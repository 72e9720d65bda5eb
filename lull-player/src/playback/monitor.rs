//! Background monitoring tasks
//!
//! `TaskSlot` is the replacement discipline for every long-lived task the
//! engine owns: a slot holds at most one task, and installing a
//! replacement first cancels and awaits the old one so two generations
//! never overlap. The samplers in this module publish playhead position
//! and buffer fill; both park themselves when there is nothing to report.

use crate::playback::backend::AudioBackend;
use crate::state::SharedState;
use chrono::Utc;
use lull_common::PlayerEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Holder for at most one cancellable background task.
#[derive(Default)]
pub struct TaskSlot {
    inner: Option<(CancellationToken, JoinHandle<()>)>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel and await the current occupant, then install `handle`.
    pub async fn replace(&mut self, token: CancellationToken, handle: JoinHandle<()>) {
        self.cancel().await;
        self.inner = Some((token, handle));
    }

    /// Cancel and await the current occupant, if any. Awaiting the join
    /// handle guarantees the old task has fully unwound before the caller
    /// continues.
    pub async fn cancel(&mut self) {
        if let Some((token, handle)) = self.inner.take() {
            token.cancel();
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .as_ref()
            .map(|(_, handle)| !handle.is_finished())
            .unwrap_or(false)
    }
}

/// Publish the playhead position periodically while the stream is playing
/// or loading. Terminates on its own once neither holds.
pub(crate) fn spawn_position_sampler(
    state: Arc<SharedState>,
    backend: Arc<dyn AudioBackend>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let status = state.status();
                    if !status.is_playing && !status.is_buffering {
                        debug!("position sampler parking, playback inactive");
                        break;
                    }
                    let position_ms = backend.position_ms();
                    let duration_ms = backend.duration_ms();
                    state.set_position(position_ms);
                    state.set_duration(duration_ms);
                    state.emit(PlayerEvent::Progress {
                        position_ms,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
    })
}

/// Sample buffer fill while a stream is loading or rebuffering.
/// Terminates once the buffering flag clears.
pub(crate) fn spawn_buffer_sampler(
    state: Arc<SharedState>,
    backend: Arc<dyn AudioBackend>,
    period: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if !state.status().is_buffering {
                        debug!("buffer sampler parking, not buffering");
                        break;
                    }
                    let percent = backend.buffered_percent();
                    if percent != state.buffer_percent() {
                        state.set_buffer_percent(percent);
                        state.emit(PlayerEvent::BufferingProgress {
                            percent,
                            timestamp: Utc::now(),
                        });
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn slot_cancels_previous_task_on_replace() {
        let mut slot = TaskSlot::new();
        let first_done = Arc::new(AtomicBool::new(false));

        let token = CancellationToken::new();
        let done = first_done.clone();
        let watch = token.clone();
        let handle = tokio::spawn(async move {
            watch.cancelled().await;
            done.store(true, Ordering::SeqCst);
        });
        slot.replace(token, handle).await;
        assert!(slot.is_running());

        let token2 = CancellationToken::new();
        let watch2 = token2.clone();
        let handle2 = tokio::spawn(async move {
            watch2.cancelled().await;
        });
        slot.replace(token2, handle2).await;

        // replace awaited the first task, so its flag is already set
        assert!(first_done.load(Ordering::SeqCst));

        slot.cancel().await;
        assert!(!slot.is_running());
    }

    #[tokio::test]
    async fn cancel_on_empty_slot_is_a_no_op() {
        let mut slot = TaskSlot::new();
        slot.cancel().await;
        assert!(!slot.is_running());
    }
}
