//! Sleep timer countdown and fade-out
//!
//! The countdown task ticks once per configured interval (one minute by
//! default), publishing the remaining time after each tick. At zero it
//! ramps the volume down in linear steps, then stops playback and
//! restores the pre-fade volume so the next play starts audible. The
//! task never holds the engine control lock across a sleep, so arming,
//! cancelling or stopping mid-fade interrupts it within one step.

use crate::playback::engine::PlayerInner;
use chrono::Utc;
use lull_common::{fade, PlayerEvent, PlayerStatus};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub(crate) fn spawn_countdown(
    inner: Arc<PlayerInner>,
    minutes: u32,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut remaining = minutes;
        debug!(minutes, "sleep timer armed");
        while remaining > 0 {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(inner.config.sleep_tick()) => {
                    remaining -= 1;
                    inner.state.update_status(|s| PlayerStatus {
                        sleep_timer_minutes_remaining: remaining,
                        ..s
                    });
                    inner.state.emit(PlayerEvent::SleepTimerTick {
                        minutes_remaining: remaining,
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        info!("sleep timer expired, fading out");
        inner.state.emit(PlayerEvent::SleepTimerExpired {
            timestamp: Utc::now(),
        });

        let start = inner.backend.volume();
        *inner.pre_fade_volume.lock().await = Some(start);

        for step in fade::linear_ramp(start, 0.0, inner.config.fade_steps) {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(inner.config.fade_step()) => {}
            }
            inner.backend.set_volume(step);
            inner.state.update_status(|s| PlayerStatus { volume: step, ..s });
            inner.state.emit(PlayerEvent::VolumeChanged {
                volume: step,
                timestamp: Utc::now(),
            });
        }

        if token.is_cancelled() {
            return;
        }
        inner.finish_sleep_stop().await;
    })
}
