//! Observable player state
//!
//! `SharedState` is the single home for everything external observers can
//! watch: the status snapshot, playhead position, track duration, the
//! loading flag and buffer fill. Each observable is a `tokio::sync::watch`
//! channel so UIs get the latest value on subscribe plus change
//! notifications, while the `EventBus` carries the discrete event stream.

use lull_common::{EventBus, PlayerEvent, PlayerStatus};
use tokio::sync::watch;

pub struct SharedState {
    status_tx: watch::Sender<PlayerStatus>,
    position_tx: watch::Sender<u64>,
    duration_tx: watch::Sender<Option<u64>>,
    loading_tx: watch::Sender<bool>,
    buffer_percent_tx: watch::Sender<u8>,
    events: EventBus,
}

impl SharedState {
    pub fn new(event_capacity: usize) -> Self {
        let (status_tx, _) = watch::channel(PlayerStatus::default());
        let (position_tx, _) = watch::channel(0);
        let (duration_tx, _) = watch::channel(None);
        let (loading_tx, _) = watch::channel(false);
        let (buffer_percent_tx, _) = watch::channel(0);
        Self {
            status_tx,
            position_tx,
            duration_tx,
            loading_tx,
            buffer_percent_tx,
            events: EventBus::new(event_capacity),
        }
    }

    /// Current status snapshot.
    pub fn status(&self) -> PlayerStatus {
        self.status_tx.borrow().clone()
    }

    /// Replace the status snapshot with a value derived from the current
    /// one. All mutation goes through here so observers never see a
    /// half-applied update.
    pub fn update_status<F>(&self, f: F) -> PlayerStatus
    where
        F: FnOnce(PlayerStatus) -> PlayerStatus,
    {
        let next = f(self.status());
        self.status_tx.send_replace(next.clone());
        next
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PlayerStatus> {
        self.status_tx.subscribe()
    }

    pub fn position(&self) -> u64 {
        *self.position_tx.borrow()
    }

    pub fn set_position(&self, position_ms: u64) {
        self.position_tx.send_replace(position_ms);
    }

    pub fn subscribe_position(&self) -> watch::Receiver<u64> {
        self.position_tx.subscribe()
    }

    pub fn duration(&self) -> Option<u64> {
        *self.duration_tx.borrow()
    }

    pub fn set_duration(&self, duration_ms: Option<u64>) {
        self.duration_tx.send_replace(duration_ms);
    }

    pub fn subscribe_duration(&self) -> watch::Receiver<Option<u64>> {
        self.duration_tx.subscribe()
    }

    pub fn loading(&self) -> bool {
        *self.loading_tx.borrow()
    }

    pub fn set_loading(&self, loading: bool) {
        self.loading_tx.send_replace(loading);
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    pub fn buffer_percent(&self) -> u8 {
        *self.buffer_percent_tx.borrow()
    }

    pub fn set_buffer_percent(&self, percent: u8) {
        self.buffer_percent_tx.send_replace(percent.min(100));
    }

    pub fn subscribe_buffer_percent(&self) -> watch::Receiver<u8> {
        self.buffer_percent_tx.subscribe()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Emit an event, tolerating the no-subscriber case.
    pub fn emit(&self, event: PlayerEvent) {
        self.events.emit_lossy(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_updates_are_functional() {
        let state = SharedState::new(16);
        state.update_status(|s| PlayerStatus {
            is_playing: true,
            volume: 0.5,
            ..s
        });
        let status = state.status();
        assert!(status.is_playing);
        assert_eq!(status.volume, 0.5);
        assert!(!status.is_looping);
    }

    #[tokio::test]
    async fn watchers_observe_position_changes() {
        let state = SharedState::new(16);
        let mut rx = state.subscribe_position();
        state.set_position(1500);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1500);
    }

    #[test]
    fn buffer_percent_is_clamped() {
        let state = SharedState::new(16);
        state.set_buffer_percent(250);
        assert_eq!(state.buffer_percent(), 100);
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let state = SharedState::new(16);
        let mut rx = state.events().subscribe();
        state.emit(PlayerEvent::SleepTimerExpired {
            timestamp: chrono::Utc::now(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "SleepTimerExpired");
    }
}
