//! Audio focus sharing
//!
//! The engine cooperates with other audio producers on the host through a
//! [`FocusCoordinator`]. Focus is requested before playback starts and
//! abandoned on stop or unrecoverable failure; external focus changes are
//! delivered to the engine as [`FocusChange`] values.

use std::sync::Arc;
use tracing::{debug, warn};

/// External focus change delivered by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Another producer took focus for good. Playback pauses and focus is
    /// not re-requested automatically.
    PermanentLoss,
    /// Focus lost briefly (notification, call). Playback pauses but the
    /// logical focus claim is kept.
    TransientLoss,
    /// Focus lost briefly, but quiet playback may continue.
    TransientLossCanDuck,
    /// Focus returned after a transient loss.
    Regain,
}

/// Host-side arbiter for the shared audio output.
///
/// Implementations bridge to whatever focus facility the platform has. A
/// denied request is non-fatal: playback still starts, but the engine
/// records that it does not hold focus.
pub trait FocusCoordinator: Send + Sync + 'static {
    /// Claim focus. Returns true when granted.
    fn request_focus(&self) -> bool;

    /// Give up a previously granted claim.
    fn abandon_focus(&self);
}

/// Coordinator for hosts without a focus concept: every request succeeds
/// and abandon is a no-op.
#[derive(Debug, Default)]
pub struct AlwaysGranted;

impl FocusCoordinator for AlwaysGranted {
    fn request_focus(&self) -> bool {
        true
    }

    fn abandon_focus(&self) {}
}

/// Tracks whether we currently hold focus and keeps request/abandon
/// balanced against the coordinator.
pub struct FocusGate {
    coordinator: Arc<dyn FocusCoordinator>,
    held: bool,
}

impl FocusGate {
    pub fn new(coordinator: Arc<dyn FocusCoordinator>) -> Self {
        Self {
            coordinator,
            held: false,
        }
    }

    /// Request focus if not already held. Returns whether focus is held
    /// afterwards.
    pub fn acquire(&mut self) -> bool {
        if self.held {
            return true;
        }
        self.held = self.coordinator.request_focus();
        if self.held {
            debug!("audio focus granted");
        } else {
            warn!("audio focus denied");
        }
        self.held
    }

    /// Abandon focus if held.
    pub fn release(&mut self) {
        if self.held {
            self.coordinator.abandon_focus();
            self.held = false;
            debug!("audio focus released");
        }
    }

    /// Drop the claim without notifying the coordinator. Used when the
    /// host reports a permanent loss: the coordinator already reassigned
    /// focus, so abandoning would be redundant.
    pub fn mark_lost(&mut self) {
        self.held = false;
    }

    pub fn held(&self) -> bool {
        self.held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct CountingCoordinator {
        requests: AtomicU32,
        abandons: AtomicU32,
        deny: bool,
    }

    impl FocusCoordinator for CountingCoordinator {
        fn request_focus(&self) -> bool {
            self.requests.fetch_add(1, Ordering::SeqCst);
            !self.deny
        }

        fn abandon_focus(&self) {
            self.abandons.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn acquire_is_idempotent_while_held() {
        let coordinator = Arc::new(CountingCoordinator::default());
        let mut gate = FocusGate::new(coordinator.clone());
        assert!(gate.acquire());
        assert!(gate.acquire());
        assert_eq!(coordinator.requests.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_only_abandons_when_held() {
        let coordinator = Arc::new(CountingCoordinator::default());
        let mut gate = FocusGate::new(coordinator.clone());
        gate.release();
        assert_eq!(coordinator.abandons.load(Ordering::SeqCst), 0);
        gate.acquire();
        gate.release();
        gate.release();
        assert_eq!(coordinator.abandons.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn denied_focus_leaves_gate_unheld() {
        let coordinator = Arc::new(CountingCoordinator {
            deny: true,
            ..Default::default()
        });
        let mut gate = FocusGate::new(coordinator);
        assert!(!gate.acquire());
        assert!(!gate.held());
    }

    #[test]
    fn mark_lost_skips_coordinator() {
        let coordinator = Arc::new(CountingCoordinator::default());
        let mut gate = FocusGate::new(coordinator.clone());
        gate.acquire();
        gate.mark_lost();
        assert!(!gate.held());
        assert_eq!(coordinator.abandons.load(Ordering::SeqCst), 0);
    }
}
