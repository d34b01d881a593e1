// Transport - Playback flags shared between control and clock threads
// Readable without taking the sequencer's playback lock

use std::sync::atomic::{AtomicBool, Ordering};

/// Transport state (stopped/playing)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped)
    }
}

/// Shared transport state
///
/// `playing` is only written while the playback lock is held, so readers see
/// either side of a transition, never half of it.
#[derive(Debug, Default)]
pub struct SharedTransportState {
    playing: AtomicBool,
    disposed: AtomicBool,
    /// Stop requested from inside a tick pass
    stop_requested: AtomicBool,
}

impl SharedTransportState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get current transport state
    pub fn state(&self) -> TransportState {
        if self.playing.load(Ordering::Acquire) {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub(crate) fn set_playing(&self, playing: bool) {
        self.playing.store(playing, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Mark as disposed, returns false if it already was
    pub(crate) fn mark_disposed(&self) -> bool {
        !self.disposed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Consume a pending stop request
    pub(crate) fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }
}
