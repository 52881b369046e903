//! Playback state machine — the single source of truth for which pads
//! are triggered or playing.
//!
//! The engine calls `notify_*` from the audio callback; UI adapters query
//! `is_playing` from their own threads. Set mutation happens under the
//! internal lock, which is released before observers are notified, so an
//! observer may query this machine from inside its handler.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::observer::ObserverManager;

/// Playback lifecycle events, fanned out to [`PlaybackObserver`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    PadTriggered,
    PadPlaying,
    PadStopped,
    PadFinished,
}

pub trait PlaybackObserver: Send + Sync {
    fn on_playback_event(&self, event: PlaybackEvent, pad_index: usize);
}

#[derive(Default)]
struct PadSets {
    triggered: HashSet<usize>,
    playing: HashSet<usize>,
}

pub struct SamplerStateMachine {
    sets: Mutex<PadSets>,
    observers: ObserverManager<dyn PlaybackObserver>,
}

impl SamplerStateMachine {
    pub fn new() -> Self {
        Self {
            sets: Mutex::new(PadSets::default()),
            observers: ObserverManager::new(),
        }
    }

    pub fn register_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        self.observers.register(observer);
    }

    pub fn unregister_observer(&self, observer: &Arc<dyn PlaybackObserver>) {
        self.observers.unregister(observer);
    }

    /// A trigger was accepted for the pad.
    pub fn notify_triggered(&self, pad_index: usize) {
        {
            let mut sets = self.sets.lock();
            sets.triggered.insert(pad_index);
        }
        self.observers
            .notify(|o| o.on_playback_event(PlaybackEvent::PadTriggered, pad_index));
    }

    /// The pad started producing audio. Moves it from `triggered` to
    /// `playing` atomically with respect to observers: no observer can
    /// see the pad in both sets.
    pub fn notify_playing(&self, pad_index: usize) {
        {
            let mut sets = self.sets.lock();
            sets.triggered.remove(&pad_index);
            sets.playing.insert(pad_index);
        }
        self.observers
            .notify(|o| o.on_playback_event(PlaybackEvent::PadPlaying, pad_index));
    }

    /// The pad was stopped explicitly (release, stop, toggle-off).
    /// Suppressed when the pad was not playing.
    pub fn notify_stopped(&self, pad_index: usize) {
        let was_playing = {
            let mut sets = self.sets.lock();
            sets.triggered.remove(&pad_index);
            sets.playing.remove(&pad_index)
        };
        if was_playing {
            self.observers
                .notify(|o| o.on_playback_event(PlaybackEvent::PadStopped, pad_index));
        }
    }

    /// The pad reached the end of its buffer naturally. Suppressed when
    /// the pad was not playing.
    pub fn notify_finished(&self, pad_index: usize) {
        let was_playing = {
            let mut sets = self.sets.lock();
            sets.playing.remove(&pad_index)
        };
        if was_playing {
            self.observers
                .notify(|o| o.on_playback_event(PlaybackEvent::PadFinished, pad_index));
        }
    }

    pub fn is_triggered(&self, pad_index: usize) -> bool {
        self.sets.lock().triggered.contains(&pad_index)
    }

    pub fn is_playing(&self, pad_index: usize) -> bool {
        self.sets.lock().playing.contains(&pad_index)
    }

    /// Currently playing pad indices, unordered.
    pub fn playing_pads(&self) -> Vec<usize> {
        self.sets.lock().playing.iter().copied().collect()
    }

    pub fn playing_count(&self) -> usize {
        self.sets.lock().playing.len()
    }
}

impl Default for SamplerStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
