//! Grid controller support: the Launchpad wire protocol and the midir
//! adapter with hot-plug monitoring.

pub mod adapter;
pub mod protocol;

pub use adapter::GridController;

/// A logical event parsed from controller MIDI input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    NoteOn { pad_index: usize },
    NoteOff { pad_index: usize },
    ControlChange { control: u8, value: u8 },
}

pub trait MidiObserver: Send + Sync {
    fn on_midi_event(&self, event: MidiEvent);
}

/// Hot-plug transitions, carrying the port name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerEvent {
    Connected(String),
    Disconnected(String),
}

pub trait ControllerObserver: Send + Sync {
    fn on_controller_event(&self, event: &ControllerEvent);
}
