//! Launchsampler — a grid-controller sample player.
//!
//! An 8x8 grid of pads, each bound to an audio file and a playback mode,
//! mixed in real time from a lock-free audio callback. A Novation
//! Launchpad (or programmatic triggers) starts and stops pads; pad state
//! is mirrored back onto the controller's LEDs.

pub mod audio;
pub mod controller;
pub mod editor;
pub mod error;
pub mod model;
pub mod observer;
pub mod orchestrator;
pub mod player;
pub mod set_manager;
pub mod state_machine;

pub use orchestrator::Orchestrator;
