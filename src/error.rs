//! Error types, one enum per subsystem boundary.
//!
//! Library modules return specific errors via `thiserror`; the binary
//! logs them at the edge. Nothing here ever crosses the audio callback —
//! engine failures inside the callback are demoted to a log and a counter.

use std::path::PathBuf;

/// Errors from the sampler engine and the audio device layer.
#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    /// No output device with a usable configuration could be found,
    /// after falling back from the configured device and the OS default.
    #[error("no suitable audio output device")]
    NoSuitableAudioDevice,

    /// The chosen output device exists but refused to open a stream.
    #[error("audio device busy: {0}")]
    AudioDeviceBusy(String),

    /// Decoding a sample file failed (missing, unreadable, bad format).
    #[error("failed to load sample {path}: {message}")]
    SampleLoadFailed { path: PathBuf, message: String },

    /// The output stream failed after it was opened.
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl SamplerError {
    pub fn load_failed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::SampleLoadFailed {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Validation failures in the data model.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("color component {0} out of range (0-127)")]
    ColorOutOfRange(u8),

    #[error("pad coordinate ({0}, {1}) outside the 8x8 grid")]
    CoordOutOfRange(u8, u8),

    #[error("volume {0} outside 0.0..=1.0")]
    VolumeOutOfRange(f32),

    #[error("launchpad must contain exactly 64 pads, got {0}")]
    WrongPadCount(usize),

    #[error("pad at position {0} reports linear index {1}")]
    PadIndexMismatch(usize, usize),
}

/// Precondition failures in the editor service. Callers surface these at
/// the UI boundary; no state changes when one is returned.
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum EditError {
    #[error("pad index {0} out of range")]
    IndexOutOfRange(usize),

    #[error("sample file not found: {0}")]
    SampleNotFound(PathBuf),

    #[error("pad {0} is not assigned")]
    PadNotAssigned(usize),

    #[error("pad {0} is already assigned")]
    PadAlreadyAssigned(usize),

    #[error("clipboard is empty")]
    ClipboardEmpty,

    #[error("invalid value: {0}")]
    InvalidValue(#[from] ValidationError),
}

/// Errors from set persistence.
#[derive(Debug, thiserror::Error)]
pub enum SetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed set file {path}: {message}")]
    Malformed { path: PathBuf, message: String },

    #[error("set not found: {0}")]
    NotFound(String),

    #[error("invalid set data: {0}")]
    Invalid(#[from] ValidationError),
}

/// Errors from the grid controller adapter. All of these are non-fatal to
/// the player; the hot-plug monitor keeps retrying.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("MIDI subsystem init failed: {0}")]
    Init(String),

    #[error("no MIDI port matches a known grid controller")]
    NoMatchingPort,

    #[error("failed to connect to {port}: {message}")]
    Connect { port: String, message: String },

    #[error("controller output unavailable")]
    OutputUnavailable,
}
