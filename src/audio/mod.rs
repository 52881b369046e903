//! Real-time sample playback: decoded buffers, per-pad cursors, the
//! block mixer, the cpal output stream, and the sampler engine that ties
//! them together under the audio callback.

pub mod buffer;
pub mod device;
pub mod engine;
pub mod loader;
pub mod mixer;
pub mod playback;

pub use buffer::AudioBuffer;
pub use device::AudioOutput;
pub use engine::SamplerEngine;
pub use playback::PlaybackState;
