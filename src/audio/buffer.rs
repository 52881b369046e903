//! Immutable decoded audio, shared by reference between the cache and
//! the per-pad playback states.

use std::sync::Arc;

/// Decoded audio: interleaved f32 frames at a known rate. Immutable once
/// constructed, so an `Arc<AudioBuffer>` is freely shared without locks.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    num_channels: usize,
    num_frames: usize,
}

impl AudioBuffer {
    /// Build from interleaved samples. A trailing partial frame is
    /// dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, num_channels: usize, sample_rate: u32) -> Self {
        let num_channels = num_channels.max(1);
        let num_frames = samples.len() / num_channels;
        samples.truncate(num_frames * num_channels);
        Self {
            samples,
            sample_rate,
            num_channels,
            num_frames,
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn num_channels(&self) -> usize {
        self.num_channels
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.num_frames as f64 / self.sample_rate as f64
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// One interleaved frame. `index` must be `< num_frames`.
    #[inline]
    pub fn frame(&self, index: usize) -> &[f32] {
        let start = index * self.num_channels;
        &self.samples[start..start + self.num_channels]
    }
}
