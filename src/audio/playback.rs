//! Per-pad playback state and the cursor semantics for each mode.
//!
//! Once installed in the engine, a `PlaybackState` is owned by the audio
//! thread; UI-thread mutations (load, volume, mode) go through the
//! engine's pad lock.

use std::sync::Arc;

use crate::audio::buffer::AudioBuffer;
use crate::model::PlaybackMode;

/// What a trigger did, so the caller can emit the right events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// The voice (re)started from frame zero.
    Started,
    /// A `LoopToggle` pad was playing; the second trigger switched it off.
    ToggledOff,
}

#[derive(Debug, Clone)]
pub struct PlaybackState {
    buffer: Arc<AudioBuffer>,
    mode: PlaybackMode,
    volume: f32,
    position: f64,
    is_playing: bool,
    toggle_latch: bool,
}

impl PlaybackState {
    pub fn new(buffer: Arc<AudioBuffer>, mode: PlaybackMode, volume: f32) -> Self {
        Self {
            buffer,
            mode,
            volume,
            position: 0.0,
            is_playing: false,
            toggle_latch: false,
        }
    }

    pub fn buffer(&self) -> &Arc<AudioBuffer> {
        &self.buffer
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Change the mode. Resets the toggle latch so a `LoopToggle` pad
    /// starts from a known phase.
    pub fn set_mode(&mut self, mode: PlaybackMode) {
        self.mode = mode;
        self.toggle_latch = false;
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn toggle_latch(&self) -> bool {
        self.toggle_latch
    }

    /// Apply a trigger. For `LoopToggle`, the latch makes the second
    /// trigger stop the voice; every other mode restarts from zero.
    pub fn trigger(&mut self) -> TriggerAction {
        if self.mode == PlaybackMode::LoopToggle && self.is_playing && self.toggle_latch {
            self.is_playing = false;
            self.toggle_latch = false;
            TriggerAction::ToggledOff
        } else {
            self.position = 0.0;
            self.is_playing = true;
            self.toggle_latch = self.mode == PlaybackMode::LoopToggle;
            TriggerAction::Started
        }
    }

    /// Apply a release. Only `Loop` and `Hold` are note-sensitive;
    /// returns whether the voice stopped.
    pub fn release(&mut self) -> bool {
        match self.mode {
            PlaybackMode::Loop | PlaybackMode::Hold if self.is_playing => {
                self.is_playing = false;
                true
            }
            _ => false,
        }
    }

    /// Stop unconditionally; returns whether the voice was playing.
    pub fn stop(&mut self) -> bool {
        let was_playing = self.is_playing;
        self.is_playing = false;
        self.toggle_latch = false;
        was_playing
    }

    /// Emit up to `out.len() / out_channels` frames into `out`, summing
    /// at this state's volume, and advance the cursor. Reading IS
    /// advancing; looping modes wrap, the others run off the end and
    /// clear `is_playing`.
    pub fn mix_into(&mut self, out: &mut [f32], out_channels: usize) {
        if !self.is_playing || out_channels == 0 {
            return;
        }
        let total_frames = self.buffer.num_frames();
        if total_frames == 0 {
            self.is_playing = false;
            return;
        }
        let looping = matches!(self.mode, PlaybackMode::Loop | PlaybackMode::LoopToggle);
        let frames = out.len() / out_channels;

        for frame_idx in 0..frames {
            if self.position >= total_frames as f64 {
                if looping {
                    self.position -= total_frames as f64;
                } else {
                    // The tail ended on an earlier frame of this block
                    // (or exactly on the previous block boundary, in
                    // which case this read is what discovers it, so the
                    // finished event lands on the block after the tail).
                    self.is_playing = false;
                    self.toggle_latch = false;
                    return;
                }
            }
            let src = self.buffer.frame(self.position as usize);
            let dst = &mut out[frame_idx * out_channels..(frame_idx + 1) * out_channels];
            add_frame(src, dst, self.volume);
            self.position += 1.0;
        }

        if looping && self.position >= total_frames as f64 {
            self.position -= total_frames as f64;
        }
    }
}

/// Channel mapping: mono broadcasts to every output channel; a buffer
/// with more channels than the output folds down with averaging; fewer
/// channels copy one-to-one with the remainder left silent.
#[inline]
fn add_frame(src: &[f32], dst: &mut [f32], gain: f32) {
    let src_channels = src.len();
    let dst_channels = dst.len();

    if src_channels == 1 {
        let sample = src[0] * gain;
        for out in dst.iter_mut() {
            *out += sample;
        }
    } else if src_channels <= dst_channels {
        for (out, sample) in dst.iter_mut().zip(src.iter()) {
            *out += sample * gain;
        }
    } else {
        for (channel, sample) in src.iter().enumerate() {
            let target = channel % dst_channels;
            // Channels folding onto `target`: every dst_channels-th one.
            let fold_count = (src_channels - target).div_ceil(dst_channels);
            dst[target] += sample * gain / fold_count as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioBuffer;

    fn mono_ramp(frames: usize) -> Arc<AudioBuffer> {
        let samples: Vec<f32> = (0..frames).map(|i| (i + 1) as f32).collect();
        AudioBuffer::from_interleaved(samples, 1, 44100).shared()
    }

    fn render(state: &mut PlaybackState, frames: usize, channels: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * channels];
        state.mix_into(&mut out, channels);
        out
    }

    #[test]
    fn test_one_shot_emits_tail_and_stops() {
        let mut state = PlaybackState::new(mono_ramp(3), PlaybackMode::OneShot, 1.0);
        state.trigger();

        let out = render(&mut state, 5, 1);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 0.0, 0.0]);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_one_shot_exact_boundary_finishes_on_next_read() {
        let mut state = PlaybackState::new(mono_ramp(4), PlaybackMode::OneShot, 1.0);
        state.trigger();
        let out = render(&mut state, 4, 1);
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
        // The tail filled the block exactly; the next read discovers the
        // end, so completion is reported one block after the audio.
        assert!(state.is_playing());
        let next = render(&mut state, 4, 1);
        assert_eq!(next, vec![0.0; 4]);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_loop_wraps_and_keeps_playing() {
        let mut state = PlaybackState::new(mono_ramp(2), PlaybackMode::Loop, 1.0);
        state.trigger();
        let out = render(&mut state, 5, 1);
        assert_eq!(out, vec![1.0, 2.0, 1.0, 2.0, 1.0]);
        assert!(state.is_playing());
        // Invariant: position stays inside the buffer while playing.
        assert!(state.position() < 2.0);
    }

    #[test]
    fn test_loop_stops_on_release() {
        let mut state = PlaybackState::new(mono_ramp(2), PlaybackMode::Loop, 1.0);
        state.trigger();
        assert!(state.release());
        assert!(!state.is_playing());
        // Release again is a no-op.
        assert!(!state.release());
    }

    #[test]
    fn test_hold_stops_on_release_and_natural_end() {
        let mut state = PlaybackState::new(mono_ramp(3), PlaybackMode::Hold, 1.0);
        state.trigger();
        assert!(state.release());

        state.trigger();
        render(&mut state, 8, 1);
        assert!(!state.is_playing());
    }

    #[test]
    fn test_one_shot_ignores_release() {
        let mut state = PlaybackState::new(mono_ramp(8), PlaybackMode::OneShot, 1.0);
        state.trigger();
        assert!(!state.release());
        assert!(!state.release());
        assert!(state.is_playing());
    }

    #[test]
    fn test_loop_toggle_second_trigger_stops() {
        let mut state = PlaybackState::new(mono_ramp(4), PlaybackMode::LoopToggle, 1.0);
        assert_eq!(state.trigger(), TriggerAction::Started);
        assert!(state.is_playing());

        // Release is ignored in toggle mode.
        assert!(!state.release());
        assert!(state.is_playing());

        assert_eq!(state.trigger(), TriggerAction::ToggledOff);
        assert!(!state.is_playing());
        assert!(!state.toggle_latch());
    }

    #[test]
    fn test_volume_applied_as_linear_gain() {
        let mut state = PlaybackState::new(mono_ramp(2), PlaybackMode::OneShot, 0.5);
        state.trigger();
        let out = render(&mut state, 2, 1);
        assert_eq!(out, vec![0.5, 1.0]);
    }

    #[test]
    fn test_mono_broadcast_to_stereo() {
        let mut state = PlaybackState::new(mono_ramp(2), PlaybackMode::OneShot, 1.0);
        state.trigger();
        let out = render(&mut state, 2, 2);
        assert_eq!(out, vec![1.0, 1.0, 2.0, 2.0]);
    }

    #[test]
    fn test_stereo_to_stereo_keeps_channels() {
        let buffer = AudioBuffer::from_interleaved(vec![0.1, 0.2, 0.3, 0.4], 2, 44100).shared();
        let mut state = PlaybackState::new(buffer, PlaybackMode::OneShot, 1.0);
        state.trigger();
        let out = render(&mut state, 2, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn test_quad_folds_to_stereo_by_averaging() {
        // One frame of four channels onto stereo: L = avg(c0, c2), R = avg(c1, c3).
        let buffer = AudioBuffer::from_interleaved(vec![0.2, 0.4, 0.6, 0.8], 4, 44100).shared();
        let mut state = PlaybackState::new(buffer, PlaybackMode::OneShot, 1.0);
        state.trigger();
        let out = render(&mut state, 1, 2);
        assert!((out[0] - 0.4).abs() < 1e-6);
        assert!((out[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_stereo_padded_on_four_channel_output() {
        let buffer = AudioBuffer::from_interleaved(vec![0.5, 0.25], 2, 44100).shared();
        let mut state = PlaybackState::new(buffer, PlaybackMode::OneShot, 1.0);
        state.trigger();
        let out = render(&mut state, 1, 4);
        assert_eq!(out, vec![0.5, 0.25, 0.0, 0.0]);
    }

    #[test]
    fn test_retrigger_resets_position() {
        let mut state = PlaybackState::new(mono_ramp(10), PlaybackMode::OneShot, 1.0);
        state.trigger();
        render(&mut state, 4, 1);
        assert_eq!(state.position(), 4.0);

        state.trigger();
        assert_eq!(state.position(), 0.0);
        assert!(state.is_playing());
    }

    #[test]
    fn test_set_mode_resets_toggle_latch() {
        let mut state = PlaybackState::new(mono_ramp(4), PlaybackMode::LoopToggle, 1.0);
        state.trigger();
        assert!(state.toggle_latch());
        state.set_mode(PlaybackMode::Loop);
        assert!(!state.toggle_latch());
    }
}
