//! Block mixer: sums every active playback state into an interleaved
//! output block. The mixer owns the cursor advance so that "read =
//! advance" stays atomic on the audio thread.

use crate::audio::playback::PlaybackState;

/// Zero `out`, then sum each playing state's next block into it.
/// Returns the number of states that contributed.
pub fn mix_active(
    states: &mut [Option<PlaybackState>],
    out: &mut [f32],
    out_channels: usize,
) -> usize {
    out.fill(0.0);
    let mut active = 0;
    for state in states.iter_mut().flatten() {
        if state.is_playing() {
            state.mix_into(out, out_channels);
            active += 1;
        }
    }
    active
}
