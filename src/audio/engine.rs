//! The sampler engine: per-pad playback states, the lock-free trigger
//! queue, the buffer cache, and the audio-callback block processing.
//!
//! Threading contract: `process_block` runs on the audio thread and
//! takes no lock except a `try_lock` on the pad states (contended only
//! while a load/unload or `stop_all` is in flight, in which case the
//! block is silence) and the state machine's short internal lock inside
//! `notify_*`. Everything else is atomics and a bounded channel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::audio::buffer::AudioBuffer;
use crate::audio::loader;
use crate::audio::mixer;
use crate::audio::playback::{PlaybackState, TriggerAction};
use crate::error::SamplerError;
use crate::model::{PAD_COUNT, Pad, PlaybackMode};
use crate::state_machine::SamplerStateMachine;

/// Trigger queue capacity. Producers never block; the queue drops on
/// full and counts the drop.
pub const TRIGGER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerCommand {
    Trigger(usize),
    Release(usize),
    Stop(usize),
}

pub struct SamplerEngine {
    /// Pad states, indexed by linear pad index. The mutex is the load
    /// lock: held briefly by load/unload/stop_all on the UI thread, and
    /// try-locked per block by the audio thread.
    pads: Mutex<Vec<Option<PlaybackState>>>,
    /// Decoded buffers keyed by canonical path.
    cache: Mutex<HashMap<PathBuf, Arc<AudioBuffer>>>,
    trigger_tx: Sender<TriggerCommand>,
    trigger_rx: Receiver<TriggerCommand>,
    dropped_triggers: AtomicU64,
    /// f32 bits; linear gain applied before the soft clip.
    master_volume: AtomicU32,
    /// Device rate samples are resampled to at load time.
    sample_rate: AtomicU32,
    state_machine: Arc<SamplerStateMachine>,
}

impl SamplerEngine {
    pub fn new(state_machine: Arc<SamplerStateMachine>) -> Self {
        let (trigger_tx, trigger_rx) = crossbeam_channel::bounded(TRIGGER_QUEUE_CAPACITY);
        Self {
            pads: Mutex::new((0..PAD_COUNT).map(|_| None).collect()),
            cache: Mutex::new(HashMap::new()),
            trigger_tx,
            trigger_rx,
            dropped_triggers: AtomicU64::new(0),
            master_volume: AtomicU32::new(1.0_f32.to_bits()),
            sample_rate: AtomicU32::new(44100),
            state_machine,
        }
    }

    pub fn state_machine(&self) -> &Arc<SamplerStateMachine> {
        &self.state_machine
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Set the device rate. Cached buffers were resampled for the old
    /// rate, so a rate change invalidates the cache.
    pub fn set_sample_rate(&self, rate: u32) {
        let old = self.sample_rate.swap(rate, Ordering::Relaxed);
        if old != rate {
            let dropped = self.cache.lock().drain().count();
            if dropped > 0 {
                log::info!(
                    "[SamplerEngine] sample rate changed {old} -> {rate}, cleared {dropped} cached buffers"
                );
            }
        }
    }

    pub fn master_volume(&self) -> f32 {
        f32::from_bits(self.master_volume.load(Ordering::Relaxed))
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.master_volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    /// Decode (or reuse from cache) the pad's sample and install a fresh
    /// playback state for it.
    pub fn load_sample(&self, pad_index: usize, pad: &Pad) -> Result<(), SamplerError> {
        let Some(sample) = &pad.sample else {
            self.unload_sample(pad_index);
            return Ok(());
        };
        let buffer = self.cached_buffer(&sample.path)?;
        let state = PlaybackState::new(buffer, pad.mode, pad.volume);

        let mut pads = self.pads.lock();
        if let Some(slot) = pads.get_mut(pad_index) {
            let was_playing = slot.as_ref().map(|s| s.is_playing()).unwrap_or(false);
            *slot = Some(state);
            drop(pads);
            if was_playing {
                self.state_machine.notify_stopped(pad_index);
            }
        }
        Ok(())
    }

    /// Remove the pad's playback state. Emits a stop if it was playing.
    pub fn unload_sample(&self, pad_index: usize) {
        let mut pads = self.pads.lock();
        let was_playing = pads
            .get_mut(pad_index)
            .and_then(|slot| slot.take())
            .map(|s| s.is_playing())
            .unwrap_or(false);
        drop(pads);
        if was_playing {
            self.state_machine.notify_stopped(pad_index);
        }
    }

    pub fn update_pad_volume(&self, pad_index: usize, volume: f32) {
        let mut pads = self.pads.lock();
        if let Some(Some(state)) = pads.get_mut(pad_index) {
            state.set_volume(volume);
        }
    }

    pub fn update_pad_mode(&self, pad_index: usize, mode: PlaybackMode) {
        let mut pads = self.pads.lock();
        if let Some(Some(state)) = pads.get_mut(pad_index) {
            state.set_mode(mode);
        }
    }

    pub fn is_loaded(&self, pad_index: usize) -> bool {
        self.pads
            .lock()
            .get(pad_index)
            .map(|slot| slot.is_some())
            .unwrap_or(false)
    }

    /// Enqueue a trigger; applied at the next audio block.
    pub fn trigger_pad(&self, pad_index: usize) {
        self.enqueue(TriggerCommand::Trigger(pad_index));
    }

    /// Enqueue a release; applied at the next audio block.
    pub fn release_pad(&self, pad_index: usize) {
        self.enqueue(TriggerCommand::Release(pad_index));
    }

    /// Enqueue a stop; applied at the next audio block.
    pub fn stop_pad(&self, pad_index: usize) {
        self.enqueue(TriggerCommand::Stop(pad_index));
    }

    fn enqueue(&self, command: TriggerCommand) {
        match self.trigger_tx.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_triggers.fetch_add(1, Ordering::Relaxed);
                log::debug!("[SamplerEngine] trigger queue full, dropped {command:?}");
            }
        }
    }

    /// Messages dropped because the trigger queue was full.
    pub fn dropped_triggers(&self) -> u64 {
        self.dropped_triggers.load(Ordering::Relaxed)
    }

    /// Stop every playing pad synchronously. Holds the pad lock for the
    /// whole flip so the audio thread sees either all voices playing or
    /// none; the contended block renders silence.
    pub fn stop_all(&self) {
        let mut stopped: Vec<usize> = Vec::new();
        {
            let mut pads = self.pads.lock();
            for (i, slot) in pads.iter_mut().enumerate() {
                if let Some(state) = slot {
                    if state.stop() {
                        stopped.push(i);
                    }
                }
            }
        }
        for pad_index in stopped {
            self.state_machine.notify_stopped(pad_index);
        }
    }

    /// Number of currently playing voices.
    pub fn active_voices(&self) -> usize {
        self.pads
            .lock()
            .iter()
            .flatten()
            .filter(|s| s.is_playing())
            .count()
    }

    /// Drop cached buffers no playback state references anymore.
    pub fn clear_cache(&self) {
        self.cache
            .lock()
            .retain(|_, buffer| Arc::strong_count(buffer) > 1);
    }

    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    fn cached_buffer(&self, path: &Path) -> Result<Arc<AudioBuffer>, SamplerError> {
        let canonical = std::fs::canonicalize(path)
            .map_err(|e| SamplerError::load_failed(path, format!("file missing: {e}")))?;
        if let Some(buffer) = self.cache.lock().get(&canonical) {
            return Ok(buffer.clone());
        }
        // Decode outside the cache lock; loads are UI-thread and rare.
        let buffer = loader::load_sample_file(&canonical, self.sample_rate()).map(Arc::new)?;
        self.cache
            .lock()
            .entry(canonical)
            .or_insert(buffer.clone());
        Ok(buffer)
    }

    /// One audio block: drain triggers, mix, detect completions, apply
    /// master gain and soft clip. Runs on the audio thread.
    pub fn process_block(&self, out: &mut [f32], out_channels: usize) {
        let Some(mut pads) = self.pads.try_lock() else {
            out.fill(0.0);
            return;
        };

        let mut was_playing = [false; PAD_COUNT];
        for (i, slot) in pads.iter().enumerate() {
            if let Some(state) = slot {
                was_playing[i] = state.is_playing();
            }
        }

        // Drain fully, bounded by the queue capacity.
        let mut explicitly_stopped = [false; PAD_COUNT];
        for _ in 0..TRIGGER_QUEUE_CAPACITY {
            let Ok(command) = self.trigger_rx.try_recv() else {
                break;
            };
            match command {
                TriggerCommand::Trigger(i) => {
                    if let Some(Some(state)) = pads.get_mut(i) {
                        match state.trigger() {
                            TriggerAction::Started => {
                                self.state_machine.notify_triggered(i);
                                self.state_machine.notify_playing(i);
                            }
                            TriggerAction::ToggledOff => {
                                explicitly_stopped[i] = true;
                                self.state_machine.notify_stopped(i);
                            }
                        }
                    }
                }
                TriggerCommand::Release(i) => {
                    if let Some(Some(state)) = pads.get_mut(i) {
                        if state.release() {
                            explicitly_stopped[i] = true;
                            self.state_machine.notify_stopped(i);
                        }
                    }
                }
                TriggerCommand::Stop(i) => {
                    if let Some(Some(state)) = pads.get_mut(i) {
                        if state.stop() {
                            explicitly_stopped[i] = true;
                            self.state_machine.notify_stopped(i);
                        }
                    }
                }
            }
        }

        mixer::mix_active(&mut pads[..], out, out_channels);

        // Natural completion: was playing, not stopped above, no longer
        // playing after the mix advanced it off the end.
        for i in 0..PAD_COUNT {
            if was_playing[i] && !explicitly_stopped[i] {
                let still_playing = pads[i].as_ref().map(|s| s.is_playing()).unwrap_or(false);
                if !still_playing {
                    self.state_machine.notify_finished(i);
                }
            }
        }
        drop(pads);

        let master = self.master_volume();
        for sample in out.iter_mut() {
            *sample = (*sample * master).tanh();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Sample;
    use crate::state_machine::{PlaybackEvent, PlaybackObserver};
    use parking_lot::Mutex as PlMutex;

    struct Recorder {
        events: PlMutex<Vec<(PlaybackEvent, usize)>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: PlMutex::new(Vec::new()),
            })
        }

        fn take(&self) -> Vec<(PlaybackEvent, usize)> {
            std::mem::take(&mut *self.events.lock())
        }
    }

    impl PlaybackObserver for Recorder {
        fn on_playback_event(&self, event: PlaybackEvent, pad_index: usize) {
            self.events.lock().push((event, pad_index));
        }
    }

    fn engine_with_recorder() -> (SamplerEngine, Arc<Recorder>) {
        let state_machine = Arc::new(SamplerStateMachine::new());
        let recorder = Recorder::new();
        state_machine.register_observer(recorder.clone());
        (SamplerEngine::new(state_machine), recorder)
    }

    /// Install a playback state directly, bypassing file IO.
    fn install(engine: &SamplerEngine, pad_index: usize, frames: usize, mode: PlaybackMode) {
        let samples: Vec<f32> = (0..frames).map(|_| 0.5).collect();
        let buffer = AudioBuffer::from_interleaved(samples, 1, 44100).shared();
        engine.pads.lock()[pad_index] = Some(PlaybackState::new(buffer, mode, 1.0));
    }

    fn run_block(engine: &SamplerEngine, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames * 2];
        engine.process_block(&mut out, 2);
        out
    }

    fn is_silent(block: &[f32]) -> bool {
        block.iter().all(|&s| s == 0.0)
    }

    #[test]
    fn test_one_shot_trigger_plays_and_finishes() {
        // A 4410-frame one-shot at 441-frame blocks: ten audible blocks,
        // then one finished event and silence.
        let (engine, recorder) = engine_with_recorder();
        install(&engine, 0, 4410, PlaybackMode::OneShot);

        engine.trigger_pad(0);
        let first = run_block(&engine, 441);
        assert!(!is_silent(&first));
        assert_eq!(
            recorder.take(),
            vec![
                (PlaybackEvent::PadTriggered, 0),
                (PlaybackEvent::PadPlaying, 0),
            ]
        );

        for _ in 1..10 {
            assert!(!is_silent(&run_block(&engine, 441)));
        }
        assert!(recorder.take().is_empty());

        // Block 11: the voice completed on block 10's boundary.
        let tail = run_block(&engine, 441);
        assert!(is_silent(&tail));
        assert_eq!(recorder.take(), vec![(PlaybackEvent::PadFinished, 0)]);
        assert_eq!(engine.active_voices(), 0);

        // Finished fires once and only once.
        run_block(&engine, 441);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_loop_wraps_until_release() {
        let (engine, recorder) = engine_with_recorder();
        install(&engine, 5, 2205, PlaybackMode::Loop);

        engine.trigger_pad(5);
        for _ in 0..20 {
            assert!(!is_silent(&run_block(&engine, 441)));
        }
        recorder.take();

        engine.release_pad(5);
        let after = run_block(&engine, 441);
        assert!(is_silent(&after));
        assert_eq!(recorder.take(), vec![(PlaybackEvent::PadStopped, 5)]);
        assert_eq!(engine.active_voices(), 0);
    }

    #[test]
    fn test_loop_toggle_second_trigger_stops() {
        let (engine, recorder) = engine_with_recorder();
        install(&engine, 12, 2205, PlaybackMode::LoopToggle);

        engine.trigger_pad(12);
        run_block(&engine, 441);
        assert_eq!(
            recorder.take(),
            vec![
                (PlaybackEvent::PadTriggered, 12),
                (PlaybackEvent::PadPlaying, 12),
            ]
        );

        // Release between the two triggers is a no-op for toggle mode.
        engine.release_pad(12);
        assert!(!is_silent(&run_block(&engine, 441)));
        assert!(recorder.take().is_empty());

        engine.trigger_pad(12);
        let after = run_block(&engine, 441);
        assert!(is_silent(&after));
        assert_eq!(recorder.take(), vec![(PlaybackEvent::PadStopped, 12)]);
        // No finished event on the following block.
        run_block(&engine, 441);
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_stop_all_stops_everything_without_finished() {
        let (engine, recorder) = engine_with_recorder();
        for i in [0, 3, 7, 20, 63] {
            install(&engine, i, 4410, PlaybackMode::Loop);
            engine.trigger_pad(i);
        }
        run_block(&engine, 441);
        recorder.take();

        engine.stop_all();
        assert_eq!(engine.active_voices(), 0);

        let events = recorder.take();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|(e, _)| *e == PlaybackEvent::PadStopped));

        // Next block is silent and emits nothing further.
        assert!(is_silent(&run_block(&engine, 441)));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_trigger_on_unloaded_pad_is_noop() {
        let (engine, recorder) = engine_with_recorder();
        engine.trigger_pad(9);
        assert!(is_silent(&run_block(&engine, 64)));
        assert!(recorder.take().is_empty());
    }

    #[test]
    fn test_queue_overflow_counts_drops() {
        let (engine, _recorder) = engine_with_recorder();
        install(&engine, 0, 64, PlaybackMode::OneShot);

        let burst = TRIGGER_QUEUE_CAPACITY + 17;
        for _ in 0..burst {
            engine.trigger_pad(0);
        }
        assert_eq!(engine.dropped_triggers(), 17);

        // The first CAPACITY triggers are all observed by the drain.
        run_block(&engine, 64);
        assert_eq!(engine.dropped_triggers(), 17);
    }

    #[test]
    fn test_master_volume_and_soft_clip_bound_output() {
        let (engine, _recorder) = engine_with_recorder();
        // Eight loud loops summed well past 1.0.
        for i in 0..8 {
            let buffer = AudioBuffer::from_interleaved(vec![1.0; 512], 1, 44100).shared();
            engine.pads.lock()[i] = Some(PlaybackState::new(buffer, PlaybackMode::Loop, 1.0));
            engine.trigger_pad(i);
        }
        let out = run_block(&engine, 128);
        assert!(!is_silent(&out));
        assert!(out.iter().all(|s| s.abs() <= 1.0));

        // Halving the master halves the pre-clip signal.
        engine.set_master_volume(0.5);
        let softer = run_block(&engine, 128);
        assert!(softer[0] < out[0]);
    }

    #[test]
    fn test_update_pad_volume_scales_next_block() {
        let (engine, _recorder) = engine_with_recorder();
        install(&engine, 0, 44100, PlaybackMode::Loop);
        engine.trigger_pad(0);

        let loud = run_block(&engine, 441);
        assert!((loud[0] - 0.5_f32.tanh()).abs() < 1e-6);

        engine.update_pad_volume(0, 0.5);
        let soft = run_block(&engine, 441);
        assert!((soft[0] - 0.25_f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_unload_playing_pad_emits_stop() {
        let (engine, recorder) = engine_with_recorder();
        install(&engine, 2, 4410, PlaybackMode::Loop);
        engine.trigger_pad(2);
        run_block(&engine, 441);
        recorder.take();

        engine.unload_sample(2);
        assert_eq!(recorder.take(), vec![(PlaybackEvent::PadStopped, 2)]);
        assert!(!engine.is_loaded(2));
    }

    #[test]
    fn test_load_failure_for_missing_file() {
        let (engine, _recorder) = engine_with_recorder();
        let mut pad = Pad::new(0, 0).unwrap();
        pad.sample = Some(Sample::new("/nonexistent/sample.wav"));
        let result = engine.load_sample(0, &pad);
        assert!(matches!(
            result,
            Err(SamplerError::SampleLoadFailed { .. })
        ));
        assert!(!engine.is_loaded(0));
    }

    #[test]
    fn test_clear_cache_keeps_referenced_buffers() {
        let (engine, _recorder) = engine_with_recorder();
        let referenced = AudioBuffer::from_interleaved(vec![0.0; 16], 1, 44100).shared();
        engine
            .cache
            .lock()
            .insert(PathBuf::from("/a.wav"), referenced.clone());
        engine
            .cache
            .lock()
            .insert(PathBuf::from("/b.wav"), AudioBuffer::from_interleaved(vec![0.0; 16], 1, 44100).shared());

        engine.clear_cache();
        assert_eq!(engine.cache_len(), 1);
        drop(referenced);
        engine.clear_cache();
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_triggers_within_one_block_apply_in_order() {
        let (engine, recorder) = engine_with_recorder();
        install(&engine, 1, 512, PlaybackMode::LoopToggle);

        // Two triggers in the same block: start, then toggle off.
        engine.trigger_pad(1);
        engine.trigger_pad(1);
        let out = run_block(&engine, 64);
        assert!(is_silent(&out));
        assert_eq!(
            recorder.take(),
            vec![
                (PlaybackEvent::PadTriggered, 1),
                (PlaybackEvent::PadPlaying, 1),
                (PlaybackEvent::PadStopped, 1),
            ]
        );
    }
}
