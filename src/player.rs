//! The player wires controller input and editor changes into the
//! sampler engine, and re-emits events for UI adapters.
//!
//! [`PlayerCore`] carries the observer capabilities (edit, MIDI,
//! playback) and is shared as an `Arc` across the emitting threads.
//! [`Player`] owns the non-shareable pieces — the cpal stream and the
//! controller lifecycle — on the thread that constructed it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::device::AudioOutput;
use crate::audio::engine::SamplerEngine;
use crate::controller::{GridController, MidiEvent, MidiObserver};
use crate::editor::{EditEvent, EditEventKind, EditObserver};
use crate::error::SamplerError;
use crate::model::config::AppConfig;
use crate::model::{Launchpad, Pad};
use crate::observer::ObserverManager;
use crate::state_machine::{PlaybackEvent, PlaybackObserver, SamplerStateMachine};

pub struct PlayerCore {
    engine: Arc<SamplerEngine>,
    state_machine: Arc<SamplerStateMachine>,
    launchpad: Arc<Mutex<Launchpad>>,
    /// Playback re-emission for UIs that only know the player.
    state_observers: ObserverManager<dyn PlaybackObserver>,
    /// MIDI re-emission, delivered even for unassigned pads.
    midi_observers: ObserverManager<dyn MidiObserver>,
    panic_control: u8,
    panic_value: u8,
}

impl PlayerCore {
    pub fn engine(&self) -> &Arc<SamplerEngine> {
        &self.engine
    }

    pub fn state_machine(&self) -> &Arc<SamplerStateMachine> {
        &self.state_machine
    }

    pub fn register_state_observer(&self, observer: Arc<dyn PlaybackObserver>) {
        self.state_observers.register(observer);
    }

    pub fn register_midi_observer(&self, observer: Arc<dyn MidiObserver>) {
        self.midi_observers.register(observer);
    }

    /// Keep the engine's pad state in step with one edited pad.
    fn sync_pad(&self, pad_index: usize, pad: &Pad) {
        if pad.is_assigned() {
            if let Err(e) = self.engine.load_sample(pad_index, pad) {
                // The pad stays assigned in the model; triggers become
                // no-ops until a working sample is assigned.
                log::error!("[Player] pad {pad_index}: {e}");
            }
        } else {
            self.engine.unload_sample(pad_index);
        }
    }
}

impl EditObserver for PlayerCore {
    fn on_edit_event(&self, event: &EditEvent) {
        match event.kind {
            EditEventKind::PadAssigned | EditEventKind::PadModeChanged => {
                if let (Some(&index), Some(pad)) = (event.indices.first(), event.pads.first()) {
                    self.sync_pad(index, pad);
                }
            }
            EditEventKind::PadMoved => {
                for (&index, pad) in event.indices.iter().zip(event.pads.iter()) {
                    self.sync_pad(index, pad);
                }
            }
            EditEventKind::PadDuplicated => {
                // The destination is the last index; the event carries
                // only the destination pad.
                if let (Some(&index), Some(pad)) = (event.indices.last(), event.pads.first()) {
                    self.sync_pad(index, pad);
                }
            }
            EditEventKind::PadCleared | EditEventKind::PadsCleared => {
                for &index in &event.indices {
                    self.engine.unload_sample(index);
                }
            }
            EditEventKind::PadVolumeChanged => {
                if let (Some(&index), Some(pad)) = (event.indices.first(), event.pads.first()) {
                    self.engine.update_pad_volume(index, pad.volume);
                }
            }
            EditEventKind::PadNameChanged => {}
        }
    }
}

impl MidiObserver for PlayerCore {
    fn on_midi_event(&self, event: MidiEvent) {
        match event {
            MidiEvent::NoteOn { pad_index } => {
                let assigned = self
                    .launchpad
                    .lock()
                    .pad(pad_index)
                    .map(|p| p.is_assigned())
                    .unwrap_or(false);
                if assigned {
                    self.engine.trigger_pad(pad_index);
                }
            }
            MidiEvent::NoteOff { pad_index } => {
                self.engine.release_pad(pad_index);
            }
            MidiEvent::ControlChange { control, value } => {
                if control == self.panic_control && value == self.panic_value {
                    log::info!("[Player] panic CC received, stopping all pads");
                    self.engine.stop_all();
                }
            }
        }
        // Re-emit downstream even for unassigned pads, so UIs can
        // still indicate the press.
        self.midi_observers.notify(|o| o.on_midi_event(event));
    }
}

impl PlaybackObserver for PlayerCore {
    fn on_playback_event(&self, event: PlaybackEvent, pad_index: usize) {
        self.state_observers
            .notify(|o| o.on_playback_event(event, pad_index));
    }
}

pub struct Player {
    core: Arc<PlayerCore>,
    controller: Arc<GridController>,
    audio: Option<AudioOutput>,
    audio_device: Option<String>,
    buffer_size: u32,
}

impl Player {
    pub fn new(
        engine: Arc<SamplerEngine>,
        launchpad: Arc<Mutex<Launchpad>>,
        controller: Arc<GridController>,
        config: &AppConfig,
    ) -> Self {
        let state_machine = engine.state_machine().clone();
        let core = Arc::new(PlayerCore {
            engine,
            state_machine,
            launchpad,
            state_observers: ObserverManager::new(),
            midi_observers: ObserverManager::new(),
            panic_control: config.panic_button_cc_control,
            panic_value: config.panic_button_cc_value,
        });
        Self {
            core,
            controller,
            audio: None,
            audio_device: config.default_audio_device.clone(),
            buffer_size: config.default_buffer_size,
        }
    }

    pub fn core(&self) -> &Arc<PlayerCore> {
        &self.core
    }

    pub fn controller(&self) -> &Arc<GridController> {
        &self.controller
    }

    pub fn engine(&self) -> &Arc<SamplerEngine> {
        self.core.engine()
    }

    pub fn is_midi_connected(&self) -> bool {
        self.controller.is_connected()
    }

    pub fn is_audio_running(&self) -> bool {
        self.audio.as_ref().map(|a| a.is_running()).unwrap_or(false)
    }

    /// Open the audio device and start the engine callback, then try the
    /// controller. A missing controller is non-fatal; a missing audio
    /// device fails the whole start.
    pub fn start(&mut self) -> Result<(), SamplerError> {
        let mut audio = AudioOutput::open(self.audio_device.as_deref(), 2, self.buffer_size)?;
        self.core.engine.set_sample_rate(audio.sample_rate());

        let engine = self.core.engine.clone();
        audio.start(move |data, channels| engine.process_block(data, channels))?;
        self.audio = Some(audio);

        self.controller.start();
        Ok(())
    }

    /// Reverse of `start`: controller first, then the audio stream.
    pub fn stop(&mut self) {
        self.controller.stop();
        if let Some(mut audio) = self.audio.take() {
            audio.stop();
        }
        self.core.engine.stop_all();
    }
}
