//! The orchestrator builds every component around a single state
//! machine, wires the observer graph, and manages set mounting and the
//! app mode.
//!
//! Observer graph: editor -> player + LED mirror + auto-saver, controller
//! -> player, state machine -> player + LED mirror, orchestrator ->
//! `AppEvent` observers. UIs attach to the player's re-emission lists or
//! directly to the state machine; there is exactly one copy of the
//! playing/triggered state in the process.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::audio::engine::SamplerEngine;
use crate::controller::{ControllerEvent, ControllerObserver, GridController};
use crate::editor::{EditEvent, EditObserver, EditorService};
use crate::error::{SamplerError, SetError};
use crate::model::config::AppConfig;
use crate::model::{Color, Launchpad, PAD_COUNT, Set};
use crate::observer::ObserverManager;
use crate::player::Player;
use crate::set_manager::SetManager;
use crate::state_machine::{PlaybackEvent, PlaybackObserver, SamplerStateMachine};

pub const DEFAULT_SET_NAME: &str = "untitled";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Performance,
    Edit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    SetMounted(String),
    SetSaved(String),
    ModeChanged(AppMode),
    SetAutoCreated(String),
}

pub trait AppObserver: Send + Sync {
    fn on_app_event(&self, event: &AppEvent);
}

/// Identity of the mounted set; the grid itself lives in the shared
/// `Launchpad`.
#[derive(Debug, Clone)]
struct SetMeta {
    name: String,
    samples_root: Option<std::path::PathBuf>,
    created_at: DateTime<Utc>,
}

pub struct Orchestrator {
    config: AppConfig,
    state_machine: Arc<SamplerStateMachine>,
    launchpad: Arc<Mutex<Launchpad>>,
    editor: Arc<EditorService>,
    set_manager: SetManager,
    player: Player,
    led_mirror: Arc<LedMirror>,
    app_observers: ObserverManager<dyn AppObserver>,
    mode: Mutex<AppMode>,
    current: Arc<Mutex<Option<SetMeta>>>,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Self {
        let state_machine = Arc::new(SamplerStateMachine::new());
        let engine = Arc::new(SamplerEngine::new(state_machine.clone()));
        let launchpad = Arc::new(Mutex::new(Launchpad::new()));
        let controller = Arc::new(GridController::new(Duration::from_secs_f64(
            config.midi_poll_interval.max(0.1),
        )));
        let player = Player::new(engine, launchpad.clone(), controller.clone(), &config);
        let editor = Arc::new(EditorService::new(launchpad.clone()));
        let set_manager = SetManager::new(config.sets_dir.clone());
        let current: Arc<Mutex<Option<SetMeta>>> = Arc::new(Mutex::new(None));

        // Observer graph. The player core fulfils all three capabilities.
        editor.register_observer(player.core().clone());
        state_machine.register_observer(player.core().clone());
        controller.register_midi_observer(player.core().clone());

        let led_mirror = Arc::new(LedMirror::new(controller.clone(), launchpad.clone()));
        editor.register_observer(led_mirror.clone());
        state_machine.register_observer(led_mirror.clone());
        controller.register_controller_observer(led_mirror.clone());

        let app_observers: ObserverManager<dyn AppObserver> = ObserverManager::new();
        app_observers.register(led_mirror.clone());

        if config.auto_save {
            let auto_saver = Arc::new(AutoSaver {
                set_manager: set_manager.clone(),
                launchpad: launchpad.clone(),
                current: current.clone(),
            });
            editor.register_observer(auto_saver);
        }

        Self {
            config,
            state_machine,
            launchpad,
            editor,
            set_manager,
            player,
            led_mirror,
            app_observers,
            mode: Mutex::new(AppMode::Performance),
            current,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn editor(&self) -> &Arc<EditorService> {
        &self.editor
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut Player {
        &mut self.player
    }

    pub fn set_manager(&self) -> &SetManager {
        &self.set_manager
    }

    pub fn state_machine(&self) -> &Arc<SamplerStateMachine> {
        &self.state_machine
    }

    pub fn register_app_observer(&self, observer: Arc<dyn AppObserver>) {
        self.app_observers.register(observer);
    }

    pub fn mode(&self) -> AppMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: AppMode) {
        let changed = {
            let mut current = self.mode.lock();
            let changed = *current != mode;
            *current = mode;
            changed
        };
        if changed {
            self.emit(AppEvent::ModeChanged(mode));
        }
    }

    pub fn start(&mut self) -> Result<(), SamplerError> {
        self.player.start()
    }

    pub fn stop(&mut self) {
        self.player.stop();
        self.led_mirror.shutdown();
    }

    /// Replace the mounted grid. Engine states follow the new pads; the
    /// buffer cache makes remounting sets with overlapping samples cheap
    /// and glitch-free.
    pub fn mount_set(&self, set: Set) {
        {
            let mut launchpad = self.launchpad.lock();
            *launchpad = set.launchpad.clone();
        }
        let engine = self.player.engine();
        for index in 0..PAD_COUNT {
            let pad = set.launchpad[index].clone();
            if pad.is_assigned() {
                if let Err(e) = engine.load_sample(index, &pad) {
                    log::error!("[Orchestrator] pad {index}: {e}");
                }
            } else {
                engine.unload_sample(index);
            }
        }
        *self.current.lock() = Some(SetMeta {
            name: set.name.clone(),
            samples_root: set.samples_root.clone(),
            created_at: set.created_at,
        });
        log::info!("[Orchestrator] mounted set '{}'", set.name);
        self.emit(AppEvent::SetMounted(set.name));
    }

    /// Mount the configured last set, or fall back to a fresh default
    /// set when there is nothing usable on disk.
    pub fn mount_last_or_default(&self) {
        if let Some(name) = self.config.last_set.clone() {
            match self.set_manager.load_set(&name) {
                Ok(set) => {
                    self.mount_set(set);
                    return;
                }
                Err(e) => {
                    log::warn!("[Orchestrator] could not load last set '{name}': {e}");
                }
            }
        }

        let set = Set::new(DEFAULT_SET_NAME);
        if let Err(e) = self.set_manager.save_set(&set) {
            log::warn!("[Orchestrator] could not save auto-created set: {e}");
        }
        let name = set.name.clone();
        self.mount_set(set);
        self.emit(AppEvent::SetAutoCreated(name));
    }

    /// Snapshot of the mounted set, rebuilt from the live grid.
    pub fn current_set(&self) -> Option<Set> {
        let meta = self.current.lock().clone()?;
        Some(Set {
            name: meta.name,
            samples_root: meta.samples_root,
            created_at: meta.created_at,
            modified_at: Utc::now(),
            launchpad: self.launchpad.lock().clone(),
        })
    }

    pub fn save_current_set(&self) -> Result<(), SetError> {
        let Some(set) = self.current_set() else {
            return Err(SetError::NotFound("<no mounted set>".to_string()));
        };
        self.set_manager.save_set(&set)?;
        self.emit(AppEvent::SetSaved(set.name));
        Ok(())
    }

    fn emit(&self, event: AppEvent) {
        self.app_observers.notify(|o| o.on_app_event(&event));
    }
}

/// Saves the mounted set after every edit when `auto_save` is on.
/// Runs on the editing thread; set files are small.
struct AutoSaver {
    set_manager: SetManager,
    launchpad: Arc<Mutex<Launchpad>>,
    current: Arc<Mutex<Option<SetMeta>>>,
}

impl EditObserver for AutoSaver {
    fn on_edit_event(&self, _event: &EditEvent) {
        let Some(meta) = self.current.lock().clone() else {
            return;
        };
        let set = Set {
            name: meta.name,
            samples_root: meta.samples_root,
            created_at: meta.created_at,
            modified_at: Utc::now(),
            launchpad: self.launchpad.lock().clone(),
        };
        if let Err(e) = self.set_manager.save_set(&set) {
            log::error!("[AutoSaver] save failed: {e}");
        }
    }
}

/// Mirrors pad state onto the controller LEDs: playing pads pulse,
/// stopped pads fall back to their static color, unassigned pads are
/// dark. Commands are executed by a dedicated worker thread so that
/// playback events coming from the audio callback never perform MIDI IO.
pub struct LedMirror {
    tx: Mutex<Option<Sender<LedCommand>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug)]
enum LedCommand {
    Pulse(usize),
    Restore(usize),
    Refresh(Vec<usize>),
    FullRefresh,
}

impl LedMirror {
    pub fn new(controller: Arc<GridController>, launchpad: Arc<Mutex<Launchpad>>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("led-mirror".into())
            .spawn(move || led_worker(rx, controller, launchpad))
            .expect("spawn LED worker");
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn submit(&self, command: LedCommand) {
        if let Some(tx) = self.tx.lock().as_ref() {
            let _ = tx.send(command);
        }
    }

    /// Stop the worker thread. Idempotent.
    pub fn shutdown(&self) {
        self.tx.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LedMirror {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PlaybackObserver for LedMirror {
    fn on_playback_event(&self, event: PlaybackEvent, pad_index: usize) {
        match event {
            PlaybackEvent::PadPlaying => self.submit(LedCommand::Pulse(pad_index)),
            PlaybackEvent::PadStopped | PlaybackEvent::PadFinished => {
                self.submit(LedCommand::Restore(pad_index));
            }
            PlaybackEvent::PadTriggered => {}
        }
    }
}

impl EditObserver for LedMirror {
    fn on_edit_event(&self, event: &EditEvent) {
        self.submit(LedCommand::Refresh(event.indices.clone()));
    }
}

impl ControllerObserver for LedMirror {
    fn on_controller_event(&self, event: &ControllerEvent) {
        if matches!(event, ControllerEvent::Connected(_)) {
            self.submit(LedCommand::FullRefresh);
        }
    }
}

impl AppObserver for LedMirror {
    fn on_app_event(&self, event: &AppEvent) {
        if matches!(event, AppEvent::SetMounted(_)) {
            self.submit(LedCommand::FullRefresh);
        }
    }
}

fn led_worker(
    rx: Receiver<LedCommand>,
    controller: Arc<GridController>,
    launchpad: Arc<Mutex<Launchpad>>,
) {
    while let Ok(command) = rx.recv() {
        let result = match command {
            LedCommand::Pulse(index) => {
                let palette = {
                    let launchpad = launchpad.lock();
                    launchpad
                        .pad(index)
                        .filter(|p| p.is_assigned())
                        .map(|p| p.color.palette_index())
                };
                match palette {
                    Some(palette) => controller.set_pad_pulsing(index, palette),
                    None => Ok(()),
                }
            }
            LedCommand::Restore(index) => {
                let color = pad_display_color(&launchpad.lock(), index);
                controller.set_pad_color(index, color)
            }
            LedCommand::Refresh(indices) => {
                let entries: Vec<(usize, Color)> = {
                    let launchpad = launchpad.lock();
                    indices
                        .iter()
                        .map(|&i| (i, pad_display_color(&launchpad, i)))
                        .collect()
                };
                if entries.len() > 4 {
                    controller.set_leds_bulk(&entries)
                } else {
                    entries
                        .iter()
                        .try_for_each(|&(i, color)| controller.set_pad_color(i, color))
                }
            }
            LedCommand::FullRefresh => {
                let entries: Vec<(usize, Color)> = {
                    let launchpad = launchpad.lock();
                    (0..PAD_COUNT)
                        .map(|i| (i, pad_display_color(&launchpad, i)))
                        .collect()
                };
                controller.set_leds_bulk(&entries)
            }
        };
        if let Err(e) = result {
            // Expected while no controller is attached.
            log::debug!("[LedMirror] LED update skipped: {e}");
        }
    }
}

fn pad_display_color(launchpad: &Launchpad, index: usize) -> Color {
    launchpad
        .pad(index)
        .filter(|p| p.is_assigned())
        .map(|p| p.color)
        .unwrap_or(Color::OFF)
}
