//! midir-backed controller adapter: opens the matching input/output
//! ports, parses incoming messages on the MIDI receive thread, drives
//! LEDs over SysEx, and re-detects the device when it is unplugged or
//! plugged back in.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use parking_lot::Mutex;

use crate::controller::protocol::{self, PadInput};
use crate::controller::{ControllerEvent, ControllerObserver, MidiEvent, MidiObserver};
use crate::error::ControllerError;
use crate::model::Color;
use crate::observer::ObserverManager;

const CLIENT_NAME: &str = "Launchsampler";

struct ActiveConnection {
    port_name: String,
    _input: MidiInputConnection<()>,
    output: Option<MidiOutputConnection>,
}

struct ControllerInner {
    midi_observers: ObserverManager<dyn MidiObserver>,
    controller_observers: ObserverManager<dyn ControllerObserver>,
    connection: Mutex<Option<ActiveConnection>>,
}

impl ControllerInner {
    /// Parse and fan out one raw message. Runs on the MIDI receive
    /// thread; observers must defer anything heavy.
    fn handle_raw_message(&self, data: &[u8]) {
        let Some(input) = protocol::parse_message(data) else {
            return;
        };
        let event = match input {
            PadInput::Press(pad_index) => MidiEvent::NoteOn { pad_index },
            PadInput::Release(pad_index) => MidiEvent::NoteOff { pad_index },
            PadInput::Control(control, value) => MidiEvent::ControlChange { control, value },
        };
        self.midi_observers.notify(|o| o.on_midi_event(event));
    }

    fn connect(self: &Arc<Self>, port_name: &str) -> Result<(), ControllerError> {
        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| ControllerError::Init(e.to_string()))?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| midi_in.port_name(p).as_deref() == Ok(port_name))
            .ok_or_else(|| ControllerError::Connect {
                port: port_name.to_string(),
                message: "port disappeared".to_string(),
            })?;

        // Weak reference: the connection's closure must not keep the
        // adapter alive.
        let weak = Arc::downgrade(self);
        let input = midi_in
            .connect(
                &port,
                CLIENT_NAME,
                move |_timestamp, data, _| {
                    if let Some(inner) = weak.upgrade() {
                        inner.handle_raw_message(data);
                    }
                },
                (),
            )
            .map_err(|e| ControllerError::Connect {
                port: port_name.to_string(),
                message: e.to_string(),
            })?;

        let mut output = open_output(port_name);
        if let Some(out) = output.as_mut() {
            // Programmer mode must be entered before LED control sticks.
            if let Err(e) = out.send(&protocol::programmer_mode(true)) {
                log::warn!("[GridController] failed to enter programmer mode: {e}");
            }
        } else {
            log::warn!("[GridController] no output port for {port_name}, LEDs unavailable");
        }

        *self.connection.lock() = Some(ActiveConnection {
            port_name: port_name.to_string(),
            _input: input,
            output,
        });
        log::info!("[GridController] connected to {port_name}");
        self.controller_observers
            .notify(|o| o.on_controller_event(&ControllerEvent::Connected(port_name.to_string())));
        Ok(())
    }

    /// Drop the connection. Best-effort mode restore when the device is
    /// still reachable.
    fn disconnect(&self, restore_mode: bool) {
        let Some(mut conn) = self.connection.lock().take() else {
            return;
        };
        if restore_mode {
            if let Some(out) = conn.output.as_mut() {
                let _ = out.send(&protocol::programmer_mode(false));
            }
        }
        log::info!("[GridController] disconnected from {}", conn.port_name);
        let event = ControllerEvent::Disconnected(conn.port_name.clone());
        drop(conn);
        self.controller_observers
            .notify(|o| o.on_controller_event(&event));
    }

    fn connected_port(&self) -> Option<String> {
        self.connection.lock().as_ref().map(|c| c.port_name.clone())
    }

    /// One hot-plug scan: reconnect if the device appeared, tear down if
    /// it vanished.
    fn poll_ports(self: &Arc<Self>) {
        let available = list_input_ports();
        match self.connected_port() {
            Some(name) if !available.contains(&name) => {
                // Device unplugged; mode restore cannot reach it.
                self.disconnect(false);
            }
            Some(_) => {}
            None => {
                if let Some(index) = protocol::match_port(&available) {
                    if let Err(e) = self.connect(&available[index]) {
                        log::warn!("[GridController] connect failed: {e}");
                    }
                }
            }
        }
    }
}

fn list_input_ports() -> Vec<String> {
    let Ok(midi_in) = MidiInput::new(&format!("{CLIENT_NAME} probe")) else {
        return Vec::new();
    };
    midi_in
        .ports()
        .iter()
        .filter_map(|p| midi_in.port_name(p).ok())
        .collect()
}

/// Open the output side of the controller, matched by port name first
/// and by device hint as a fallback.
fn open_output(input_port_name: &str) -> Option<MidiOutputConnection> {
    let midi_out = MidiOutput::new(CLIENT_NAME).ok()?;
    let ports = midi_out.ports();
    let names: Vec<String> = ports
        .iter()
        .filter_map(|p| midi_out.port_name(p).ok())
        .collect();
    let index = names
        .iter()
        .position(|n| n == input_port_name)
        .or_else(|| protocol::match_port(&names))?;
    midi_out.connect(&ports[index], CLIENT_NAME).ok()
}

/// The controller adapter. All methods take `&self`; the stream of
/// parsed [`MidiEvent`]s reaches registered observers on the MIDI
/// receive thread.
pub struct GridController {
    inner: Arc<ControllerInner>,
    running: Arc<AtomicBool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl GridController {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                midi_observers: ObserverManager::new(),
                controller_observers: ObserverManager::new(),
                connection: Mutex::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(None),
            poll_interval,
        }
    }

    pub fn register_midi_observer(&self, observer: Arc<dyn MidiObserver>) {
        self.inner.midi_observers.register(observer);
    }

    pub fn register_controller_observer(&self, observer: Arc<dyn ControllerObserver>) {
        self.inner.controller_observers.register(observer);
    }

    /// Attempt an initial connection and start the hot-plug monitor.
    /// A missing controller is not an error; the monitor keeps looking.
    pub fn start(&self) {
        self.inner.poll_ports();
        if self.inner.connected_port().is_none() {
            log::info!("[GridController] no controller attached, watching for hot-plug");
        }

        self.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        let running = self.running.clone();
        let interval = self.poll_interval;
        let handle = std::thread::Builder::new()
            .name("midi-hotplug".into())
            .spawn(move || {
                while running.load(Ordering::SeqCst) {
                    sleep_interruptible(interval, &running);
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    inner.poll_ports();
                }
            })
            .expect("spawn hot-plug monitor");
        *self.monitor.lock() = Some(handle);
    }

    /// Stop the monitor and restore the device mode.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.join();
        }
        self.inner.disconnect(true);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected_port().is_some()
    }

    pub fn connected_port(&self) -> Option<String> {
        self.inner.connected_port()
    }

    pub fn set_pad_color(&self, index: usize, color: Color) -> Result<(), ControllerError> {
        let message = protocol::led_rgb(index, color).ok_or(ControllerError::OutputUnavailable)?;
        self.send(&message)
    }

    pub fn set_pad_palette(&self, index: usize, palette: u8) -> Result<(), ControllerError> {
        let message =
            protocol::led_palette(index, palette).ok_or(ControllerError::OutputUnavailable)?;
        self.send(&message)
    }

    pub fn set_pad_pulsing(&self, index: usize, palette: u8) -> Result<(), ControllerError> {
        let message =
            protocol::led_pulse(index, palette).ok_or(ControllerError::OutputUnavailable)?;
        self.send(&message)
    }

    /// One SysEx for the whole batch; required form for updates covering
    /// more than a handful of pads.
    pub fn set_leds_bulk(&self, entries: &[(usize, Color)]) -> Result<(), ControllerError> {
        self.send(&protocol::led_bulk(entries))
    }

    pub fn clear_all(&self) -> Result<(), ControllerError> {
        self.send(&protocol::clear_all())
    }

    fn send(&self, message: &[u8]) -> Result<(), ControllerError> {
        let mut guard = self.inner.connection.lock();
        let conn = guard.as_mut().ok_or(ControllerError::OutputUnavailable)?;
        let output = conn
            .output
            .as_mut()
            .ok_or(ControllerError::OutputUnavailable)?;
        output.send(message).map_err(|e| ControllerError::Connect {
            port: conn.port_name.clone(),
            message: e.to_string(),
        })
    }
}

impl Drop for GridController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sleep `total` in short slices so `stop()` is not held up by a long
/// poll interval.
fn sleep_interruptible(total: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + total;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(100)));
    }
}
