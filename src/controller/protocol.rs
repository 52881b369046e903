//! Launchpad wire protocol: port matching, note <-> pad mapping, input
//! byte parsing, and the programmer-mode SysEx builders for LED control.
//!
//! Grid notes follow the programmer-mode layout: `note = 10*(row+1) +
//! (col+1)` with row 0 at the bottom of the device, so the bottom-left
//! pad is note 11 and the top-right is note 88.

use crate::model::{Color, PAD_COUNT};

/// Port-name substrings identifying a supported grid controller.
pub const DEVICE_NAME_HINTS: &[&str] = &["Launchpad", "LPProMK3", "LPMiniMK3"];

const STATUS_NOTE_OFF: u8 = 0x80;
const STATUS_NOTE_ON: u8 = 0x90;
const STATUS_CONTROL_CHANGE: u8 = 0xB0;

/// SysEx prefix: Novation manufacturer id + Launchpad device id.
const SYSEX_HEADER: [u8; 6] = [0xF0, 0x00, 0x20, 0x29, 0x02, 0x0D];
const SYSEX_END: u8 = 0xF7;
const OP_PROGRAMMER_MODE: u8 = 0x0E;
const OP_LED_LIGHTING: u8 = 0x03;
const LIGHT_STATIC_PALETTE: u8 = 0x00;
const LIGHT_PULSE_PALETTE: u8 = 0x02;
const LIGHT_STATIC_RGB: u8 = 0x03;

/// Pick the controller port from a port-name list. When several match,
/// the one containing "MIDI 1" wins, otherwise the first match.
pub fn match_port(port_names: &[String]) -> Option<usize> {
    let candidates: Vec<usize> = port_names
        .iter()
        .enumerate()
        .filter(|(_, name)| DEVICE_NAME_HINTS.iter().any(|hint| name.contains(hint)))
        .map(|(i, _)| i)
        .collect();
    candidates
        .iter()
        .copied()
        .find(|&i| port_names[i].contains("MIDI 1"))
        .or_else(|| candidates.first().copied())
}

/// Map a grid note number to a linear pad index. Notes outside the 8x8
/// grid region (scene buttons, the top control row) return `None`.
pub fn note_to_index(note: u8) -> Option<usize> {
    let row = (note / 10).checked_sub(1)?;
    let col = (note % 10).checked_sub(1)?;
    if row < 8 && col < 8 {
        Some(row as usize * 8 + col as usize)
    } else {
        None
    }
}

/// Inverse of [`note_to_index`].
pub fn index_to_note(index: usize) -> Option<u8> {
    if index >= PAD_COUNT {
        return None;
    }
    let row = (index / 8) as u8;
    let col = (index % 8) as u8;
    Some(10 * (row + 1) + (col + 1))
}

/// A parsed input message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadInput {
    Press(usize),
    Release(usize),
    Control(u8, u8),
}

/// Parse one raw MIDI message into a logical pad input. Clock, active
/// sense, SysEx and anything off the grid is ignored.
pub fn parse_message(data: &[u8]) -> Option<PadInput> {
    if data.len() < 3 {
        return None;
    }
    let status = data[0] & 0xF0;
    match status {
        STATUS_NOTE_ON => {
            let index = note_to_index(data[1])?;
            if data[2] > 0 {
                Some(PadInput::Press(index))
            } else {
                // Running-status convention: note_on with velocity 0.
                Some(PadInput::Release(index))
            }
        }
        STATUS_NOTE_OFF => Some(PadInput::Release(note_to_index(data[1])?)),
        STATUS_CONTROL_CHANGE => Some(PadInput::Control(data[1], data[2])),
        _ => None,
    }
}

/// Enter or leave programmer mode. Required before LED control.
pub fn programmer_mode(enable: bool) -> Vec<u8> {
    let mut message = SYSEX_HEADER.to_vec();
    message.push(OP_PROGRAMMER_MODE);
    message.push(enable as u8);
    message.push(SYSEX_END);
    message
}

/// Light one pad with a static palette color.
pub fn led_palette(index: usize, palette: u8) -> Option<Vec<u8>> {
    let note = index_to_note(index)?;
    let mut message = SYSEX_HEADER.to_vec();
    message.extend_from_slice(&[OP_LED_LIGHTING, LIGHT_STATIC_PALETTE, note, palette & 0x7F]);
    message.push(SYSEX_END);
    Some(message)
}

/// Light one pad with an RGB color (7 bits per channel).
pub fn led_rgb(index: usize, color: Color) -> Option<Vec<u8>> {
    let note = index_to_note(index)?;
    let mut message = SYSEX_HEADER.to_vec();
    message.extend_from_slice(&[
        OP_LED_LIGHTING,
        LIGHT_STATIC_RGB,
        note,
        color.r & 0x7F,
        color.g & 0x7F,
        color.b & 0x7F,
    ]);
    message.push(SYSEX_END);
    Some(message)
}

/// Pulse one pad with a palette color.
pub fn led_pulse(index: usize, palette: u8) -> Option<Vec<u8>> {
    let note = index_to_note(index)?;
    let mut message = SYSEX_HEADER.to_vec();
    message.extend_from_slice(&[OP_LED_LIGHTING, LIGHT_PULSE_PALETTE, note, palette & 0x7F]);
    message.push(SYSEX_END);
    Some(message)
}

/// Set many pads in one SysEx message. Mandatory for updates covering
/// more than a few pads to stay inside MIDI bandwidth. Out-of-range
/// indices are skipped.
pub fn led_bulk(entries: &[(usize, Color)]) -> Vec<u8> {
    let mut message = SYSEX_HEADER.to_vec();
    message.push(OP_LED_LIGHTING);
    for &(index, color) in entries {
        if let Some(note) = index_to_note(index) {
            message.extend_from_slice(&[
                LIGHT_STATIC_RGB,
                note,
                color.r & 0x7F,
                color.g & 0x7F,
                color.b & 0x7F,
            ]);
        }
    }
    message.push(SYSEX_END);
    message
}

/// Turn every grid LED off in one message.
pub fn clear_all() -> Vec<u8> {
    let mut message = SYSEX_HEADER.to_vec();
    message.push(OP_LED_LIGHTING);
    for note in (0..PAD_COUNT).filter_map(index_to_note) {
        message.extend_from_slice(&[LIGHT_STATIC_PALETTE, note, 0]);
    }
    message.push(SYSEX_END);
    message
}
