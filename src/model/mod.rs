//! Data model — validated value objects for the 8x8 grid and its sets.
//!
//! Everything here is plain data: serialization per the set file format,
//! validation of ranges, and nothing else. Runtime audio state lives in
//! [`crate::audio`]; mutation goes through the editor service.

pub mod config;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const GRID_WIDTH: u8 = 8;
pub const GRID_HEIGHT: u8 = 8;
pub const PAD_COUNT: usize = (GRID_WIDTH as usize) * (GRID_HEIGHT as usize);

/// RGB color in the MIDI-compatible 0..=127 range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const OFF: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 127, g: 127, b: 127 };

    pub fn new(r: u8, g: u8, b: u8) -> Result<Self, ValidationError> {
        for component in [r, g, b] {
            if component > 127 {
                return Err(ValidationError::ColorOutOfRange(component));
            }
        }
        Ok(Self { r, g, b })
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        Self::new(self.r, self.g, self.b).map(|_| ())
    }

    /// Nearest entry of the hardware palette, for palette-based effects
    /// (pulse/flash take a palette index, not RGB). Quantizes against the
    /// handful of palette entries the app actually lights.
    pub fn palette_index(&self) -> u8 {
        // (index, r, g, b) from the Launchpad programmer-mode palette.
        const PALETTE: &[(u8, u8, u8, u8)] = &[
            (0, 0, 0, 0),      // off
            (3, 127, 127, 127), // white
            (5, 127, 0, 0),    // red
            (13, 127, 127, 0), // yellow
            (21, 0, 127, 0),   // green
            (33, 0, 85, 127),  // azure
            (45, 0, 0, 127),   // blue
            (53, 127, 0, 127), // magenta
            (9, 127, 60, 0),   // orange
        ];
        let mut best = 0u8;
        let mut best_dist = u32::MAX;
        for &(index, r, g, b) in PALETTE {
            let dist = (self.r as i32 - r as i32).pow(2) as u32
                + (self.g as i32 - g as i32).pow(2) as u32
                + (self.b as i32 - b as i32).pow(2) as u32;
            if dist < best_dist {
                best_dist = dist;
                best = index;
            }
        }
        best
    }
}

/// How the engine advances and stops a voice for a pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackMode {
    OneShot,
    Loop,
    Hold,
    LoopToggle,
}

impl PlaybackMode {
    /// Color a pad gets when first assigned, keyed by mode so the grid
    /// reads at a glance.
    pub fn default_color(&self) -> Color {
        match self {
            PlaybackMode::OneShot => Color { r: 0, g: 127, b: 0 },
            PlaybackMode::Loop => Color { r: 0, g: 85, b: 127 },
            PlaybackMode::Hold => Color { r: 127, g: 127, b: 0 },
            PlaybackMode::LoopToggle => Color { r: 127, g: 0, b: 127 },
        }
    }
}

/// A sample reference. File existence is checked at load time, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub path: PathBuf,
    #[serde(rename = "name")]
    pub display_name: String,
}

impl Sample {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let display_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, display_name }
    }
}

/// One position on the 8x8 grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pad {
    pub x: u8,
    pub y: u8,
    pub sample: Option<Sample>,
    pub mode: PlaybackMode,
    pub volume: f32,
    pub color: Color,
}

impl Pad {
    pub fn new(x: u8, y: u8) -> Result<Self, ValidationError> {
        if x >= GRID_WIDTH || y >= GRID_HEIGHT {
            return Err(ValidationError::CoordOutOfRange(x, y));
        }
        Ok(Self {
            x,
            y,
            sample: None,
            mode: PlaybackMode::OneShot,
            volume: 1.0,
            color: Color::OFF,
        })
    }

    pub fn is_assigned(&self) -> bool {
        self.sample.is_some()
    }

    pub fn linear_index(&self) -> usize {
        self.y as usize * GRID_WIDTH as usize + self.x as usize
    }

    /// Copy everything but the grid position from another pad.
    pub fn copy_content_from(&mut self, other: &Pad) {
        self.sample = other.sample.clone();
        self.mode = other.mode;
        self.volume = other.volume;
        self.color = other.color;
    }

    /// Back to an unassigned pad, keeping the grid position.
    pub fn clear_content(&mut self) {
        self.sample = None;
        self.mode = PlaybackMode::OneShot;
        self.volume = 1.0;
        self.color = Color::OFF;
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.x >= GRID_WIDTH || self.y >= GRID_HEIGHT {
            return Err(ValidationError::CoordOutOfRange(self.x, self.y));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ValidationError::VolumeOutOfRange(self.volume));
        }
        self.color.validate()
    }
}

/// The 8x8 grid: exactly [`PAD_COUNT`] pads, in linear-index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launchpad {
    pads: Vec<Pad>,
}

impl Launchpad {
    pub fn new() -> Self {
        let pads = (0..PAD_COUNT)
            .map(|i| {
                let x = (i % GRID_WIDTH as usize) as u8;
                let y = (i / GRID_WIDTH as usize) as u8;
                Pad::new(x, y).expect("grid coordinates are in range")
            })
            .collect();
        Self { pads }
    }

    pub fn from_pads(pads: Vec<Pad>) -> Result<Self, ValidationError> {
        let launchpad = Self { pads };
        launchpad.validate()?;
        Ok(launchpad)
    }

    pub fn pad(&self, index: usize) -> Option<&Pad> {
        self.pads.get(index)
    }

    pub fn pad_mut(&mut self, index: usize) -> Option<&mut Pad> {
        self.pads.get_mut(index)
    }

    pub fn pads(&self) -> &[Pad] {
        &self.pads
    }

    pub fn assigned_indices(&self) -> Vec<usize> {
        self.pads
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_assigned())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.pads.len() != PAD_COUNT {
            return Err(ValidationError::WrongPadCount(self.pads.len()));
        }
        for (i, pad) in self.pads.iter().enumerate() {
            pad.validate()?;
            if pad.linear_index() != i {
                return Err(ValidationError::PadIndexMismatch(i, pad.linear_index()));
            }
        }
        Ok(())
    }
}

impl Default for Launchpad {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Index<usize> for Launchpad {
    type Output = Pad;

    fn index(&self, index: usize) -> &Pad {
        &self.pads[index]
    }
}

impl std::ops::IndexMut<usize> for Launchpad {
    fn index_mut(&mut self, index: usize) -> &mut Pad {
        &mut self.pads[index]
    }
}

/// A saved/mounted configuration of the grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Set {
    pub name: String,
    pub samples_root: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub launchpad: Launchpad,
}

impl Set {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            samples_root: None,
            created_at: now,
            modified_at: now,
            launchpad: Launchpad::new(),
        }
    }

    pub fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.launchpad.validate()
    }

    /// Resolve relative sample paths against `samples_root`. Absolute
    /// paths are left alone.
    pub fn resolve_sample_paths(&mut self) {
        let Some(root) = self.samples_root.clone() else {
            return;
        };
        for pad in &mut self.launchpad.pads {
            if let Some(sample) = &mut pad.sample {
                if sample.path.is_relative() {
                    sample.path = root.join(&sample.path);
                }
            }
        }
    }

    /// Inverse of [`Self::resolve_sample_paths`]: store paths under
    /// `samples_root` as relative.
    pub fn relativize_sample_paths(&mut self) {
        let Some(root) = self.samples_root.clone() else {
            return;
        };
        for pad in &mut self.launchpad.pads {
            if let Some(sample) = &mut pad.sample {
                if let Ok(stripped) = sample.path.strip_prefix(&root) {
                    sample.path = stripped.to_path_buf();
                }
            }
        }
    }
}

/// Canonical on-disk file name for a set.
pub fn set_file_name(name: &str) -> String {
    format!("{name}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_range_validation() {
        assert!(Color::new(0, 64, 127).is_ok());
        assert_eq!(
            Color::new(128, 0, 0),
            Err(ValidationError::ColorOutOfRange(128))
        );
    }

    #[test]
    fn test_color_palette_index_for_known_colors() {
        assert_eq!(Color::OFF.palette_index(), 0);
        assert_eq!(Color::WHITE.palette_index(), 3);
        assert_eq!(Color { r: 0, g: 127, b: 0 }.palette_index(), 21);
    }

    #[test]
    fn test_playback_mode_serde_names() {
        assert_eq!(
            serde_json::to_string(&PlaybackMode::OneShot).unwrap(),
            "\"one_shot\""
        );
        assert_eq!(
            serde_json::from_str::<PlaybackMode>("\"loop_toggle\"").unwrap(),
            PlaybackMode::LoopToggle
        );
    }

    #[test]
    fn test_pad_linear_index() {
        let pad = Pad::new(3, 2).unwrap();
        assert_eq!(pad.linear_index(), 19);
        assert!(Pad::new(8, 0).is_err());
    }

    #[test]
    fn test_launchpad_has_64_pads_in_order() {
        let launchpad = Launchpad::new();
        assert_eq!(launchpad.pads().len(), PAD_COUNT);
        for (i, pad) in launchpad.pads().iter().enumerate() {
            assert_eq!(pad.linear_index(), i);
        }
        assert!(launchpad.validate().is_ok());
    }

    #[test]
    fn test_launchpad_rejects_shuffled_pads() {
        let mut pads: Vec<Pad> = Launchpad::new().pads().to_vec();
        pads.swap(0, 1);
        assert!(matches!(
            Launchpad::from_pads(pads),
            Err(ValidationError::PadIndexMismatch(0, 1))
        ));
    }

    #[test]
    fn test_set_json_round_trip() {
        let mut set = Set::new("demo");
        set.samples_root = Some(PathBuf::from("/samples"));
        let pad = set.launchpad.pad_mut(5).unwrap();
        pad.sample = Some(Sample::new("kick.wav"));
        pad.mode = PlaybackMode::Loop;
        pad.volume = 0.5;
        pad.color = Color { r: 0, g: 85, b: 127 };

        let json = serde_json::to_string_pretty(&set).unwrap();
        let parsed: Set = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, set);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_sample_serializes_name_field() {
        let sample = Sample::new("/samples/Kick 01.wav");
        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"name\":\"Kick 01\""));
    }

    #[test]
    fn test_resolve_and_relativize_paths() {
        let mut set = Set::new("paths");
        set.samples_root = Some(PathBuf::from("/samples"));
        set.launchpad.pad_mut(0).unwrap().sample = Some(Sample::new("kick.wav"));
        set.launchpad.pad_mut(1).unwrap().sample = Some(Sample::new("/elsewhere/snare.wav"));

        set.resolve_sample_paths();
        assert_eq!(
            set.launchpad.pad(0).unwrap().sample.as_ref().unwrap().path,
            PathBuf::from("/samples/kick.wav")
        );
        // Absolute paths are preserved.
        assert_eq!(
            set.launchpad.pad(1).unwrap().sample.as_ref().unwrap().path,
            PathBuf::from("/elsewhere/snare.wav")
        );

        set.relativize_sample_paths();
        assert_eq!(
            set.launchpad.pad(0).unwrap().sample.as_ref().unwrap().path,
            PathBuf::from("kick.wav")
        );
    }

    #[test]
    fn test_pad_volume_validation() {
        let mut pad = Pad::new(0, 0).unwrap();
        pad.volume = 1.5;
        assert!(matches!(
            pad.validate(),
            Err(ValidationError::VolumeOutOfRange(_))
        ));
    }
}
