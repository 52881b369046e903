//! Application configuration, stored as JSON in the platform config
//! directory. Loading never fails — missing or unparseable files fall
//! back to defaults with a warning, so the app always starts.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding `<name>.json` set files.
    pub sets_dir: PathBuf,
    /// Output device name; `None` means the OS default.
    pub default_audio_device: Option<String>,
    /// Frames per audio callback block.
    pub default_buffer_size: u32,
    /// Seconds between MIDI port scans by the hot-plug monitor.
    pub midi_poll_interval: f64,
    /// CC number that triggers stop-all.
    pub panic_button_cc_control: u8,
    /// CC value that triggers stop-all.
    pub panic_button_cc_value: u8,
    /// Name of the last mounted set, remounted at startup.
    pub last_set: Option<String>,
    /// Save the mounted set after every edit.
    pub auto_save: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sets_dir: default_sets_dir(),
            default_audio_device: None,
            default_buffer_size: 256,
            midi_poll_interval: 2.0,
            panic_button_cc_control: 111,
            panic_button_cc_value: 127,
            last_set: None,
            auto_save: true,
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "launchsampler", "Launchsampler")
}

fn default_sets_dir() -> PathBuf {
    if let Some(dirs) = project_dirs() {
        dirs.data_dir().join("sets")
    } else {
        PathBuf::from("./sets")
    }
}

/// Full path of the config file.
pub fn config_path() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().join("config.json"))
}

impl AppConfig {
    /// Load from disk, falling back to defaults on any failure.
    pub fn load() -> Self {
        let Some(path) = config_path() else {
            log::warn!("[Config] could not determine config directory, using defaults");
            return Self::default();
        };
        if !path.exists() {
            log::info!("[Config] no config file at {}, using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("[Config] loaded {}", path.display());
                    config
                }
                Err(e) => {
                    log::error!("[Config] failed to parse {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(e) => {
                log::error!("[Config] failed to read {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Save to disk, creating the directory and writing atomically via a
    /// temp-file rename.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        let dir = path.parent().ok_or(ConfigError::NoConfigDir)?;
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;

        let contents = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &contents)
            .map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
        std::fs::rename(&temp_path, &path)
            .map_err(|e| ConfigError::Write(path.clone(), e))?;

        log::info!("[Config] saved {}", path.display());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine config directory")]
    NoConfigDir,

    #[error("failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(serde_json::Error),

    #[error("failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),
}
