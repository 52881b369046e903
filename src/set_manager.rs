//! Set persistence: JSON files named `<set>.json` under the configured
//! sets directory. Saves are atomic (temp file + rename); loads validate
//! the grid invariants and resolve relative sample paths.

use std::path::{Path, PathBuf};

use crate::error::SetError;
use crate::model::{Set, set_file_name};

#[derive(Debug, Clone)]
pub struct SetManager {
    sets_dir: PathBuf,
}

impl SetManager {
    pub fn new(sets_dir: impl Into<PathBuf>) -> Self {
        Self {
            sets_dir: sets_dir.into(),
        }
    }

    pub fn sets_dir(&self) -> &Path {
        &self.sets_dir
    }

    pub fn set_path(&self, name: &str) -> PathBuf {
        self.sets_dir.join(set_file_name(name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.set_path(name).is_file()
    }

    /// Names of every set on disk, sorted.
    pub fn list_sets(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.sets_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                if path.extension().map(|e| e == "json").unwrap_or(false) {
                    path.file_stem().map(|s| s.to_string_lossy().into_owned())
                } else {
                    None
                }
            })
            .collect();
        names.sort();
        names
    }

    /// Load a set by name. Sample paths come back absolute, resolved
    /// against the set's `samples_root`.
    pub fn load_set(&self, name: &str) -> Result<Set, SetError> {
        let path = self.set_path(name);
        if !path.is_file() {
            return Err(SetError::NotFound(name.to_string()));
        }
        let contents = std::fs::read_to_string(&path)?;
        let mut set: Set = serde_json::from_str(&contents).map_err(|e| SetError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        set.validate()?;
        set.resolve_sample_paths();
        log::info!("[SetManager] loaded set '{}' from {}", set.name, path.display());
        Ok(set)
    }

    /// Save a set, refreshing its modification time. Paths under
    /// `samples_root` are stored relative; the caller's set is left
    /// untouched.
    pub fn save_set(&self, set: &Set) -> Result<(), SetError> {
        std::fs::create_dir_all(&self.sets_dir)?;

        let mut on_disk = set.clone();
        on_disk.touch();
        on_disk.relativize_sample_paths();

        let path = self.set_path(&on_disk.name);
        let contents = serde_json::to_string_pretty(&on_disk).map_err(|e| SetError::Malformed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        log::info!("[SetManager] saved set '{}' to {}", on_disk.name, path.display());
        Ok(())
    }

    pub fn delete_set(&self, name: &str) -> Result<(), SetError> {
        let path = self.set_path(name);
        if !path.is_file() {
            return Err(SetError::NotFound(name.to_string()));
        }
        std::fs::remove_file(&path)?;
        Ok(())
    }
}
