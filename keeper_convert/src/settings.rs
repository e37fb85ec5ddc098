use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::process::ConvertProcess;

/// Persistent record of which output version each category was built with.
pub trait VersionStore {
    fn recorded_version(&self, key: &str) -> Option<u32>;
    fn set_recorded_version(&mut self, key: &str, version: u32);
}

/// A category needs converting when forced, when nothing is recorded for it,
/// or when its current version is newer than the recorded one.
pub fn needs_conversion(store: &dyn VersionStore, process: ConvertProcess, force: bool) -> bool {
    if force {
        return true;
    }
    match store.recorded_version(&process.setting_name()) {
        Some(recorded) => process.version() > recorded,
        None => true,
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    versions: BTreeMap<String, u32>,
}

/// Version store backed by a JSON file (`{"versions": {"TexturesVersion": 6}}`).
#[derive(Debug, Default, Clone)]
pub struct JsonSettings {
    document: SettingsDocument,
    dirty: bool,
    backing_path: Option<PathBuf>,
}

impl JsonSettings {
    /// Loads `path` when it exists; a missing file starts empty and is created
    /// on the first [`save`](Self::save).
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = JsonSettings {
            backing_path: Some(path.to_path_buf()),
            ..JsonSettings::default()
        };
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read settings file: {}", path.display()))?;
            settings.document = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse settings json: {}", path.display()))?;
        }
        Ok(settings)
    }

    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        JsonSettings::default()
    }

    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.backing_path.as_ref() else {
            self.dirty = false;
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create settings directory: {}", parent.display())
                })?;
            }
        }
        let serialized = serde_json::to_string_pretty(&self.document)
            .context("failed to serialize settings to JSON")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write settings file: {}", path.display()))?;
        self.dirty = false;
        Ok(())
    }
}

impl VersionStore for JsonSettings {
    fn recorded_version(&self, key: &str) -> Option<u32> {
        self.document.versions.get(key).copied()
    }

    fn set_recorded_version(&mut self, key: &str, version: u32) {
        if self.document.versions.get(key) != Some(&version) {
            self.document.versions.insert(key.to_string(), version);
            self.dirty = true;
        }
    }
}
