use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use keeper_formats::kmf::Material;
use keeper_formats::wad::sanitized_path;

/// Materials written so far in this run, keyed by lowercased name.
///
/// Many models share a material; the first model to reference one writes it
/// and the rest reuse the path.
#[derive(Debug)]
pub struct MaterialCache {
    dir: PathBuf,
    written: Mutex<HashMap<String, PathBuf>>,
}

impl MaterialCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        MaterialCache {
            dir: dir.as_ref().to_path_buf(),
            written: Mutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the JSON file describing `material`, writing it on first use.
    pub fn store(&self, material: &Material) -> Result<PathBuf> {
        let key = material.name.to_ascii_lowercase();
        let mut written = self
            .written
            .lock()
            .map_err(|_| anyhow!("material cache lock poisoned"))?;
        if let Some(path) = written.get(&key) {
            return Ok(path.clone());
        }

        let mut file_name = sanitized_path(&material.name).into_os_string();
        file_name.push(".json");
        let path = self.dir.join(file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(material)
            .with_context(|| format!("serializing material {}", material.name))?;
        fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;

        written.insert(key, path.clone());
        Ok(path)
    }

    pub fn len(&self) -> usize {
        self.written.lock().map(|written| written.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
