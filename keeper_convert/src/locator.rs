//! Case-insensitive access to an original game installation.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use walkdir::WalkDir;

pub const SPRITE_WAD: &str = "Data/Sprite.WAD";
pub const MESHES_WAD: &str = "Data/Meshes.WAD";
pub const PATHS_WAD: &str = "Data/Paths.WAD";
pub const SFX_DIR: &str = "Data/Sound/sfx";
pub const TEXT_DIR: &str = "Data/Text/Default";
pub const MAPS_DIR: &str = "Data/editor/maps";
pub const HISCORES_FILE: &str = "Data/Settings/HiScores.dat";
pub const ENGINE_TEXTURES: &str = "DK2TextureCache/EngineTextures.dat";

#[derive(Debug, Clone)]
pub struct GameInstall {
    root: PathBuf,
}

impl GameInstall {
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        ensure!(
            root.is_dir(),
            "game folder {} does not exist or is not a directory",
            root.display()
        );
        Ok(GameInstall { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a `/`-separated path below the root, matching each component
    /// case-insensitively. `None` when some component does not exist.
    pub fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let mut current = self.root.clone();
        for part in relative.split(['/', '\\']).filter(|part| !part.is_empty()) {
            let exact = current.join(part);
            if exact.exists() {
                current = exact;
                continue;
            }
            let entry = fs::read_dir(&current)
                .ok()?
                .filter_map(|entry| entry.ok())
                .find(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(part))?;
            current = entry.path();
        }
        Some(current)
    }

    pub fn require(&self, relative: &str) -> Result<PathBuf> {
        self.resolve(relative)
            .with_context(|| format!("{relative} not found below {}", self.root.display()))
    }

    /// Files below `dir` (recursively) whose extension matches `extension`
    /// case-insensitively, sorted by path.
    pub fn find_files(&self, dir: &str, extension: &str) -> Result<Vec<PathBuf>> {
        let base = self.require(dir)?;
        let mut files: Vec<PathBuf> = WalkDir::new(&base)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
            })
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_paths_regardless_of_case() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("data/sound/SFX")).unwrap();
        fs::write(dir.path().join("data/meshes.wad"), b"x").unwrap();

        let install = GameInstall::open(dir.path()).unwrap();
        assert_eq!(
            install.resolve(MESHES_WAD),
            Some(dir.path().join("data/meshes.wad"))
        );
        assert_eq!(
            install.resolve(SFX_DIR),
            Some(dir.path().join("data/sound/SFX"))
        );
        assert_eq!(install.resolve("Data/Nope.wad"), None);
        assert!(install.require("Data/Nope.wad").is_err());
    }

    #[test]
    fn finds_files_by_extension() {
        let dir = tempdir().unwrap();
        let sfx = dir.path().join("Data/Sound/sfx");
        fs::create_dir_all(sfx.join("Speech")).unwrap();
        fs::write(sfx.join("Global.SDT"), b"").unwrap();
        fs::write(sfx.join("Speech/Horny.sdt"), b"").unwrap();
        fs::write(sfx.join("readme.txt"), b"").unwrap();

        let install = GameInstall::open(dir.path()).unwrap();
        let found = install.find_files(SFX_DIR, "sdt").unwrap();
        assert_eq!(found, vec![sfx.join("Global.SDT"), sfx.join("Speech/Horny.sdt")]);
    }

    #[test]
    fn missing_root_is_rejected() {
        let dir = tempdir().unwrap();
        assert!(GameInstall::open(dir.path().join("absent")).is_err());
    }
}
