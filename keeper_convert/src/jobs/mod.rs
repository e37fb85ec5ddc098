//! One conversion job per [`ConvertProcess`].
//!
//! Every job reads from the original installation through [`GameInstall`],
//! owns its output folder (cleared before writing) and reports progress to
//! the shared [`ProgressSink`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::locator::GameInstall;
use crate::materials::MaterialCache;
use crate::process::ConvertProcess;
use crate::progress::ProgressSink;

pub mod cursors;
pub mod fonts;
pub mod hiscores;
pub mod models;
pub mod paths;
pub mod sounds;
pub mod texts;
pub mod textures;
pub mod thumbnails;

pub const TEXTURES_DIR: &str = "Textures";
pub const MODELS_DIR: &str = "Models";
pub const MATERIALS_DIR: &str = "Materials";
pub const CURSORS_DIR: &str = "Interface/Cursors";
pub const SOUNDS_DIR: &str = "Sounds";
pub const TEXTS_DIR: &str = "Interface/Texts";
pub const PATHS_DIR: &str = "Interface/Paths";
pub const HISCORES_FILE: &str = "HiScores.json";
pub const FONTS_DIR: &str = "Interface/Fonts";
pub const THUMBNAILS_DIR: &str = "Thumbnails";

pub type JobFn = fn(&JobContext) -> Result<()>;

pub struct JobContext {
    pub install: GameInstall,
    pub output: PathBuf,
    pub progress: Arc<dyn ProgressSink>,
    pub materials: MaterialCache,
}

impl JobContext {
    pub fn new(install: GameInstall, output: PathBuf, progress: Arc<dyn ProgressSink>) -> Self {
        let materials = MaterialCache::new(output.join(MATERIALS_DIR));
        JobContext {
            install,
            output,
            progress,
            materials,
        }
    }

    pub fn output_dir(&self, relative: &str) -> PathBuf {
        self.output.join(relative)
    }

    pub fn report(&self, process: ConvertProcess, current: Option<usize>, total: Option<usize>) {
        self.progress.update(process, current, total);
    }
}

pub fn job_for(process: ConvertProcess) -> JobFn {
    match process {
        ConvertProcess::Textures => textures::run,
        ConvertProcess::Models => models::run,
        ConvertProcess::MouseCursors => cursors::run,
        ConvertProcess::MusicAndSounds => sounds::run,
        ConvertProcess::InterfaceTexts => texts::run,
        ConvertProcess::Paths => paths::run,
        ConvertProcess::HiScores => hiscores::run,
        ConvertProcess::Fonts => fonts::run,
        ConvertProcess::MapThumbnails => thumbnails::run,
    }
}

/// Empties (or creates) a job's output directory.
pub fn reset_dir(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_dir_all(path).with_context(|| format!("clearing {}", path.display()))?;
    }
    fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
}

/// Copies `files` below `dest`, keeping their paths relative to `base`.
///
/// Used for categories whose decoding happens in another tool: the raw
/// sources are staged unchanged.
pub fn stage_files(
    ctx: &JobContext,
    process: ConvertProcess,
    files: &[PathBuf],
    base: &Path,
    dest: &Path,
) -> Result<usize> {
    let total = files.len();
    for (index, file) in files.iter().enumerate() {
        ctx.report(process, Some(index), Some(total));
        let relative = file.strip_prefix(base).unwrap_or(file.as_path());
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::copy(file, &target)
            .with_context(|| format!("copying {} to {}", file.display(), target.display()))?;
    }
    ctx.report(process, Some(total), Some(total));
    Ok(total)
}

pub(crate) fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
