use anyhow::Result;
use keeper_formats::SdtArchive;

use super::{JobContext, SOUNDS_DIR, reset_dir};
use crate::locator::SFX_DIR;
use crate::process::ConvertProcess;

/// Unpacks every SDT archive under the sound folder into a directory named
/// after the archive, mirroring the original folder layout.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::MusicAndSounds, None, None);
    let base = ctx.install.require(SFX_DIR)?;
    let archives = ctx.install.find_files(SFX_DIR, "sdt")?;
    let dest = ctx.output_dir(SOUNDS_DIR);
    reset_dir(&dest)?;

    let total = archives.len();
    let mut samples = 0usize;
    for (index, path) in archives.iter().enumerate() {
        ctx.report(ConvertProcess::MusicAndSounds, Some(index), Some(total));
        let relative = path.strip_prefix(&base).unwrap_or(path).with_extension("");
        let archive = SdtArchive::open(path)?;
        samples += archive.extract_all(dest.join(relative))?.len();
    }

    ctx.report(ConvertProcess::MusicAndSounds, Some(total), Some(total));
    log::info!(
        "extracted {samples} samples from {total} sound archives into {}",
        dest.display()
    );
    Ok(())
}
