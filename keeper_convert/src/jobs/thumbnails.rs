use anyhow::Result;

use super::{JobContext, THUMBNAILS_DIR, reset_dir, stage_files};
use crate::locator::MAPS_DIR;
use crate::process::ConvertProcess;

/// Stages the level map files (`.kwd`) for the thumbnail renderer, which needs
/// the converted textures.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::MapThumbnails, None, None);
    let base = ctx.install.require(MAPS_DIR)?;
    let maps = ctx.install.find_files(MAPS_DIR, "kwd")?;
    let dest = ctx.output_dir(THUMBNAILS_DIR);
    reset_dir(&dest)?;

    let staged = stage_files(ctx, ConvertProcess::MapThumbnails, &maps, &base, &dest)?;
    log::info!("staged {staged} maps for thumbnails into {}", dest.display());
    Ok(())
}
