use anyhow::{Context, Result};
use keeper_formats::WadArchive;

use super::{CURSORS_DIR, JobContext, has_extension, reset_dir};
use crate::locator::SPRITE_WAD;
use crate::process::ConvertProcess;

/// Extracts the sprite archive. Plain images are usable as is; `.spr`
/// animated cursors are staged for the sprite decoder.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::MouseCursors, None, None);
    let wad = WadArchive::open(ctx.install.require(SPRITE_WAD)?)?;
    let dest = ctx.output_dir(CURSORS_DIR);
    reset_dir(&dest)?;

    let total = wad.entry_count();
    let mut sprites = 0usize;
    for (index, entry) in wad.entries().iter().enumerate() {
        ctx.report(ConvertProcess::MouseCursors, Some(index), Some(total));
        if has_extension(&entry.name, "spr") {
            sprites += 1;
        }
        wad.extract_entry(entry, &dest)
            .with_context(|| format!("extracting {}", entry.name))?;
    }

    ctx.report(ConvertProcess::MouseCursors, Some(total), Some(total));
    log::info!(
        "extracted {total} cursor files ({sprites} sprite sheets) into {}",
        dest.display()
    );
    Ok(())
}
