use anyhow::{Context, Result};
use keeper_formats::WadArchive;

use super::{JobContext, PATHS_DIR, has_extension, reset_dir};
use crate::locator::PATHS_WAD;
use crate::process::ConvertProcess;

/// Extracts the camera path (`.kcs`) files from the paths archive.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::Paths, None, None);
    let wad = WadArchive::open(ctx.install.require(PATHS_WAD)?)?;
    let dest = ctx.output_dir(PATHS_DIR);
    reset_dir(&dest)?;

    let paths: Vec<_> = wad
        .entries()
        .iter()
        .filter(|entry| has_extension(&entry.name, "kcs"))
        .collect();
    let total = paths.len();
    for (index, entry) in paths.into_iter().enumerate() {
        ctx.report(ConvertProcess::Paths, Some(index), Some(total));
        wad.extract_entry(entry, &dest)
            .with_context(|| format!("extracting {}", entry.name))?;
    }

    ctx.report(ConvertProcess::Paths, Some(total), Some(total));
    log::info!("extracted {total} camera paths into {}", dest.display());
    Ok(())
}
