use std::fs;

use anyhow::{Context, Result};
use keeper_formats::TextureCache;

use super::{JobContext, TEXTURES_DIR, reset_dir};
use crate::locator::ENGINE_TEXTURES;
use crate::process::ConvertProcess;

/// Stages every texture cache record plus an `index.json` with their
/// dimensions and alpha flags. Pixel decoding happens downstream.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::Textures, None, None);
    let cache = TextureCache::open(ctx.install.require(ENGINE_TEXTURES)?)?;
    let dest = ctx.output_dir(TEXTURES_DIR);
    reset_dir(&dest)?;

    let total = cache.entries().len();
    for (index, entry) in cache.entries().iter().enumerate() {
        ctx.report(ConvertProcess::Textures, Some(index), Some(total));
        cache.extract_entry(entry, &dest)?;
    }

    let index_path = dest.join("index.json");
    let json = serde_json::to_string_pretty(cache.entries()).context("serializing texture index")?;
    fs::write(&index_path, json).with_context(|| format!("writing {}", index_path.display()))?;

    ctx.report(ConvertProcess::Textures, Some(total), Some(total));
    log::info!("staged {total} textures into {}", dest.display());
    Ok(())
}
