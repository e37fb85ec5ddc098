use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::RgbaImage;
use keeper_formats::Bf4File;

use super::{FONTS_DIR, JobContext, reset_dir};
use crate::locator::TEXT_DIR;
use crate::process::ConvertProcess;

/// Renders every BF4 font into a folder of per-glyph PNGs plus a `font.json`
/// with the metrics.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::Fonts, None, None);
    let fonts = ctx.install.find_files(TEXT_DIR, "bf4")?;
    let dest = ctx.output_dir(FONTS_DIR);
    reset_dir(&dest)?;

    let total = fonts.len();
    for (index, path) in fonts.iter().enumerate() {
        ctx.report(ConvertProcess::Fonts, Some(index), Some(total));
        let font = Bf4File::open(path)?;
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("font");
        write_font(&font, &dest.join(stem))?;
    }

    ctx.report(ConvertProcess::Fonts, Some(total), Some(total));
    log::info!("converted {total} fonts into {}", dest.display());
    Ok(())
}

pub fn write_font(font: &Bf4File, dir: &Path) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut written = 0;
    for glyph in &font.glyphs {
        let Some(rgba) = glyph.as_rgba8888() else {
            continue;
        };
        let image = RgbaImage::from_raw(u32::from(glyph.width), u32::from(glyph.height), rgba)
            .with_context(|| format!("glyph {:04x} has inconsistent dimensions", glyph.code))?;
        let path = dir.join(format!("{:04x}.png", glyph.code));
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }

    let metrics = dir.join("font.json");
    let json = serde_json::to_string_pretty(font).context("serializing font metrics")?;
    fs::write(&metrics, json).with_context(|| format!("writing {}", metrics.display()))?;
    Ok(written)
}
