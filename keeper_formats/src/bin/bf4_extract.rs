//! Dump every glyph of a BF4 font as a PNG, plus a JSON index of the glyph
//! metrics.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use image::RgbaImage;
use keeper_formats::Bf4File;

#[derive(Parser, Debug)]
#[command(about = "Extract glyph bitmaps from a BF4 font", version)]
struct Args {
    /// BF4 font file
    #[arg(long)]
    input: PathBuf,

    /// Directory receiving one PNG per glyph and `font.json`
    #[arg(long, value_name = "DIR")]
    dest: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let font = Bf4File::open(&args.input)?;

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating {}", args.dest.display()))?;

    let mut written = 0usize;
    for glyph in &font.glyphs {
        let Some(rgba) = glyph.as_rgba8888() else {
            continue;
        };
        let image = RgbaImage::from_raw(u32::from(glyph.width), u32::from(glyph.height), rgba)
            .context("glyph bitmap does not match its dimensions")?;
        let path = args.dest.join(format!("{:04x}.png", glyph.code));
        image
            .save(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        written += 1;
    }

    let index = args.dest.join("font.json");
    fs::write(&index, serde_json::to_vec_pretty(&font)?)
        .with_context(|| format!("writing {}", index.display()))?;

    println!(
        "{} glyphs ({} with bitmaps, avg width {}) from {} into {}",
        font.glyphs.len(),
        written,
        font.avg_width,
        args.input.display(),
        args.dest.display()
    );
    Ok(())
}
