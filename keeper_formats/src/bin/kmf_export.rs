//! Convert a KMF model into a JSON document: materials plus either meshes with
//! resolved vertex positions, per-frame animation positions, or group
//! placements.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use keeper_formats::{KmfFile, ModelExport};

#[derive(Parser, Debug)]
#[command(about = "Export a Dungeon Keeper II KMF model as JSON", version)]
struct Args {
    /// KMF model to read
    #[arg(long)]
    input: PathBuf,

    /// JSON document to write; defaults to the input path with a .json extension
    #[arg(long)]
    output: Option<PathBuf>,

    /// Indent the JSON document
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("json"));

    let model = KmfFile::open(&args.input)?;
    let export = ModelExport::from_kmf(&model)
        .with_context(|| format!("flattening {}", args.input.display()))?;
    let json = if args.pretty {
        serde_json::to_vec_pretty(&export)
    } else {
        serde_json::to_vec(&export)
    }
    .context("serializing model export")?;

    if let Some(dir) = output.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(&output, json).with_context(|| format!("writing {}", output.display()))?;

    log::info!(
        "exported {:?} model ({} materials) from {} to {}",
        model.model_type(),
        model.materials.len(),
        args.input.display(),
        output.display()
    );
    Ok(())
}
