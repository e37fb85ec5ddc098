use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use keeper_formats::wad::sanitized_path;
use keeper_formats::{KmfFile, ModelExport, WadArchive};

use super::{JobContext, MODELS_DIR, has_extension, reset_dir};
use crate::locator::MESHES_WAD;
use crate::process::ConvertProcess;

/// Decodes every KMF in the mesh archive to JSON and writes the materials it
/// references once each.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::Models, None, None);
    let wad = WadArchive::open(ctx.install.require(MESHES_WAD)?)?;
    let dest = ctx.output_dir(MODELS_DIR);
    reset_dir(&dest)?;
    reset_dir(ctx.materials.dir())?;

    let models: Vec<_> = wad
        .entries()
        .iter()
        .filter(|entry| has_extension(&entry.name, "kmf"))
        .collect();
    let total = models.len();

    for (index, entry) in models.into_iter().enumerate() {
        ctx.report(ConvertProcess::Models, Some(index), Some(total));
        let bytes = wad
            .read_entry(entry)
            .with_context(|| format!("reading {}", entry.name))?;
        let kmf = KmfFile::from_bytes(&bytes).with_context(|| format!("parsing {}", entry.name))?;
        convert_model(ctx, &kmf, &entry.name, &dest)?;
    }

    ctx.report(ConvertProcess::Models, Some(total), Some(total));
    log::info!(
        "converted {total} models ({} materials) into {}",
        ctx.materials.len(),
        dest.display()
    );
    Ok(())
}

fn convert_model(ctx: &JobContext, kmf: &KmfFile, name: &str, dest: &Path) -> Result<()> {
    for material in &kmf.materials {
        ctx.materials.store(material)?;
    }
    let export = ModelExport::from_kmf(kmf).with_context(|| format!("flattening {name}"))?;

    let target = dest.join(sanitized_path(name)).with_extension("json");
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_vec(&export).with_context(|| format!("serializing {name}"))?;
    fs::write(&target, json).with_context(|| format!("writing {}", target.display()))
}
