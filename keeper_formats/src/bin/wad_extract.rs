use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use keeper_formats::WadArchive;
use keeper_formats::wad::sanitized_path;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract Dungeon Keeper II WAD archives", version)]
struct Args {
    /// WAD archive to extract (may be passed multiple times)
    #[arg(long = "wad", value_name = "PATH", conflicts_with = "root")]
    wads: Vec<PathBuf>,

    /// Directory scanned recursively for WAD archives when --wad is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "wads")]
    root: Option<PathBuf>,

    /// Destination directory; each archive gets a subdirectory
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Newline-delimited list of entry names to extract (case-insensitive)
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Individual entry names to extract (case-insensitive, may repeat)
    #[arg(long = "asset", value_name = "NAME")]
    assets: Vec<String>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let wads = resolve_wad_paths(&args);
    if wads.is_empty() {
        bail!("no WAD archives to extract");
    }

    let filter = build_asset_filter(&args)?;

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for wad_path in wads {
        let archive = WadArchive::open(&wad_path)?;
        extract_archive(&archive, &args.dest, filter.as_ref(), args.overwrite)?;
    }

    Ok(())
}

fn resolve_wad_paths(args: &Args) -> Vec<PathBuf> {
    let mut wads = Vec::new();

    if !args.wads.is_empty() {
        wads.extend(args.wads.iter().cloned());
    } else if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            let is_wad = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("wad"));
            if entry.file_type().is_file() && is_wad {
                wads.push(entry.into_path());
            }
        }
    }

    wads.sort();
    wads.dedup();
    wads
}

fn build_asset_filter(args: &Args) -> Result<Option<HashSet<String>>> {
    let mut wanted: HashSet<String> = args.assets.iter().map(|name| normalize(name)).collect();

    if let Some(path) = &args.manifest {
        let listing = fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        wanted.extend(
            listing
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(normalize),
        );
    }

    Ok((!wanted.is_empty()).then_some(wanted))
}

fn normalize(name: &str) -> String {
    name.trim().replace('\\', "/").to_ascii_lowercase()
}

fn extract_archive(
    archive: &WadArchive,
    dest_root: &Path,
    filter: Option<&HashSet<String>>,
    overwrite: bool,
) -> Result<()> {
    let wad_name = archive
        .path()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("wad")
        .to_string();

    let wad_dest = dest_root.join(&wad_name);
    fs::create_dir_all(&wad_dest).with_context(|| format!("creating {}", wad_dest.display()))?;

    let selected = archive
        .entries()
        .iter()
        .filter(|entry| filter.is_none_or(|names| names.contains(&normalize(&entry.name))));
    let (mut written, mut kept) = (0usize, 0usize);
    for entry in selected {
        if !overwrite && wad_dest.join(sanitized_path(&entry.name)).exists() {
            kept += 1;
            continue;
        }
        archive
            .extract_entry(entry, &wad_dest)
            .with_context(|| format!("unpacking {} from {}", entry.name, archive.path().display()))?;
        written += 1;
    }

    println!(
        "{}: wrote {written} file(s), kept {kept} existing, into {}",
        archive.path().display(),
        wad_dest.display()
    );

    Ok(())
}
