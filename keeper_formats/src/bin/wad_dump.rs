use std::env;

use anyhow::{Context, Result};
use keeper_formats::{WadArchive, WadCompression};

fn main() -> Result<()> {
    let path = env::args().nth(1).context("usage: wad_dump <WAD file>")?;
    let archive = WadArchive::open(&path)?;
    println!(
        "{} entries in {} (version {})",
        archive.entry_count(),
        archive.path().display(),
        archive.version()
    );
    for entry in archive.entries() {
        let compression = match entry.compression {
            WadCompression::Stored => "stored",
            WadCompression::RefPack => "refpack",
        };
        println!(
            "{name:<48} {compression:<7} {offset:>10} {packed:>10} {size:>10}",
            name = entry.name,
            offset = entry.offset,
            packed = entry.compressed_size,
            size = entry.size
        );
    }
    Ok(())
}
