use std::env;

use anyhow::{Context, Result};
use keeper_formats::BankMapFile;

fn main() -> Result<()> {
    let path = env::args()
        .nth(1)
        .context("usage: bank_map_dump <bank map file>")?;
    let map = BankMapFile::open(&path)?;
    println!(
        "{} entries in {} (unknown {} / {})",
        map.entries.len(),
        path,
        map.unknown1,
        map.unknown2
    );
    for entry in &map.entries {
        println!(
            "{name:<32} {a:>10} {b:>10} {c:>6} {d:>4}",
            name = entry.name,
            a = entry.unknown1,
            b = entry.unknown2,
            c = entry.unknown3,
            d = entry.unknown4
        );
    }
    Ok(())
}
