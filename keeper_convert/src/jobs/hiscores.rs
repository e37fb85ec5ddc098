use std::fs;

use anyhow::{Context, Result};
use keeper_formats::HiScoresFile;

use super::{HISCORES_FILE, JobContext};
use crate::locator;
use crate::process::ConvertProcess;

/// Converts the high score table to JSON. A missing or unreadable table only
/// produces a warning; the job still succeeds.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::HiScores, Some(0), Some(1));
    match convert(ctx) {
        Ok(count) => log::info!("converted {count} hiscore entries"),
        Err(err) => log::warn!("can not convert hiscores: {err:#}"),
    }
    ctx.report(ConvertProcess::HiScores, Some(1), Some(1));
    Ok(())
}

fn convert(ctx: &JobContext) -> Result<usize> {
    let table = HiScoresFile::open(ctx.install.require(locator::HISCORES_FILE)?)?;
    let target = ctx.output_dir(HISCORES_FILE);
    fs::create_dir_all(&ctx.output).with_context(|| format!("creating {}", ctx.output.display()))?;
    let json = serde_json::to_string_pretty(&table).context("serializing hiscores")?;
    fs::write(&target, json).with_context(|| format!("writing {}", target.display()))?;
    Ok(table.entries.len())
}
