use anyhow::Result;

use super::{JobContext, TEXTS_DIR, reset_dir, stage_files};
use crate::locator::TEXT_DIR;
use crate::process::ConvertProcess;

/// Stages the `.str` string tables for the text decoder.
pub fn run(ctx: &JobContext) -> Result<()> {
    ctx.report(ConvertProcess::InterfaceTexts, None, None);
    let base = ctx.install.require(TEXT_DIR)?;
    let files = ctx.install.find_files(TEXT_DIR, "str")?;
    let dest = ctx.output_dir(TEXTS_DIR);
    reset_dir(&dest)?;

    let staged = stage_files(ctx, ConvertProcess::InterfaceTexts, &files, &base, &dest)?;
    log::info!("staged {staged} string tables into {}", dest.display());
    Ok(())
}
