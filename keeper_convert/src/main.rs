use std::sync::Arc;

use anyhow::{Result, bail};
use clap::Parser;
use keeper_convert::cli::Args;
use keeper_convert::{Converter, JsonSettings, LogProgress, TaskState};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    args.validate()?;

    let mut settings = JsonSettings::load(&args.settings_path())?;
    let converter = Converter::new(args.options(), &mut settings, Arc::new(LogProgress));

    if args.dry_run {
        for process in converter.pending() {
            println!("{process} (version {})", process.version());
        }
        return Ok(());
    }

    let report = converter.run()?;
    settings.save()?;

    for task in &report.tasks {
        let state = match task.state {
            TaskState::Completed => "converted",
            TaskState::Skipped => "up to date",
            TaskState::Failed => "FAILED",
            TaskState::Blocked => "not started",
            TaskState::Pending | TaskState::Running => "unknown",
        };
        match &task.error {
            Some(error) => println!("{:<16} {state}: {error}", task.id.name()),
            None => println!("{:<16} {state}", task.id.name()),
        }
    }

    if !report.succeeded() {
        bail!("{} conversion task(s) failed", report.failures().count());
    }
    Ok(())
}
