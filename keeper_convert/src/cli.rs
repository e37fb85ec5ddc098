use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;

use crate::converter::ConvertOptions;

#[derive(Parser, Debug)]
#[command(
    about = "Converts Dungeon Keeper II assets into engine-agnostic files",
    version
)]
pub struct Args {
    /// Root of the original game installation
    #[arg(long)]
    pub dk2_dir: PathBuf,

    /// Directory the converted assets are written to
    #[arg(long, default_value = "assets/Converted")]
    pub output: PathBuf,

    /// JSON file recording the converted version of each category
    /// (default: <output>/settings.json)
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Worker threads (default: available parallelism)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Reconvert every category even when it is up to date
    #[arg(long)]
    pub force: bool,

    /// Print the categories that would run and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn validate(&self) -> Result<()> {
        if self.threads == Some(0) {
            bail!("--threads must be at least 1");
        }
        if self.output.starts_with(&self.dk2_dir) && self.output != self.dk2_dir {
            log::warn!(
                "output {} is inside the game folder {}",
                self.output.display(),
                self.dk2_dir.display()
            );
        }
        if self.output == self.dk2_dir {
            bail!("--output must not be the game folder itself");
        }
        Ok(())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(|| self.output.join("settings.json"))
    }

    pub fn options(&self) -> ConvertOptions {
        ConvertOptions {
            dk2_dir: self.dk2_dir.clone(),
            output: self.output.clone(),
            threads: self.threads,
            force: self.force,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_settings_next_to_output() {
        let args = Args::parse_from(["keeper_convert", "--dk2-dir", "/games/dk2", "--force"]);
        assert!(args.force);
        assert_eq!(args.settings_path(), PathBuf::from("assets/Converted/settings.json"));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn rejects_zero_threads_and_in_place_output() {
        let args = Args::parse_from(["keeper_convert", "--dk2-dir", "dk2", "--threads", "0"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from(["keeper_convert", "--dk2-dir", "dk2", "--output", "dk2"]);
        assert!(args.validate().is_err());
    }
}
