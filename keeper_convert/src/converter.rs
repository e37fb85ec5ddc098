//! Builds the task graph for one conversion run and records the versions of
//! the categories that were converted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::jobs::{JobContext, job_for};
use crate::locator::GameInstall;
use crate::process::ConvertProcess;
use crate::progress::ProgressSink;
use crate::scheduler::{RunReport, TaskManager};
use crate::settings::{VersionStore, needs_conversion};

#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub dk2_dir: PathBuf,
    pub output: PathBuf,
    /// Worker threads; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Rebuild every category regardless of recorded versions.
    pub force: bool,
}

pub struct Converter<'a> {
    options: ConvertOptions,
    settings: &'a mut dyn VersionStore,
    progress: Arc<dyn ProgressSink>,
}

impl<'a> Converter<'a> {
    pub fn new(
        options: ConvertOptions,
        settings: &'a mut dyn VersionStore,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Converter {
            options,
            settings,
            progress,
        }
    }

    /// Categories that will run given the recorded versions.
    pub fn pending(&self) -> Vec<ConvertProcess> {
        ConvertProcess::ALL
            .into_iter()
            .filter(|&process| needs_conversion(&*self.settings, process, self.options.force))
            .collect()
    }

    /// Runs every needed category. Versions are recorded only for categories
    /// whose job completed; a failed run leaves the rest untouched so they are
    /// retried next time.
    pub fn run(mut self) -> Result<RunReport<ConvertProcess>> {
        let install = GameInstall::open(&self.options.dk2_dir)?;
        let context = Arc::new(JobContext::new(
            install,
            self.options.output.clone(),
            Arc::clone(&self.progress),
        ));

        let mut manager = match self.options.threads {
            Some(threads) => TaskManager::new(threads),
            None => TaskManager::with_available_parallelism(),
        };
        log::info!(
            "converting {} into {} with {} worker(s)",
            self.options.dk2_dir.display(),
            self.options.output.display(),
            manager.threads()
        );

        for process in ConvertProcess::ALL {
            let needed = needs_conversion(&*self.settings, process, self.options.force);
            if !needed {
                log::info!("{process} is up to date (version {})", process.version());
            }
            let ctx = Arc::clone(&context);
            let job = job_for(process);
            manager
                .add_task(
                    process,
                    process.dependencies().iter().copied(),
                    move || job(&ctx),
                    needed,
                )
                .with_context(|| format!("registering {process}"))?;
        }

        let report = manager.execute().context("running conversion tasks")?;
        for &process in report.completed() {
            self.settings
                .set_recorded_version(&process.setting_name(), process.version());
        }
        Ok(report)
    }
}
