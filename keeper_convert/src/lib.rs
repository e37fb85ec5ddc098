//! Conversion pipeline for Dungeon Keeper II assets: one job per asset
//! category, run on a dependency-ordered worker pool.

pub mod cli;
pub mod converter;
pub mod jobs;
pub mod locator;
pub mod materials;
pub mod process;
pub mod progress;
pub mod scheduler;
pub mod settings;

pub use converter::{ConvertOptions, Converter};
pub use locator::GameInstall;
pub use process::ConvertProcess;
pub use progress::{LogProgress, ProgressSink};
pub use scheduler::{RunReport, ScheduleError, TaskManager, TaskReport, TaskState};
pub use settings::{JsonSettings, VersionStore, needs_conversion};
