use crate::process::ConvertProcess;

/// Receives progress from running jobs. `None` means "unknown yet".
pub trait ProgressSink: Send + Sync {
    fn update(&self, process: ConvertProcess, current: Option<usize>, total: Option<usize>);
}

/// Writes progress to the log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn update(&self, process: ConvertProcess, current: Option<usize>, total: Option<usize>) {
        match (current, total) {
            (Some(current), Some(total)) => log::debug!("{process}: {current}/{total}"),
            _ => log::debug!("{process}: working"),
        }
    }
}
