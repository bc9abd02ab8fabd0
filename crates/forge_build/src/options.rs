//! Per-run build options.

use std::path::PathBuf;
use std::time::Duration;

use forge_config::{BuildSettings, DEFAULT_TIMEOUT};

/// Knobs for one [`Scheduler::build`](crate::Scheduler::build) call.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Scope rebuild decisions to files changed since the last success.
    pub incremental: bool,
    /// Consult and populate the artifact cache.
    pub cache: bool,
    /// Maximum number of targets built at once (at least 1).
    pub parallel_jobs: usize,
    /// Timeout for one toolchain invocation.
    pub timeout: Duration,
    /// Extra attempts after a toolchain exits non-zero.
    pub retries: u32,
    /// Directory for per-step stdout/stderr logs. No log files when `None`.
    pub log_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            incremental: true,
            cache: true,
            parallel_jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            timeout: DEFAULT_TIMEOUT,
            retries: 0,
            log_dir: None,
        }
    }
}

impl BuildOptions {
    /// Options taken from the `[build]` table.
    pub fn from_settings(settings: &BuildSettings) -> Self {
        Self {
            incremental: settings.incremental,
            cache: settings.cache,
            parallel_jobs: settings.effective_jobs(),
            timeout: settings.timeout,
            retries: settings.retries,
            log_dir: None,
        }
    }
}
