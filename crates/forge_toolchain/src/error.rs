//! Error types for toolchain invocation.

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while preparing or running a toolchain.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// The platform project is missing a file the adapter needs.
    #[error("invalid {platform} project in {dir}: {reason}")]
    InvalidProject {
        /// Platform name.
        platform: &'static str,
        /// Directory that was inspected.
        dir: PathBuf,
        /// What was missing.
        reason: String,
    },

    /// No command is configured for a target that needs one.
    #[error("target '{target}' has no build command")]
    NoCommand {
        /// Target name.
        target: String,
    },

    /// The child process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The child process exceeded its time budget and was killed.
    #[error("timed out after {}s", .after.as_secs())]
    Timeout {
        /// The configured timeout.
        after: Duration,
        /// Last lines written to stderr before the kill.
        stderr_tail: Vec<String>,
    },

    /// The run was cancelled and the child process was killed.
    #[error("cancelled")]
    Cancelled,

    /// The output directory contains the project or a source root, so it
    /// cannot be cleared before a build.
    #[error("refusing to clear output directory {dir}: it contains {contains}")]
    UnsafeOutputDir {
        /// The configured output directory.
        dir: PathBuf,
        /// The project or source directory inside it.
        contains: PathBuf,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

impl ToolchainError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| ToolchainError::Io { path, source }
    }
}
