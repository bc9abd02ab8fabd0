//! Error types for reports.

use std::path::PathBuf;

use crate::step::StepStatus;

/// Errors raised while updating or persisting reports.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// A step status change that would move backwards or out of a terminal state.
    #[error("invalid step transition for '{target}': {from} -> {to}")]
    InvalidTransition {
        /// Target of the step.
        target: String,
        /// Current status.
        from: StepStatus,
        /// Requested status.
        to: StepStatus,
    },

    /// A report file could not be read or written.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A report file is not valid JSON.
    #[error("failed to parse report {path}: {reason}")]
    Parse {
        /// The report file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },
}
