//! Run-level errors.
//!
//! Only conditions that abort a run before anything executes are errors here.
//! Failures of individual targets are recorded on their step in the report.

use std::path::PathBuf;

use forge_toolchain::ValidationReport;

/// Errors that abort a whole build run.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Required tools are missing. Carries every report with unmet tools.
    #[error("missing required tools:\n{}", format_reports(.reports))]
    Validation {
        /// One report per target with unmet requirements.
        reports: Vec<ValidationReport>,
    },

    /// A target's sources import each other in a cycle.
    #[error("target '{target}': cyclic dependency between {}", format_members(.members))]
    CyclicDependency {
        /// The target whose graph contains the cycle.
        target: String,
        /// Every file in the cycle, sorted.
        members: Vec<PathBuf>,
    },

    /// Declared sources could not be read. Carries every failure found.
    #[error("unreadable sources:\n{}", format_unreadable(.failures))]
    UnreadableSources {
        /// One entry per target whose analysis failed.
        failures: Vec<SourceFailure>,
    },

    /// Two requests share a target name.
    #[error("target '{0}' requested more than once")]
    DuplicateTarget(String),
}

/// A target whose sources could not be discovered or hashed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    /// Target name.
    pub target: String,
    /// The root or file that failed, when known.
    pub path: PathBuf,
    /// Underlying error message.
    pub reason: String,
}

fn format_unreadable(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}: {}: {}\n", f.target, f.path.display(), f.reason))
        .collect()
}

fn format_reports(reports: &[ValidationReport]) -> String {
    reports.iter().map(ToString::to_string).collect::<Vec<_>>().join("")
}

fn format_members(members: &[PathBuf]) -> String {
    members
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
