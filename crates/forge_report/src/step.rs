//! Per-target step records and the status state machine.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use forge_cache::Fingerprint;
use forge_common::Platform;
use serde::{Deserialize, Serialize};

use crate::error::ReportError;

/// Lifecycle of one build step.
///
/// ```text
/// Pending -> Running -> Succeeded
///    |          \----> Failed
///    |-> Cached
///    \-> Failed
/// ```
///
/// `Cached`, `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Not started.
    Pending,
    /// Toolchain process running.
    Running,
    /// Artifacts restored from the cache; nothing ran.
    Cached,
    /// Toolchain process exited successfully.
    Succeeded,
    /// The step failed or was cancelled.
    Failed,
}

impl StepStatus {
    /// Returns `true` for states that never change again.
    pub fn is_terminal(self) -> bool {
        matches!(self, StepStatus::Cached | StepStatus::Succeeded | StepStatus::Failed)
    }

    /// Returns `true` if `self -> next` is a legal transition.
    pub fn can_transition(self, next: StepStatus) -> bool {
        use StepStatus::*;
        matches!(
            (self, next),
            (Pending, Running) | (Pending, Cached) | (Pending, Failed) | (Running, Succeeded) | (Running, Failed)
        )
    }

    /// Returns `true` for outcomes that count as a successful step.
    pub fn is_success(self) -> bool {
        matches!(self, StepStatus::Cached | StepStatus::Succeeded)
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Cached => "cached",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the cache answered for a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheOutcome {
    /// Artifacts came from the cache.
    Hit,
    /// The cache was consulted and had nothing.
    Miss,
    /// Caching was turned off for this run.
    #[default]
    Disabled,
}

/// Part of the pipeline a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepPhase {
    /// Preparing or running the toolchain.
    Execute,
    /// Locating or staging produced artifacts.
    Collect,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepPhase::Execute => "execute",
            StepPhase::Collect => "collect",
        })
    }
}

/// Outcome of one target within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    /// Target name.
    pub target: String,
    /// Target platform.
    pub platform: Platform,
    /// Current status.
    pub status: StepStatus,
    /// Cache answer.
    pub cache: CacheOutcome,
    /// Fingerprint of the step's inputs, once computed.
    pub fingerprint: Option<Fingerprint>,
    /// Number of files affected since the last successful build.
    pub affected_files: usize,
    /// Time spent on the step in milliseconds.
    pub duration_ms: u64,
    /// Exit code of the last toolchain attempt.
    pub exit_code: Option<i32>,
    /// Toolchain attempts made (0 for cached or pre-execution failures).
    pub attempts: u32,
    /// Artifact paths in the output directory.
    pub artifacts: Vec<PathBuf>,
    /// Captured stdout of the last attempt.
    pub stdout_log: Option<PathBuf>,
    /// Captured stderr of the last attempt.
    pub stderr_log: Option<PathBuf>,
    /// Last stderr lines of a failed attempt.
    pub stderr_tail: Vec<String>,
    /// Where a failure happened.
    pub failed_phase: Option<StepPhase>,
    /// Failure message.
    pub error: Option<String>,
}

impl StepReport {
    /// Creates a pending step.
    pub fn new(target: impl Into<String>, platform: Platform) -> Self {
        Self {
            target: target.into(),
            platform,
            status: StepStatus::Pending,
            cache: CacheOutcome::default(),
            fingerprint: None,
            affected_files: 0,
            duration_ms: 0,
            exit_code: None,
            attempts: 0,
            artifacts: Vec::new(),
            stdout_log: None,
            stderr_log: None,
            stderr_tail: Vec::new(),
            failed_phase: None,
            error: None,
        }
    }

    /// Moves to `next`, rejecting illegal transitions.
    pub fn transition(&mut self, next: StepStatus) -> Result<(), ReportError> {
        if !self.status.can_transition(next) {
            return Err(ReportError::InvalidTransition {
                target: self.target.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Marks the step failed in `phase`. A step that already reached a
    /// terminal state keeps it.
    pub fn fail(&mut self, phase: StepPhase, message: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.status = StepStatus::Failed;
        self.failed_phase = Some(phase);
        self.error = Some(message.into());
    }

    /// Records the elapsed time.
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as u64;
    }
}
