//! Run-level report.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::step::{CacheOutcome, StepReport, StepStatus};

/// Time-ordered run identifier (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new id for the current time.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Record of one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Unique run id.
    pub run_id: RunId,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished; `None` while in progress.
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// One entry per requested target, in request order.
    pub steps: Vec<StepReport>,
    /// Every step ended `Succeeded` or `Cached`.
    pub success: bool,
}

impl BuildReport {
    /// Starts a report for a run beginning now.
    pub fn start() -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
            steps: Vec::new(),
            success: false,
        }
    }

    /// Stamps the finish time and computes the success flag.
    pub fn finish(mut self, steps: Vec<StepReport>) -> Self {
        let finished = Utc::now();
        self.duration_ms = (finished - self.started_at).num_milliseconds().max(0) as u64;
        self.finished_at = Some(finished);
        self.success = steps.iter().all(|s| s.status.is_success());
        self.steps = steps;
        self
    }

    /// Returns `true` if every step succeeded or was served from the cache.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Finds the step for `target`.
    pub fn step(&self, target: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.target == target)
    }

    /// Number of steps with the given status.
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Number of steps the cache answered.
    pub fn cache_hits(&self) -> usize {
        self.steps.iter().filter(|s| s.cache == CacheOutcome::Hit).count()
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "run {} ({}, {:.2}s)",
            self.run_id,
            if self.success { "succeeded" } else { "failed" },
            self.duration_ms as f64 / 1000.0
        )?;
        for step in &self.steps {
            write!(
                f,
                "  {:<16} {:<8} {:<10} {:>8.2}s",
                step.target,
                step.platform.as_str(),
                step.status.as_str(),
                step.duration_ms as f64 / 1000.0
            )?;
            if let Some(fp) = &step.fingerprint {
                let hex = fp.to_string();
                write!(f, "  {}", &hex[..hex.len().min(12)])?;
            }
            if step.attempts > 1 {
                write!(f, "  ({} attempts)", step.attempts)?;
            }
            writeln!(f)?;
            if let Some(error) = &step.error {
                writeln!(f, "      error: {error}")?;
                for line in &step.stderr_tail {
                    writeln!(f, "      | {line}")?;
                }
            }
        }
        write!(
            f,
            "{} cached, {} built, {} failed",
            self.count(StepStatus::Cached),
            self.count(StepStatus::Succeeded),
            self.count(StepStatus::Failed)
        )
    }
}
