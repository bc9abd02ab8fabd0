//! On-disk report history.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::ReportError;
use crate::report::{BuildReport, RunId};

/// Subdirectory of the state directory holding reports.
pub const REPORTS_DIR: &str = "reports";

/// Stores finished reports as `<state>/reports/<run-id>.json`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Creates a store under `state_dir`.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            dir: state_dir.join(REPORTS_DIR),
        }
    }

    /// Returns the reports directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: &RunId) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Writes `report` atomically and returns its path.
    pub fn save(&self, report: &BuildReport) -> Result<PathBuf, ReportError> {
        let io = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ReportError::Io { path, source }
        };
        std::fs::create_dir_all(&self.dir).map_err(io(&self.dir))?;

        let json = serde_json::to_vec_pretty(report).map_err(|e| ReportError::Parse {
            path: self.path_for(&report.run_id),
            reason: e.to_string(),
        })?;
        let path = self.path_for(&report.run_id);
        let tmp = self.dir.join(format!(".{}.json.tmp", report.run_id));
        std::fs::write(&tmp, json).map_err(io(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io(&path))?;
        Ok(path)
    }

    /// Loads one report, or `None` if it does not exist.
    pub fn load(&self, run_id: &RunId) -> Result<Option<BuildReport>, ReportError> {
        let path = self.path_for(run_id);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ReportError::Io { path, source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ReportError::Parse {
                path,
                reason: e.to_string(),
            })
    }

    /// Lists stored run ids, oldest first.
    pub fn list_runs(&self) -> Result<Vec<RunId>, ReportError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ReportError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut runs: Vec<RunId> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem()?.to_str()?.parse().ok())
            .collect();
        runs.sort();
        Ok(runs)
    }

    /// Loads up to `limit` reports, newest first. Unreadable reports are
    /// skipped with a warning.
    pub fn recent(&self, limit: usize) -> Result<Vec<BuildReport>, ReportError> {
        let runs = self.list_runs()?;
        let mut reports = Vec::new();
        for run_id in runs.iter().rev() {
            if reports.len() == limit {
                break;
            }
            match self.load(run_id) {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => {}
                Err(e) => warn!(run = %run_id, error = %e, "skipping unreadable report"),
            }
        }
        Ok(reports)
    }

    /// Deletes all but the newest `keep` reports and returns how many were removed.
    pub fn prune(&self, keep: usize) -> Result<usize, ReportError> {
        let runs = self.list_runs()?;
        let excess = runs.len().saturating_sub(keep);
        for run_id in &runs[..excess] {
            let path = self.path_for(run_id);
            std::fs::remove_file(&path).map_err(|source| ReportError::Io { path, source })?;
        }
        Ok(excess)
    }
}
