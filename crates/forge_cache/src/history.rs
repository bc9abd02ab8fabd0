//! Records of the last successful build per (target, config) pair.
//!
//! Each record lives in `history/<target>-<config-hash>.json` under the cache
//! root and holds the file hashes the build saw. The scheduler diffs the
//! current snapshot against it to compute the affected set.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use forge_common::{BuildConfig, ContentHash};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::index::write_atomic;

/// Subdirectory of the cache root holding build records.
pub const HISTORY_DIR: &str = "history";

/// The last successful build of one target under one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    /// Target name.
    pub target: String,
    /// Fingerprint of the build.
    pub fingerprint: Fingerprint,
    /// Content hash of every graph file, keyed by project-relative path.
    pub files: BTreeMap<PathBuf, ContentHash>,
    /// When the build finished.
    pub finished_at: DateTime<Utc>,
}

/// Loads and stores [`BuildRecord`]s.
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    /// Creates a store under `<cache_root>/history`.
    pub fn new(cache_root: &Path) -> Self {
        Self {
            dir: cache_root.join(HISTORY_DIR),
        }
    }

    /// Returns the record file for a target and configuration.
    pub fn record_path(&self, target: &str, config: &BuildConfig) -> PathBuf {
        self.dir
            .join(format!("{}-{}.json", sanitize(target), config.digest()))
    }

    /// Loads the last record, or `None` if absent or unreadable.
    pub fn load(&self, target: &str, config: &BuildConfig) -> Option<BuildRecord> {
        let path = self.record_path(target, config);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable build record");
                None
            }
        }
    }

    /// Replaces the record for `record.target` under `config`.
    pub fn store(&self, config: &BuildConfig, record: &BuildRecord) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| CacheError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let json = serde_json::to_string_pretty(record).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        write_atomic(&self.record_path(&record.target, config), json.as_bytes())
    }

    /// Deletes every record. Returns how many were removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(CacheError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                std::fs::remove_file(&path).map_err(|e| CacheError::Io {
                    path: path.clone(),
                    source: e,
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// Maps a target name onto a safe file-name stem.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
