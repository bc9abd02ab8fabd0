//! Source file snapshots and change detection.
//!
//! Computes content hashes for source files and compares them against a
//! previous build record to identify which files are new, modified or
//! deleted.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use forge_common::ContentHash;
use rayon::prelude::*;

use crate::error::CacheError;

/// An immutable snapshot of one source file taken at the start of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path of the file as discovered.
    pub path: PathBuf,
    /// XXH3-128 hash of the file contents.
    pub hash: ContentHash,
    /// Last-modified time, when the filesystem reports one.
    pub modified: Option<SystemTime>,
}

/// Result of comparing current source file hashes against a previous record.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Files that are not present in the previous record.
    pub new_files: Vec<PathBuf>,

    /// Files whose content hash differs from the previous record.
    pub modified_files: Vec<PathBuf>,

    /// Files present in the previous record but not in the current set.
    pub deleted_files: Vec<PathBuf>,
}

/// Utility for hashing source files and detecting changes.
pub struct SourceHasher;

impl SourceHasher {
    /// Snapshots one file: content hash plus modification time.
    pub fn snapshot_file(path: &Path) -> Result<SourceFile, CacheError> {
        Self::read_snapshot(path).map(|(file, _)| file)
    }

    fn read_snapshot(path: &Path) -> Result<(SourceFile, Vec<u8>), CacheError> {
        let content = std::fs::read(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();
        let file = SourceFile {
            path: path.to_path_buf(),
            hash: ContentHash::from_bytes(&content),
            modified,
        };
        Ok((file, content))
    }

    /// Snapshots many files in parallel, handing each file's contents to
    /// `inspect` while they are in memory.
    ///
    /// A declared file that cannot be read fails the whole snapshot with an
    /// error naming that path. The result is sorted by path.
    pub fn snapshot<T, F>(paths: &[PathBuf], inspect: F) -> Result<Vec<(SourceFile, T)>, CacheError>
    where
        T: Send,
        F: Fn(&Path, &[u8]) -> T + Sync,
    {
        let mut files = paths
            .par_iter()
            .map(|p| {
                let (file, content) = Self::read_snapshot(p)?;
                let extra = inspect(p.as_path(), content.as_slice());
                Ok((file, extra))
            })
            .collect::<Result<Vec<_>, CacheError>>()?;
        files.sort_by(|a, b| a.0.path.cmp(&b.0.path));
        Ok(files)
    }

    /// Compares current file hashes against a previous record.
    pub fn detect_changes(
        current: &BTreeMap<PathBuf, ContentHash>,
        previous: &BTreeMap<PathBuf, ContentHash>,
    ) -> ChangeSet {
        let mut changes = ChangeSet::default();

        for (path, hash) in current {
            match previous.get(path) {
                Some(old) if old == hash => {}
                Some(_) => changes.modified_files.push(path.clone()),
                None => changes.new_files.push(path.clone()),
            }
        }

        changes.deleted_files = previous
            .keys()
            .filter(|p| !current.contains_key(*p))
            .cloned()
            .collect();

        changes
    }
}
