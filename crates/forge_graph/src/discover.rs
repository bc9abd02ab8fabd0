//! Source file discovery under a target's roots.

use std::path::{Path, PathBuf};

use crate::error::GraphError;
use crate::language::SourceLanguage;

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "build", "dist"];

/// Discovers source files under `root` (recursive), sorted by path.
///
/// Only files with a recognized extension are returned. Hidden directories
/// and `node_modules`, `build` and `dist` are skipped. A root that is itself
/// a file is returned as-is if its extension is recognized.
pub fn discover_sources(root: &Path) -> Result<Vec<PathBuf>, GraphError> {
    let metadata = std::fs::metadata(root).map_err(|e| GraphError::Io {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    if metadata.is_file() {
        if SourceLanguage::detect(root).is_some() {
            files.push(root.to_path_buf());
        }
    } else {
        walk_dir(root, &mut files)?;
    }
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), GraphError> {
    let io = |e: std::io::Error| GraphError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let entry = entry.map_err(io)?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref()) {
                walk_dir(&path, files)?;
            }
        } else if SourceLanguage::detect(&path).is_some() {
            files.push(path);
        }
    }
    Ok(())
}
