//! Incremental change analysis over a dependency graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use forge_cache::SourceHasher;
use forge_common::ContentHash;
use petgraph::graph::NodeIndex;
use petgraph::Direction;

use crate::graph::{relative_to, DependencyGraph, NodeKey};

/// Files that must be reconsidered since the last successful build.
///
/// Paths are relative to the base directory passed to [`affected_set`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffectedSet {
    /// New or modified files.
    pub changed: Vec<PathBuf>,
    /// Files present in the previous record but gone now.
    pub deleted: Vec<PathBuf>,
    /// Changed files plus every file that transitively imports one,
    /// or imported a deleted file.
    pub affected: BTreeSet<PathBuf>,
    /// `true` when there was no previous record and everything is affected.
    pub full: bool,
}

impl AffectedSet {
    /// Returns `true` if nothing changed.
    pub fn is_empty(&self) -> bool {
        self.affected.is_empty() && self.deleted.is_empty()
    }

    /// Returns the number of affected files.
    pub fn len(&self) -> usize {
        self.affected.len()
    }

    /// Returns `true` if `path` (relative to the base) is affected.
    pub fn contains(&self, path: &Path) -> bool {
        self.affected.contains(path)
    }
}

/// Computes the files affected by changes since `previous`.
///
/// `previous` maps paths relative to `base` to their hashes at the last
/// successful build. Without a record, every file is affected.
pub fn affected_set(
    graph: &DependencyGraph,
    base: &Path,
    previous: Option<&BTreeMap<PathBuf, ContentHash>>,
) -> AffectedSet {
    let current = graph.file_hashes(base);

    let Some(previous) = previous else {
        return AffectedSet {
            changed: current.keys().cloned().collect(),
            deleted: Vec::new(),
            affected: current.into_keys().collect(),
            full: true,
        };
    };

    let changes = SourceHasher::detect_changes(&current, previous);
    let inner = graph.inner();

    let mut seeds: Vec<NodeIndex> = Vec::new();
    let mut changed = Vec::new();
    for idx in inner.node_indices() {
        match &inner[idx].key {
            NodeKey::File(path) => {
                let rel = relative_to(base, path);
                if changes.new_files.contains(&rel) || changes.modified_files.contains(&rel) {
                    seeds.push(idx);
                }
            }
            NodeKey::Unresolved(candidate) => {
                let hit = changes
                    .deleted_files
                    .iter()
                    .any(|d| points_at(candidate, &base.join(d)));
                if hit {
                    seeds.push(idx);
                }
            }
            NodeKey::Module(_) => {}
        }
    }
    changed.extend(changes.new_files.iter().cloned());
    changed.extend(changes.modified_files.iter().cloned());
    changed.sort();

    let mut seen: BTreeSet<NodeIndex> = seeds.iter().copied().collect();
    let mut queue: VecDeque<NodeIndex> = seeds.into_iter().collect();
    while let Some(idx) = queue.pop_front() {
        for importer in inner.neighbors_directed(idx, Direction::Incoming) {
            if seen.insert(importer) {
                queue.push_back(importer);
            }
        }
    }

    let affected = seen
        .into_iter()
        .filter_map(|idx| inner[idx].key.as_file().map(|p| relative_to(base, p)))
        .collect();

    AffectedSet {
        changed,
        deleted: changes.deleted_files,
        affected,
        full: false,
    }
}

/// Whether an unresolved import candidate referred to `deleted`: the exact
/// path, the path without its extension, or its directory for index files.
fn points_at(candidate: &Path, deleted: &Path) -> bool {
    if candidate == deleted || candidate == deleted.with_extension("") {
        return true;
    }
    let is_index = deleted.file_stem() == Some(OsStr::new("index"));
    is_index && deleted.parent() == Some(candidate)
}
