//! Error types for graph construction.

use std::path::PathBuf;

use forge_cache::CacheError;

/// Errors that can occur while building a dependency graph.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// A source root or source file could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The import graph contains a cycle.
    #[error("cyclic dependency between {}", format_members(.members))]
    CyclicDependency {
        /// Every file that takes part in the cycle, sorted.
        members: Vec<PathBuf>,
    },
}

impl From<CacheError> for GraphError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Io { path, source } => GraphError::Io { path, source },
            other => GraphError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other(other.to_string()),
            },
        }
    }
}

fn format_members(members: &[PathBuf]) -> String {
    members
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}
