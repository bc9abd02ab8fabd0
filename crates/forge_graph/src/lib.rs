//! Source dependency graphs for build targets.
//!
//! Discovers the source files under a target's roots, parses their import
//! statements, and assembles a [`DependencyGraph`] whose edges point from an
//! importing file to the file or module it imports. The graph rejects import
//! cycles and answers which files are affected by a set of changes.

#![warn(missing_docs)]

pub mod affected;
pub mod discover;
pub mod error;
pub mod graph;
pub mod imports;
pub mod language;

pub use affected::{affected_set, AffectedSet};
pub use discover::discover_sources;
pub use error::GraphError;
pub use graph::{build_graph, DependencyGraph, DependencyNode, NodeKey};
pub use imports::{parse_imports, ImportRef, ImportStyle};
pub use language::SourceLanguage;
