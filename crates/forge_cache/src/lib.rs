//! Content-addressed build artifact caching.
//!
//! This crate fingerprints a target's inputs, stores the artifacts of
//! successful builds under that fingerprint, and restores them on later runs
//! with identical inputs. It also keeps the per-target build records used to
//! scope incremental rebuilds.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod error;
pub mod fingerprint;
pub mod hasher;
pub mod history;
pub mod index;

pub use cache::{BuildCache, CacheStats, EntryMetadata, EvictionPolicy, EvictionSummary, PlatformStats};
pub use error::CacheError;
pub use fingerprint::{fingerprint, Fingerprint};
pub use hasher::{ChangeSet, SourceFile, SourceHasher};
pub use history::{BuildRecord, HistoryStore};
pub use index::{CacheEntry, CacheIndex, StoredArtifact, UnindexedObject};
