//! Cache key computation for one target build.
//!
//! A fingerprint covers three inputs:
//! - every `(path, content hash)` pair of the target's dependency graph,
//!   ordered by path
//! - the canonical form of the [`BuildConfig`]
//! - the toolchain version string
//!
//! Each field is framed by [`ContentHasher`], so two different input sets can
//! only collide through a genuine XXH3-128 collision. That residual risk is
//! accepted for a local cache.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use forge_common::{BuildConfig, ContentHash, ContentHasher, ParseHashError};
use serde::{Deserialize, Serialize};

/// Bumped whenever the set or framing of hashed fields changes.
const FINGERPRINT_SCHEME: &[u8] = b"forge-fingerprint-v1";

/// The cache key of one (source set, config, toolchain) combination.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(ContentHash);

impl Fingerprint {
    /// Wraps an existing hash.
    pub fn from_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Returns the underlying hash.
    pub fn hash(&self) -> ContentHash {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.0.to_string()[..12])
    }
}

impl FromStr for Fingerprint {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Computes the fingerprint of a target build.
///
/// `files` may arrive in any order; they are sorted by path before hashing.
/// Paths are hashed with `/` separators so a key computed on Windows matches
/// the same tree on Unix.
pub fn fingerprint<'a, I>(files: I, config: &BuildConfig, toolchain_version: &str) -> Fingerprint
where
    I: IntoIterator<Item = (&'a Path, ContentHash)>,
{
    let mut files: Vec<(String, ContentHash)> = files
        .into_iter()
        .map(|(path, hash)| (normalize(path), hash))
        .collect();
    files.sort();

    let mut hasher = ContentHasher::new();
    hasher.field("scheme", FINGERPRINT_SCHEME);
    hasher.field("file.count", &(files.len() as u64).to_le_bytes());
    for (path, hash) in &files {
        hasher.field("file.path", path.as_bytes());
        hasher.field("file.hash", hash.as_bytes());
    }
    config.hash_into(&mut hasher);
    hasher.field("toolchain", toolchain_version.as_bytes());
    Fingerprint(hasher.finish())
}

fn normalize(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
