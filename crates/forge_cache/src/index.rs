//! Per-entry index files.
//!
//! Every stored entry describes itself in `objects/<fingerprint>/entry.json`,
//! next to its blobs. The file is written into the staging directory before
//! the directory is renamed into place, so an entry becomes visible together
//! with its blobs. Processes sharing a cache root never rewrite each other's
//! entries; the set of entries is whatever a scan of `objects/` finds.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use forge_common::{BuildConfig, ContentHash, Platform};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

/// Name of the index file inside each object directory.
pub const ENTRY_FILE: &str = "entry.json";

/// Current entry format version. An entry of another version is unindexed.
pub const INDEX_FORMAT_VERSION: u32 = 1;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// One stored build result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The fingerprint this entry is stored under.
    pub fingerprint: Fingerprint,

    /// Name of the target that produced it.
    pub target: String,

    /// Configuration the artifacts were built with.
    pub config: BuildConfig,

    /// Command line that produced the artifacts.
    pub command: Vec<String>,

    /// Stored artifact files.
    pub artifacts: Vec<StoredArtifact>,

    /// Sum of the uncompressed artifact sizes.
    pub total_size: u64,

    /// When the entry was stored.
    pub created_at: DateTime<Utc>,

    /// When the entry was last returned by a lookup.
    #[serde(default)]
    pub last_hit: Option<DateTime<Utc>>,

    /// How many lookups returned this entry.
    #[serde(default)]
    pub hit_count: u64,
}

impl CacheEntry {
    /// Returns the platform the entry was built for.
    pub fn platform(&self) -> Platform {
        self.config.platform
    }

    /// Returns the last time the entry was useful: its last hit, else its creation.
    pub fn last_used(&self) -> DateTime<Utc> {
        self.last_hit.unwrap_or(self.created_at)
    }
}

/// One artifact file stored as a blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    /// Path relative to the target's output directory.
    pub path: PathBuf,

    /// Blob file name within `objects/<fingerprint>/`.
    pub blob: String,

    /// Uncompressed size in bytes.
    pub size: u64,

    /// Checksum of the uncompressed contents.
    pub checksum: ContentHash,
}

#[derive(Serialize, Deserialize)]
struct EntryFile {
    format_version: u32,
    entry: CacheEntry,
}

/// Reads the entry stored in `object_dir`.
///
/// Returns `Ok(None)` when the directory has no entry file or the file was
/// written by another format version, and an error when it cannot be read,
/// does not parse, or names a different fingerprint.
pub fn load_entry(object_dir: &Path, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CacheError> {
    let path = object_dir.join(ENTRY_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CacheError::Io { path, source: e }),
    };

    let parse_error = |reason: String| CacheError::EntryParse {
        path: path.clone(),
        reason,
    };
    let value: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| parse_error(e.to_string()))?;
    let version = value.get("format_version").and_then(|v| v.as_u64());
    if version != Some(u64::from(INDEX_FORMAT_VERSION)) {
        return Ok(None);
    }

    let file: EntryFile = serde_json::from_value(value).map_err(|e| parse_error(e.to_string()))?;
    if file.entry.fingerprint != *fingerprint {
        return Err(parse_error(format!(
            "entry is for {}, expected {fingerprint}",
            file.entry.fingerprint
        )));
    }
    Ok(Some(file.entry))
}

/// Atomically writes `entry` into `object_dir`.
pub fn save_entry(object_dir: &Path, entry: &CacheEntry) -> Result<(), CacheError> {
    let file = EntryFile {
        format_version: INDEX_FORMAT_VERSION,
        entry: entry.clone(),
    };
    let json = serde_json::to_string_pretty(&file).map_err(|e| CacheError::Serialization {
        reason: e.to_string(),
    })?;
    write_atomic(&object_dir.join(ENTRY_FILE), json.as_bytes())
}

/// An object directory without a readable entry of the current format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnindexedObject {
    /// Fingerprint named by the directory.
    pub fingerprint: Fingerprint,
    /// Bytes on disk.
    pub size: u64,
}

/// Snapshot of `objects/` at the time of a scan.
#[derive(Debug, Clone, Default)]
pub struct CacheIndex {
    /// Readable entries.
    pub entries: BTreeMap<Fingerprint, CacheEntry>,
    /// Object directories that no entry describes.
    pub unindexed: Vec<UnindexedObject>,
}

impl CacheIndex {
    /// Scans `objects_dir`. Staging directories and names that are not
    /// fingerprints are ignored.
    pub fn scan(objects_dir: &Path) -> Result<Self, CacheError> {
        let mut index = Self::default();
        let dir = match std::fs::read_dir(objects_dir) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(index),
            Err(e) => {
                return Err(CacheError::Io {
                    path: objects_dir.to_path_buf(),
                    source: e,
                })
            }
        };

        for item in dir.flatten() {
            let path = item.path();
            let Ok(fingerprint) = item.file_name().to_string_lossy().parse::<Fingerprint>() else {
                continue;
            };
            if !path.is_dir() {
                continue;
            }
            match load_entry(&path, &fingerprint) {
                Ok(Some(entry)) => {
                    index.entries.insert(fingerprint, entry);
                }
                Ok(None) => index.unindexed.push(UnindexedObject {
                    fingerprint,
                    size: disk_size(&path),
                }),
                Err(e) => {
                    warn!(%fingerprint, error = %e, "unreadable cache entry");
                    index.unindexed.push(UnindexedObject {
                        fingerprint,
                        size: disk_size(&path),
                    });
                }
            }
        }
        Ok(index)
    }

    /// Returns the sum of all entries' sizes.
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.total_size).sum()
    }

    /// Returns the bytes held by unindexed object directories.
    pub fn unindexed_size(&self) -> u64 {
        self.unindexed.iter().map(|o| o.size).sum()
    }
}

/// Bytes of every file under `path`.
pub(crate) fn disk_size(path: &Path) -> u64 {
    let Ok(meta) = std::fs::symlink_metadata(path) else {
        return 0;
    };
    if !meta.is_dir() {
        return meta.len();
    }
    std::fs::read_dir(path)
        .map(|dir| dir.flatten().map(|e| disk_size(&e.path())).sum())
        .unwrap_or(0)
}

/// Writes `data` to a sibling temporary file, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(
        ".{file_name}.tmp-{}-{}",
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&tmp, data).map_err(|e| CacheError::Io {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })
}
