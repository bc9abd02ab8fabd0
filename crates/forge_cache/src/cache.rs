//! High-level build cache.
//!
//! [`BuildCache`] ties the entry files, the blob store and the build history
//! into a single interface for the scheduler. Layout under the cache root:
//!
//! ```text
//! objects/<fp>/entry.json  the entry: artifacts, config, hit statistics
//! objects/<fp>/<n>.blob    one blob per artifact file
//! history/<target>-<cfg>.json
//! ```
//!
//! There is no shared index file. Every read or write of an entry happens
//! under that fingerprint's lock from a concurrent lock table, so targets with
//! different fingerprints never wait on each other, and several processes can
//! share one root without overwriting each other's entries. Locks are dropped
//! from the table once nobody holds them.
//!
//! If the root cannot be opened the cache runs degraded: lookups miss and
//! writes return [`CacheError::Degraded`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use forge_common::{BuildConfig, Platform};
use tracing::{debug, info, warn};

use crate::artifact::{blob_name, expand_artifacts, BlobStore};
use crate::error::CacheError;
use crate::fingerprint::Fingerprint;
use crate::history::{BuildRecord, HistoryStore};
use crate::index::{load_entry, save_entry, CacheEntry, CacheIndex, StoredArtifact};

/// Subdirectory of the cache root holding blob directories.
const OBJECTS_DIR: &str = "objects";

/// Prefix of in-progress object directories.
const STAGING_PREFIX: &str = ".staging-";

/// Staging directories younger than this may belong to another process's
/// write in progress and survive [`BuildCache::gc`].
const STAGING_GRACE: Duration = Duration::from_secs(60 * 60);

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Describes how a cache entry was produced.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    /// Target name.
    pub target: String,
    /// Configuration the artifacts were built with.
    pub config: BuildConfig,
    /// Command line that produced them.
    pub command: Vec<String>,
}

/// Limits applied by [`BuildCache::evict`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictionPolicy {
    /// Evict least-recently-hit entries until the total size fits.
    pub max_total_bytes: Option<u64>,
    /// Evict entries whose last use is older than this.
    pub max_age: Option<Duration>,
}

/// Outcome of an eviction or clear pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionSummary {
    /// Fingerprints that were removed.
    pub removed: Vec<Fingerprint>,
    /// Bytes freed: artifact sizes for entries, disk usage for unindexed objects.
    pub freed_bytes: u64,
    /// Entries left alone because a lookup or store held their lock.
    pub skipped_locked: usize,
}

/// Per-platform share of the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformStats {
    /// Number of entries.
    pub entries: usize,
    /// Sum of the entries' sizes.
    pub size_bytes: u64,
}

/// Summary of the cache contents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Cache root directory.
    pub root: PathBuf,
    /// Sum of all entries' sizes.
    pub total_size_bytes: u64,
    /// Number of entries.
    pub entry_count: usize,
    /// Breakdown by platform.
    pub per_platform: BTreeMap<Platform, PlatformStats>,
    /// Disk usage of object directories without a readable entry.
    pub unindexed_bytes: u64,
    /// Set when the cache is running degraded.
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Removed,
    Busy,
    Kept,
}

/// Persistent fingerprint to artifact store.
pub struct BuildCache {
    root: PathBuf,
    blobs: BlobStore,
    history: HistoryStore,
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
    degraded: Option<String>,
}

impl BuildCache {
    /// Opens the cache at `root`, creating it if needed.
    ///
    /// Never fails: a root that cannot be created yields a degraded cache
    /// and a warning.
    pub fn open(root: &Path, producer_version: &str) -> Self {
        let objects = root.join(OBJECTS_DIR);
        let degraded = match std::fs::create_dir_all(&objects) {
            Ok(()) => None,
            Err(e) => {
                let err = CacheError::Io {
                    path: objects,
                    source: e,
                };
                warn!(root = %root.display(), error = %err, "build cache unavailable, continuing without it");
                Some(err.to_string())
            }
        };

        Self {
            root: root.to_path_buf(),
            blobs: BlobStore::new(producer_version),
            history: HistoryStore::new(root),
            locks: DashMap::new(),
            degraded,
        }
    }

    /// Returns the cache root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns why the cache is degraded, if it is.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded.as_deref()
    }

    /// Returns `true` if every lookup will miss.
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }

    /// Looks up an entry and records the hit in its entry file.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        if self.is_degraded() {
            return None;
        }
        self.with_lock(fingerprint, || {
            let dir = self.object_dir(fingerprint);
            let mut entry = match load_entry(&dir, fingerprint) {
                Ok(Some(entry)) => entry,
                Ok(None) => return None,
                Err(e) => {
                    warn!(%fingerprint, error = %e, "corrupt cache entry, dropping it");
                    self.remove_objects(fingerprint);
                    return None;
                }
            };

            entry.last_hit = Some(Utc::now());
            entry.hit_count += 1;
            if let Err(e) = save_entry(&dir, &entry) {
                warn!(%fingerprint, error = %e, "failed to record cache hit");
            }
            debug!(%fingerprint, target = %entry.target, hits = entry.hit_count, "cache hit");
            Some(entry)
        })
    }

    /// Stores the artifacts of a successful build under `fingerprint`.
    ///
    /// `artifacts` are files or directories relative to `output_root`. If an
    /// entry for the fingerprint already exists the call is a no-op returning
    /// it. Blobs and the entry file are staged in a private directory and
    /// renamed into place, so a crash mid-write never leaves a visible
    /// partial entry.
    pub fn put(
        &self,
        fingerprint: &Fingerprint,
        metadata: EntryMetadata,
        output_root: &Path,
        artifacts: &[PathBuf],
    ) -> Result<CacheEntry, CacheError> {
        if let Some(reason) = &self.degraded {
            return Err(CacheError::Degraded {
                reason: reason.clone(),
            });
        }
        self.with_lock(fingerprint, || {
            self.put_locked(fingerprint, metadata, output_root, artifacts)
        })
    }

    fn put_locked(
        &self,
        fingerprint: &Fingerprint,
        metadata: EntryMetadata,
        output_root: &Path,
        artifacts: &[PathBuf],
    ) -> Result<CacheEntry, CacheError> {
        let final_dir = self.object_dir(fingerprint);
        if let Ok(Some(existing)) = load_entry(&final_dir, fingerprint) {
            debug!(%fingerprint, "entry already stored by another writer");
            return Ok(existing);
        }

        let files = expand_artifacts(output_root, artifacts)?;
        let staging = self.root.join(OBJECTS_DIR).join(format!(
            "{STAGING_PREFIX}{fingerprint}-{}-{}",
            std::process::id(),
            STAGING_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let stored = match self.write_blobs(&staging, output_root, &files) {
            Ok(stored) => stored,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&staging);
                return Err(e);
            }
        };

        let entry = CacheEntry {
            fingerprint: *fingerprint,
            target: metadata.target,
            config: metadata.config,
            command: metadata.command,
            total_size: stored.iter().map(|a| a.size).sum(),
            artifacts: stored,
            created_at: Utc::now(),
            last_hit: None,
            hit_count: 0,
        };
        if let Err(e) = save_entry(&staging, &entry) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        if final_dir.exists() {
            if let Ok(Some(existing)) = load_entry(&final_dir, fingerprint) {
                let _ = std::fs::remove_dir_all(&staging);
                return Ok(existing);
            }
            // No readable entry: left over from an interrupted or older writer.
            let _ = std::fs::remove_dir_all(&final_dir);
        }
        if let Err(e) = std::fs::rename(&staging, &final_dir) {
            let _ = std::fs::remove_dir_all(&staging);
            // Another process may have renamed its copy into place first.
            if let Ok(Some(existing)) = load_entry(&final_dir, fingerprint) {
                return Ok(existing);
            }
            return Err(CacheError::Io {
                path: final_dir,
                source: e,
            });
        }

        info!(
            %fingerprint,
            target = %entry.target,
            files = entry.artifacts.len(),
            bytes = entry.total_size,
            "stored build artifacts"
        );
        Ok(entry)
    }

    fn write_blobs(
        &self,
        staging: &Path,
        output_root: &Path,
        files: &[PathBuf],
    ) -> Result<Vec<StoredArtifact>, CacheError> {
        std::fs::create_dir_all(staging).map_err(|e| CacheError::Io {
            path: staging.to_path_buf(),
            source: e,
        })?;
        files
            .iter()
            .enumerate()
            .map(|(n, rel)| -> Result<StoredArtifact, CacheError> {
                let source = output_root.join(rel);
                let data = std::fs::read(&source).map_err(|e| CacheError::Io {
                    path: source.clone(),
                    source: e,
                })?;
                let blob = blob_name(n);
                let info = self.blobs.write_blob(&staging.join(&blob), &data)?;
                Ok(StoredArtifact {
                    path: rel.clone(),
                    blob,
                    size: info.size,
                    checksum: info.checksum,
                })
            })
            .collect()
    }

    /// Reads every artifact of an entry into memory, validating each blob.
    ///
    /// A corrupt blob drops the whole entry and returns the error, so the
    /// next lookup misses.
    pub fn read_artifacts(&self, entry: &CacheEntry) -> Result<Vec<(PathBuf, Vec<u8>)>, CacheError> {
        self.with_lock(&entry.fingerprint, || self.read_locked(entry))
    }

    fn read_locked(&self, entry: &CacheEntry) -> Result<Vec<(PathBuf, Vec<u8>)>, CacheError> {
        let dir = self.object_dir(&entry.fingerprint);
        let result: Result<Vec<_>, CacheError> = entry
            .artifacts
            .iter()
            .map(|artifact| -> Result<(PathBuf, Vec<u8>), CacheError> {
                let data = self.blobs.read_blob(&dir.join(&artifact.blob))?;
                if data.len() as u64 != artifact.size {
                    return Err(CacheError::InvalidHeader {
                        path: dir.join(&artifact.blob),
                        reason: format!("expected {} bytes, read {}", artifact.size, data.len()),
                    });
                }
                Ok((artifact.path.clone(), data))
            })
            .collect();

        if let Err(e) = &result {
            warn!(fingerprint = %entry.fingerprint, error = %e, "corrupt cache entry, dropping it");
            self.remove_objects(&entry.fingerprint);
        }
        result
    }

    /// Writes an entry's artifacts into `out_dir`, returning the restored paths.
    ///
    /// Every blob is validated before anything is written.
    pub fn restore(&self, entry: &CacheEntry, out_dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
        let contents = self.with_lock(&entry.fingerprint, || self.read_locked(entry))?;

        let mut restored = Vec::with_capacity(contents.len());
        for (rel, data) in contents {
            let dest = out_dir.join(&rel);
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent).map_err(|e| CacheError::Io {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            std::fs::write(&dest, &data).map_err(|e| CacheError::Io {
                path: dest.clone(),
                source: e,
            })?;
            restored.push(dest);
        }
        debug!(fingerprint = %entry.fingerprint, files = restored.len(), out = %out_dir.display(), "restored artifacts");
        Ok(restored)
    }

    /// Evicts unindexed objects, then entries by age, then by least-recent
    /// use until under budget.
    ///
    /// Entries whose lock is currently held are skipped.
    pub fn evict(&self, policy: &EvictionPolicy) -> Result<EvictionSummary, CacheError> {
        let mut summary = EvictionSummary::default();
        if self.is_degraded() {
            return Ok(summary);
        }

        let index = self.scan()?;
        let mut total = index.total_size() + index.unindexed_size();

        for object in &index.unindexed {
            match self.try_remove(&object.fingerprint, true) {
                Removal::Removed => {
                    total = total.saturating_sub(object.size);
                    summary.freed_bytes += object.size;
                    summary.removed.push(object.fingerprint);
                }
                Removal::Busy => summary.skipped_locked += 1,
                Removal::Kept => {}
            }
        }

        let mut candidates: Vec<(Fingerprint, u64, chrono::DateTime<Utc>)> = index
            .entries
            .values()
            .map(|e| (e.fingerprint, e.total_size, e.last_used()))
            .collect();
        candidates.sort_by_key(|(fp, _, used)| (*used, *fp));

        let cutoff = policy
            .max_age
            .and_then(|age| chrono::Duration::from_std(age).ok())
            .and_then(|age| Utc::now().checked_sub_signed(age));

        for (fingerprint, size, used) in candidates {
            let expired = cutoff.is_some_and(|cutoff| used < cutoff);
            let over_budget = policy.max_total_bytes.is_some_and(|max| total > max);
            if !expired && !over_budget {
                continue;
            }
            match self.try_remove(&fingerprint, false) {
                Removal::Removed => {
                    total = total.saturating_sub(size);
                    summary.freed_bytes += size;
                    summary.removed.push(fingerprint);
                }
                Removal::Busy | Removal::Kept => summary.skipped_locked += 1,
            }
        }

        if !summary.removed.is_empty() {
            info!(
                removed = summary.removed.len(),
                freed_bytes = summary.freed_bytes,
                skipped = summary.skipped_locked,
                "evicted cache entries"
            );
        }
        Ok(summary)
    }

    /// Removes every entry, or only those built for `platform`.
    ///
    /// Clearing everything also deletes build records and orphaned objects.
    pub fn clear(&self, platform: Option<Platform>) -> Result<EvictionSummary, CacheError> {
        let mut summary = EvictionSummary::default();
        if let Some(reason) = &self.degraded {
            return Err(CacheError::Degraded {
                reason: reason.clone(),
            });
        }

        let index = self.scan()?;
        let targets = index
            .entries
            .values()
            .filter(|e| platform.map_or(true, |p| e.platform() == p));
        for entry in targets {
            match self.try_remove(&entry.fingerprint, false) {
                Removal::Removed => {
                    summary.freed_bytes += entry.total_size;
                    summary.removed.push(entry.fingerprint);
                }
                Removal::Busy | Removal::Kept => summary.skipped_locked += 1,
            }
        }

        if platform.is_none() {
            self.history.clear()?;
            self.gc()?;
        }
        info!(
            platform = platform.map(|p| p.as_str()).unwrap_or("all"),
            removed = summary.removed.len(),
            "cleared build cache"
        );
        Ok(summary)
    }

    /// Removes object directories without a readable entry, stale staging
    /// directories, and anything else under `objects/` that is not an entry.
    ///
    /// Returns the number of paths removed.
    pub fn gc(&self) -> Result<usize, CacheError> {
        if self.is_degraded() {
            return Ok(0);
        }
        let objects = self.root.join(OBJECTS_DIR);
        let items = match std::fs::read_dir(&objects) {
            Ok(items) => items,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(CacheError::Io {
                    path: objects,
                    source: e,
                })
            }
        };

        let mut removed = 0;
        for item in items.flatten() {
            let path = item.path();
            let name = item.file_name().to_string_lossy().into_owned();

            if let Some(rest) = name.strip_prefix(STAGING_PREFIX) {
                let busy = rest
                    .get(..32)
                    .and_then(|hex| hex.parse::<Fingerprint>().ok())
                    .is_some_and(|fp| self.try_with_lock(&fp, || ()).is_none());
                if busy || is_recent(&path) {
                    continue;
                }
            } else if let Ok(fingerprint) = name.parse::<Fingerprint>() {
                if path.is_dir() {
                    if self.try_remove(&fingerprint, true) == Removal::Removed {
                        debug!(path = %path.display(), "removed unindexed cache object");
                        removed += 1;
                    }
                    continue;
                }
            }

            let result = if path.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            result.map_err(|e| CacheError::Io {
                path: path.clone(),
                source: e,
            })?;
            debug!(path = %path.display(), "removed orphaned cache object");
            removed += 1;
        }
        Ok(removed)
    }

    /// Summarizes the cache contents.
    pub fn stats(&self) -> CacheStats {
        let index = self.scan_or_empty();
        let mut per_platform: BTreeMap<Platform, PlatformStats> = BTreeMap::new();
        for entry in index.entries.values() {
            let stats = per_platform.entry(entry.platform()).or_default();
            stats.entries += 1;
            stats.size_bytes += entry.total_size;
        }
        CacheStats {
            root: self.root.clone(),
            total_size_bytes: index.total_size(),
            entry_count: index.entries.len(),
            per_platform,
            unindexed_bytes: index.unindexed_size(),
            degraded: self.degraded.clone(),
        }
    }

    /// Returns every entry, most recently used first.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.scan_or_empty().entries.into_values().collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.last_used()));
        entries
    }

    /// Loads the last successful build record for a target.
    pub fn load_record(&self, target: &str, config: &BuildConfig) -> Option<BuildRecord> {
        if self.is_degraded() {
            return None;
        }
        self.history.load(target, config)
    }

    /// Stores the build record for a target.
    pub fn store_record(&self, config: &BuildConfig, record: &BuildRecord) -> Result<(), CacheError> {
        if let Some(reason) = &self.degraded {
            return Err(CacheError::Degraded {
                reason: reason.clone(),
            });
        }
        self.history.store(config, record)
    }

    fn scan(&self) -> Result<CacheIndex, CacheError> {
        CacheIndex::scan(&self.root.join(OBJECTS_DIR))
    }

    fn scan_or_empty(&self) -> CacheIndex {
        if self.is_degraded() {
            return CacheIndex::default();
        }
        self.scan().unwrap_or_else(|e| {
            warn!(root = %self.root.display(), error = %e, "cannot scan build cache");
            CacheIndex::default()
        })
    }

    fn object_dir(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(OBJECTS_DIR).join(fingerprint.to_string())
    }

    fn lock_for(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        self.locks.entry(*fingerprint).or_default().clone()
    }

    /// Drops `lock` and removes it from the table if no one else holds it.
    fn release(&self, fingerprint: &Fingerprint, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks
            .remove_if(fingerprint, |_, lock| Arc::strong_count(lock) == 1);
    }

    fn with_lock<R>(&self, fingerprint: &Fingerprint, f: impl FnOnce() -> R) -> R {
        let lock = self.lock_for(fingerprint);
        let result = {
            let _guard = acquire(&lock);
            f()
        };
        self.release(fingerprint, lock);
        result
    }

    /// Runs `f` under the fingerprint's lock, or returns `None` if it is held.
    fn try_with_lock<R>(&self, fingerprint: &Fingerprint, f: impl FnOnce() -> R) -> Option<R> {
        let lock = self.lock_for(fingerprint);
        let result = match lock.try_lock() {
            Ok(_guard) => Some(f()),
            Err(TryLockError::Poisoned(poisoned)) => {
                let _guard = poisoned.into_inner();
                Some(f())
            }
            Err(TryLockError::WouldBlock) => None,
        };
        self.release(fingerprint, lock);
        result
    }

    /// Deletes an object directory unless its lock is held. With
    /// `unindexed_only`, a directory that holds a readable entry is kept.
    fn try_remove(&self, fingerprint: &Fingerprint, unindexed_only: bool) -> Removal {
        let outcome = self.try_with_lock(fingerprint, || {
            let dir = self.object_dir(fingerprint);
            if unindexed_only && matches!(load_entry(&dir, fingerprint), Ok(Some(_))) {
                return Removal::Kept;
            }
            self.remove_objects(fingerprint);
            Removal::Removed
        });
        outcome.unwrap_or(Removal::Busy)
    }

    /// Deletes an object directory. The caller holds its lock.
    fn remove_objects(&self, fingerprint: &Fingerprint) {
        if let Err(e) = std::fs::remove_dir_all(self.object_dir(fingerprint)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(%fingerprint, error = %e, "failed to remove cache objects");
            }
        }
    }
}

fn acquire<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn is_recent(path: &Path) -> bool {
    match std::fs::metadata(path).and_then(|m| m.modified()) {
        Ok(modified) => modified.elapsed().map_or(true, |age| age < STAGING_GRACE),
        Err(_) => false,
    }
}
