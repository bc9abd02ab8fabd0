//! Cache failures.

use std::path::PathBuf;

/// Errors from storing, reading or maintaining cache entries.
///
/// Lookups never return these: a blob or entry file that fails to read turns
/// into a miss and the broken object directory is dropped. They reach callers
/// from `put`, maintenance commands, and hashing of declared source files.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading or writing a file under the cache root or an output directory failed.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// File or directory being accessed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// An `entry.json` is not valid JSON or describes another fingerprint.
    #[error("bad cache entry {path}: {reason}")]
    EntryParse {
        /// The entry file.
        path: PathBuf,
        /// Parser message.
        reason: String,
    },

    /// A blob is shorter than its header, lacks the `FRGB` magic, or its
    /// decoded size disagrees with the entry.
    #[error("invalid blob {path}: {reason}")]
    InvalidHeader {
        /// The blob file.
        path: PathBuf,
        /// What was wrong.
        reason: String,
    },

    /// The decompressed payload does not hash to the checksum in the blob header.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The blob file.
        path: PathBuf,
        /// Checksum in the header.
        expected: String,
        /// Checksum of the payload.
        actual: String,
    },

    /// The blob was written with another blob format version.
    #[error("blob format {actual} in {path}, this build reads {expected}")]
    VersionMismatch {
        /// The blob file.
        path: PathBuf,
        /// Version this build reads.
        expected: u32,
        /// Version found.
        actual: u32,
    },

    /// Encoding an entry file or blob header failed.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Encoder message.
        reason: String,
    },

    /// A path the toolchain reported as an artifact is not in the output directory.
    #[error("artifact not found: {path}")]
    MissingArtifact {
        /// The missing path.
        path: PathBuf,
    },

    /// The cache root could not be opened. Lookups miss and writes are refused.
    #[error("cache is unavailable: {reason}")]
    Degraded {
        /// Why the root could not be opened.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_names_the_path() {
        let err = CacheError::Io {
            path: PathBuf::from("/p/.forge/cache/objects/ab/0.blob"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("cache I/O error"));
        assert!(msg.contains("objects/ab/0.blob"));
    }

    #[test]
    fn checksum_mismatch_shows_both_sums() {
        let err = CacheError::ChecksumMismatch {
            path: PathBuf::from("0.blob"),
            expected: "aabb".to_string(),
            actual: "ccdd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("aabb"));
        assert!(msg.contains("ccdd"));
    }

    #[test]
    fn version_mismatch_display() {
        let err = CacheError::VersionMismatch {
            path: PathBuf::from("old.blob"),
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "blob format 1 in old.blob, this build reads 2");
    }

    #[test]
    fn entry_parse_display() {
        let err = CacheError::EntryParse {
            path: PathBuf::from("objects/ab/entry.json"),
            reason: "expected value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "bad cache entry objects/ab/entry.json: expected value"
        );
    }
}
