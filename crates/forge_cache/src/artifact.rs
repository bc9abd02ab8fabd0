//! Compressed, checksummed blob files.
//!
//! Every cached artifact is stored as one blob: a little-endian `u32` header
//! length, a bincode-encoded [`BlobHeader`], then the gzip-compressed file
//! contents. The header checksum covers the uncompressed bytes, so a blob that
//! decompresses cleanly but to the wrong content is still rejected.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use forge_common::ContentHash;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a Forge blob.
const BLOB_MAGIC: [u8; 4] = *b"FRGB";

/// Current blob format version.
pub const BLOB_FORMAT_VERSION: u32 = 1;

/// File extension for blobs.
pub const BLOB_EXT: &str = "blob";

/// Header prepended to every blob for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobHeader {
    /// Magic bytes: must be `b"FRGB"`.
    pub magic: [u8; 4],

    /// Blob format version.
    pub format_version: u32,

    /// Forge version that wrote the blob.
    pub producer_version: String,

    /// Size of the uncompressed payload.
    pub size: u64,

    /// Content hash of the uncompressed payload.
    pub checksum: ContentHash,
}

/// Summary of a written blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobInfo {
    /// Uncompressed size in bytes.
    pub size: u64,
    /// Checksum of the uncompressed payload.
    pub checksum: ContentHash,
}

/// Reads and writes blob files.
pub struct BlobStore {
    producer_version: String,
}

impl BlobStore {
    /// Creates a blob store that stamps blobs with `producer_version`.
    pub fn new(producer_version: &str) -> Self {
        Self {
            producer_version: producer_version.to_string(),
        }
    }

    /// Encodes `data` and writes it to `path`.
    pub fn write_blob(&self, path: &Path, data: &[u8]) -> Result<BlobInfo, CacheError> {
        let checksum = ContentHash::from_bytes(data);
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            producer_version: self.producer_version.clone(),
            size: data.len() as u64,
            checksum,
        };

        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let io = |e: std::io::Error| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        };
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(io)?;
        let compressed = encoder.finish().map_err(io)?;

        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&compressed);
        std::fs::write(path, &output).map_err(io)?;

        Ok(BlobInfo {
            size: header.size,
            checksum,
        })
    }

    /// Reads a blob and returns its validated, decompressed payload.
    pub fn read_blob(&self, path: &Path) -> Result<Vec<u8>, CacheError> {
        let raw = std::fs::read(path).map_err(|e| CacheError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("file shorter than header length prefix"));
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        if raw.len() < 4 + header_len {
            return Err(invalid("truncated header"));
        }

        let (header, _): (BlobHeader, usize) =
            bincode::serde::decode_from_slice(&raw[4..4 + header_len], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?;

        if header.magic != BLOB_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != BLOB_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path: path.to_path_buf(),
                expected: BLOB_FORMAT_VERSION,
                actual: header.format_version,
            });
        }

        let mut payload = Vec::with_capacity(header.size as usize);
        GzDecoder::new(&raw[4 + header_len..])
            .read_to_end(&mut payload)
            .map_err(|e| invalid(&format!("payload does not decompress: {e}")))?;

        let actual = ContentHash::from_bytes(&payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path: path.to_path_buf(),
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(payload)
    }
}

/// Returns the blob file name for the `index`-th artifact of an entry.
pub fn blob_name(index: usize) -> String {
    format!("{index}.{BLOB_EXT}")
}

/// Expands `paths` (files or directories, relative to `root`) into a sorted
/// list of relative file paths.
pub fn expand_artifacts(root: &Path, paths: &[PathBuf]) -> Result<Vec<PathBuf>, CacheError> {
    let mut files = Vec::new();
    for rel in paths {
        let full = root.join(rel);
        if full.is_dir() {
            walk_dir(root, &full, &mut files)?;
        } else if full.is_file() {
            files.push(rel.clone());
        } else {
            return Err(CacheError::MissingArtifact { path: full });
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Recursively collects files under `dir` as paths relative to `root`.
fn walk_dir(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), CacheError> {
    let io = |e: std::io::Error| CacheError::Io {
        path: dir.to_path_buf(),
        source: e,
    };
    for entry in std::fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_dir() {
            walk_dir(root, &path, files)?;
        } else if let Ok(rel) = path.strip_prefix(root) {
            files.push(rel.to_path_buf());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_raw(path: &Path, header: &BlobHeader, payload: &[u8]) {
        let header_bytes =
            bincode::serde::encode_to_vec(header, bincode::config::standard()).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();
        let mut out = (header_bytes.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(&header_bytes);
        out.extend_from_slice(&compressed);
        std::fs::write(path, out).unwrap();
    }

    #[test]
    fn write_and_read_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join(blob_name(0));
        let data = b"hello artifact world, hello artifact world";

        let info = store.write_blob(&path, data).unwrap();
        assert_eq!(info.size, data.len() as u64);
        assert_eq!(info.checksum, ContentHash::from_bytes(data));
        assert_eq!(store.read_blob(&path).unwrap(), data);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("empty.blob");
        store.write_blob(&path, b"").unwrap();
        assert!(store.read_blob(&path).unwrap().is_empty());
    }

    #[test]
    fn read_missing_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let err = store.read_blob(&dir.path().join("nope.blob")).unwrap_err();
        assert!(matches!(err, CacheError::Io { .. }));
    }

    #[test]
    fn garbage_is_invalid_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("garbage.blob");
        std::fs::write(&path, b"garbage data").unwrap();
        assert!(matches!(
            store.read_blob(&path).unwrap_err(),
            CacheError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn wrong_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("magic.blob");
        let header = BlobHeader {
            magic: *b"BAAD",
            format_version: BLOB_FORMAT_VERSION,
            producer_version: "0.1.0".to_string(),
            size: 4,
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&path, &header, b"data");
        assert!(matches!(
            store.read_blob(&path).unwrap_err(),
            CacheError::InvalidHeader { .. }
        ));
    }

    #[test]
    fn wrong_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("old.blob");
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION + 1,
            producer_version: "9.9.9".to_string(),
            size: 4,
            checksum: ContentHash::from_bytes(b"data"),
        };
        write_raw(&path, &header, b"data");
        assert!(matches!(
            store.read_blob(&path).unwrap_err(),
            CacheError::VersionMismatch { .. }
        ));
    }

    #[test]
    fn checksum_mismatch_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("tampered.blob");
        let header = BlobHeader {
            magic: BLOB_MAGIC,
            format_version: BLOB_FORMAT_VERSION,
            producer_version: "0.1.0".to_string(),
            size: 8,
            checksum: ContentHash::from_bytes(b"original"),
        };
        write_raw(&path, &header, b"tampered");
        assert!(matches!(
            store.read_blob(&path).unwrap_err(),
            CacheError::ChecksumMismatch { .. }
        ));
    }

    #[test]
    fn truncated_payload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::new("0.1.0");
        let path = dir.path().join("short.blob");
        store.write_blob(&path, &[7u8; 4096]).unwrap();
        let raw = std::fs::read(&path).unwrap();
        std::fs::write(&path, &raw[..raw.len() - 10]).unwrap();
        assert!(store.read_blob(&path).is_err());
    }

    #[test]
    fn expand_walks_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("Demo.app/Contents")).unwrap();
        std::fs::write(root.join("Demo.app/Contents/Info.plist"), "plist").unwrap();
        std::fs::write(root.join("Demo.app/binary"), "bin").unwrap();
        std::fs::write(root.join("notes.txt"), "n").unwrap();

        let files =
            expand_artifacts(root, &[PathBuf::from("Demo.app"), PathBuf::from("notes.txt")])
                .unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("Demo.app/Contents/Info.plist"),
                PathBuf::from("Demo.app/binary"),
                PathBuf::from("notes.txt"),
            ]
        );
    }

    #[test]
    fn expand_missing_artifact_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = expand_artifacts(dir.path(), &[PathBuf::from("app.apk")]).unwrap_err();
        assert!(matches!(err, CacheError::MissingArtifact { .. }));
    }
}
