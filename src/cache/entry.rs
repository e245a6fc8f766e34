//! Per-file cache entries and the metadata/hash validation primitives.
//!
//! A [`SourceFileMeta`] pins down a file's on-disk state at the moment its
//! symbols were last computed: `(mtime, size)` for the cheap fast path and
//! a SHA-256 content hash for the slow, authoritative comparison. The fast
//! path never reads file content; the hash path exists to absorb `touch`
//! and git checkouts that reset mtimes while restoring identical bytes.

use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::Symbol;

/// Live `(mtime, size)` observation of a file, read via one `stat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Modification time seconds since UNIX_EPOCH
    pub mtime_secs: u64,
    /// Modification time nanoseconds component
    pub mtime_nanos: u32,
    /// File size in bytes
    pub size_bytes: u64,
}

impl FileStat {
    /// Stat a live file. Fails for missing/unreadable paths; callers treat
    /// that as the file being gone, never as a cache decision.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta.modified()?;
        let duration = mtime
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default();
        Ok(Self {
            mtime_secs: duration.as_secs(),
            mtime_nanos: duration.subsec_nanos(),
            size_bytes: meta.len(),
        })
    }
}

/// SHA-256 of file content as a lowercase hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A file's on-disk identity at the moment symbols were last computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileMeta {
    /// Repo-relative path; the unique cache key
    pub path: String,
    /// Modification time seconds since UNIX_EPOCH
    pub mtime_secs: u64,
    /// Modification time nanoseconds component
    pub mtime_nanos: u32,
    /// File size in bytes
    pub size_bytes: u64,
    /// SHA-256 hex of the content the symbols were extracted from
    pub content_hash: String,
}

impl SourceFileMeta {
    /// Fast-path check: does the stored metadata match the live stat?
    pub fn matches_stat(&self, stat: &FileStat) -> bool {
        self.mtime_secs == stat.mtime_secs
            && self.mtime_nanos == stat.mtime_nanos
            && self.size_bytes == stat.size_bytes
    }

    /// Refresh metadata after a hash-confirmed hit so future calls can use
    /// the fast path again. The content hash is unchanged by construction.
    pub fn refresh_stat(&mut self, stat: &FileStat) {
        self.mtime_secs = stat.mtime_secs;
        self.mtime_nanos = stat.mtime_nanos;
        self.size_bytes = stat.size_bytes;
    }
}

/// One cached file: identity, symbols, schema version, recency.
///
/// Owned exclusively by the [`CacheIndex`](super::CacheIndex); mutated in
/// place on every successful re-extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub meta: SourceFileMeta,
    /// Symbols in ascending start_line order
    pub symbols: Vec<Symbol>,
    /// Extractor contract version this entry was produced under; a
    /// mismatch with the current version is a forced miss
    pub schema_version: u32,
    /// Logical-clock tick of the last hit (not wall time, so LRU order is
    /// deterministic)
    pub last_accessed: u64,
    /// Monotonic insertion sequence; breaks LRU ties
    pub inserted_seq: u64,
}

impl CacheEntry {
    /// Rough in-memory footprint, used for byte-bounded eviction and the
    /// aggregate size estimate in stats. Intentionally cheap, not exact.
    pub fn approx_bytes(&self) -> u64 {
        let fixed = 96u64;
        let meta = self.meta.path.len() + self.meta.content_hash.len();
        let symbols: usize = self
            .symbols
            .iter()
            .map(|s| s.name.len() + s.snippet.len() + s.rel_fname.len() + 32)
            .sum();
        fixed + meta as u64 + symbols as u64
    }
}
