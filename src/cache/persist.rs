//! Atomic, schema-versioned persistence for the cache index.
//!
//! The durable copy is a single bincode file. Every commit serializes the
//! full index to a uniquely-named temporary file in the same directory,
//! fsyncs it, then renames it over the previous copy - a crash at any
//! point leaves either the complete old index or the complete new index
//! on disk, never a blend.
//!
//! Loading is strictly best-effort: a missing, truncated, oversized or
//! version-skewed file degrades to an empty index (cold start) with a log
//! line. Cache corruption must cost a re-extraction, never a crash, and a
//! corrupted length prefix must not be able to request an enormous
//! allocation - hence the payload limit on deserialization.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use bincode::Options;
use serde::{Deserialize, Serialize};

use super::index::CacheIndex;
use super::SYMBOLS_SCHEMA_VERSION;
use crate::error::{Result, SymdexError};

/// Version of the on-disk index wrapper. Bumped when the serialized layout
/// of [`CacheIndex`] or its entries changes shape.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Hard upper bound for any serialized index we will attempt to read back.
/// Large enough for hundreds of thousands of entries, small enough that a
/// corrupted length prefix cannot OOM the process.
pub const PAYLOAD_LIMIT_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Serialize, Deserialize)]
struct DurableIndex {
    schema_version: u32,
    index: CacheIndex,
}

fn bincode_options() -> impl bincode::Options + Copy {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
}

/// Load the durable index, or an empty one on any failure.
///
/// Per-entry schema versions are checked after the wrapper: entries
/// produced under an older extractor contract are dropped individually,
/// which makes them forced misses without discarding their neighbors.
pub fn load_index(path: &Path) -> CacheIndex {
    let bytes = match fs::metadata(path) {
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return CacheIndex::new(),
        Err(err) => {
            tracing::warn!(
                target: "symdex::cache",
                path = %path.display(),
                error = %err,
                "failed to stat cache index; starting cold"
            );
            return CacheIndex::new();
        }
        Ok(meta) if meta.len() > PAYLOAD_LIMIT_BYTES => {
            tracing::warn!(
                target: "symdex::cache",
                path = %path.display(),
                size = meta.len(),
                "cache index exceeds payload limit; starting cold"
            );
            return CacheIndex::new();
        }
        Ok(_) => match fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(
                    target: "symdex::cache",
                    path = %path.display(),
                    error = %err,
                    "failed to read cache index; starting cold"
                );
                return CacheIndex::new();
            }
        },
    };

    let durable: DurableIndex = match bincode_options()
        .with_limit(PAYLOAD_LIMIT_BYTES)
        .deserialize(&bytes)
    {
        Ok(d) => d,
        Err(err) => {
            tracing::warn!(
                target: "symdex::cache",
                path = %path.display(),
                error = %err,
                "cache index is corrupt; starting cold"
            );
            return CacheIndex::new();
        }
    };

    if durable.schema_version != CACHE_SCHEMA_VERSION {
        tracing::warn!(
            target: "symdex::cache",
            found = durable.schema_version,
            expected = CACHE_SCHEMA_VERSION,
            "cache index schema version mismatch; starting cold"
        );
        return CacheIndex::new();
    }

    let mut index = durable.index;
    let before = index.entries.len();
    index
        .entries
        .retain(|_, entry| entry.schema_version == SYMBOLS_SCHEMA_VERSION);
    let dropped = before - index.entries.len();
    if dropped > 0 {
        tracing::debug!(
            target: "symdex::cache",
            dropped,
            "dropped entries with stale symbol schema (forced misses)"
        );
    }

    index
}

/// Commit the index to its durable location, atomically.
///
/// Serialize to a unique temp file next to the target, fsync, rename.
/// Readers either see the complete previous index or the complete new one.
pub fn commit_index(index: &CacheIndex, path: &Path) -> Result<()> {
    let durable = DurableIndex {
        schema_version: CACHE_SCHEMA_VERSION,
        index: index.clone(),
    };
    let bytes = bincode_options().serialize(&durable)?;

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|source| SymdexError::CacheDir {
        path: parent.to_path_buf(),
        source,
    })?;

    let tmp_path = unique_tmp_path(path, parent);
    let write_result = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(err) = write_result {
        // Best-effort cleanup of the partial temp file
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Unique temp path in `parent`, namespaced by pid and a process-local
/// counter so concurrent commits from separate processes never collide.
fn unique_tmp_path(target: &Path, parent: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let stem = target
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    parent.join(format!(".{}.tmp.{}.{}", stem, std::process::id(), n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{hash_bytes, FileStat};
    use crate::types::{Symbol, SymbolKind};

    fn sample_index() -> CacheIndex {
        let mut index = CacheIndex::new();
        let stat = FileStat {
            mtime_secs: 10,
            mtime_nanos: 0,
            size_bytes: 9,
        };
        index.insert(
            "src/a.rs",
            &stat,
            hash_bytes(b"fn a() {}"),
            vec![Symbol {
                name: "a".into(),
                kind: SymbolKind::Function,
                start_line: 1,
                end_line: 1,
                snippet: "fn a() {}".into(),
                rel_fname: "src/a.rs".into(),
            }],
        );
        index
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");

        let index = sample_index();
        commit_index(&index, &path).unwrap();

        let loaded = load_index(&path);
        assert_eq!(loaded.len(), 1);
        let entry = loaded.get("src/a.rs").unwrap();
        assert_eq!(entry.symbols[0].name.as_ref(), "a");
        assert_eq!(entry.meta.content_hash, hash_bytes(b"fn a() {}"));
    }

    #[test]
    fn test_missing_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_index(&dir.path().join("nope.bin"));
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");
        fs::write(&path, b"definitely not bincode").unwrap();

        let loaded = load_index(&path);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_truncated_file_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");

        commit_index(&sample_index(), &path).unwrap();
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() / 2]).unwrap();

        let loaded = load_index(&path);
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_wrapper_version_mismatch_is_cold_start() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");

        let durable = DurableIndex {
            schema_version: CACHE_SCHEMA_VERSION + 1,
            index: sample_index(),
        };
        let bytes = bincode_options().serialize(&durable).unwrap();
        fs::write(&path, bytes).unwrap();

        assert!(load_index(&path).is_empty());
    }

    #[test]
    fn test_stale_entry_schema_is_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");

        let mut index = sample_index();
        index
            .entries
            .get_mut("src/a.rs")
            .unwrap()
            .schema_version = SYMBOLS_SCHEMA_VERSION - 1;
        commit_index(&index, &path).unwrap();

        assert!(load_index(&path).is_empty());
    }

    #[test]
    fn test_commit_replaces_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbols.bin");

        commit_index(&sample_index(), &path).unwrap();
        let empty = CacheIndex::new();
        commit_index(&empty, &path).unwrap();

        assert!(load_index(&path).is_empty());
        // No temp files left behind
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }
}
