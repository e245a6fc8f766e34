//! The symbol engine: batch orchestration over discovery, validation,
//! extraction and persistence.
//!
//! A batch runs in phases so that serial cache mutation and parallel file
//! work never interleave:
//!
//! 1. Observe git state and ask the advisor whether metadata matches may
//!    be trusted this batch.
//! 2. Serial: stat every file and probe the index. Fast-path hits are
//!    done; the rest queue for hashing or extraction.
//! 3. Parallel (rayon): read and hash the queued files.
//! 4. Serial: resolve hash confirmations; mismatches join the extraction
//!    queue with their bytes already in hand.
//! 5. Parallel: extract symbols, timed per file.
//! 6. Serial: insert results, enforce capacity limits and commit the
//!    index to disk. Full-tree batches additionally record the observed
//!    git state and release the strictness latch; subset batches never
//!    do.
//!
//! Per-file failures (vanished files, unreadable content, non-UTF-8) are
//! logged and skipped; only persistence failures abort the run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::cache::{
    cleanup_stale, clear, commit_index, evict_to_limit, hash_bytes, load_index, stats, CacheIndex,
    CacheStats, FileStat, Probe,
};
use crate::config::Config;
use crate::discovery::{enumerate_source_files, SourceFile};
use crate::error::SymdexError;
use crate::extraction;
use crate::git::{self, GitStateAdvisor};
use crate::registry;
use crate::types::Symbol;

/// Counters for one processed batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Files submitted to the batch
    pub files: usize,
    /// Served from metadata match alone, content never read
    pub fast_path_hits: usize,
    /// Metadata drifted but content hash matched; metadata refreshed
    pub hash_confirmed_hits: usize,
    /// Re-extracted and re-inserted
    pub misses: usize,
    /// Vanished or unreadable files, logged and dropped from the batch
    pub skipped: usize,
    /// Entries removed by capacity enforcement after the batch
    pub evicted: usize,
}

/// Query-driven symbol extraction over one project root.
///
/// Owns the cache index, the durable store location and the git advisor.
/// Every public operation that mutates the index commits it before
/// returning, so a crash between calls never loses more than the current
/// batch.
pub struct SymbolEngine {
    root: PathBuf,
    config: Config,
    index: CacheIndex,
    index_path: PathBuf,
    advisor: GitStateAdvisor,
}

struct FileJob {
    rel: String,
    abs: PathBuf,
    extension: String,
    stat: FileStat,
}

impl SymbolEngine {
    /// Open an engine for `root`: load config, ensure the cache directory
    /// exists, load (or cold-start) the durable index and resume the git
    /// advisor from the persisted hint.
    pub fn open(root: &Path) -> Result<Self> {
        let config = Config::load(root);
        let cache_dir = config.cache_dir_under(root);
        fs::create_dir_all(&cache_dir).map_err(|source| SymdexError::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;
        let index_path = cache_dir.join("symbols.bin");
        let index = load_index(&index_path);
        let advisor = GitStateAdvisor::from_hint(index.git_hint().cloned());

        tracing::debug!(
            target: "symdex::engine",
            root = %root.display(),
            entries = index.len(),
            "engine opened"
        );

        Ok(Self {
            root: root.to_path_buf(),
            config,
            index,
            index_path,
            advisor,
        })
    }

    /// Symbols for one file, served from cache when valid, re-extracted
    /// otherwise. Unregistered extensions and failed files yield an empty
    /// list, never an error.
    pub fn get_symbols(&mut self, rel_path: &str) -> Result<Vec<Symbol>> {
        let abs = self.root.join(rel_path);
        let extension = abs
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if registry::lookup(&extension).is_none() {
            return Ok(Vec::new());
        }

        let file = SourceFile {
            abs_path: abs,
            rel_path: rel_path.to_string(),
            extension,
        };
        self.process_files(std::slice::from_ref(&file), false);
        self.commit()?;

        Ok(self
            .index
            .get(rel_path)
            .map(|entry| entry.symbols.clone())
            .unwrap_or_default())
    }

    /// Process an explicit set of files and commit the index.
    ///
    /// The set may be any subset of the tree, so this never releases the
    /// git strictness latch - only [`SymbolEngine::index_all`] covers
    /// every file and may restore fast-path behavior after a HEAD change.
    pub fn run_batch(&mut self, files: &[SourceFile]) -> Result<BatchReport> {
        self.run(files, false)
    }

    /// Discover every source file under the root and run one batch over
    /// all of them.
    pub fn index_all(&mut self) -> Result<BatchReport> {
        let files = enumerate_source_files(&self.root, &self.config)
            .context("file discovery failed")?;
        self.run(&files, true)
    }

    fn run(&mut self, files: &[SourceFile], full_batch: bool) -> Result<BatchReport> {
        let report = self.process_files(files, full_batch);
        self.commit()?;
        tracing::info!(
            target: "symdex::engine",
            files = report.files,
            fast = report.fast_path_hits,
            confirmed = report.hash_confirmed_hits,
            misses = report.misses,
            skipped = report.skipped,
            evicted = report.evicted,
            "batch committed"
        );
        Ok(report)
    }

    /// Aggregate cache statistics.
    pub fn cache_status(&self) -> CacheStats {
        stats(&self.index)
    }

    /// Drop every entry and counter, and persist the empty index
    /// immediately.
    pub fn cache_clear(&mut self) -> Result<()> {
        clear(&mut self.index);
        self.commit()
    }

    /// Remove entries whose files no longer exist on disk. Returns the
    /// number of entries removed.
    pub fn cache_cleanup(&mut self) -> Result<usize> {
        let files = enumerate_source_files(&self.root, &self.config)
            .context("file discovery failed")?;
        let existing = files.into_iter().map(|f| f.rel_path).collect();
        let removed = cleanup_stale(&mut self.index, &existing);
        self.commit()?;
        Ok(removed)
    }

    fn process_files(&mut self, files: &[SourceFile], full_batch: bool) -> BatchReport {
        let mut report = BatchReport {
            files: files.len(),
            ..Default::default()
        };

        let git_state = match git::read_snapshot(&self.root) {
            Ok(snapshot) => Some(snapshot),
            Err(err) => {
                tracing::debug!(target: "symdex::engine", %err, "no git signal");
                None
            }
        };
        let strict = self.advisor.strictness(git_state.as_ref());

        // Phase 2: serial stat + probe.
        let mut need_hash: Vec<FileJob> = Vec::new();
        let mut need_extract: Vec<(FileJob, Option<(Vec<u8>, String)>)> = Vec::new();

        for file in files {
            let stat = match FileStat::of(&file.abs_path) {
                Ok(stat) => stat,
                Err(err) => {
                    tracing::warn!(
                        target: "symdex::engine",
                        path = %file.abs_path.display(),
                        error = %err,
                        "file vanished before stat; skipping"
                    );
                    report.skipped += 1;
                    continue;
                }
            };
            let job = FileJob {
                rel: file.rel_path.clone(),
                abs: file.abs_path.clone(),
                extension: file.extension.clone(),
                stat,
            };
            match self.index.probe(&job.rel, &job.stat, strict) {
                Probe::FastPathHit(_) => report.fast_path_hits += 1,
                Probe::NeedsHash => need_hash.push(job),
                Probe::Miss => need_extract.push((job, None)),
            }
        }

        // Phase 3: parallel read + hash for inconclusive metadata.
        let hashed: Vec<(FileJob, std::io::Result<(Vec<u8>, String)>)> = need_hash
            .into_par_iter()
            .map(|job| {
                let outcome = fs::read(&job.abs).map(|bytes| {
                    let hash = hash_bytes(&bytes);
                    (bytes, hash)
                });
                (job, outcome)
            })
            .collect();

        // Phase 4: serial hash confirmation.
        for (job, outcome) in hashed {
            match outcome {
                Err(err) => {
                    tracing::warn!(
                        target: "symdex::engine",
                        path = %job.abs.display(),
                        error = %err,
                        "file vanished before read; skipping"
                    );
                    self.index.note_miss();
                    report.skipped += 1;
                }
                Ok((bytes, hash)) => {
                    if self.index.confirm_hash(&job.rel, &job.stat, &hash).is_some() {
                        report.hash_confirmed_hits += 1;
                    } else {
                        need_extract.push((job, Some((bytes, hash))));
                    }
                }
            }
        }

        // Phase 5: parallel extraction. Bytes from the hash phase are
        // reused; plain misses read here.
        let extracted: Vec<(FileJob, Result<(String, Vec<Symbol>, u64)>)> = need_extract
            .into_par_iter()
            .map(|(job, prefetched)| {
                let outcome = (|| -> Result<(String, Vec<Symbol>, u64)> {
                    let (bytes, hash) = match prefetched {
                        Some(pair) => pair,
                        None => {
                            let bytes = fs::read(&job.abs).map_err(|source| {
                                SymdexError::FileUnreadable {
                                    path: job.abs.clone(),
                                    source,
                                }
                            })?;
                            let hash = hash_bytes(&bytes);
                            (bytes, hash)
                        }
                    };
                    let start = Instant::now();
                    let symbols = extraction::extract(&job.extension, &job.rel, &bytes)?;
                    let micros = start.elapsed().as_micros() as u64;
                    Ok((hash, symbols, micros))
                })();
                (job, outcome)
            })
            .collect();

        // Phase 6: serial insert.
        for (job, outcome) in extracted {
            match outcome {
                Ok((hash, symbols, micros)) => {
                    self.index.insert(&job.rel, &job.stat, hash, symbols);
                    self.index.record_extraction(micros);
                    report.misses += 1;
                }
                Err(err) => {
                    tracing::warn!(
                        target: "symdex::engine",
                        path = %job.abs.display(),
                        error = %err,
                        "extraction failed; file left uncached"
                    );
                    report.skipped += 1;
                }
            }
        }

        report.evicted = evict_to_limit(&mut self.index, self.config.max_entries, self.config.max_bytes);

        // Only a batch that covered the whole discovered file set may
        // release the strictness latch and advance the persisted hint: a
        // subset leaves files unvalidated under the new HEAD, and their
        // checkout-restored metadata could match stale entries.
        if full_batch {
            self.advisor.mark_batch_complete(git_state);
            self.index.set_git_hint(self.advisor.last_state().cloned());
        }
        report
    }

    fn commit(&self) -> Result<()> {
        commit_index(&self.index, &self.index_path).context("failed to persist cache index")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};

    // Tempdirs live outside any git repository, so the advisor sees no
    // git signal and metadata validation stands alone.

    fn write_sources(root: &Path, n: usize) {
        fs::create_dir_all(root.join("src")).unwrap();
        for i in 0..n {
            fs::write(
                root.join(format!("src/m{:02}.rs", i)),
                format!("pub fn item_{}() {{}}\n", i),
            )
            .unwrap();
        }
    }

    fn set_mtime(path: &Path, when: SystemTime) {
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_modified(when).unwrap();
    }

    #[test]
    fn test_cold_run_is_all_misses() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 5);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        let report = engine.index_all().unwrap();

        assert_eq!(report.files, 5);
        assert_eq!(report.misses, 5);
        assert_eq!(report.fast_path_hits, 0);
        assert_eq!(report.hash_confirmed_hits, 0);
    }

    #[test]
    fn test_warm_run_is_all_fast_path_hits() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 5);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        // Fresh engine: symbols come off the durable index.
        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        let report = engine.index_all().unwrap();

        assert_eq!(report.fast_path_hits, 5);
        assert_eq!(report.misses, 0);
    }

    #[test]
    fn test_single_modification_invalidates_one_entry() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 5);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        fs::write(
            dir.path().join("src/m02.rs"),
            "pub fn renamed_item() {}\npub fn extra() {}\n",
        )
        .unwrap();

        let report = engine.index_all().unwrap();
        assert_eq!(report.fast_path_hits, 4);
        assert_eq!(report.misses, 1);

        let symbols = engine.get_symbols("src/m02.rs").unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["renamed_item", "extra"]);
    }

    #[test]
    fn test_touched_unchanged_file_is_hash_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 3);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        // mtime moves, bytes stay identical
        let touched = dir.path().join("src/m01.rs");
        set_mtime(&touched, SystemTime::now() + Duration::from_secs(5));

        let report = engine.index_all().unwrap();
        assert_eq!(report.fast_path_hits, 2);
        assert_eq!(report.hash_confirmed_hits, 1);
        assert_eq!(report.misses, 0);

        // Metadata was refreshed: the next run takes the fast path again.
        let report = engine.index_all().unwrap();
        assert_eq!(report.fast_path_hits, 3);
    }

    #[test]
    fn test_eviction_respects_entry_limit() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 8);
        fs::write(dir.path().join("symdex.toml"), "max-entries = 3\n").unwrap();

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        let report = engine.index_all().unwrap();

        assert_eq!(report.misses, 8);
        assert_eq!(report.evicted, 5);
        assert_eq!(engine.cache_status().cached_file_count, 3);
    }

    #[test]
    fn test_cleanup_removes_deleted_files() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 4);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        fs::remove_file(dir.path().join("src/m03.rs")).unwrap();
        let removed = engine.cache_cleanup().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.cache_status().cached_file_count, 3);
    }

    #[test]
    fn test_clear_persists_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 3);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();
        engine.cache_clear().unwrap();

        let engine = SymbolEngine::open(dir.path()).unwrap();
        assert_eq!(engine.cache_status().cached_file_count, 0);
        assert_eq!(engine.cache_status().hit_count, 0);
    }

    #[test]
    fn test_get_symbols_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(
            dir.path().join("src/lib.rs"),
            "pub struct Widget {\n    id: u32,\n}\n\npub fn build() {}\n",
        )
        .unwrap();

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        let symbols = engine.get_symbols("src/lib.rs").unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["Widget", "build"]);

        // Second lookup hits the fast path and returns identical symbols.
        let again = engine.get_symbols("src/lib.rs").unwrap();
        assert_eq!(symbols, again);
        assert_eq!(engine.cache_status().hit_count, 1);
    }

    #[test]
    fn test_get_symbols_unregistered_extension_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "not code").unwrap();

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        assert!(engine.get_symbols("notes.txt").unwrap().is_empty());
    }

    #[test]
    fn test_non_utf8_file_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("src/ok.rs"), "pub fn ok() {}\n").unwrap();
        fs::write(dir.path().join("src/bad.rs"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        let report = engine.index_all().unwrap();
        assert_eq!(report.misses, 1);
        assert_eq!(report.skipped, 1);
        assert!(engine.get_symbols("src/bad.rs").unwrap().is_empty());
    }

    #[test]
    fn test_status_reports_counts() {
        let dir = tempfile::tempdir().unwrap();
        write_sources(dir.path(), 2);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();
        engine.index_all().unwrap();

        let status = engine.cache_status();
        assert_eq!(status.cached_file_count, 2);
        assert_eq!(status.total_symbol_count, 2);
        assert_eq!(status.hit_count, 2);
        assert_eq!(status.miss_count, 2);
        assert!((status.hit_rate - 0.5).abs() < f64::EPSILON);
        assert!(status.avg_extraction_micros > 0.0);
    }

    fn git(root: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(root)
            .args(["-c", "user.email=dev@example.com", "-c", "user.name=dev"])
            .args(args)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?} failed", args);
    }

    fn git_repo_with_sources(root: &Path, n: usize) {
        write_sources(root, n);
        git(root, &["init", "-q"]);
        git(root, &["add", "-A"]);
        git(root, &["commit", "-q", "-m", "initial"]);
    }

    #[test]
    fn test_head_change_forces_hash_validation_for_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        git_repo_with_sources(dir.path(), 3);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        // Same HEAD: metadata fast path applies.
        let report = engine.index_all().unwrap();
        assert_eq!(report.fast_path_hits, 3);

        // Move HEAD without touching the source files.
        fs::write(dir.path().join("README.md"), "# demo\n").unwrap();
        git(dir.path(), &["add", "README.md"]);
        git(dir.path(), &["commit", "-q", "-m", "docs"]);

        // Byte-identical files under a changed HEAD hash-confirm instead
        // of being trusted on metadata or re-extracted.
        let report = engine.index_all().unwrap();
        assert_eq!(report.hash_confirmed_hits, 3);
        assert_eq!(report.fast_path_hits, 0);
        assert_eq!(report.misses, 0);

        // The completed full batch recorded the new HEAD; fast path is back.
        let report = engine.index_all().unwrap();
        assert_eq!(report.fast_path_hits, 3);
    }

    #[test]
    fn test_partial_batch_keeps_strict_latch_after_head_change() {
        let dir = tempfile::tempdir().unwrap();
        git_repo_with_sources(dir.path(), 2);

        let mut engine = SymbolEngine::open(dir.path()).unwrap();
        engine.index_all().unwrap();

        // Rewrite one file with same-size content and restore its old
        // mtime, the footprint a checkout leaves when it resets
        // timestamps: metadata alone cannot tell the entry is stale.
        let b_path = dir.path().join("src/m01.rs");
        let old_mtime = fs::metadata(&b_path).unwrap().modified().unwrap();
        // Same byte length as the original item_1 definition
        fs::write(&b_path, "pub fn swap_1() {}\n").unwrap();
        set_mtime(&b_path, old_mtime);

        // Move HEAD so the advisor latches strictness.
        git(dir.path(), &["add", "-A"]);
        git(dir.path(), &["commit", "-q", "-m", "swap"]);

        // A single-file lookup is not a full batch and must not release
        // the latch on behalf of files it never validated.
        engine.get_symbols("src/m00.rs").unwrap();

        // The next full batch still hash-validates and catches the swap.
        engine.index_all().unwrap();
        let symbols = engine.get_symbols("src/m01.rs").unwrap();
        let names: Vec<&str> = symbols.iter().map(|s| s.name.as_ref()).collect();
        assert_eq!(names, vec!["swap_1"]);
    }
}
