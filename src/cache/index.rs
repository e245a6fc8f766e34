//! The in-memory cache index and its validation state machine.
//!
//! A [`CacheIndex`] is an explicitly owned value - no ambient global state -
//! holding every [`CacheEntry`] plus the aggregate hit/miss counters and
//! the logical clock that drives LRU ordering. Validation is split into two
//! calls so the caller controls when file content is actually read:
//!
//! 1. [`CacheIndex::probe`] with a live `(mtime, size)` stat. Metadata
//!    match -> fast-path hit, served without touching file content.
//! 2. On [`Probe::NeedsHash`], the caller reads the bytes, hashes them and
//!    calls [`CacheIndex::confirm_hash`]: equal hash -> hit with metadata
//!    refresh; unequal -> miss, the caller re-extracts and
//!    [`CacheIndex::insert`]s the replacement entry.
//!
//! The strict flag on `probe` implements git-assisted strictness: when the
//! advisor reports a HEAD/branch change, metadata matches are downgraded to
//! `NeedsHash` for one full batch, because a checkout can restore old
//! content under a fresh mtime.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, FileStat, SourceFileMeta};
use super::SYMBOLS_SCHEMA_VERSION;
use crate::types::{GitStateSnapshot, Symbol};

/// Outcome of a metadata probe for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Entry exists and `(mtime, size)` match: cached symbols returned
    /// without reading file content. `last_accessed` has been bumped.
    FastPathHit(Vec<Symbol>),
    /// Entry exists but metadata differs (or strict mode is active); the
    /// caller must hash the live content and call `confirm_hash`.
    NeedsHash,
    /// No usable entry; the caller extracts and inserts. Counted as a miss.
    Miss,
}

/// Process-wide map of `path -> CacheEntry` plus aggregate counters.
///
/// Created empty on cold start or corrupt-store recovery, mutated by
/// extraction/eviction/cleanup, emptied by `clear`, and persisted after
/// each committed batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheIndex {
    pub(crate) entries: BTreeMap<String, CacheEntry>,
    pub(crate) hit_count: u64,
    pub(crate) miss_count: u64,
    /// Logical clock; bumped on every hit and insert
    pub(crate) clock: u64,
    /// Insertion sequence for LRU tie-breaking
    pub(crate) seq: u64,
    /// Accumulated extraction wall time, for avg_extraction_time stats
    pub(crate) total_extraction_micros: u64,
    pub(crate) extraction_count: u64,
    /// Last git state observed by a completed full batch. A hint only:
    /// a missing or stale hint forces strict validation, never staleness.
    pub(crate) git_hint: Option<GitStateSnapshot>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            hit_count: 0,
            miss_count: 0,
            clock: 0,
            seq: 0,
            total_extraction_micros: 0,
            extraction_count: 0,
            git_hint: None,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Step 1 of validation: compare stored metadata against the live stat.
    ///
    /// `strict` forces the hash comparison even on a metadata match (git
    /// checkout protection). Fast-path hits bump `last_accessed` and the
    /// hit counter; misses bump the miss counter; `NeedsHash` defers
    /// counting until `confirm_hash` resolves it.
    pub fn probe(&mut self, path: &str, stat: &FileStat, strict: bool) -> Probe {
        let tick = self.tick();
        match self.entries.get_mut(path) {
            None => {
                self.miss_count += 1;
                Probe::Miss
            }
            Some(entry) if entry.schema_version != SYMBOLS_SCHEMA_VERSION => {
                // Shaped for an old contract; treat as absent.
                self.miss_count += 1;
                Probe::Miss
            }
            Some(entry) => {
                if entry.meta.matches_stat(stat) && !strict {
                    entry.last_accessed = tick;
                    self.hit_count += 1;
                    Probe::FastPathHit(entry.symbols.clone())
                } else {
                    Probe::NeedsHash
                }
            }
        }
    }

    /// Step 2 of validation: resolve a `NeedsHash` probe with the live
    /// content hash.
    ///
    /// Equal hash -> hash-confirmed hit: stored `(mtime, size)` are
    /// refreshed to the live values so the next call takes the fast path,
    /// and the cached symbols are returned. Unequal -> counted as a miss,
    /// `None` returned; the caller re-extracts and calls `insert`.
    pub fn confirm_hash(
        &mut self,
        path: &str,
        stat: &FileStat,
        content_hash: &str,
    ) -> Option<Vec<Symbol>> {
        let tick = self.tick();
        match self.entries.get_mut(path) {
            Some(entry)
                if entry.schema_version == SYMBOLS_SCHEMA_VERSION
                    && entry.meta.content_hash == content_hash =>
            {
                entry.meta.refresh_stat(stat);
                entry.last_accessed = tick;
                self.hit_count += 1;
                Some(entry.symbols.clone())
            }
            _ => {
                self.miss_count += 1;
                None
            }
        }
    }

    /// Store a freshly extracted result, replacing any prior entry for the
    /// path. Does not touch the hit/miss counters - the preceding probe or
    /// confirm already counted the miss.
    pub fn insert(
        &mut self,
        path: &str,
        stat: &FileStat,
        content_hash: String,
        symbols: Vec<Symbol>,
    ) {
        let tick = self.tick();
        self.seq += 1;
        let entry = CacheEntry {
            meta: SourceFileMeta {
                path: path.to_string(),
                mtime_secs: stat.mtime_secs,
                mtime_nanos: stat.mtime_nanos,
                size_bytes: stat.size_bytes,
                content_hash,
            },
            symbols,
            schema_version: SYMBOLS_SCHEMA_VERSION,
            last_accessed: tick,
            inserted_seq: self.seq,
        };
        self.entries.insert(path.to_string(), entry);
    }

    /// Record one extraction's wall time for the running average.
    pub fn record_extraction(&mut self, micros: u64) {
        self.total_extraction_micros += micros;
        self.extraction_count += 1;
    }

    /// Record a miss that never reached probe/confirm resolution (e.g. a
    /// file that vanished between stat and read).
    pub fn note_miss(&mut self) {
        self.miss_count += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    pub fn git_hint(&self) -> Option<&GitStateSnapshot> {
        self.git_hint.as_ref()
    }

    pub fn set_git_hint(&mut self, hint: Option<GitStateSnapshot>) {
        self.git_hint = hint;
    }
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self::new()
    }
}
