//! Eviction, stale cleanup and cache statistics.
//!
//! Two distinct removal operations, never conflated:
//! - [`evict_to_limit`] is capacity-driven: strict least-recently-used by
//!   `last_accessed` (logical clock), ties broken by insertion order,
//!   removing until the index fits the configured bounds. No bounds
//!   configured means unbounded - capping memory/disk is explicit opt-in.
//! - [`cleanup_stale`] is existence-driven: drop entries whose path no
//!   longer exists among currently-known files, regardless of recency.

use std::collections::HashSet;

use super::index::CacheIndex;

/// Aggregate statistics for introspection (`cache_status`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of files with a cached entry
    pub cached_file_count: usize,
    /// Total symbols across all entries
    pub total_symbol_count: usize,
    /// Rough in-memory/on-disk footprint estimate
    pub approx_bytes: u64,
    /// Validated hits served since the counters were last cleared
    pub hit_count: u64,
    /// Misses (extractions) since the counters were last cleared
    pub miss_count: u64,
    /// hit_count / (hit_count + miss_count), 0.0 when no lookups yet
    pub hit_rate: f64,
    /// Mean extraction wall time in microseconds, 0.0 when nothing was
    /// extracted yet
    pub avg_extraction_micros: f64,
}

impl CacheStats {
    /// Format the footprint estimate in human-readable form.
    pub fn size_human(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        const GB: u64 = MB * 1024;

        if self.approx_bytes >= GB {
            format!("{:.2} GB", self.approx_bytes as f64 / GB as f64)
        } else if self.approx_bytes >= MB {
            format!("{:.2} MB", self.approx_bytes as f64 / MB as f64)
        } else if self.approx_bytes >= KB {
            format!("{:.2} KB", self.approx_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.approx_bytes)
        }
    }
}

/// Compute statistics for the given index.
pub fn stats(index: &CacheIndex) -> CacheStats {
    let total_symbol_count = index.entries.values().map(|e| e.symbols.len()).sum();
    let approx_bytes = index.entries.values().map(|e| e.approx_bytes()).sum();
    let lookups = index.hit_count + index.miss_count;
    let hit_rate = if lookups == 0 {
        0.0
    } else {
        index.hit_count as f64 / lookups as f64
    };
    let avg_extraction_micros = if index.extraction_count == 0 {
        0.0
    } else {
        index.total_extraction_micros as f64 / index.extraction_count as f64
    };

    CacheStats {
        cached_file_count: index.entries.len(),
        total_symbol_count,
        approx_bytes,
        hit_count: index.hit_count,
        miss_count: index.miss_count,
        hit_rate,
        avg_extraction_micros,
    }
}

/// Evict least-recently-used entries until the index fits within the given
/// bounds. Returns the number of entries removed.
///
/// Both bounds are optional and independent; `None` means unbounded on
/// that axis. When over capacity, the entry with the oldest
/// `last_accessed` goes first (ties by `inserted_seq`), repeatedly, until
/// both bounds are satisfied.
pub fn evict_to_limit(
    index: &mut CacheIndex,
    max_entries: Option<usize>,
    max_bytes: Option<u64>,
) -> usize {
    if max_entries.is_none() && max_bytes.is_none() {
        return 0;
    }

    // Oldest-first eviction queue
    let mut order: Vec<(u64, u64, String)> = index
        .entries
        .iter()
        .map(|(path, e)| (e.last_accessed, e.inserted_seq, path.clone()))
        .collect();
    order.sort_unstable();

    let mut total_bytes: u64 = index.entries.values().map(|e| e.approx_bytes()).sum();
    let mut evicted = 0;
    let mut queue = order.into_iter();

    loop {
        let over_entries = max_entries.is_some_and(|max| index.entries.len() > max);
        let over_bytes = max_bytes.is_some_and(|max| total_bytes > max);
        if !over_entries && !over_bytes {
            break;
        }
        let Some((_, _, path)) = queue.next() else {
            break;
        };
        if let Some(entry) = index.entries.remove(&path) {
            total_bytes = total_bytes.saturating_sub(entry.approx_bytes());
            evicted += 1;
        }
    }

    if evicted > 0 {
        tracing::debug!(
            target: "symdex::cache",
            evicted,
            remaining = index.entries.len(),
            "evicted least-recently-used entries"
        );
    }
    evicted
}

/// Remove entries whose path is no longer among the currently-known files.
/// Returns the number of entries removed. Recency is not consulted.
pub fn cleanup_stale(index: &mut CacheIndex, existing_paths: &HashSet<String>) -> usize {
    let before = index.entries.len();
    index
        .entries
        .retain(|path, _| existing_paths.contains(path));
    let removed = before - index.entries.len();
    if removed > 0 {
        tracing::debug!(
            target: "symdex::cache",
            removed,
            "removed stale entries for deleted files"
        );
    }
    removed
}

/// Empty the index: entries, counters and timing accumulators. The caller
/// is responsible for persisting the empty state immediately.
pub fn clear(index: &mut CacheIndex) {
    *index = CacheIndex::new();
}
