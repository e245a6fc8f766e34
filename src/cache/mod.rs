//! Correctness-preserving symbol cache.
//!
//! The cache exists to make warm runs cheap without ever serving stale
//! symbols. Per file it stores the extracted symbols plus the metadata and
//! content hash they were computed from; validation walks a two-step
//! machine (metadata fast path, then hash confirmation) so file content is
//! only read when the cheap check is inconclusive.
//!
//! Layout:
//! - [`entry`]: per-file metadata, hashing, entry footprint
//! - [`index`]: the in-memory map plus the probe/confirm/insert machine
//! - [`eviction`]: LRU capacity enforcement, stale cleanup, statistics
//! - [`persist`]: atomic schema-versioned bincode durability

pub mod entry;
pub mod eviction;
pub mod index;
pub mod persist;

pub use entry::{hash_bytes, CacheEntry, FileStat, SourceFileMeta};
pub use eviction::{cleanup_stale, clear, evict_to_limit, stats, CacheStats};
pub use index::{CacheIndex, Probe};
pub use persist::{commit_index, load_index, CACHE_SCHEMA_VERSION};

/// Version of the per-entry symbol contract: what the extractor promises
/// about shape, line convention and ordering. Bumped whenever extraction
/// output changes meaning; entries recorded under another version are
/// dropped on load and treated as misses.
pub const SYMBOLS_SCHEMA_VERSION: u32 = 2;
