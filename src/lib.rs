//! symdex - incremental, query-driven symbol extraction
//!
//! Extracts the top-level symbols (functions, classes, types, constants)
//! from source files across many languages using tree-sitter queries, and
//! caches the results so warm runs never re-parse unchanged files.
//!
//! # Architecture
//!
//! ```text
//! File Discovery → Validation → Extraction → Cache Index → Persistence
//!       ↓              ↓            ↓             ↓             ↓
//!    ignore       mtime/size   tree-sitter    LRU map       bincode
//!    crate        + SHA-256     queries      + counters   temp+rename
//! ```
//!
//! # Correctness model
//!
//! A cached result is served only when the file's `(mtime, size)` match
//! the stored metadata, or when its SHA-256 content hash matches despite
//! metadata drift. Git HEAD/branch changes suspend the metadata fast path
//! for one batch, because a checkout can restore old content under fresh
//! mtimes. Corrupt or version-skewed cache stores degrade to a cold start.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod git;
pub mod registry;
pub mod types;

// Re-export the primary surface
pub use cache::{CacheStats, SYMBOLS_SCHEMA_VERSION};
pub use config::Config;
pub use discovery::SourceFile;
pub use engine::{BatchReport, SymbolEngine};
pub use error::{Result, SymdexError};
pub use types::{GitStateSnapshot, Symbol, SymbolKind};
