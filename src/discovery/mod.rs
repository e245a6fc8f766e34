//! Git-aware file discovery.
//!
//! Uses the `ignore` crate to respect .gitignore and walk directories
//! efficiently, keeping only files with a registered language.

mod files;

pub use files::{enumerate_source_files, SourceFile};
