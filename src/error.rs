//! Error taxonomy for the extraction engine and its cache.
//!
//! None of the per-file conditions here should abort a multi-file run:
//! a malformed query pattern is skipped, an unreadable file yields empty
//! symbols, a corrupt cache store degrades to a cold start, and a missing
//! git repository disables the strictness hint. Only conditions that make
//! persistence impossible (cache directory creation, commit I/O) surface
//! to the caller as hard errors.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, SymdexError>;

/// Errors produced by extraction, validation and cache persistence.
#[derive(Debug, thiserror::Error)]
pub enum SymdexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {path}: {source}")]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid utf-8")]
    NonUtf8 { path: PathBuf },

    #[error("query pattern {pattern} failed against the {language} grammar: {message}")]
    QueryCompile {
        language: &'static str,
        pattern: &'static str,
        message: String,
    },

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("git state unavailable: {reason}")]
    GitUnavailable { reason: String },

    #[error("cache directory {path} could not be created: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = SymdexError::QueryCompile {
            language: "rust",
            pattern: "rust.function",
            message: "bad node type".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rust.function"));
        assert!(msg.contains("rust grammar"));
    }
}
