//! Symbol extraction from source bytes using tree-sitter.
//!
//! This module handles:
//! - Resolving a file's capture patterns from the language registry
//! - Parsing source content into a syntax tree
//! - Running each capture pattern independently (best-effort aggregate)
//! - Deduplicating and ordering the extracted symbols

mod extractor;

use std::cell::RefCell;

use crate::error::Result;
use crate::types::Symbol;

pub use extractor::SymbolExtractor;

thread_local! {
    /// Thread-local extractor (tree-sitter parsers are not thread-safe).
    /// Rayon workers each get their own; parser setup cost is paid once
    /// per thread rather than once per file.
    static EXTRACTOR: RefCell<SymbolExtractor> = RefCell::new(SymbolExtractor::new());
}

/// Extract symbols from `content` using the calling thread's extractor.
///
/// This is the main entry point for extraction. `extension` selects the
/// language via the registry; `rel_fname` is the repo-relative path stamped
/// into each symbol.
pub fn extract(extension: &str, rel_fname: &str, content: &[u8]) -> Result<Vec<Symbol>> {
    EXTRACTOR.with(|e| e.borrow_mut().extract(extension, rel_fname, content))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_entry_point() {
        let symbols = extract("rs", "lib.rs", b"pub fn entry() {}\n").unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name.as_ref(), "entry");
        assert_eq!(symbols[0].rel_fname.as_ref(), "lib.rs");
    }

    #[test]
    fn test_extract_reuses_thread_local_parser() {
        // Two calls on the same thread share one parser; both succeed.
        assert!(!extract("py", "a.py", b"def a():\n    pass\n").unwrap().is_empty());
        assert!(!extract("rs", "b.rs", b"fn b() {}\n").unwrap().is_empty());
    }
}
