//! Core types for symdex - the incremental symbol extraction engine.
//!
//! Key design decisions:
//! - `Arc<str>` for shared ownership of interned strings (symbols are
//!   cloned freely between the cache and callers)
//! - Frozen/immutable by default; a `Symbol` is never mutated after
//!   extraction
//! - `SymbolKind` is a closed enum so extractors and consumers share one
//!   contract instead of stringly-typed drift

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;

/// Serde serialization helpers for Arc<str> fields
mod arc_str_serde {
    use super::*;

    pub fn serialize<S>(arc: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(arc.as_ref())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(s.into())
    }
}

/// The kind of a source symbol.
///
/// Closed enumeration shared between the query registry, the extractor and
/// cache consumers. Adding a language never adds a stringly-typed kind; a
/// genuinely new shape (e.g. infrastructure resources) gets a new variant
/// here as an explicit extension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    Struct,
    Enum,
    Interface,
    Trait,
    Module,
    Constant,
    Variable,
    TypeAlias,
    /// Declarative infrastructure resources (reserved for config languages).
    Resource,
}

impl SymbolKind {
    /// Short lowercase label for display and logging.
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::Struct => "struct",
            SymbolKind::Enum => "enum",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Module => "module",
            SymbolKind::Constant => "constant",
            SymbolKind::Variable => "variable",
            SymbolKind::TypeAlias => "type_alias",
            SymbolKind::Resource => "resource",
        }
    }

    /// Check if this kind is callable (function-like).
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Function | SymbolKind::Method)
    }
}

/// A named, typed span of source code extracted from one file.
///
/// Line convention: `start_line` and `end_line` are 1-indexed and
/// `end_line` is the last line of the definition body, inclusive - the
/// whole body span, not just the signature. Symbols within one file are
/// kept in ascending `start_line` order, and no two symbols in a file
/// share `(name, kind, start_line, end_line)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Symbol name (function, class, variable name)
    #[serde(with = "arc_str_serde")]
    pub name: Arc<str>,
    /// What kind of definition this is
    pub kind: SymbolKind,
    /// First line of the definition (1-indexed)
    pub start_line: u32,
    /// Last line of the definition body (1-indexed, inclusive)
    pub end_line: u32,
    /// First line of the definition's source text, trimmed and capped
    #[serde(with = "arc_str_serde")]
    pub snippet: Arc<str>,
    /// Repo-relative path of the file this symbol lives in
    #[serde(with = "arc_str_serde")]
    pub rel_fname: Arc<str>,
}

impl Symbol {
    /// The dedup identity of a symbol within its file.
    pub fn identity(&self) -> (Arc<str>, SymbolKind, u32, u32) {
        (self.name.clone(), self.kind, self.start_line, self.end_line)
    }

    /// Number of source lines this symbol spans.
    pub fn line_span(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// Coarse git state used as an invalidation-strictness hint.
///
/// A checkout can restore old file content with a freshly-set mtime, which
/// would slip through metadata-only validation undetected. Comparing
/// `head_sha`/`branch` across runs tells the cache when to distrust the
/// fast path for one full batch. This snapshot is never treated as ground
/// truth - only as a hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitStateSnapshot {
    /// Full sha of HEAD
    pub head_sha: String,
    /// Current branch name (or "HEAD" when detached)
    pub branch: String,
    /// Whether the worktree has uncommitted changes
    pub dirty: bool,
}

impl GitStateSnapshot {
    /// Whether moving from `self` to `other` should defeat the metadata
    /// fast path. Only HEAD/branch movement matters: a dirty worktree
    /// changes both mtime and content, which metadata+hash validation
    /// already catches.
    pub fn invalidates_fast_path(&self, other: &GitStateSnapshot) -> bool {
        self.head_sha != other.head_sha || self.branch != other.branch
    }
}
