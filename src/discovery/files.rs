//! Git-aware source file discovery with parallel traversal.
//!
//! Discovery feeds the batch pipeline, so its output contract matters:
//! - Only files whose extension has a registered language (anything else
//!   would be an extraction no-op, so we skip the stat entirely)
//! - Repo-relative, forward-slash paths: these are the cache keys, and
//!   they must be identical across machines and working directories
//! - Sorted, deterministic order
//!
//! The `ignore` crate provides battle-tested .gitignore handling from
//! ripgrep; WalkBuilder with threads(0) auto-detects parallelism.

use std::path::{Path, PathBuf};

use anyhow::Result;
use ignore::WalkBuilder;

use crate::config::Config;
use crate::registry;

/// One discovered source file: where it lives and how it is keyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path for filesystem access
    pub abs_path: PathBuf,
    /// Repo-relative forward-slash path; the cache key
    pub rel_path: String,
    /// Lowercased extension, known to be registered
    pub extension: String,
}

/// Enumerate source files under `root` that the engine can extract from.
///
/// Respects .gitignore (and works without git), applies the config's
/// include/exclude patterns against repo-relative paths, and keeps only
/// extensions with a registered language. Results are sorted by relative
/// path.
pub fn enumerate_source_files(root: &Path, config: &Config) -> Result<Vec<SourceFile>> {
    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false)
        .follow_links(false)
        .threads(0)
        .build_parallel();

    let files = std::sync::Mutex::new(Vec::new());
    let root_buf = root.to_path_buf();

    walker.run(|| {
        Box::new(|entry_result| {
            let Ok(entry) = entry_result else {
                // Unreadable entries (permissions, broken symlinks) are skipped
                return ignore::WalkState::Continue;
            };
            let path = entry.path();
            if !path.is_file() {
                return ignore::WalkState::Continue;
            }

            let Some(extension) = registered_extension(path) else {
                return ignore::WalkState::Continue;
            };

            let rel = path.strip_prefix(&root_buf).unwrap_or(path);
            if !config.should_include(rel) {
                return ignore::WalkState::Continue;
            }

            let source = SourceFile {
                abs_path: path.to_path_buf(),
                rel_path: normalize_rel(rel),
                extension,
            };
            if let Ok(mut files) = files.lock() {
                files.push(source);
            }
            ignore::WalkState::Continue
        })
    });

    let mut files = files
        .into_inner()
        .map_err(|_| anyhow::anyhow!("file collection mutex poisoned"))?;

    // Sorted output is part of the contract: relative paths are cache
    // keys, and batch order must be reproducible across runs.
    files.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(files)
}

/// The file's lowercased extension, if a language is registered for it.
fn registered_extension(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    registry::lookup(&ext).map(|_| ext)
}

/// Repo-relative path with forward slashes, regardless of platform.
fn normalize_rel(rel: &Path) -> String {
    let s = rel.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
