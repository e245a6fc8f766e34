//! Git state observation and hash-strictness advice.
//!
//! Git is an advisor here, never an authority: a HEAD or branch change can
//! rewrite file content while restoring old mtimes (checkout, rebase,
//! stash pop), so when the observed state differs from the last one a
//! completed batch recorded, metadata fast-path hits are suspended and
//! every file goes through the hash comparison for one full batch. Cached
//! symbols are never invalidated on git signals alone - the hash decides.
//!
//! We spawn the git binary instead of linking libgit2: it works with any
//! git version, and a repository without git (or without the binary on
//! PATH) simply degrades to metadata-only validation.
//!
//! The dirty flag is captured for logging but deliberately never feeds
//! strictness: uncommitted edits update mtimes on their own, so the
//! metadata path already catches them.

use std::path::Path;
use std::process::Command;

use crate::error::{Result, SymdexError};
use crate::types::GitStateSnapshot;

/// Observe the repository's current git state.
///
/// Three cheap read-only commands: HEAD sha, branch name, porcelain
/// status. Any failure (no git binary, not a repository, unborn HEAD)
/// returns [`SymdexError::GitUnavailable`]; callers treat that as "no git
/// signal", not as an error worth surfacing.
pub fn read_snapshot(root: &Path) -> Result<GitStateSnapshot> {
    let head_sha = git_stdout(root, &["rev-parse", "HEAD"])?;
    let branch = git_stdout(root, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    let status = git_stdout(root, &["status", "--porcelain"])?;

    Ok(GitStateSnapshot {
        head_sha,
        branch,
        dirty: !status.is_empty(),
    })
}

fn git_stdout(root: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .output()
        .map_err(|err| SymdexError::GitUnavailable {
            reason: format!("failed to spawn git: {}", err),
        })?;

    if !output.status.success() {
        return Err(SymdexError::GitUnavailable {
            reason: format!(
                "git {} exited with {}",
                args.join(" "),
                output.status
            ),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Decides, per batch, whether metadata fast-path hits may be trusted.
///
/// Holds the git state the last *completed* batch ran under. Strictness
/// latches on when the current state diverges from it (or when no prior
/// state is known while git is available, e.g. the first run after the
/// hint was lost) and stays latched until a batch completes - an aborted
/// batch must not clear the flag, or files it never reached would be
/// served from metadata under a changed HEAD.
#[derive(Debug, Default)]
pub struct GitStateAdvisor {
    last: Option<GitStateSnapshot>,
    strict_pending: bool,
}

impl GitStateAdvisor {
    /// Resume from the state persisted with the cache index. `None` means
    /// no completed batch recorded a state yet.
    pub fn from_hint(hint: Option<GitStateSnapshot>) -> Self {
        Self {
            last: hint,
            strict_pending: false,
        }
    }

    /// Should the upcoming batch force hash comparison on metadata
    /// matches? `current` is this batch's observed state, `None` when git
    /// is unavailable.
    pub fn strictness(&mut self, current: Option<&GitStateSnapshot>) -> bool {
        match (current, &self.last) {
            // No git signal: metadata validation stands alone.
            (None, _) => false,
            // Git present but no recorded state: the cache may predate a
            // checkout we never saw. Strict is the safe direction.
            (Some(_), None) => {
                self.strict_pending = true;
                true
            }
            (Some(now), Some(last)) => {
                if last.invalidates_fast_path(now) {
                    tracing::info!(
                        target: "symdex::git",
                        from = %last.head_sha,
                        to = %now.head_sha,
                        "git state changed; forcing hash validation this batch"
                    );
                    self.strict_pending = true;
                }
                self.strict_pending
            }
        }
    }

    /// Record that a full batch ran to completion under `current`. Clears
    /// the strictness latch only when a state was actually observed.
    pub fn mark_batch_complete(&mut self, current: Option<GitStateSnapshot>) {
        if let Some(snapshot) = current {
            self.last = Some(snapshot);
            self.strict_pending = false;
        }
    }

    /// The state the last completed batch ran under, for persistence.
    pub fn last_state(&self) -> Option<&GitStateSnapshot> {
        self.last.as_ref()
    }
}
