//! Optional git collaborator interface.
//!
//! The core only ever *calls* a VCS, never implements one: no VCS library
//! is linked in here. A real collaborator would shell out to the `git`
//! binary with named commands; [`NullGit`] is the default, a no-op that
//! logs what it would have done.

use crate::error::Result;

/// Working-tree status the collaborator can report back before a commit is
/// attempted - whether anything is staged, and whether the tree has
/// unstaged changes the core didn't cause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitStatus {
    pub staged_paths: Vec<std::path::PathBuf>,
    pub has_unstaged_changes: bool,
}

/// The git commands named in §6: status, add (staging), commit, push, tag.
/// No VCS library is linked into the core; a real implementation shells out
/// to the `git` binary.
pub trait GitCollaborator: Send + Sync {
    fn status(&self) -> Result<GitStatus>;
    fn stage(&self, paths: &[std::path::PathBuf]) -> Result<()>;
    fn commit(&self, message: &str) -> Result<()>;
    fn push(&self) -> Result<()>;
    fn tag(&self, name: &str) -> Result<()>;
}

/// The default collaborator: every operation is a no-op that logs what it
/// would have done. A real collaborator wired in by a host replaces this
/// wholesale; the core never assumes one is actually present.
pub struct NullGit;

impl GitCollaborator for NullGit {
    fn status(&self) -> Result<GitStatus> {
        Ok(GitStatus::default())
    }

    fn stage(&self, paths: &[std::path::PathBuf]) -> Result<()> {
        tracing::debug!(count = paths.len(), "NullGit: skipping stage");
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        tracing::debug!(message, "NullGit: skipping commit");
        Ok(())
    }

    fn push(&self) -> Result<()> {
        tracing::debug!("NullGit: skipping push");
        Ok(())
    }

    fn tag(&self, name: &str) -> Result<()> {
        tracing::debug!(name, "NullGit: skipping tag");
        Ok(())
    }
}
