//! Workspace filesystem writer, restricted to categorized subpaths.
//!
//! Agents never touch the filesystem directly; every write goes through
//! here so the root-document restriction (no_root_docs) is enforced at a
//! single chokepoint in addition to the Protection Kernel's pre-emit check.

use std::path::{Path, PathBuf};

use crate::error::{CortexError, Result};

/// The only top-level directories an agent may write under, per §6's
/// "categorised subpath" list for the workspace filesystem collaborator.
pub const ALLOWED_SUBPATHS: &[&str] = &[
    "reports",
    "analysis",
    "investigations",
    "planning",
    "implementation-guides",
    "summaries",
    "conversation-captures",
];

pub struct WorkspaceWriter {
    root: PathBuf,
}

impl WorkspaceWriter {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Write `content` to `relative_path`, rejecting any path that isn't
    /// nested under one of [`ALLOWED_SUBPATHS`].
    pub fn write(&self, relative_path: &Path, content: &str) -> Result<PathBuf> {
        let top_level = relative_path
            .components()
            .next()
            .and_then(|c| c.as_os_str().to_str());

        let allowed = top_level.is_some_and(|t| ALLOWED_SUBPATHS.contains(&t));
        if !allowed {
            return Err(CortexError::blocked(
                "no_root_docs",
                format!(
                    "refusing to write {}: must be nested under one of {ALLOWED_SUBPATHS:?}",
                    relative_path.display()
                ),
                vec![],
            ));
        }

        let full_path = self.root.join(relative_path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, content)?;
        Ok(full_path)
    }
}
