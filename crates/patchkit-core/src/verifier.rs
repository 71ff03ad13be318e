//! Classifies a file's current on-disk state against its expected
//! before/after hashes. Hash-based, not timestamp-based: robust against
//! filesystem copies, VCS checkouts, and hand edits.

use crate::digest::hash_file;
use crate::error::Result;
use crate::manifest::FileChange;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// The file does not exist — deleted by the user.
    Missing,
    /// Current hash matches `before` — safe to apply.
    Original,
    /// Current hash matches `after` — already applied; apply is a no-op.
    Patched,
    /// Current hash matches neither — user edits present; unsafe.
    Modified,
}

/// Classify `path` against `change`. Used directly for apply (before/after
/// as given) and with the roles swapped for rollback.
pub fn classify(path: &Path, change: &FileChange) -> Result<FileStatus> {
    if !path.exists() {
        return Ok(FileStatus::Missing);
    }
    let current = hash_file(path)?;
    if current == change.before_hash {
        Ok(FileStatus::Original)
    } else if current == change.after_hash {
        Ok(FileStatus::Patched)
    } else {
        Ok(FileStatus::Modified)
    }
}

/// Classify for rollback purposes: swaps the meaning of before/after so
/// `Patched` means "ready to roll back" and `Original` means "already
/// rolled back".
pub fn classify_for_rollback(path: &Path, change: &FileChange) -> Result<FileStatus> {
    let swapped = FileChange {
        before_hash: change.after_hash.clone(),
        after_hash: change.before_hash.clone(),
    };
    classify(path, &swapped)
}
