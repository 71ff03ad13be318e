//! Rollback engine: transitions a package directory from patched back to
//! original. Mirrors the apply engine with before/after swapped; unlike
//! apply, the blobs needed (`beforeHash`) are not fetched eagerly, so
//! rollback may call the provider on demand.

use crate::blob_store::BlobStore;
use crate::digest::hash_file;
use crate::error::{PatchKitError, Result};
use crate::manifest::{strip_package_prefix, FileChange, PatchRecord};
use crate::provider::{ensure_blob, BlobProvider};
use crate::safety::{check_disk_space, validate_no_symlink_escape};
use crate::verifier::{classify_for_rollback, FileStatus};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct RollbackReport {
    pub restored: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

enum PlanEntry {
    Skip(PathBuf),
    Restore { path: PathBuf, before: FileChange },
}

/// Roll `record` back at `package_dir`. All `Original` is a no-op success;
/// any `Modified`/`Missing` aborts with `UnsafeState` before any write;
/// otherwise every `Patched` file is restored to its `beforeHash` bytes.
pub async fn rollback_package(
    record: &PatchRecord,
    package_dir: &Path,
    store: &BlobStore,
    provider: &dyn BlobProvider,
) -> Result<RollbackReport> {
    let mut entries = Vec::with_capacity(record.files.len());

    for (relative_path, change) in &record.files {
        let stripped = strip_package_prefix(relative_path);
        let path = package_dir.join(stripped);

        match classify_for_rollback(&path, change)? {
            FileStatus::Original => entries.push(PlanEntry::Skip(path)),
            FileStatus::Patched => {
                if !ensure_blob(store, provider, &change.before_hash).await? {
                    return Err(PatchKitError::MissingBeforeBlob(
                        change.before_hash.to_string(),
                    ));
                }
                entries.push(PlanEntry::Restore {
                    path,
                    before: change.clone(),
                });
            }
            FileStatus::Missing => {
                return Err(PatchKitError::UnsafeState {
                    path,
                    status: FileStatus::Missing,
                })
            }
            FileStatus::Modified => {
                return Err(PatchKitError::UnsafeState {
                    path,
                    status: FileStatus::Modified,
                })
            }
        }
    }

    let mut report = RollbackReport::default();
    let mut snapshots: HashMap<PathBuf, Vec<u8>> = HashMap::new();

    for entry in entries {
        match entry {
            PlanEntry::Skip(path) => report.skipped.push(path),
            PlanEntry::Restore { path, before } => {
                // The pre-rollback bytes are the after-bytes already on disk.
                let pre_image = std::fs::read(&path).map_err(PatchKitError::Io)?;
                snapshots.insert(path.clone(), pre_image);
                match write_verified(&path, &before.before_hash, store) {
                    Ok(()) => {
                        report.restored.push(path);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "rollback failed; rewinding");
                        rewind(&snapshots);
                        return Err(e);
                    }
                }
            }
        }
    }

    info!(
        restored = report.restored.len(),
        skipped = report.skipped.len(),
        "rollback complete"
    );
    Ok(report)
}

fn write_verified(path: &Path, before_hash: &crate::digest::Digest, store: &BlobStore) -> Result<()> {
    validate_no_symlink_escape(path)?;
    let bytes = store.get(before_hash)?;

    let parent = path
        .parent()
        .ok_or_else(|| PatchKitError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory")))?;
    check_disk_space(parent, bytes.len() as u64)?;

    let staging = parent.join(format!(".patchkit-{}.tmp", Uuid::new_v4()));
    let write_result = (|| -> Result<()> {
        let mut file = std::fs::File::create(&staging)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        Ok(())
    })();
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&staging);
        return Err(e);
    }

    std::fs::rename(&staging, path)?;

    let actual = hash_file(path)?;
    if &actual != before_hash {
        return Err(PatchKitError::IntegrityError {
            path: path.to_path_buf(),
            expected: before_hash.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn rewind(snapshots: &HashMap<PathBuf, Vec<u8>>) {
    for (path, bytes) in snapshots {
        if let Err(e) = std::fs::write(path, bytes) {
            warn!(path = %path.display(), error = %e, "rewind failed to restore pre-rollback bytes");
        }
    }
}
