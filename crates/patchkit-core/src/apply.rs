//! Apply engine: transitions a package directory from original to patched.
//! Two-phase: a pure planning pass that aborts before any write if anything
//! looks unsafe, then a strictly sequential execution pass with in-memory
//! rewind on failure.

use crate::blob_store::BlobStore;
use crate::digest::hash_file;
use crate::error::{PatchKitError, Result};
use crate::manifest::{strip_package_prefix, FileChange, PatchRecord};
use crate::provider::{ensure_blob, BlobProvider};
use crate::safety::{check_disk_space, validate_no_symlink_escape};
use crate::verifier::{classify, FileStatus};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// One resolved plan entry for a single file in the patch.
enum PlanEntry {
    /// File already matches `after`; nothing to do.
    Skip(PathBuf),
    /// File matches `before`; must be overwritten with the `after` blob.
    Write { path: PathBuf, after: FileChange },
}

/// Outcome of a completed (non-aborted) apply.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub applied: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Plan an apply for `record` rooted at `package_dir`, materializing every
/// `afterHash` via `ensure_blob` along the way. Returns either the ordered
/// plan or the first abort condition encountered; if any entry is an abort
/// condition, this phase performs no writes.
async fn plan(
    record: &PatchRecord,
    package_dir: &Path,
    store: &BlobStore,
    provider: &dyn BlobProvider,
) -> Result<Vec<PlanEntry>> {
    let mut entries = Vec::with_capacity(record.files.len());

    for (relative_path, change) in &record.files {
        let stripped = strip_package_prefix(relative_path);
        let path = package_dir.join(stripped);

        if !ensure_blob(store, provider, &change.after_hash).await? {
            return Err(PatchKitError::BlobUnavailable(change.after_hash.to_string()));
        }

        match classify(&path, change)? {
            FileStatus::Patched => entries.push(PlanEntry::Skip(path)),
            FileStatus::Original => entries.push(PlanEntry::Write {
                path,
                after: change.clone(),
            }),
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

    Ok(entries)
}

/// Apply `record` to the package instance at `package_dir`. On success every
/// `Write` entry has been atomically swapped in and re-verified; on any
/// Phase-2 failure, every file already written during this call is restored
/// to its pre-apply bytes before the error is returned.
pub async fn apply_package(
    record: &PatchRecord,
    package_dir: &Path,
    store: &BlobStore,
    provider: &dyn BlobProvider,
) -> Result<ApplyReport> {
    let entries = plan(record, package_dir, store, provider).await?;

    let mut report = ApplyReport::default();
    let mut snapshots: HashMap<PathBuf, Vec<u8>> = HashMap::new();

    for entry in entries {
        match entry {
            PlanEntry::Skip(path) => report.skipped.push(path),
            PlanEntry::Write { path, after } => {
                let pre_image = std::fs::read(&path).map_err(PatchKitError::Io)?;
                snapshots.insert(path.clone(), pre_image);
                match write_verified(&path, &after.after_hash, store) {
                    Ok(()) => {
                        report.applied.push(path);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "apply failed; rewinding");
                        rewind(&snapshots);
                        return Err(e);
                    }
                }
            }
        }
    }

    info!(
        applied = report.applied.len(),
        skipped = report.skipped.len(),
        "apply complete"
    );
    Ok(report)
}

/// Write `store`'s blob for `after_hash` to `path` using a same-directory
/// staging file and atomic rename, then re-hash the destination to confirm.
fn write_verified(path: &Path, after_hash: &crate::digest::Digest, store: &BlobStore) -> Result<()> {
    validate_no_symlink_escape(path)?;
    let bytes = store.get(after_hash)?;

    let parent = path
        .parent()
        .ok_or_else(|| PatchKitError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, "no parent directory")))?;
    std::fs::create_dir_all(parent)?;
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
    fsync_dir_best_effort(parent);

    let actual = hash_file(path)?;
    if &actual != after_hash {
        return Err(PatchKitError::IntegrityError {
            path: path.to_path_buf(),
            expected: after_hash.to_string(),
            actual: actual.to_string(),
        });
    }
    Ok(())
}

/// Restore every snapshotted file to its pre-write bytes. Best-effort: a
/// failure while rewinding one file does not stop rewind of the rest, since
/// the caller is already on the error path and wants maximum recovery.
fn rewind(snapshots: &HashMap<PathBuf, Vec<u8>>) {
    for (path, bytes) in snapshots {
        if let Err(e) = std::fs::write(path, bytes) {
            warn!(path = %path.display(), error = %e, "rewind failed to restore pre-apply bytes");
        }
    }
}

fn fsync_dir_best_effort(dir: &Path) {
    #[cfg(unix)]
    {
        if let Ok(d) = OpenOptions::new().read(true).open(dir) {
            let _ = d.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = dir;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;
    use crate::manifest::FileChange;
    use crate::provider::NullProvider;
    use std::collections::HashMap as StdHashMap;

    fn record_with(files: StdHashMap<String, FileChange>) -> PatchRecord {
        PatchRecord {
            uuid: Uuid::new_v4(),
            exported_at: "t".into(),
            files,
            vulnerabilities: Default::default(),
            description: String::new(),
            license: String::new(),
            tier: String::new(),
        }
    }

    async fn seeded_store(dir: &Path, blobs: &[&[u8]]) -> BlobStore {
        let store = BlobStore::open(dir.join("blobs")).unwrap();
        for b in blobs {
            store.put(&hash_bytes(b), b).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn clean_apply_writes_after_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("a.js"), b"original\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original\n"),
                after_hash: hash_bytes(b"patched\n"),
            },
        );
        let record = record_with(files);

        let report = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap();
        assert_eq!(report.applied.len(), 1);
        assert_eq!(std::fs::read(pkg_dir.join("a.js")).unwrap(), b"patched\n");
    }

    #[tokio::test]
    async fn apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("a.js"), b"patched\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original\n"),
                after_hash: hash_bytes(b"patched\n"),
            },
        );
        let record = record_with(files);

        let report = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped.len(), 1);
    }

    #[tokio::test]
    async fn modified_file_aborts_with_no_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("a.js"), b"tampered\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original\n"),
                after_hash: hash_bytes(b"patched\n"),
            },
        );
        let record = record_with(files);

        let err = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, PatchKitError::UnsafeState { .. }));
        assert_eq!(std::fs::read(pkg_dir.join("a.js")).unwrap(), b"tampered\n");
    }

    #[tokio::test]
    async fn missing_after_blob_aborts_before_any_write() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("a.js"), b"original\n").unwrap();
        std::fs::write(pkg_dir.join("b.js"), b"original-b\n").unwrap();

        // Only seed a.js's after-blob; b.js's after-blob is unavailable.
        let store = seeded_store(dir.path(), &[b"patched-a\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original\n"),
                after_hash: hash_bytes(b"patched-a\n"),
            },
        );
        files.insert(
            "b.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original-b\n"),
                after_hash: hash_bytes(b"patched-b\n"),
            },
        );
        let record = record_with(files);

        let err = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, PatchKitError::BlobUnavailable(_)));
        // Neither file was touched: Phase 1 aborted before Phase 2 began.
        assert_eq!(std::fs::read(pkg_dir.join("a.js")).unwrap(), b"original\n");
        assert_eq!(std::fs::read(pkg_dir.join("b.js")).unwrap(), b"original-b\n");
    }

    #[tokio::test]
    async fn mid_apply_crash_resumes_correctly() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        // Simulate file 1 already written (process died after it), file 2 untouched.
        std::fs::write(pkg_dir.join("a.js"), b"patched-a\n").unwrap();
        std::fs::write(pkg_dir.join("b.js"), b"original-b\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched-a\n", b"patched-b\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original-a\n"),
                after_hash: hash_bytes(b"patched-a\n"),
            },
        );
        files.insert(
            "b.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original-b\n"),
                after_hash: hash_bytes(b"patched-b\n"),
            },
        );
        let record = record_with(files);

        let report = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap();
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.applied.len(), 1);
        assert_eq!(std::fs::read(pkg_dir.join("b.js")).unwrap(), b"patched-b\n");
    }

    #[tokio::test]
    async fn integrity_failure_at_file_two_rewinds_file_one() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(pkg_dir.join("a.js"), b"original-a\n").unwrap();
        std::fs::write(pkg_dir.join("b.js"), b"original-b\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched-a\n"]).await;
        // Corrupt b.js's after-blob on disk after planning has already
        // verified (ensure_blob) that *a* blob exists under that digest;
        // this simulates bit rot / a corrupted store between plan and
        // execute, which write_verified's post-write re-hash must catch.
        let after_b = hash_bytes(b"patched-b\n");
        store.put(&after_b, b"patched-b\n").unwrap();
        std::fs::write(store.root().join(after_b.as_str()), b"corrupted!!").unwrap();

        let mut files = StdHashMap::new();
        files.insert(
            "a.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original-a\n"),
                after_hash: hash_bytes(b"patched-a\n"),
            },
        );
        files.insert(
            "b.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original-b\n"),
                after_hash: after_b,
            },
        );
        let record = record_with(files);

        let err = apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap_err();
        assert!(matches!(err, PatchKitError::IntegrityError { .. }));
        // Regardless of write order, both files must be back to their
        // pre-apply content once rewind completes (invariant 8).
        assert_eq!(std::fs::read(pkg_dir.join("a.js")).unwrap(), b"original-a\n");
        assert_eq!(std::fs::read(pkg_dir.join("b.js")).unwrap(), b"original-b\n");
    }

    #[tokio::test]
    async fn package_prefix_is_stripped_before_resolving_path() {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("pkg");
        std::fs::create_dir_all(pkg_dir.join("lib")).unwrap();
        std::fs::write(pkg_dir.join("lib/index.js"), b"original\n").unwrap();

        let store = seeded_store(dir.path(), &[b"patched\n"]).await;
        let mut files = StdHashMap::new();
        files.insert(
            "package/lib/index.js".to_string(),
            FileChange {
                before_hash: hash_bytes(b"original\n"),
                after_hash: hash_bytes(b"patched\n"),
            },
        );
        let record = record_with(files);

        apply_package(&record, &pkg_dir, &store, &NullProvider)
            .await
            .unwrap();
        assert_eq!(
            std::fs::read(pkg_dir.join("lib/index.js")).unwrap(),
            b"patched\n"
        );
    }
}
