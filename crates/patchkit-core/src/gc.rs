//! Garbage collector: removes blobs unreferenced by the manifest. Safe to
//! run after any manifest mutation; never deletes a referenced blob; treats
//! an absent blob directory as zero blobs rather than an error.

use crate::blob_store::BlobStore;
use crate::digest::Digest;
use crate::error::Result;
use crate::manifest::Manifest;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default)]
pub struct GcReport {
    pub checked: usize,
    pub removed: usize,
    pub bytes_freed: u64,
}

/// Run (or dry-run) GC against `store`, keeping every blob referenced by
/// `manifest`.
pub fn collect(manifest: &Manifest, store: &BlobStore, dry_run: bool) -> Result<GcReport> {
    let referenced: HashSet<Digest> = manifest.referenced_hashes();
    let present = store.list()?;
    let unreferenced: Vec<&Digest> = present.difference(&referenced).collect();

    let mut report = GcReport {
        checked: present.len(),
        removed: 0,
        bytes_freed: 0,
    };

    for digest in unreferenced {
        let size = std::fs::metadata(store.root().join(digest.as_str()))
            .map(|m| m.len())
            .unwrap_or(0);
        if !dry_run {
            store.delete(digest)?;
        }
        report.removed += 1;
        report.bytes_freed += size;
    }

    info!(
        checked = report.checked,
        removed = report.removed,
        bytes_freed = report.bytes_freed,
        dry_run,
        "gc complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::hash_bytes;

    fn manifest_referencing(dir: &std::path::Path, digests: &[Digest]) -> Manifest {
        let path = dir.join("manifest.json");
        let files: serde_json::Map<String, serde_json::Value> = digests
            .iter()
            .enumerate()
            .map(|(i, d)| {
                (
                    format!("f{i}.js"),
                    serde_json::json!({ "beforeHash": d.as_str(), "afterHash": d.as_str() }),
                )
            })
            .collect();
        let doc = serde_json::json!({
            "patches": {
                "npm:a@1.0.0": {
                    "uuid": "123e4567-e89b-12d3-a456-426614174000",
                    "exportedAt": "t",
                    "files": files,
                }
            }
        });
        std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap()).unwrap();
        Manifest::load(&path).unwrap()
    }

    #[test]
    fn gc_removes_only_unreferenced_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("blobs")).unwrap();
        let h1 = hash_bytes(b"one");
        let h2 = hash_bytes(b"two");
        let hx = hash_bytes(b"unreferenced");
        store.put(&h1, b"one").unwrap();
        store.put(&h2, b"two").unwrap();
        store.put(&hx, b"unreferenced").unwrap();

        let manifest = manifest_referencing(dir.path(), &[h1.clone(), h2.clone()]);
        let report = collect(&manifest, &store, false).unwrap();

        assert_eq!(report.removed, 1);
        assert!(store.has(&h1));
        assert!(store.has(&h2));
        assert!(!store.has(&hx));
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        let store = BlobStore::open(dir.path().join("blobs")).unwrap();
        let hx = hash_bytes(b"unreferenced");
        store.put(&hx, b"unreferenced").unwrap();

        let manifest = manifest_referencing(dir.path(), &[]);
        let report = collect(&manifest, &store, true).unwrap();

        assert_eq!(report.removed, 1);
        assert!(store.has(&hx), "dry run must not delete");
    }

    #[test]
    fn missing_blob_directory_reports_zero_checked() {
        let dir = tempfile::tempdir().unwrap();
        let blobs_root = dir.path().join("blobs");
        // Open creates the directory; remove it again to simulate "never
        // populated" state without touching BlobStore's invariants.
        let store = BlobStore::open(&blobs_root).unwrap();
        std::fs::remove_dir_all(&blobs_root).unwrap();

        let manifest = manifest_referencing(dir.path(), &[]);
        let report = collect(&manifest, &store, false).unwrap();
        assert_eq!(report.checked, 0);
        assert_eq!(report.removed, 0);
    }
}
