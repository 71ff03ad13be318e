//! Flat, content-addressed blob cache.
//!
//! Layout: `<root>/<digest>` — one file per blob, no subdirectories. Writes
//! go through a sibling staging file and are published with a rename, so a
//! reader never observes a partially written blob.

use crate::digest::{hash_bytes, Digest};
use crate::error::{PatchKitError, Result};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;
use uuid::Uuid;

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    /// Open (creating if absent) a blob store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, digest: &Digest) -> PathBuf {
        self.root.join(digest.as_str())
    }

    /// Existence check by filesystem stat.
    pub fn has(&self, digest: &Digest) -> bool {
        self.path_for(digest).exists()
    }

    /// Read the whole blob into memory.
    pub fn get(&self, digest: &Digest) -> Result<Vec<u8>> {
        let path = self.path_for(digest);
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PatchKitError::BlobUnavailable(digest.to_string())
            } else {
                PatchKitError::Io(e)
            }
        })
    }

    /// Open a streaming reader for large blobs.
    pub fn open_reader(&self, digest: &Digest) -> Result<std::fs::File> {
        let path = self.path_for(digest);
        std::fs::File::open(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PatchKitError::BlobUnavailable(digest.to_string())
            } else {
                PatchKitError::Io(e)
            }
        })
    }

    /// Write `bytes` under `digest`, atomically. Recomputes the digest
    /// before accepting; on mismatch the partial file is deleted and
    /// `IntegrityError` is returned.
    pub fn put(&self, digest: &Digest, bytes: &[u8]) -> Result<()> {
        let actual = hash_bytes(bytes);
        if &actual != digest {
            return Err(PatchKitError::IntegrityError {
                path: self.path_for(digest),
                expected: digest.to_string(),
                actual: actual.to_string(),
            });
        }

        let dest = self.path_for(digest);
        if dest.exists() {
            // Already present: `put` is idempotent, no re-write needed.
            return Ok(());
        }

        let staging = self.root.join(format!(".{}.staging", Uuid::new_v4()));
        let write_result = (|| -> Result<()> {
            let mut file = std::fs::File::create(&staging)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }

        std::fs::rename(&staging, &dest)?;
        Ok(())
    }

    /// Unlink a blob; idempotent.
    pub fn delete(&self, digest: &Digest) -> Result<()> {
        match std::fs::remove_file(self.path_for(digest)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PatchKitError::Io(e)),
        }
    }

    /// Enumerate stored blobs, filtering out names that aren't valid digests
    /// (e.g. orphaned `.staging` files from a crash mid-`put`).
    pub fn list(&self) -> Result<HashSet<Digest>> {
        let mut out = HashSet::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(PatchKitError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            match Digest::parse(&name) {
                Ok(d) => {
                    out.insert(d);
                }
                Err(_) => {
                    if !name.starts_with('.') {
                        warn!(name = %name, "ignoring non-digest entry in blob store");
                    }
                }
            }
        }
        Ok(out)
    }
}
