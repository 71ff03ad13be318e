//! Persistent manifest: `package-key -> patch record -> per-file hashes`.
//!
//! Loaded once per invocation (`load` does a single read-then-parse, so no
//! partial manifest is ever observable) and treated as read-only by every
//! engine in this crate; only the administrative `remove` path mutates and
//! rewrites it.

use crate::digest::Digest;
use crate::error::{PatchKitError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const DEFAULT_MANIFEST_PATH: &str = ".socket/manifest.json";

/// One expected file transition. `before == after` is permitted (a no-op
/// file that is still validated on apply/rollback).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    #[serde(rename = "beforeHash")]
    pub before_hash: Digest,
    #[serde(rename = "afterHash")]
    pub after_hash: Digest,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    #[serde(default)]
    pub cves: Vec<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchRecord {
    pub uuid: Uuid,
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
    pub files: HashMap<String, FileChange>,
    #[serde(default)]
    pub vulnerabilities: HashMap<String, Vulnerability>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub tier: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManifestDocument {
    patches: HashMap<String, PatchRecord>,
}

/// Opaque, ecosystem-qualified package identifier (`npm:name@version` or
/// a PURL `pkg:npm/name@version`). The core never parses it.
pub type PackageKey = String;

pub struct Manifest {
    path: PathBuf,
    patches: HashMap<PackageKey, PatchRecord>,
}

impl Manifest {
    /// Load from `path`. Fails `ManifestNotFound` if absent, `ManifestInvalid`
    /// on schema violations (missing fields, malformed UUID, malformed
    /// digest).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PatchKitError::ManifestNotFound(path.clone())
            } else {
                PatchKitError::Io(e)
            }
        })?;
        let doc: ManifestDocument = serde_json::from_str(&raw)
            .map_err(|e| PatchKitError::ManifestInvalid(e.to_string()))?;
        Ok(Self {
            path,
            patches: doc.patches,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lookup(&self, package_key: &str) -> Option<&PatchRecord> {
        self.patches.get(package_key)
    }

    pub fn package_keys(&self) -> impl Iterator<Item = &PackageKey> {
        self.patches.keys()
    }

    pub fn patches(&self) -> &HashMap<PackageKey, PatchRecord> {
        &self.patches
    }

    /// Union of every file's `afterHash` across every patch record.
    pub fn after_hashes(&self) -> HashSet<Digest> {
        self.patches
            .values()
            .flat_map(|p| p.files.values().map(|f| f.after_hash.clone()))
            .collect()
    }

    /// Union of every file's `beforeHash` across every patch record.
    pub fn before_hashes(&self) -> HashSet<Digest> {
        self.patches
            .values()
            .flat_map(|p| p.files.values().map(|f| f.before_hash.clone()))
            .collect()
    }

    /// Union of `after_hashes()` and `before_hashes()`.
    pub fn referenced_hashes(&self) -> HashSet<Digest> {
        let mut set = self.after_hashes();
        set.extend(self.before_hashes());
        set
    }

    /// Administrative mutation: drop a package's patch record and rewrite
    /// the manifest to disk (2-space indent, trailing newline, last-write-
    /// wins). Not used by apply/rollback/gc/repair.
    pub fn remove(&mut self, package_key: &str) -> Result<bool> {
        let removed = self.patches.remove(package_key).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    fn persist(&self) -> Result<()> {
        let doc = ManifestDocument {
            patches: self.patches.clone(),
        };
        let mut json = serde_json::to_string_pretty(&doc)
            .map_err(|e| PatchKitError::ManifestInvalid(e.to_string()))?;
        json.push('\n');
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

/// Strip a leading `package/` path segment, a quirk of the upstream
/// publishing pipeline carried in `files` keys.
pub fn strip_package_prefix(relative_path: &str) -> &str {
    relative_path
        .strip_prefix("package/")
        .unwrap_or(relative_path)
}
