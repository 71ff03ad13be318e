//! Resolves the manifest path, blob-store root, package-tree root, and
//! provider base URL from CLI flags with project-relative defaults.
//!
//! patchkit's paths are project-relative (a manifest checked into the repo
//! under `.socket/`), not OS-profile directories, so this intentionally
//! skips the `directories` crate and resolves everything relative to the
//! manifest location instead.

use anyhow::Result;
use patchkit_core::manifest::DEFAULT_MANIFEST_PATH;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PatchKitConfig {
    pub manifest_path: PathBuf,
    pub blob_store_root: PathBuf,
    pub node_modules_root: PathBuf,
    pub provider_base_url: Option<String>,
}

impl PatchKitConfig {
    pub fn resolve(
        manifest: Option<PathBuf>,
        blob_store: Option<PathBuf>,
        node_modules: Option<PathBuf>,
        provider_url: Option<String>,
    ) -> Result<Self> {
        let manifest_path = manifest.unwrap_or_else(|| PathBuf::from(DEFAULT_MANIFEST_PATH));
        let manifest_dir = manifest_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            blob_store_root: blob_store.unwrap_or_else(|| manifest_dir.join("blobs")),
            node_modules_root: node_modules.unwrap_or_else(|| PathBuf::from("node_modules")),
            manifest_path,
            provider_base_url: provider_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_derive_blob_root_from_manifest_dir() {
        let config = PatchKitConfig::resolve(None, None, None, None).unwrap();
        assert_eq!(config.manifest_path, PathBuf::from(".socket/manifest.json"));
        assert_eq!(config.blob_store_root, PathBuf::from(".socket/blobs"));
        assert_eq!(config.node_modules_root, PathBuf::from("node_modules"));
    }

    #[test]
    fn explicit_manifest_still_derives_blob_root_unless_overridden() {
        let config =
            PatchKitConfig::resolve(Some(PathBuf::from("patches/manifest.json")), None, None, None)
                .unwrap();
        assert_eq!(config.blob_store_root, PathBuf::from("patches/blobs"));
    }

    #[test]
    fn explicit_blob_store_overrides_derived_default() {
        let config = PatchKitConfig::resolve(
            Some(PathBuf::from("patches/manifest.json")),
            Some(PathBuf::from("/var/cache/patchkit/blobs")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(config.blob_store_root, PathBuf::from("/var/cache/patchkit/blobs"));
    }
}
