//! Walks `node_modules` to find the on-disk directories for a package key.
//! A key can resolve to zero, one, or many installed directories, including
//! nested `node_modules` (a package may be installed at multiple depths
//! when dependency versions conflict).

use patchkit_core::orchestrator::PackageLocator;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub struct NodeModulesLocator {
    root: PathBuf,
}

impl NodeModulesLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl PackageLocator for NodeModulesLocator {
    fn locate(&self, package_key: &str) -> Vec<PathBuf> {
        let Some(name) = parse_package_name(package_key) else {
            return Vec::new();
        };
        find_installed_instances(&self.root, &name)
    }
}

/// Extract the bare package name from either supported key grammar: PURL
/// `pkg:<type>/<name>[@<version>]` or shorthand `<type>:<name>@<version>`.
/// Scoped npm names (`@scope/name`) are kept intact.
fn parse_package_name(key: &str) -> Option<String> {
    let rest = if let Some(after_pkg) = key.strip_prefix("pkg:") {
        let (_ecosystem, after_type) = after_pkg.split_once('/')?;
        after_type
    } else {
        let (_ecosystem, after_colon) = key.split_once(':')?;
        after_colon
    };

    if let Some(scoped) = rest.strip_prefix('@') {
        let (scope, name_and_version) = scoped.split_once('/')?;
        let name = name_and_version.split('@').next()?;
        if scope.is_empty() || name.is_empty() {
            return None;
        }
        Some(format!("@{scope}/{name}"))
    } else {
        let name = rest.split('@').next()?;
        if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        }
    }
}

/// Find every directory under `root` (a `node_modules` tree, searched
/// recursively to cover nested `node_modules`) whose trailing path
/// components match `name`.
fn find_installed_instances(root: &Path, name: &str) -> Vec<PathBuf> {
    let wanted: Vec<&str> = name.split('/').collect();

    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| matches_trailing_components(entry.path(), &wanted))
        .map(|entry| entry.path().to_path_buf())
        .collect()
}

fn matches_trailing_components(path: &Path, wanted: &[&str]) -> bool {
    let components: Vec<&str> = path
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect();
    if components.len() < wanted.len() {
        return false;
    }
    let tail = &components[components.len() - wanted.len()..];
    tail == wanted
}
