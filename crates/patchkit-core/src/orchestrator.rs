//! Glue above the engines: loads the manifest, asks an external locator for
//! package instances, runs apply or rollback per instance, and aggregates
//! results. Packages are processed in manifest-iteration order by default;
//! `run_parallel` opts into running distinct package directories
//! concurrently.

use crate::apply::{apply_package, ApplyReport};
use crate::blob_store::BlobStore;
use crate::error::PatchKitError;
use crate::manifest::{Manifest, PackageKey};
use crate::provider::BlobProvider;
use crate::rollback::{rollback_package, RollbackReport};
use futures::future::join_all;
use std::path::PathBuf;

/// A package instance on disk corresponding to one `PackageKey`. The
/// locator may produce zero, one, or many per key.
pub trait PackageLocator: Send + Sync {
    fn locate(&self, package_key: &str) -> Vec<PathBuf>;
}

#[derive(Clone, Copy)]
pub enum Operation {
    Apply,
    Rollback,
}

pub enum OutcomeReport {
    Applied(ApplyReport),
    RolledBack(RollbackReport),
}

pub struct PackageOutcome {
    pub package_key: PackageKey,
    pub instance: PathBuf,
    pub result: Result<OutcomeReport, PatchKitError>,
}

pub struct RunSummary {
    pub outcomes: Vec<PackageOutcome>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
}

pub struct Orchestrator<'a> {
    manifest: &'a Manifest,
    store: &'a BlobStore,
    provider: &'a dyn BlobProvider,
    locator: &'a dyn PackageLocator,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        manifest: &'a Manifest,
        store: &'a BlobStore,
        provider: &'a dyn BlobProvider,
        locator: &'a dyn PackageLocator,
    ) -> Self {
        Self {
            manifest,
            store,
            provider,
            locator,
        }
    }

    /// Run `operation` against `targets` (or every package key in the
    /// manifest if `targets` is empty), sequentially in manifest-iteration
    /// order.
    pub async fn run(&self, operation: Operation, targets: &[PackageKey]) -> RunSummary {
        let mut outcomes = Vec::new();
        for package_key in self.target_keys(targets) {
            outcomes.extend(self.run_one(operation, package_key).await);
        }
        RunSummary { outcomes }
    }

    /// Same as `run`, but packages are processed concurrently. Safe because
    /// no package directory is shared across packages and `BlobStore::put`
    /// is atomic.
    pub async fn run_parallel(&self, operation: Operation, targets: &[PackageKey]) -> RunSummary {
        let futures = self
            .target_keys(targets)
            .into_iter()
            .map(|package_key| self.run_one(operation, package_key));
        let outcomes = join_all(futures).await.into_iter().flatten().collect();
        RunSummary { outcomes }
    }

    fn target_keys(&self, targets: &[PackageKey]) -> Vec<PackageKey> {
        if targets.is_empty() {
            self.manifest.package_keys().cloned().collect()
        } else {
            targets.to_vec()
        }
    }

    async fn run_one(&self, operation: Operation, package_key: PackageKey) -> Vec<PackageOutcome> {
        let Some(record) = self.manifest.lookup(&package_key) else {
            return Vec::new();
        };
        let instances = self.locator.locate(&package_key);

        let mut outcomes = Vec::with_capacity(instances.len());
        for instance in instances {
            let result = match operation {
                Operation::Apply => {
                    apply_package(record, &instance, self.store, self.provider)
                        .await
                        .map(OutcomeReport::Applied)
                }
                Operation::Rollback => {
                    rollback_package(record, &instance, self.store, self.provider)
                        .await
                        .map(OutcomeReport::RolledBack)
                }
            };
            outcomes.push(PackageOutcome {
                package_key: package_key.clone(),
                instance,
                result,
            });
        }
        outcomes
    }
}
