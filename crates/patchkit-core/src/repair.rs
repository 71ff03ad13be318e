//! Repair engine: downloads missing referenced blobs, then optionally runs
//! GC. Each phase is independently togglable: offline mode skips fetching
//! and only reports what's missing; download-only mode skips GC.

use crate::blob_store::BlobStore;
use crate::digest::Digest;
use crate::error::Result;
use crate::gc::{collect, GcReport};
use crate::manifest::Manifest;
use crate::provider::{BlobProvider, FetchOutcome};
use tracing::{info, warn};

#[derive(Debug)]
pub struct FetchAttempt {
    pub digest: Digest,
    pub ok: bool,
}

#[derive(Debug, Default)]
pub struct RepairReport {
    pub fetched: Vec<FetchAttempt>,
    pub gc: Option<GcReport>,
}

#[derive(Default)]
pub struct RepairOptions {
    /// Also fetch `beforeHash` blobs, not just `afterHash`.
    pub include_before_hashes: bool,
    /// Skip phase 1 (fetching) entirely and just report what's missing.
    pub offline: bool,
    /// Skip phase 2 (GC).
    pub download_only: bool,
    pub dry_run_gc: bool,
}

/// Run the repair sequence against `manifest`/`store`, using `provider` for
/// phase 1 unless `options.offline` is set.
pub async fn repair(
    manifest: &Manifest,
    store: &BlobStore,
    provider: &dyn BlobProvider,
    options: &RepairOptions,
) -> Result<RepairReport> {
    let mut needed = manifest.after_hashes();
    if options.include_before_hashes {
        needed.extend(manifest.before_hashes());
    }
    let present = store.list()?;

    let mut report = RepairReport::default();

    if options.offline {
        for digest in needed.difference(&present) {
            info!(digest = %digest, "offline mode: blob missing, not fetching");
            report.fetched.push(FetchAttempt {
                digest: digest.clone(),
                ok: false,
            });
        }
    } else {
        for digest in needed.difference(&present) {
            let ok = match provider.fetch_blob(digest).await {
                Ok(FetchOutcome::Found(bytes)) => store.put(digest, &bytes).is_ok(),
                Ok(FetchOutcome::NotAvailable) => false,
                Err(e) => {
                    warn!(digest = %digest, error = %e, "fetch failed");
                    false
                }
            };
            report.fetched.push(FetchAttempt {
                digest: digest.clone(),
                ok,
            });
        }
    }

    if !options.download_only {
        report.gc = Some(collect(manifest, store, options.dry_run_gc)?);
    }

    Ok(report)
}
