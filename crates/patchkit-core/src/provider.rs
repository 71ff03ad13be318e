//! Remote blob provider contract.
//!
//! The core only depends on this trait; `patchkit-provider` supplies the
//! concrete `reqwest`-backed implementation, and `NullProvider` here gives
//! an offline mode that never attempts I/O.

use crate::digest::Digest;
use async_trait::async_trait;

/// Outcome of a single `fetch_blob` call.
pub enum FetchOutcome {
    Found(Vec<u8>),
    NotAvailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error fetching blob: {0}")]
    Transport(String),
}

/// Fetches a blob body by digest from a remote content store. Implementors
/// MUST NOT decode or transform the body — raw bytes only.
#[async_trait]
pub trait BlobProvider: Send + Sync {
    async fn fetch_blob(&self, digest: &Digest) -> Result<FetchOutcome, ProviderError>;
}

/// The offline adapter: always reports `NotAvailable` without any I/O.
pub struct NullProvider;

#[async_trait]
impl BlobProvider for NullProvider {
    async fn fetch_blob(&self, _digest: &Digest) -> Result<FetchOutcome, ProviderError> {
        Ok(FetchOutcome::NotAvailable)
    }
}

/// Materializes `digest` into `store` if missing, consulting `provider`
/// only on a blob-store miss. Returns `true` once the blob is present in
/// the store, `false` if the provider could not supply it.
pub async fn ensure_blob(
    store: &crate::blob_store::BlobStore,
    provider: &dyn BlobProvider,
    digest: &Digest,
) -> crate::error::Result<bool> {
    if store.has(digest) {
        return Ok(true);
    }
    match provider
        .fetch_blob(digest)
        .await
        .map_err(|e| crate::error::PatchKitError::Transport(e.to_string()))?
    {
        FetchOutcome::Found(bytes) => {
            store.put(digest, &bytes)?;
            Ok(true)
        }
        FetchOutcome::NotAvailable => Ok(false),
    }
}
