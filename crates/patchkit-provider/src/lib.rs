//! HTTP(S) blob provider: fetches a blob body by digest from a remote
//! content store. Never decodes or transforms the body — raw bytes only.

use async_trait::async_trait;
use patchkit_core::digest::Digest;
use patchkit_core::provider::{BlobProvider, FetchOutcome, ProviderError};
use reqwest::StatusCode;
use tracing::warn;

/// Base URL + client for a remote blob store addressed by digest, e.g.
/// `GET {base_url}/blobs/{digest}`.
#[derive(Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("patchkit-provider/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client");
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    #[cfg(test)]
    fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BlobProvider for HttpProvider {
    async fn fetch_blob(&self, digest: &Digest) -> Result<FetchOutcome, ProviderError> {
        let url = format!("{}/blobs/{}", self.base_url, digest);
        let res = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        match res.status() {
            StatusCode::NOT_FOUND => Ok(FetchOutcome::NotAvailable),
            status if status.is_success() => {
                let bytes = res
                    .bytes()
                    .await
                    .map_err(|e| ProviderError::Transport(e.to_string()))?;
                Ok(FetchOutcome::Found(bytes.to_vec()))
            }
            status => {
                warn!(%status, %url, "provider returned non-2xx status");
                Err(ProviderError::Transport(format!(
                    "unexpected status {status} fetching {url}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patchkit_core::digest::hash_bytes;

    #[tokio::test]
    async fn fetch_blob_maps_not_found_to_not_available() {
        let mut server = mockito::Server::new_async().await;
        let digest = hash_bytes(b"payload");
        let _m = server
            .mock("GET", format!("/blobs/{digest}").as_str())
            .with_status(404)
            .create_async()
            .await;

        let provider = HttpProvider::with_client(reqwest::Client::new(), server.url());
        let outcome = provider.fetch_blob(&digest).await.unwrap();
        assert!(matches!(outcome, FetchOutcome::NotAvailable));
    }

    #[tokio::test]
    async fn fetch_blob_returns_raw_body_on_success() {
        let mut server = mockito::Server::new_async().await;
        let digest = hash_bytes(b"payload");
        let _m = server
            .mock("GET", format!("/blobs/{digest}").as_str())
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let provider = HttpProvider::with_client(reqwest::Client::new(), server.url());
        let outcome = provider.fetch_blob(&digest).await.unwrap();
        match outcome {
            FetchOutcome::Found(bytes) => assert_eq!(bytes, b"payload"),
            FetchOutcome::NotAvailable => panic!("expected Found"),
        }
    }

    #[tokio::test]
    async fn fetch_blob_errors_on_server_failure() {
        let mut server = mockito::Server::new_async().await;
        let digest = hash_bytes(b"payload");
        let _m = server
            .mock("GET", format!("/blobs/{digest}").as_str())
            .with_status(500)
            .create_async()
            .await;

        let provider = HttpProvider::with_client(reqwest::Client::new(), server.url());
        let err = provider.fetch_blob(&digest).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(_)));
    }
}
