//! Blob persistence gateway.
//!
//! [`BlobStore`] is the raw byte-level seam (a Walrus publisher/aggregator
//! pair in production, an in-memory map in tests). [`BlobGateway`] layers
//! aggregate (de)serialization and a hard timeout on top, so every call ends
//! in a classified [`GatewayError`] rather than hanging.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use thiserror::Error;

use crate::config::BlobConfig;
use crate::memory::types::MemoryAggregate;

/// Opaque identifier of a stored snapshot.
pub type Pointer = String;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("blob store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("blob store request failed: {0}")]
    Transport(String),
    #[error("blob store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unrecognized blob store response: {0}")]
    UnrecognizedResponse(String),
    #[error("failed to encode aggregate: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("stored snapshot is not a valid aggregate: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Byte-level access to a content-addressed blob store.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `payload` for `epochs` retention units and return its pointer.
    /// Storing bytes that are already present is a success.
    async fn put_bytes(&self, payload: Bytes, epochs: u32) -> Result<Pointer, GatewayError>;

    /// Fetch a blob. `Ok(None)` means the pointer is unknown or expired.
    async fn get_bytes(&self, pointer: &str) -> Result<Option<Bytes>, GatewayError>;
}

/// Timeout-guarded, aggregate-aware front for a [`BlobStore`].
#[derive(Clone)]
pub struct BlobGateway {
    store: Arc<dyn BlobStore>,
    timeout: Duration,
}

impl BlobGateway {
    pub fn new(store: Arc<dyn BlobStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Serialize and store an aggregate.
    pub async fn put(&self, aggregate: &MemoryAggregate, epochs: u32) -> Result<Pointer, GatewayError> {
        let payload = serde_json::to_vec(aggregate).map_err(GatewayError::Encode)?;
        self.put_bytes(Bytes::from(payload), epochs).await
    }

    /// Fetch and deserialize an aggregate. The returned value carries
    /// `pointer` set to the pointer it was fetched from.
    pub async fn get(&self, pointer: &str) -> Result<Option<MemoryAggregate>, GatewayError> {
        let Some(bytes) = self.get_bytes(pointer).await? else {
            return Ok(None);
        };
        let mut aggregate: MemoryAggregate =
            serde_json::from_slice(&bytes).map_err(GatewayError::Decode)?;
        aggregate.pointer = Some(pointer.to_string());
        Ok(Some(aggregate))
    }

    pub async fn put_bytes(&self, payload: Bytes, epochs: u32) -> Result<Pointer, GatewayError> {
        let size = payload.len();
        let pointer = tokio::time::timeout(self.timeout, self.store.put_bytes(payload, epochs))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;
        tracing::debug!(%pointer, size, epochs, "blob stored");
        Ok(pointer)
    }

    pub async fn get_bytes(&self, pointer: &str) -> Result<Option<Bytes>, GatewayError> {
        let result = tokio::time::timeout(self.timeout, self.store.get_bytes(pointer))
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout))??;
        if result.is_none() {
            tracing::debug!(pointer, "blob not found");
        }
        Ok(result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreResponse {
    newly_created: Option<NewlyCreated>,
    already_certified: Option<AlreadyCertified>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewlyCreated {
    blob_object: BlobObject,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobObject {
    blob_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AlreadyCertified {
    blob_id: String,
}

/// Pull the blob id out of a publisher response. Both "newly created" and
/// "already certified" count as stored.
pub fn pointer_from_store_response(body: &[u8]) -> Result<Pointer, GatewayError> {
    let parsed: StoreResponse = serde_json::from_slice(body)
        .map_err(|e| GatewayError::UnrecognizedResponse(e.to_string()))?;
    match (parsed.newly_created, parsed.already_certified) {
        (Some(created), _) => Ok(created.blob_object.blob_id),
        (None, Some(certified)) => Ok(certified.blob_id),
        (None, None) => Err(GatewayError::UnrecognizedResponse(
            String::from_utf8_lossy(body).chars().take(200).collect(),
        )),
    }
}

/// Walrus HTTP API: writes go to a publisher, reads to an aggregator.
pub struct WalrusStore {
    client: reqwest::Client,
    publisher_url: String,
    aggregator_url: String,
}

impl WalrusStore {
    pub fn new(config: &BlobConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            publisher_url: config.publisher_url.trim_end_matches('/').to_string(),
            aggregator_url: config.aggregator_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BlobStore for WalrusStore {
    async fn put_bytes(&self, payload: Bytes, epochs: u32) -> Result<Pointer, GatewayError> {
        let url = format!("{}/v1/blobs?epochs={epochs}", self.publisher_url);
        let response = self
            .client
            .put(url)
            .body(payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        pointer_from_store_response(&body)
    }

    async fn get_bytes(&self, pointer: &str) -> Result<Option<Bytes>, GatewayError> {
        let url = format!("{}/v1/blobs/{pointer}", self.aggregator_url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(Some(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newly_created_response() {
        let body = br#"{"newlyCreated":{"blobObject":{"id":"0x1","blobId":"abc123","size":10}},"cost":5}"#;
        assert_eq!(pointer_from_store_response(body).unwrap(), "abc123");
    }

    #[test]
    fn already_certified_response() {
        let body = br#"{"alreadyCertified":{"blobId":"abc123","endEpoch":40}}"#;
        assert_eq!(pointer_from_store_response(body).unwrap(), "abc123");
    }

    #[test]
    fn unknown_response_shape_is_an_error() {
        assert!(matches!(
            pointer_from_store_response(br#"{"markedInvalid":{}}"#),
            Err(GatewayError::UnrecognizedResponse(_))
        ));
        assert!(matches!(
            pointer_from_store_response(b"not json"),
            Err(GatewayError::UnrecognizedResponse(_))
        ));
    }

    struct Stalled;

    #[async_trait]
    impl BlobStore for Stalled {
        async fn put_bytes(&self, _: Bytes, _: u32) -> Result<Pointer, GatewayError> {
            std::future::pending().await
        }
        async fn get_bytes(&self, _: &str) -> Result<Option<Bytes>, GatewayError> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out() {
        let gateway = BlobGateway::new(Arc::new(Stalled), Duration::from_secs(10));
        let aggregate = MemoryAggregate::empty("0xabc");
        assert!(matches!(
            gateway.put(&aggregate, 5).await,
            Err(GatewayError::Timeout(d)) if d == Duration::from_secs(10)
        ));
        assert!(matches!(gateway.get("p").await, Err(GatewayError::Timeout(_))));
    }
}
