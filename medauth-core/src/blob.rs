//! Blob store collaborator: content-addressed storage for uploaded files

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Identifier returned by `put` and stored on the ledger as `content_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("blob store unreachable: {0}")]
    Transport(String),

    #[error("blob store rejected upload ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected blob store response: {0}")]
    UnexpectedShape(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` and return their content id.
    async fn put(&self, file_name: &str, bytes: Bytes) -> Result<ContentId, BlobError>;
}

/// Blobs kept in memory, addressed by the hex SHA-256 of their content.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<ContentId, Bytes>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &ContentId) -> Option<Bytes> {
        self.blobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, _file_name: &str, bytes: Bytes) -> Result<ContentId, BlobError> {
        let id = ContentId(format!("{:x}", Sha256::digest(&bytes)));
        self.blobs.entry(id.clone()).or_insert(bytes);
        Ok(id)
    }
}

#[derive(Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

/// Pinata `pinFileToIPFS` client. Never log the key or secret.
pub struct PinataBlobStore {
    api_url: String,
    api_key: String,
    api_secret: String,
    client: Arc<Client>,
}

impl PinataBlobStore {
    pub fn new(api_url: String, api_key: String, api_secret: String) -> Self {
        Self {
            api_url,
            api_key,
            api_secret,
            client: Arc::new(Client::new()),
        }
    }
}

#[async_trait]
impl BlobStore for PinataBlobStore {
    async fn put(&self, file_name: &str, bytes: Bytes) -> Result<ContentId, BlobError> {
        let part = Part::bytes(bytes.to_vec()).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let res = self
            .client
            .post(&self.api_url)
            .header("pinata_api_key", &self.api_key)
            .header("pinata_secret_api_key", &self.api_secret)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status().as_u16();
            let body = res.text().await.unwrap_or_default();
            return Err(BlobError::Rejected { status, body });
        }
        let pinned: PinResponse = res
            .json()
            .await
            .map_err(|e| BlobError::UnexpectedShape(e.to_string()))?;
        Ok(ContentId(pinned.ipfs_hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_content_addressed() {
        let store = InMemoryBlobStore::new();
        let a = store.put("a.png", Bytes::from_static(b"scan")).await.unwrap();
        let b = store.put("b.png", Bytes::from_static(b"scan")).await.unwrap();
        let c = store.put("c.png", Bytes::from_static(b"other")).await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(store.len(), 2);
        assert_eq!(a.as_str().len(), 64);
        assert_eq!(store.get(&a).unwrap(), Bytes::from_static(b"scan"));
    }

    #[test]
    fn test_pin_response_shape() {
        let pinned: PinResponse = serde_json::from_str(
            r#"{"IpfsHash":"QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG","PinSize":12}"#,
        )
        .unwrap();
        assert!(pinned.ipfs_hash.starts_with("Qm"));
    }
}
