//! The spec's Blob Store (§2 item 2): put-binary-object and issue-time-
//! limited-read-URL, backed by the `object_store` crate so the same client
//! works against S3 in production and an in-memory/local store in tests.

use std::sync::Arc;
use std::time::Duration;

use http::Method;
use object_store::memory::InMemory;
use object_store::path::Path as StoragePath;
use object_store::signer::Signer;
use object_store::ObjectStore;
use thiserror::Error;

use crate::config::{StorageConfig, StorageProvider};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("presigning is not supported by this storage provider")]
    SigningUnsupported,

    #[error("object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// Wraps an `object_store` backend plus, when the backend supports it
/// (S3, GCS), a `Signer` for pre-signed read URLs (spec §4.5). Local/
/// in-memory backends used in dev and tests have no signer; `presign_read`
/// falls back to a descriptive, non-authoritative URL for them.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    signer: Option<Arc<dyn Signer>>,
    pub bucket: String,
}

impl StorageClient {
    /// Wraps an arbitrary `object_store` backend with no signing support.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String) -> Self {
        Self { store, signer: None, bucket }
    }

    /// In-memory storage for tests and local development.
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(InMemory::new()),
            signer: None,
            bucket: "processvault-local".to_string(),
        }
    }

    /// Builds a client from operator configuration (spec §10.1). S3 gets a
    /// real `Signer`; `Local` uses the filesystem with no signing.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config.provider {
            StorageProvider::Local => {
                let path = config.endpoint.as_deref().unwrap_or("data/blobs");
                std::fs::create_dir_all(path).map_err(|e| StorageError::UploadFailed(e.to_string()))?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(path)
                    .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
                Ok(Self {
                    store: Arc::new(fs),
                    signer: None,
                    bucket: config.bucket.clone(),
                })
            }
            StorageProvider::S3 => {
                let mut builder = object_store::aws::AmazonS3Builder::new()
                    .with_bucket_name(&config.bucket);
                if let Some(endpoint) = &config.endpoint {
                    builder = builder.with_endpoint(endpoint).with_allow_http(true);
                }
                if let Some(region) = &config.region {
                    builder = builder.with_region(region);
                }
                if let Some(key) = &config.access_key {
                    builder = builder.with_access_key_id(key);
                }
                if let Some(secret) = &config.secret_key {
                    builder = builder.with_secret_access_key(secret);
                }

                let s3 = Arc::new(
                    builder
                        .build()
                        .map_err(|e| StorageError::UploadFailed(e.to_string()))?,
                );
                let store: Arc<dyn ObjectStore> = s3.clone();
                let signer: Arc<dyn Signer> = s3;

                Ok(Self {
                    store,
                    signer: Some(signer),
                    bucket: config.bucket.clone(),
                })
            }
        }
    }

    /// Uploads bytes under `key` (spec §4.2 step 5d,
    /// `processes/{processNumber}/documents/{documentId}/{name}`).
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();

        let put_result = self.store.put(&path, data.into()).await?;

        tracing::info!(key, size, "uploaded to storage");

        Ok(UploadMetadata {
            key: key.to_string(),
            etag: put_result.e_tag.clone(),
            size,
        })
    }

    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;

        tracing::info!(key, size = bytes.len(), "downloaded from storage");
        Ok(bytes.to_vec())
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Issues a fresh, time-limited read URL for `key` (spec §4.5, §9 open
    /// question: TTL defaults to 1h, never cached — callers must call this
    /// every time they need a link, not reuse a prior result).
    pub async fn presign_read(&self, key: &str, ttl: Duration) -> Result<String> {
        match &self.signer {
            Some(signer) => {
                let path = StoragePath::from(key);
                let url = signer
                    .signed_url(Method::GET, &path, ttl)
                    .await
                    .map_err(StorageError::ObjectStoreError)?;
                Ok(url.to_string())
            }
            None => {
                // Local/in-memory backends have no real signing capability.
                // Dev/test callers still get a TTL-shaped URL so the rest
                // of the pipeline (webhook payloads, status projection)
                // exercises the same code path; it is not a capability URL.
                let expires_at = chrono::Utc::now()
                    + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
                Ok(format!(
                    "file:///{}/{}?expires={}",
                    self.bucket,
                    key,
                    expires_at.timestamp()
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_round_trips() {
        let client = StorageClient::in_memory();
        client.upload("processes/p1/documents/d1/a.pdf", b"hello".to_vec()).await.unwrap();

        let bytes = client.download("processes/p1/documents/d1/a.pdf").await.unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[tokio::test]
    async fn exists_reflects_uploads() {
        let client = StorageClient::in_memory();
        assert!(!client.exists("missing").await.unwrap());

        client.upload("present", b"x".to_vec()).await.unwrap();
        assert!(client.exists("present").await.unwrap());
    }

    #[tokio::test]
    async fn presign_read_without_a_signer_still_returns_a_url() {
        let client = StorageClient::in_memory();
        client.upload("k", b"v".to_vec()).await.unwrap();

        let url = client.presign_read("k", Duration::from_secs(3600)).await.unwrap();
        assert!(url.contains("k"));
        assert!(url.contains("expires="));
    }
}
