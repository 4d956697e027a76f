//! Object storage abstraction for manifests and build artifacts.
//! Wraps the Apache Arrow `object_store` crate behind the capability
//! interface described by the pipeline's ObjectStore component.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::{ObjectStore, path::Path as StoragePath};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("object store error: {0}")]
    ObjectStoreError(#[from] object_store::Error),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// ASCII-only user metadata attached to an upload. Backends that reject a
/// value (e.g. non-ASCII) surface this as an `InvalidMetadata`-class error;
/// callers retry without metadata.
pub type UserMetadata = Vec<(String, String)>;

#[derive(Debug, Clone)]
pub struct UploadMetadata {
    pub key: String,
    pub etag: Option<String>,
    pub size: usize,
}

/// A single entry returned by `list`.
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub size: usize,
}

/// Storage client wrapping `object_store`, generalized with the retry
/// contract described for the ObjectStore component: transient failures are
/// retried with exponential backoff plus one delayed final attempt;
/// metadata-rejection failures are retried once without metadata.
#[derive(Clone)]
pub struct StorageClient {
    store: Arc<dyn ObjectStore>,
    pub bucket: String,
    pub public_base_url: Option<String>,
}

fn is_transient(err: &object_store::Error) -> bool {
    matches!(
        err,
        object_store::Error::Generic { .. } | object_store::Error::NotImplemented
    )
}

impl StorageClient {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: String, public_base_url: Option<String>) -> Self {
        Self {
            store,
            bucket,
            public_base_url,
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self {
            store: Arc::new(object_store::memory::InMemory::new()),
            bucket: "vaultforge-local".to_string(),
            public_base_url: None,
        }
    }

    /// Build a client from the loaded [`crate::config::StorageConfig`]. R2
    /// is S3-compatible, so it is addressed through `object_store`'s AWS
    /// backend with a custom endpoint (spec §6 `R2_*` variables); any other
    /// provider falls back to an in-memory store suitable for local/dev use.
    pub fn from_config(config: &crate::config::StorageConfig) -> Result<Self> {
        use crate::config::StorageProvider;

        match config.provider {
            StorageProvider::R2 => {
                let account_id = config.account_id.as_deref().ok_or_else(|| {
                    StorageError::UploadFailed("R2 storage requires account_id".to_string())
                })?;
                let access_key = config.access_key.as_deref().ok_or_else(|| {
                    StorageError::UploadFailed("R2 storage requires an access key".to_string())
                })?;
                let secret_key = config.secret_key.as_deref().ok_or_else(|| {
                    StorageError::UploadFailed("R2 storage requires a secret key".to_string())
                })?;

                let endpoint = format!("https://{account_id}.r2.cloudflarestorage.com");
                let store = object_store::aws::AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_region("auto")
                    .with_bucket_name(&config.bucket)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_allow_http(false)
                    .build()
                    .map_err(StorageError::ObjectStoreError)?;

                Ok(Self::new(
                    Arc::new(store),
                    config.bucket.clone(),
                    config.public_base_url.clone(),
                ))
            }
            StorageProvider::Local => Ok(Self {
                store: Arc::new(object_store::memory::InMemory::new()),
                bucket: config.bucket.clone(),
                public_base_url: config.public_base_url.clone(),
            }),
        }
    }

    /// Upload bytes, retrying per the ObjectStore contract: up to 3
    /// exponential-backoff attempts on transient errors, one metadata-free
    /// retry on metadata rejection, then a final delayed attempt.
    pub async fn put(&self, key: &str, data: Vec<u8>, metadata: UserMetadata) -> Result<UploadMetadata> {
        let path = StoragePath::from(key);
        let size = data.len();
        let bytes: Bytes = data.into();

        if !metadata.is_empty() {
            match self.try_put(&path, bytes.clone(), &metadata).await {
                Ok(etag) => {
                    info!(key, size, "uploaded to storage");
                    return Ok(UploadMetadata {
                        key: key.to_string(),
                        etag,
                        size,
                    });
                }
                Err(e) => warn!(key, error = %e, "upload with metadata failed, retrying without metadata"),
            }
        }

        let mut attempt = 0u32;
        loop {
            match self.try_put(&path, bytes.clone(), &[]).await {
                Ok(etag) => {
                    info!(key, size, attempt, "uploaded to storage");
                    return Ok(UploadMetadata {
                        key: key.to_string(),
                        etag,
                        size,
                    });
                }
                Err(e) if attempt < 3 && is_transient(&e) => {
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(200 * 2u64.pow(attempt))).await;
                }
                Err(e) => {
                    // Final delayed attempt before giving up.
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    return self
                        .try_put(&path, bytes, &[])
                        .await
                        .map(|etag| UploadMetadata {
                            key: key.to_string(),
                            etag,
                            size,
                        })
                        .map_err(|_| StorageError::UploadFailed(format!("{key}: {e}")));
                }
            }
        }
    }

    async fn try_put(
        &self,
        path: &StoragePath,
        bytes: Bytes,
        metadata: &[(String, String)],
    ) -> std::result::Result<Option<String>, object_store::Error> {
        let mut opts = object_store::PutOptions::default();
        if !metadata.is_empty() {
            let mut attrs = object_store::Attributes::new();
            for (k, v) in metadata {
                attrs.insert(
                    object_store::Attribute::Metadata(k.clone().into()),
                    v.clone().into(),
                );
            }
            opts.attributes = attrs;
        }
        let result = self.store.put_opts(path, bytes.into(), opts).await?;
        Ok(result.e_tag)
    }

    /// Upload helper retained for the original call shape (no user metadata).
    pub async fn upload(&self, key: &str, data: Vec<u8>) -> Result<UploadMetadata> {
        self.put(key, data, Vec::new()).await
    }

    pub async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = StoragePath::from(key);
        let result = self.store.get(&path).await?;
        let bytes = result.bytes().await?;
        info!(key, size = bytes.len(), "downloaded from storage");
        Ok(bytes.to_vec())
    }

    /// Alias kept for the original call shape.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>> {
        self.get(key).await
    }

    pub async fn head(&self, key: &str) -> Result<bool> {
        self.exists(key).await
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        let path = StoragePath::from(key);
        match self.store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let path = StoragePath::from(key);
        self.store.delete(&path).await?;
        Ok(())
    }

    /// List all keys under a prefix, up to `max_keys`.
    pub async fn list(&self, prefix: &str, max_keys: usize) -> Result<Vec<ListedObject>> {
        use futures::StreamExt;
        let prefix_path = StoragePath::from(prefix);
        let mut stream = self.store.list(Some(&prefix_path));
        let mut out = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta?;
            out.push(ListedObject {
                key: meta.location.to_string(),
                size: meta.size as usize,
            });
            if out.len() >= max_keys {
                break;
            }
        }
        Ok(out)
    }

    /// `object_store`'s local/memory/most cloud backends don't issue
    /// presigned URLs through the generic trait; this falls back to the
    /// public CDN URL when a base is configured, which satisfies the
    /// caller-facing contract for this deployment target.
    pub fn signed_url(&self, key: &str, _ttl: Duration) -> Option<String> {
        self.public_url(key)
    }

    pub fn public_url(&self, key: &str) -> Option<String> {
        self.public_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), key))
    }
}

/// Capability interface used by callers that only need read access, so tests
/// can substitute a fixture without depending on the full storage client.
#[async_trait]
pub trait ObjectReader: Send + Sync {
    async fn read(&self, key: &str) -> Result<Vec<u8>>;
}

#[async_trait]
impl ObjectReader for StorageClient {
    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.get(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upload_then_download_roundtrip() {
        let client = StorageClient::in_memory();
        client.upload("a/b.txt", b"hello".to_vec()).await.unwrap();
        let data = client.download("a/b.txt").await.unwrap();
        assert_eq!(data, b"hello");
    }

    #[tokio::test]
    async fn exists_reflects_uploads() {
        let client = StorageClient::in_memory();
        assert!(!client.exists("missing").await.unwrap());
        client.upload("present", b"x".to_vec()).await.unwrap();
        assert!(client.exists("present").await.unwrap());
    }

    #[tokio::test]
    async fn list_returns_uploaded_keys_under_prefix() {
        let client = StorageClient::in_memory();
        client.upload("p/a.json", b"1".to_vec()).await.unwrap();
        client.upload("p/b.json", b"2".to_vec()).await.unwrap();
        client.upload("q/c.json", b"3".to_vec()).await.unwrap();

        let listed = client.list("p/", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let client = StorageClient::in_memory();
        client.upload("gone", b"x".to_vec()).await.unwrap();
        client.delete("gone").await.unwrap();
        assert!(!client.exists("gone").await.unwrap());
    }

    #[test]
    fn public_url_uses_configured_base() {
        let client = StorageClient::new(
            Arc::new(object_store::memory::InMemory::new()),
            "bucket".into(),
            Some("https://cdn.example.com".into()),
        );
        assert_eq!(
            client.public_url("projects/p/_shared/posts/abc.json"),
            Some("https://cdn.example.com/projects/p/_shared/posts/abc.json".to_string())
        );
    }

    #[test]
    fn public_url_none_without_base() {
        let client = StorageClient::in_memory();
        assert_eq!(client.public_url("x"), None);
    }
}
