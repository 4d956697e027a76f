//! CacheLoader: fetches prior-build manifests and exposes them as in-memory
//! lookup tables. Any per-category failure is non-fatal.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::media::MediaDerivativeSet;
use crate::storage::StorageClient;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("malformed manifest: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Three hash-keyed maps loaded from a prior deployment, read-only for the
/// duration of a job.
#[derive(Debug, Clone, Default)]
pub struct CacheContext {
    pub media: HashMap<String, MediaDerivativeSet>,
    pub text_embeddings: HashMap<String, Vec<f32>>,
    pub image_embeddings: HashMap<String, Vec<f32>>,
    pub stats: CacheStats,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub media_hits: u64,
    pub media_misses: u64,
    pub text_embedding_hits: u64,
    pub text_embedding_misses: u64,
    pub image_embedding_hits: u64,
    pub image_embedding_misses: u64,
}

/// Manifest keys (object-store keys, not full URLs) for each cache category.
/// Each is optional; a missing manifest simply forces full recomputation.
#[derive(Debug, Clone, Default)]
pub struct CacheManifestKeys {
    pub media_manifest_key: Option<String>,
    pub text_embedding_manifest_key: Option<String>,
    pub image_embedding_manifest_key: Option<String>,
}

/// Loads zero or more manifests from a prior build. Each fetch is
/// independent; a failure only disables caching for that category.
pub async fn load(storage: &StorageClient, keys: &CacheManifestKeys) -> CacheContext {
    let mut ctx = CacheContext::default();

    if let Some(key) = &keys.media_manifest_key {
        match fetch_json::<HashMap<String, MediaDerivativeSet>>(storage, key).await {
            Ok(map) => ctx.media = map,
            Err(e) => warn!(key, error = %e, "media cache manifest unavailable, forcing full recompute"),
        }
    }

    if let Some(key) = &keys.text_embedding_manifest_key {
        match fetch_json::<HashMap<String, Vec<f32>>>(storage, key).await {
            Ok(map) => ctx.text_embeddings = map,
            Err(e) => {
                warn!(key, error = %e, "text embedding cache manifest unavailable, forcing full recompute")
            }
        }
    }

    if let Some(key) = &keys.image_embedding_manifest_key {
        match fetch_json::<HashMap<String, Vec<f32>>>(storage, key).await {
            Ok(map) => ctx.image_embeddings = map,
            Err(e) => {
                warn!(key, error = %e, "image embedding cache manifest unavailable, forcing full recompute")
            }
        }
    }

    ctx
}

async fn fetch_json<T: for<'de> Deserialize<'de>>(
    storage: &StorageClient,
    key: &str,
) -> std::result::Result<T, CacheError> {
    let bytes = storage.get(key).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_manifests_yield_empty_context() {
        let storage = StorageClient::in_memory();
        let keys = CacheManifestKeys {
            media_manifest_key: Some("manifests/media.json".into()),
            text_embedding_manifest_key: None,
            image_embedding_manifest_key: None,
        };
        let ctx = load(&storage, &keys).await;
        assert!(ctx.media.is_empty());
        assert!(ctx.text_embeddings.is_empty());
    }

    #[tokio::test]
    async fn present_manifest_populates_map() {
        let storage = StorageClient::in_memory();
        let mut map = HashMap::new();
        map.insert("deadbeef".to_string(), vec![0.1f32, 0.2, 0.3]);
        storage
            .upload("manifests/text.json", serde_json::to_vec(&map).unwrap())
            .await
            .unwrap();

        let keys = CacheManifestKeys {
            media_manifest_key: None,
            text_embedding_manifest_key: Some("manifests/text.json".into()),
            image_embedding_manifest_key: None,
        };
        let ctx = load(&storage, &keys).await;
        assert_eq!(ctx.text_embeddings.get("deadbeef"), Some(&vec![0.1, 0.2, 0.3]));
    }
}
