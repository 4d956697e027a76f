//! EmbeddingEngine: computes L2-normalized text and image embedding
//! vectors, reusing cached values by content hash and falling back to a
//! null embedder rather than failing the job when a model is unavailable
//! (spec §4.6).

use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::CacheContext;
use crate::config::EmbeddingConfig;
use crate::markdown::Post;
use crate::media::Media;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("model init failed: {0}")]
    InitFailed(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    async fn embed(&self, bytes: &[u8]) -> Result<Vec<f32>, EmbeddingError>;
    fn dimension(&self) -> usize;
}

/// Always-degrade fallback used when `SKIP_EMBEDDINGS` is set or the
/// backing model failed to initialize. Emits a zero vector of the
/// configured dimension so downstream similarity math has a stable shape
/// without ever failing the job solely because embeddings are unavailable.
pub struct NullTextEmbedder {
    dimension: usize,
}

impl NullTextEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl TextEmbedder for NullTextEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

pub struct NullImageEmbedder {
    dimension: usize,
}

impl NullImageEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl ImageEmbedder for NullImageEmbedder {
    async fn embed(&self, _bytes: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// `fastembed`-backed text embedder. Invocation is serialized behind a
/// mutex: the underlying ONNX session is not safely shared across
/// concurrent calls, so each embed request acquires exclusive access.
pub struct FastEmbedTextEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    dimension: usize,
}

impl FastEmbedTextEmbedder {
    pub fn try_new(dimension: usize) -> Result<Self, EmbeddingError> {
        let model = fastembed::TextEmbedding::try_new(Default::default())
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        Ok(Self { model: Mutex::new(model), dimension })
    }
}

#[async_trait]
impl TextEmbedder for FastEmbedTextEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_string();
        let model = &self.model;
        let embeddings = {
            let mut guard = model.lock().expect("text embedder mutex poisoned");
            guard
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))?
        };
        let vector = embeddings.into_iter().next().unwrap_or_default();
        Ok(l2_normalize(vector))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// `fastembed`-backed image embedder, same exclusive-invocation model as
/// [`FastEmbedTextEmbedder`].
pub struct FastEmbedImageEmbedder {
    model: Mutex<fastembed::ImageEmbedding>,
    dimension: usize,
}

impl FastEmbedImageEmbedder {
    pub fn try_new(dimension: usize) -> Result<Self, EmbeddingError> {
        let model = fastembed::ImageEmbedding::try_new(Default::default())
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;
        Ok(Self { model: Mutex::new(model), dimension })
    }
}

#[async_trait]
impl ImageEmbedder for FastEmbedImageEmbedder {
    async fn embed(&self, bytes: &[u8]) -> Result<Vec<f32>, EmbeddingError> {
        let tmp = tempfile::NamedTempFile::new().map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))?;
        std::fs::write(tmp.path(), bytes).map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))?;
        let path = tmp.path().to_path_buf();

        let embeddings = {
            let mut guard = self.model.lock().expect("image embedder mutex poisoned");
            guard
                .embed(vec![path], None)
                .map_err(|e| EmbeddingError::InferenceFailed(e.to_string()))?
        };
        let vector = embeddings.into_iter().next().unwrap_or_default();
        Ok(l2_normalize(vector))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn l2_normalize(vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector;
    }
    vector.into_iter().map(|v| v / norm).collect()
}

/// Builds the default text embedder for this process: `fastembed` unless
/// `SKIP_EMBEDDINGS` is set or model init fails, in which case a null
/// embedder is substituted and the job proceeds without text embeddings.
pub fn build_text_embedder(config: &EmbeddingConfig) -> Box<dyn TextEmbedder> {
    if config.skip_embeddings {
        return Box::new(NullTextEmbedder::new(config.text_dimension));
    }
    match FastEmbedTextEmbedder::try_new(config.text_dimension) {
        Ok(embedder) => Box::new(embedder),
        Err(e) => {
            tracing::warn!(error = %e, "text embedding model unavailable, degrading to null embedder");
            Box::new(NullTextEmbedder::new(config.text_dimension))
        }
    }
}

pub fn build_image_embedder(config: &EmbeddingConfig) -> Box<dyn ImageEmbedder> {
    if config.skip_embeddings {
        return Box::new(NullImageEmbedder::new(config.image_dimension));
    }
    match FastEmbedImageEmbedder::try_new(config.image_dimension) {
        Ok(embedder) => Box::new(embedder),
        Err(e) => {
            tracing::warn!(error = %e, "image embedding model unavailable, degrading to null embedder");
            Box::new(NullImageEmbedder::new(config.image_dimension))
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct EmbeddingStats {
    pub text_computed: u64,
    pub text_cached: u64,
    pub image_computed: u64,
    pub image_cached: u64,
}

/// Output of the embedding stage: hash-keyed vectors for posts and media,
/// ready for the similarity stage and for persisting the
/// `posts-embedding-hash-map.json` / `media-embedding-hash-map.json`
/// artifacts.
#[derive(Debug, Default)]
pub struct EmbeddingResult {
    pub post_embeddings: std::collections::HashMap<String, Vec<f32>>,
    pub media_embeddings: std::collections::HashMap<String, Vec<f32>>,
    pub stats: EmbeddingStats,
}

/// Computes embeddings for every post and every image-class media item,
/// reusing cached vectors by content hash. The text and image passes run
/// concurrently with each other; within each pass, calls to the same
/// embedder instance are still serialized by its internal mutex.
pub async fn compute_embeddings(
    posts: &[Post],
    media: &[Media],
    cache: &CacheContext,
    text_embedder: &dyn TextEmbedder,
    image_embedder: &dyn ImageEmbedder,
    media_bytes: impl Fn(&Media) -> Option<Vec<u8>> + Sync,
) -> EmbeddingResult {
    let mut stats = EmbeddingStats::default();
    let mut post_embeddings = std::collections::HashMap::new();
    let mut media_embeddings = std::collections::HashMap::new();

    let text_future = async {
        let mut out = std::collections::HashMap::new();
        let mut computed = 0u64;
        let mut cached = 0u64;
        for post in posts {
            if let Some(vector) = cache.text_embeddings.get(&post.hash) {
                out.insert(post.hash.clone(), vector.clone());
                cached += 1;
                continue;
            }
            let content = format!("{}\n\n{}", post.title, post.plaintext);
            match text_embedder.embed(&content).await {
                Ok(vector) => {
                    out.insert(post.hash.clone(), vector);
                    computed += 1;
                }
                Err(e) => tracing::warn!(hash = %post.hash, error = %e, "text embedding failed"),
            }
        }
        (out, computed, cached)
    };

    let image_future = async {
        let mut out = std::collections::HashMap::new();
        let mut computed = 0u64;
        let mut cached = 0u64;
        for item in media.iter().filter(|m| m.mime_class == crate::media::MimeClass::Image) {
            if let Some(vector) = cache.image_embeddings.get(&item.hash) {
                out.insert(item.hash.clone(), vector.clone());
                cached += 1;
                continue;
            }
            let Some(bytes) = media_bytes(item) else { continue };
            match image_embedder.embed(&bytes).await {
                Ok(vector) => {
                    out.insert(item.hash.clone(), vector);
                    computed += 1;
                }
                Err(e) => tracing::warn!(hash = %item.hash, error = %e, "image embedding failed"),
            }
        }
        (out, computed, cached)
    };

    let ((text_map, text_computed, text_cached), (image_map, image_computed, image_cached)) =
        tokio::join!(text_future, image_future);

    post_embeddings.extend(text_map);
    media_embeddings.extend(image_map);
    stats.text_computed = text_computed;
    stats.text_cached = text_cached;
    stats.image_computed = image_computed;
    stats.image_cached = image_cached;

    EmbeddingResult { post_embeddings, media_embeddings, stats }
}
