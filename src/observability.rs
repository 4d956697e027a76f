//! In-process metrics counters, surfaced via `GET /health` and
//! `GET /operators/health` (spec §2a): jobs accepted/completed/failed, cache
//! hits/misses per category, media processed, embeddings computed, bytes
//! uploaded, uploads skipped/failed.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    jobs_accepted: AtomicU64,
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    cache_media_hits: AtomicU64,
    cache_media_misses: AtomicU64,
    cache_text_embedding_hits: AtomicU64,
    cache_text_embedding_misses: AtomicU64,
    cache_image_embedding_hits: AtomicU64,
    cache_image_embedding_misses: AtomicU64,
    media_processed: AtomicU64,
    embeddings_computed: AtomicU64,
    bytes_uploaded: AtomicU64,
    uploads_skipped: AtomicU64,
    uploads_failed: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_accepted(&self) {
        self.jobs_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_completed(&self) {
        self.jobs_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn job_failed(&self) {
        self.jobs_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_stats(&self, stats: &crate::cache::CacheStats) {
        self.cache_media_hits.fetch_add(stats.media_hits, Ordering::Relaxed);
        self.cache_media_misses.fetch_add(stats.media_misses, Ordering::Relaxed);
        self.cache_text_embedding_hits
            .fetch_add(stats.text_embedding_hits, Ordering::Relaxed);
        self.cache_text_embedding_misses
            .fetch_add(stats.text_embedding_misses, Ordering::Relaxed);
        self.cache_image_embedding_hits
            .fetch_add(stats.image_embedding_hits, Ordering::Relaxed);
        self.cache_image_embedding_misses
            .fetch_add(stats.image_embedding_misses, Ordering::Relaxed);
    }

    pub fn media_processed(&self, count: u64) {
        self.media_processed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn embeddings_computed(&self, count: u64) {
        self.embeddings_computed.fetch_add(count, Ordering::Relaxed);
    }

    pub fn bytes_uploaded(&self, bytes: u64) {
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn upload_skipped(&self) {
        self.uploads_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn upload_failed(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_accepted: self.jobs_accepted.load(Ordering::Relaxed),
            jobs_completed: self.jobs_completed.load(Ordering::Relaxed),
            jobs_failed: self.jobs_failed.load(Ordering::Relaxed),
            cache_media_hits: self.cache_media_hits.load(Ordering::Relaxed),
            cache_media_misses: self.cache_media_misses.load(Ordering::Relaxed),
            cache_text_embedding_hits: self.cache_text_embedding_hits.load(Ordering::Relaxed),
            cache_text_embedding_misses: self.cache_text_embedding_misses.load(Ordering::Relaxed),
            cache_image_embedding_hits: self.cache_image_embedding_hits.load(Ordering::Relaxed),
            cache_image_embedding_misses: self.cache_image_embedding_misses.load(Ordering::Relaxed),
            media_processed: self.media_processed.load(Ordering::Relaxed),
            embeddings_computed: self.embeddings_computed.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            uploads_skipped: self.uploads_skipped.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_accepted: u64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub cache_media_hits: u64,
    pub cache_media_misses: u64,
    pub cache_text_embedding_hits: u64,
    pub cache_text_embedding_misses: u64,
    pub cache_image_embedding_hits: u64,
    pub cache_image_embedding_misses: u64,
    pub media_processed: u64,
    pub embeddings_computed: u64,
    pub bytes_uploaded: u64,
    pub uploads_skipped: u64,
    pub uploads_failed: u64,
}
