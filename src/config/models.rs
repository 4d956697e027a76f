use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level, validated configuration tree assembled once at startup from
/// defaults + TOML + environment (spec §2a).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub markdown: MarkdownConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// HTTP server configuration (spec §6: `PORT`, request size limits §6a).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_fjall_path")]
    pub fjall_path: PathBuf,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            fjall_path: default_fjall_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_fjall_path() -> PathBuf {
    PathBuf::from("data/jobs")
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize(5 * 1024 * 1024)
}

/// Object store provider (spec §4.1, §6 `R2_*` variables).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    R2,
    #[default]
    Local,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    pub account_id: Option<String>,
    #[serde(skip)]
    pub access_key: Option<String>,
    #[serde(skip)]
    pub secret_key: Option<String>,
    /// CDN host used to build `publicUrl`s, e.g. `https://cdn.example.com`.
    pub public_base_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: default_bucket(),
            account_id: None,
            access_key: None,
            secret_key: None,
            public_base_url: None,
        }
    }
}

fn default_bucket() -> String {
    "vaultforge-default".to_string()
}

/// SourceFetcher configuration (spec §4.2).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(skip)]
    pub github_token: Option<String>,
    #[serde(default = "default_clone_depth")]
    pub default_depth: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            github_token: None,
            default_depth: default_clone_depth(),
        }
    }
}

fn default_clone_depth() -> u32 {
    1
}

/// One configured derivative size, width in pixels.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaSizeConfig {
    pub suffix: crate::media::SizeSuffix,
    pub width: u32,
}

/// One configured output format/quality pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaFormatConfig {
    pub format: crate::media::types::ImageFormat,
    pub quality: u8,
}

/// MediaScanner + ImageProcessor configuration (spec §4.4).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    #[serde(default = "default_media_prefix")]
    pub media_prefix: String,
    #[serde(default = "default_media_sizes")]
    pub sizes: Vec<MediaSizeConfig>,
    #[serde(default = "default_media_formats")]
    pub formats: Vec<MediaFormatConfig>,
    #[serde(default = "default_true")]
    pub require_md: bool,
    #[serde(default = "default_media_concurrency")]
    pub concurrency: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            media_prefix: default_media_prefix(),
            sizes: default_media_sizes(),
            formats: default_media_formats(),
            require_md: true,
            concurrency: default_media_concurrency(),
        }
    }
}

fn default_media_prefix() -> String {
    "media".to_string()
}

fn default_media_sizes() -> Vec<MediaSizeConfig> {
    use crate::media::SizeSuffix::*;
    vec![
        MediaSizeConfig { suffix: Xs, width: 320 },
        MediaSizeConfig { suffix: Sm, width: 640 },
        MediaSizeConfig { suffix: Md, width: 1024 },
        MediaSizeConfig { suffix: Lg, width: 1600 },
        MediaSizeConfig { suffix: Xl, width: 2048 },
        MediaSizeConfig { suffix: Xxl, width: 2560 },
    ]
}

fn default_media_formats() -> Vec<MediaFormatConfig> {
    vec![MediaFormatConfig {
        format: crate::media::types::ImageFormat::Webp,
        quality: 80,
    }]
}

fn default_media_concurrency() -> usize {
    num_cpus::get()
}

fn default_true() -> bool {
    true
}

/// Mermaid rendering strategy (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum MermaidStrategy {
    InlineSvg,
    ImgSvg,
    #[default]
    PreMermaid,
}

/// One iframe-embed category (mermaid, video, midi, model3d, markdown, code).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IframeCategoryConfig {
    pub enabled: bool,
    #[serde(default)]
    pub min_lines: usize,
    #[serde(default)]
    pub language_allowlist: Vec<String>,
}

impl Default for IframeCategoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_lines: 0,
            language_allowlist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IframeEmbedConfig {
    #[serde(default = "default_embed_service_base_url")]
    pub service_base_url: String,
    #[serde(default = "default_enabled_category")]
    pub mermaid: IframeCategoryConfig,
    #[serde(default = "default_enabled_category")]
    pub video: IframeCategoryConfig,
    #[serde(default = "default_enabled_category")]
    pub midi: IframeCategoryConfig,
    #[serde(default = "default_enabled_category")]
    pub model3d: IframeCategoryConfig,
    #[serde(default)]
    pub markdown: IframeCategoryConfig,
    #[serde(default)]
    pub code: IframeCategoryConfig,
}

impl Default for IframeEmbedConfig {
    fn default() -> Self {
        Self {
            service_base_url: default_embed_service_base_url(),
            mermaid: default_enabled_category(),
            video: default_enabled_category(),
            midi: default_enabled_category(),
            model3d: default_enabled_category(),
            markdown: IframeCategoryConfig::default(),
            code: IframeCategoryConfig::default(),
        }
    }
}

fn default_enabled_category() -> IframeCategoryConfig {
    IframeCategoryConfig {
        enabled: true,
        min_lines: 0,
        language_allowlist: Vec::new(),
    }
}

fn default_embed_service_base_url() -> String {
    "https://embed.example.com".to_string()
}

/// MarkdownPipeline configuration (spec §4.5).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarkdownConfig {
    #[serde(default = "default_note_prefix")]
    pub note_prefix: String,
    #[serde(default)]
    pub remove_dead_links: bool,
    #[serde(default)]
    pub mermaid_strategy: MermaidStrategy,
    #[serde(default)]
    pub iframe_embeds: IframeEmbedConfig,
    #[serde(default = "default_true")]
    pub parse_formulas: bool,
    #[serde(default)]
    pub rewrite_raw_media_urls: bool,
    #[serde(default = "default_media_field_name")]
    pub media_field_name: String,
}

impl Default for MarkdownConfig {
    fn default() -> Self {
        Self {
            note_prefix: default_note_prefix(),
            remove_dead_links: false,
            mermaid_strategy: MermaidStrategy::default(),
            iframe_embeds: IframeEmbedConfig::default(),
            parse_formulas: true,
            rewrite_raw_media_urls: false,
            media_field_name: default_media_field_name(),
        }
    }
}

fn default_note_prefix() -> String {
    "/notes".to_string()
}

fn default_media_field_name() -> String {
    "image".to_string()
}

/// EmbeddingEngine configuration (spec §4.6, §6 `SKIP_EMBEDDINGS`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(skip)]
    pub skip_embeddings: bool,
    #[serde(default = "default_text_dimension")]
    pub text_dimension: usize,
    #[serde(default = "default_image_dimension")]
    pub image_dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            skip_embeddings: false,
            text_dimension: default_text_dimension(),
            image_dimension: default_image_dimension(),
        }
    }
}

fn default_text_dimension() -> usize {
    384
}

fn default_image_dimension() -> usize {
    512
}

/// SimilarityBuilder configuration (spec §4.7).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_similarity_k")]
    pub k: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { k: default_similarity_k() }
    }
}

fn default_similarity_k() -> usize {
    10
}

/// Publisher configuration (spec §4.9).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublisherConfig {
    #[serde(default = "default_publisher_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: ByteSize,
    #[serde(default = "default_true")]
    pub skip_existing_files: bool,
    #[serde(default = "default_true")]
    pub skip_identical_content: bool,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_publisher_concurrency(),
            max_file_size_bytes: default_max_file_size_bytes(),
            skip_existing_files: true,
            skip_identical_content: true,
        }
    }
}

fn default_publisher_concurrency() -> usize {
    10
}

fn default_max_file_size_bytes() -> ByteSize {
    ByteSize(50 * 1024 * 1024)
}

/// Job lifecycle configuration (spec §6 `TEMP_DIR`, `KEEP_TMP_FILES`,
/// `PURGE_TMP_DIR`, and §5's soft/hard timeouts).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JobConfig {
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
    #[serde(skip)]
    pub keep_tmp_files: bool,
    #[serde(skip)]
    pub purge_tmp_dir: bool,
    #[serde(default = "default_soft_timeout_secs")]
    pub soft_timeout_secs: u64,
    #[serde(default = "default_hard_timeout_secs")]
    pub hard_timeout_secs: u64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            keep_tmp_files: false,
            purge_tmp_dir: false,
            soft_timeout_secs: default_soft_timeout_secs(),
            hard_timeout_secs: default_hard_timeout_secs(),
        }
    }
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

fn default_soft_timeout_secs() -> u64 {
    300
}

fn default_hard_timeout_secs() -> u64 {
    1800
}

/// Ledger retention configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_job_ttl_days")]
    pub job_ttl_days: u32,
    #[serde(default = "default_logs_ttl_days")]
    pub logs_ttl_days: u32,
    #[serde(default = "default_ledger_max_bytes")]
    pub ledger_max_bytes: ByteSize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            job_ttl_days: default_job_ttl_days(),
            logs_ttl_days: default_logs_ttl_days(),
            ledger_max_bytes: default_ledger_max_bytes(),
        }
    }
}

fn default_job_ttl_days() -> u32 {
    30
}

fn default_logs_ttl_days() -> u32 {
    30
}

fn default_ledger_max_bytes() -> ByteSize {
    ByteSize(50 * 1024 * 1024 * 1024)
}

/// DatabasePlugin toggle (spec §4.8): the SQLite artifact is optional and
/// off by default since most projects only consume the JSON artifacts.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_database_filename")]
    pub filename: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filename: default_database_filename(),
        }
    }
}

fn default_database_filename() -> String {
    "posts.sqlite3".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            source: SourceConfig::default(),
            media: MediaConfig::default(),
            markdown: MarkdownConfig::default(),
            embedding: EmbeddingConfig::default(),
            similarity: SimilarityConfig::default(),
            publisher: PublisherConfig::default(),
            job: JobConfig::default(),
            retention: RetentionConfig::default(),
            database: DatabaseConfig::default(),
        };

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.similarity.k, 10);
        assert_eq!(config.publisher.concurrency, 10);
        assert!(config.media.require_md);
    }
}
