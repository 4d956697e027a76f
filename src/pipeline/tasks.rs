//! Task dispatch table and the per-task pipelines composed from the ten
//! pipeline components (spec §4.10): `process-all`, `deploy-repo`,
//! `process-with-repo`, `wp-import`, `publish-r2`,
//! `generate-and-deploy-project`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::cache::{self, CacheManifestKeys};
use crate::config::Config;
use crate::database;
use crate::embedding;
use crate::issues::IssueCollector;
use crate::markdown::{self, Post, RawDocument};
use crate::media::{self, Media, MimeClass};
use crate::publisher::{self, Destination, PublishItem};
use crate::similarity;
use crate::source::{self, FetchRequest};
use crate::storage::StorageClient;

use super::artifacts::write_artifacts;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("job cancelled")]
    Cancelled,
    #[error("invalid task input: {0}")]
    InvalidInput(#[from] serde_json::Error),
    #[error("source fetch failed: {0}")]
    Source(#[from] source::SourceError),
    #[error("artifact write failed: {0}")]
    Artifact(#[from] super::artifacts::ArtifactError),
    #[error("database build failed: {0}")]
    Database(#[from] database::DatabaseError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing required field '{0}' in task data")]
    MissingField(&'static str),
    #[error("unknown task '{0}'")]
    UnknownTask(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Shared, read-only context threaded through every task function.
pub struct JobContext {
    pub job_id: String,
    pub config: Arc<Config>,
    pub storage: Arc<StorageClient>,
    pub issues: IssueCollector,
    pub cancel: CancellationToken,
}

impl JobContext {
    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CacheManifestInput {
    #[serde(default)]
    pub media_manifest_key: Option<String>,
    #[serde(default)]
    pub text_embedding_manifest_key: Option<String>,
    #[serde(default)]
    pub image_embedding_manifest_key: Option<String>,
}

impl From<CacheManifestInput> for CacheManifestKeys {
    fn from(value: CacheManifestInput) -> Self {
        CacheManifestKeys {
            media_manifest_key: value.media_manifest_key,
            text_embedding_manifest_key: value.text_embedding_manifest_key,
            image_embedding_manifest_key: value.image_embedding_manifest_key,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSourceInput {
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub subfolder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessAllInput {
    pub input_dir: String,
    #[serde(default)]
    pub cache: CacheManifestInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRepoInput {
    #[serde(flatten)]
    pub source: RepoSourceInput,
    pub project: String,
    #[serde(default)]
    pub cache: CacheManifestInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessWithRepoInput {
    #[serde(flatten)]
    pub source: RepoSourceInput,
    #[serde(default)]
    pub cache: CacheManifestInput,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishR2Input {
    pub dist_dir: String,
    pub project: String,
}

/// Input for `wp-import` / `generate-and-deploy-project`: the external
/// collaborator (WordPress importer, AI content generator) has already
/// produced a working tree on disk; this task only runs the build +
/// publish stages against it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalWorkingTreeInput {
    pub working_dir: String,
    pub project: String,
    #[serde(default)]
    pub cache: CacheManifestInput,
}

/// Output of the core `process-all` stage composition, before any
/// publishing decision is made by the caller task.
pub struct ProcessAllOutput {
    pub posts: Vec<Post>,
    pub media: Vec<Media>,
    pub uploads: HashMap<String, Vec<u8>>,
    pub post_embeddings: HashMap<String, Vec<f32>>,
    pub media_embeddings: HashMap<String, Vec<f32>>,
    pub pair_scores: similarity::PairScores,
    pub neighbors: similarity::NeighborMap,
    pub dist_dir: PathBuf,
    pub database_path: Option<PathBuf>,
}

/// Enumerates `*.md` files under `root` in deterministic order, mirroring
/// the media scanner's walk (spec §5's ordering guarantee applies here too).
fn discover_markdown(root: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|e| e.to_str()) == Some("md"))
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();
    paths
}

fn load_documents(root: &Path, issues: &IssueCollector) -> Vec<RawDocument> {
    discover_markdown(root)
        .into_iter()
        .filter_map(|path| {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    issues.error("markdown", path.display().to_string(), format!("read failed: {e}"));
                    return None;
                }
            };
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let folder = relative
                .parent()
                .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect())
                .unwrap_or_default();
            Some(markdown::load_document(&relative.to_string_lossy(), folder, &bytes))
        })
        .collect()
}

/// Pre-fetches image bytes needed by the embedding stage. The embedding
/// engine's `media_bytes` callback is synchronous, so any remote fetch (for
/// a derivative produced in a prior deployment and reused from cache) must
/// happen here, before the callback is constructed.
async fn prefetch_image_bytes(
    media: &[Media],
    uploads: &HashMap<String, Vec<u8>>,
    cache: &cache::CacheContext,
    storage: &StorageClient,
) -> HashMap<String, Vec<u8>> {
    let mut out = HashMap::new();
    for item in media.iter().filter(|m| m.mime_class == MimeClass::Image) {
        if cache.image_embeddings.contains_key(&item.hash) {
            continue;
        }
        let Some(derivative) = item
            .derivatives
            .iter()
            .find(|d| d.size_suffix.map(|s| s.as_str()) == Some("md"))
            .or_else(|| item.derivatives.first())
        else {
            continue;
        };
        if let Some(bytes) = uploads.get(&derivative.output_path) {
            out.insert(item.hash.clone(), bytes.clone());
        } else if let Ok(bytes) = storage.get(&derivative.output_path).await {
            out.insert(item.hash.clone(), bytes);
        }
    }
    out
}

/// Runs CacheLoader → MediaScanner/Image → Markdown → Embeddings →
/// Similarity → Database → artifact files against `input_dir`, writing
/// results under `dist_dir`. Does not publish anything.
async fn run_process_all_core(
    ctx: &JobContext,
    input_dir: &Path,
    cache_input: CacheManifestInput,
    dist_dir: PathBuf,
) -> Result<ProcessAllOutput> {
    ctx.check_cancelled()?;
    let cache_keys: CacheManifestKeys = cache_input.into();
    let cache_ctx = cache::load(&ctx.storage, &cache_keys).await;

    let media_config = &ctx.config.media;
    let image_config = media::ImageProcessorConfig {
        sizes: media_config
            .sizes
            .iter()
            .map(|s| media::image_processor::SizeTarget { suffix: s.suffix, width: s.width })
            .collect(),
        formats: media_config
            .formats
            .iter()
            .map(|f| media::image_processor::FormatTarget { format: f.format, quality: f.quality })
            .collect(),
        require_md: media_config.require_md,
    };
    let public_base = ctx.config.storage.public_base_url.clone().unwrap_or_default();
    let processor = media::DefaultImageProcessor;
    let input_dir_owned = input_dir.to_path_buf();
    let media_prefix = media_config.media_prefix.clone();
    let concurrency = media_config.concurrency;
    let issues_for_scan = IssueCollector::new();
    let scan = {
        let cache_ctx = cache_ctx.clone();
        tokio::task::spawn_blocking(move || {
            media::scan(
                &input_dir_owned,
                &media_prefix,
                &public_base,
                &cache_ctx,
                &processor,
                &image_config,
                concurrency,
                &issues_for_scan,
            )
        })
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e.to_string())))?
    };
    for issue in issues_for_scan.snapshot() {
        ctx.issues.record(issue.stage, issue.path, issue.message, issue.severity);
    }

    ctx.check_cancelled()?;
    let documents = load_documents(input_dir, &ctx.issues);
    let posts = markdown::build_posts(documents, &scan.media, &ctx.config.markdown, &ctx.issues);

    ctx.check_cancelled()?;
    let text_embedder = embedding::build_text_embedder(&ctx.config.embedding);
    let image_embedder = embedding::build_image_embedder(&ctx.config.embedding);
    let image_bytes = prefetch_image_bytes(&scan.media, &scan.uploads, &cache_ctx, &ctx.storage).await;
    let embedding_result = embedding::compute_embeddings(
        &posts,
        &scan.media,
        &cache_ctx,
        text_embedder.as_ref(),
        image_embedder.as_ref(),
        |m: &Media| image_bytes.get(&m.hash).cloned(),
    )
    .await;

    ctx.check_cancelled()?;
    let (pair_scores, neighbors) = similarity::build_similarity(
        &embedding_result.post_embeddings,
        &ctx.config.similarity,
        "similarity",
        &ctx.issues,
    );

    let database_path = if ctx.config.database.enabled {
        let path = dist_dir.join(&ctx.config.database.filename);
        database::build_database(
            &path,
            true,
            &posts,
            &scan.media,
            &embedding_result.post_embeddings,
            &embedding_result.media_embeddings,
            &pair_scores,
        )?
    } else {
        None
    };

    write_artifacts(
        &dist_dir,
        Some(input_dir),
        &posts,
        &embedding_result.post_embeddings,
        &embedding_result.media_embeddings,
        &pair_scores,
        &neighbors,
        &ctx.issues,
    )?;

    Ok(ProcessAllOutput {
        posts,
        media: scan.media,
        uploads: scan.uploads,
        post_embeddings: embedding_result.post_embeddings,
        media_embeddings: embedding_result.media_embeddings,
        pair_scores,
        neighbors,
        dist_dir,
        database_path,
    })
}

fn summarize_result(output: &ProcessAllOutput) -> Value {
    json!({
        "postCount": output.posts.len(),
        "mediaCount": output.media.len(),
        "embeddedPostCount": output.post_embeddings.len(),
        "embeddedMediaCount": output.media_embeddings.len(),
        "database": output.database_path.as_ref().map(|p| p.display().to_string()),
    })
}

/// Basename of a content-addressed media derivative, used to derive its
/// shared-storage key without re-deriving the hash/suffix/extension tuple
/// `publisher::shared_media_key` expects.
fn derivative_filename(output_path: &str) -> &str {
    output_path.rsplit('/').next().unwrap_or(output_path)
}

fn build_shared_media_items(media: &[Media], uploads: &HashMap<String, Vec<u8>>, project: &str) -> Vec<PublishItem> {
    let mut items = Vec::new();
    for item in media {
        for derivative in &item.derivatives {
            let Some(bytes) = uploads.get(&derivative.output_path) else { continue };
            let key = format!("projects/{project}/_shared/medias/{}", derivative_filename(&derivative.output_path));
            let content_type = match derivative.format.as_str() {
                "webp" => "image/webp",
                "jpg" | "jpeg" => "image/jpeg",
                _ => "application/octet-stream",
            };
            items.push(PublishItem {
                key,
                destination: Destination::SharedMedia,
                bytes: bytes.clone(),
                content_type,
            });
        }
    }
    items
}

fn build_shared_post_items(posts: &[Post], project: &str) -> Result<Vec<PublishItem>> {
    posts
        .iter()
        .map(|post| {
            let bytes = serde_json::to_vec(post)?;
            Ok(PublishItem {
                key: publisher::shared_post_key(project, &post.hash),
                destination: Destination::SharedPosts,
                bytes,
                content_type: "application/json",
            })
        })
        .collect()
}

fn build_primary_items(dist_dir: &Path, project: &str, job_id: &str) -> Result<Vec<PublishItem>> {
    let mut items = Vec::new();
    for entry in WalkDir::new(dist_dir).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dist_dir).unwrap_or(entry.path());
        let name = relative.to_string_lossy().to_string();
        let bytes = std::fs::read(entry.path())?;
        let content_type = if name.ends_with(".json") {
            "application/json"
        } else {
            "application/octet-stream"
        };
        items.push(PublishItem {
            key: publisher::primary_key(project, job_id, &name),
            destination: Destination::Primary,
            bytes,
            content_type,
        });
    }
    items.sort_by(|a, b| a.key.cmp(&b.key));
    Ok(items)
}

/// Lists a project's full object-store prefix once and derives both lookup
/// tables the Publisher's skip rules need: every returned key (for
/// `skipExistingFiles`'s bare existence check, which must cover non-content-
/// addressed primary artifacts like `posts.json` too) and, for whichever of
/// those keys embeds a 64-hex content hash in its filename, that hash (for
/// `skipIdenticalContent`'s hash comparison).
async fn fetch_remote_state(storage: &StorageClient, prefix: &str) -> (HashSet<String>, HashMap<String, String>) {
    let hash_re = regex::Regex::new(r"([0-9a-f]{64})").expect("valid hash regex");
    let mut existing_keys = HashSet::new();
    let mut hashes = HashMap::new();
    if let Ok(listed) = storage.list(prefix, 100_000).await {
        for object in listed {
            if let Some(captures) = hash_re.captures(&object.key) {
                hashes.insert(object.key.clone(), captures[1].to_string());
            }
            existing_keys.insert(object.key);
        }
    }
    (existing_keys, hashes)
}

async fn publish_build(ctx: &JobContext, output: &ProcessAllOutput, project: &str) -> Result<Value> {
    let mut items = build_primary_items(&output.dist_dir, project, &ctx.job_id)?;
    items.extend(build_shared_media_items(&output.media, &output.uploads, project));
    items.extend(build_shared_post_items(&output.posts, project)?);

    let (existing_keys, remote_hashes) = fetch_remote_state(&ctx.storage, &format!("projects/{project}/")).await;
    let stats = publisher::publish_all(ctx.storage.clone(), items, &ctx.config.publisher, &existing_keys, &remote_hashes, &ctx.issues).await;

    Ok(json!({
        "uploaded": stats.uploaded,
        "skippedExisting": stats.skipped_existing,
        "skippedIdentical": stats.skipped_identical,
        "failed": stats.failed,
    }))
}

pub async fn run_process_all(ctx: &JobContext, input: ProcessAllInput, dist_dir: PathBuf) -> Result<Value> {
    let output = run_process_all_core(ctx, Path::new(&input.input_dir), input.cache, dist_dir).await?;
    Ok(summarize_result(&output))
}

pub async fn run_process_with_repo(ctx: &JobContext, input: ProcessWithRepoInput, job_root: &Path) -> Result<Value> {
    let request = FetchRequest {
        url: input.source.repo_url,
        branch: input.source.branch,
        depth: input.source.depth.or(Some(ctx.config.source.default_depth)),
        commit: input.source.commit,
        github_token: ctx.config.source.github_token.clone(),
    };
    let snapshot = source::fetch(job_root, &request, input.source.subfolder.as_deref())?;
    let output = run_process_all_core(ctx, &snapshot.input_root, input.cache, job_root.join("dist")).await?;
    Ok(summarize_result(&output))
}

pub async fn run_deploy_repo(ctx: &JobContext, input: DeployRepoInput, job_root: &Path) -> Result<Value> {
    let request = FetchRequest {
        url: input.source.repo_url,
        branch: input.source.branch,
        depth: input.source.depth.or(Some(ctx.config.source.default_depth)),
        commit: input.source.commit,
        github_token: ctx.config.source.github_token.clone(),
    };
    let snapshot = source::fetch(job_root, &request, input.source.subfolder.as_deref())?;
    let output = run_process_all_core(ctx, &snapshot.input_root, input.cache, job_root.join("dist")).await?;
    let mut result = summarize_result(&output);
    let publish_result = publish_build(ctx, &output, &input.project).await?;
    result["publish"] = publish_result;
    Ok(result)
}

/// Shared body for `wp-import` and `generate-and-deploy-project`: both
/// receive an already-materialized working tree from an external
/// collaborator and only need the build + publish stages run against it.
pub async fn run_external_working_tree(ctx: &JobContext, input: ExternalWorkingTreeInput, job_root: &Path) -> Result<Value> {
    let working_dir = PathBuf::from(&input.working_dir);
    let output = run_process_all_core(ctx, &working_dir, input.cache, job_root.join("dist")).await?;
    let mut result = summarize_result(&output);
    let publish_result = publish_build(ctx, &output, &input.project).await?;
    result["publish"] = publish_result;
    Ok(result)
}

pub async fn run_publish_r2(ctx: &JobContext, input: PublishR2Input) -> Result<Value> {
    let dist_dir = PathBuf::from(&input.dist_dir);
    let items = build_primary_items(&dist_dir, &input.project, &ctx.job_id)?;
    let (existing_keys, remote_hashes) = fetch_remote_state(&ctx.storage, &format!("projects/{}/", input.project)).await;
    let stats = publisher::publish_all(ctx.storage.clone(), items, &ctx.config.publisher, &existing_keys, &remote_hashes, &ctx.issues).await;
    Ok(json!({
        "uploaded": stats.uploaded,
        "skippedExisting": stats.skipped_existing,
        "skippedIdentical": stats.skipped_identical,
        "failed": stats.failed,
    }))
}

/// Dispatches a job's `task` name to its pipeline, deserializing `data`
/// into the task-specific input shape.
pub async fn dispatch(task: &str, data: &Value, ctx: &JobContext, job_root: &Path) -> Result<Value> {
    match task {
        "process-all" => {
            let input: ProcessAllInput = serde_json::from_value(data.clone())?;
            run_process_all(ctx, input, job_root.join("dist")).await
        }
        "process-with-repo" => {
            let input: ProcessWithRepoInput = serde_json::from_value(data.clone())?;
            run_process_with_repo(ctx, input, job_root).await
        }
        "deploy-repo" => {
            let input: DeployRepoInput = serde_json::from_value(data.clone())?;
            run_deploy_repo(ctx, input, job_root).await
        }
        "wp-import" | "generate-and-deploy-project" => {
            let input: ExternalWorkingTreeInput = serde_json::from_value(data.clone())?;
            run_external_working_tree(ctx, input, job_root).await
        }
        "publish-r2" => {
            let input: PublishR2Input = serde_json::from_value(data.clone())?;
            run_publish_r2(ctx, input).await
        }
        other => Err(PipelineError::UnknownTask(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_context(job_id: &str) -> JobContext {
        JobContext {
            job_id: job_id.to_string(),
            config: Arc::new({
                let mut config = Config::load_from_path(PathBuf::from("nonexistent.toml")).unwrap_or_else(|_| {
                    // `load_from_path` only fails on malformed TOML; a missing
                    // file still yields defaults, so this branch is unreachable
                    // in practice and exists only to keep the helper infallible.
                    unreachable!("config defaults must load without a file")
                });
                config.embedding.skip_embeddings = true;
                config
            }),
            storage: Arc::new(StorageClient::in_memory()),
            issues: IssueCollector::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn process_all_runs_over_a_minimal_vault() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "---\ntitle: Hello\n---\n# Hi\n").unwrap();

        let ctx = test_context("job-1");
        let dist = dir.path().join("dist");
        let input = ProcessAllInput {
            input_dir: dir.path().to_string_lossy().to_string(),
            cache: CacheManifestInput::default(),
        };

        let result = run_process_all(&ctx, input, dist.clone()).await.unwrap();
        assert_eq!(result["postCount"], 1);
        assert!(dist.join("posts.json").exists());
        assert!(dist.join("posts-similar-hash.json").exists());
    }

    #[tokio::test]
    async fn republish_with_skip_existing_uploads_zero_new_primary_objects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "---\ntitle: Hello\n---\n# Hi\n").unwrap();

        let ctx = test_context("job-republish");
        let dist = dir.path().join("dist");
        let input = ProcessAllInput {
            input_dir: dir.path().to_string_lossy().to_string(),
            cache: CacheManifestInput::default(),
        };
        let output = run_process_all_core(&ctx, Path::new(&input.input_dir), input.cache, dist).await.unwrap();

        let first = publish_build(&ctx, &output, "proj").await.unwrap();
        assert!(first["uploaded"].as_u64().unwrap() > 0);

        let second = publish_build(&ctx, &output, "proj").await.unwrap();
        assert_eq!(second["uploaded"], 0);
        assert!(second["skippedExisting"].as_u64().unwrap() > 0 || second["skippedIdentical"].as_u64().unwrap() > 0);
    }

    #[test]
    fn derivative_filename_strips_prefix() {
        assert_eq!(derivative_filename("media/abc-md.webp"), "abc-md.webp");
        assert_eq!(derivative_filename("abc.png"), "abc.png");
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_task() {
        let ctx = test_context("job-2");
        let dir = tempfile::tempdir().unwrap();
        let err = dispatch("not-a-real-task", &json!({}), &ctx, dir.path()).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTask(_)));
    }
}
