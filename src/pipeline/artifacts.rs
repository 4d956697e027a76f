//! Writes the `BuildArtifacts` JSON files into a job's dist directory
//! (spec §3, §6): rendered posts, embedding maps, similarity maps, file
//! summaries, and the issue log.

use std::collections::HashMap;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::issues::IssueCollector;
use crate::markdown::Post;
use crate::similarity::{NeighborMap, PairScores};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One entry of `files-source.json` / `files-dist.json` (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    pub path: String,
    pub filename: String,
    pub extension: String,
    pub size: u64,
    pub folder: Vec<String>,
}

/// Summarizes every regular file under `root`, in deterministic
/// lexicographic order, relative to `root`.
pub fn summarize_tree(root: &Path) -> Vec<FileSummary> {
    if !root.exists() {
        return Vec::new();
    }
    let mut paths: Vec<_> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| {
            let relative = path.strip_prefix(root).ok()?;
            let metadata = std::fs::metadata(&path).ok()?;
            let filename = path.file_name()?.to_string_lossy().to_string();
            let extension = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            let folder = relative
                .parent()
                .map(|p| p.components().map(|c| c.as_os_str().to_string_lossy().to_string()).collect())
                .unwrap_or_default();
            Some(FileSummary {
                path: relative.to_string_lossy().to_string(),
                filename,
                extension,
                size: metadata.len(),
                folder,
            })
        })
        .collect()
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<(), ArtifactError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    std::fs::write(path, bytes).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Reduces a [`NeighborMap`] to the hash-only shape `posts-similar-hash.json`
/// expects: `{ <hash>: string[] }`, dropping the per-neighbor score.
fn neighbor_hashes_only(neighbors: &NeighborMap) -> HashMap<String, Vec<String>> {
    neighbors
        .iter()
        .map(|(hash, list)| (hash.clone(), list.iter().map(|n| n.hash.clone()).collect()))
        .collect()
}

fn posts_embedding_slug_map(posts: &[Post], post_embeddings: &HashMap<String, Vec<f32>>) -> HashMap<String, Vec<f32>> {
    posts
        .iter()
        .filter_map(|post| post_embeddings.get(&post.hash).map(|vector| (post.slug.clone(), vector.clone())))
        .collect()
}

#[allow(clippy::too_many_arguments)]
pub fn write_artifacts(
    dist_dir: &Path,
    source_dir: Option<&Path>,
    posts: &[Post],
    post_embeddings: &HashMap<String, Vec<f32>>,
    media_embeddings: &HashMap<String, Vec<f32>>,
    pair_scores: &PairScores,
    neighbors: &NeighborMap,
    issues: &IssueCollector,
) -> Result<(), ArtifactError> {
    std::fs::create_dir_all(dist_dir).map_err(|source| ArtifactError::Io {
        path: dist_dir.display().to_string(),
        source,
    })?;

    write_json(&dist_dir.join("posts.json"), posts)?;
    write_json(&dist_dir.join("posts-embedding-hash-map.json"), post_embeddings)?;
    write_json(
        &dist_dir.join("posts-embedding-slug-map.json"),
        &posts_embedding_slug_map(posts, post_embeddings),
    )?;
    write_json(&dist_dir.join("media-embedding-hash-map.json"), media_embeddings)?;
    write_json(&dist_dir.join("posts-similarity.json"), pair_scores)?;
    write_json(&dist_dir.join("posts-similar-hash.json"), &neighbor_hashes_only(neighbors))?;

    if let Some(source_dir) = source_dir {
        write_json(&dist_dir.join("files-source.json"), &summarize_tree(source_dir))?;
    }
    // `files-dist.json` is written last so its own file summaries are
    // excluded from the listing (it can only describe what came before it).
    write_json(&dist_dir.join("files-dist.json"), &summarize_tree(dist_dir))?;
    write_json(&dist_dir.join("worker-issues.json"), &issues.snapshot())?;

    Ok(())
}
