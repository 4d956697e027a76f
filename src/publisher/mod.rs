//! Publisher: uploads every build artifact to the configured object store
//! under its destination path, applying the skip rules and bounded
//! concurrency described in spec §4.9.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::PublisherConfig;
use crate::issues::IssueCollector;
use crate::storage::StorageClient;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("upload failed for {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: crate::storage::StorageError,
    },
}

/// Which of the three destination path shapes a file is published under
/// (spec §4.9): per-job outputs always go under the version-scoped path,
/// while content-addressed media and posts are shared across jobs and
/// deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// `projects/{project}/{jobId}/...` — job-scoped build artifacts.
    Primary,
    /// `projects/{project}/_shared/medias/{hash}-{suffix}.{ext}` — content-addressed, reused across jobs.
    SharedMedia,
    /// `projects/{project}/_shared/posts/{hash}.json` — content-addressed, reused across jobs.
    SharedPosts,
}

#[derive(Debug, Clone)]
pub struct PublishItem {
    pub key: String,
    pub destination: Destination,
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

#[derive(Debug, Clone, Default)]
pub struct PublishStats {
    pub uploaded: u64,
    pub skipped_existing: u64,
    pub skipped_identical: u64,
    pub failed: u64,
    pub oversized_warnings: u64,
}

fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Publishes every item, applying the configured skip rules in order:
/// `skip_existing_files` short-circuits on a bare existence check against
/// every key returned by the project prefix listing; `skip_identical_content`
/// additionally compares the uploaded object's content hash (known only for
/// content-addressed keys whose filename embeds it) against the local one.
/// Per-file size ceiling is a warning only, never an abort, per spec.
pub async fn publish_all(
    storage: Arc<StorageClient>,
    items: Vec<PublishItem>,
    config: &PublisherConfig,
    existing_keys: &HashSet<String>,
    remote_hashes: &std::collections::HashMap<String, String>,
    issues: &IssueCollector,
) -> PublishStats {
    let semaphore = Arc::new(Semaphore::new(config.concurrency.max(1)));
    let max_file_size = config.max_file_size_bytes.as_u64();
    let skip_existing = config.skip_existing_files;
    let skip_identical = config.skip_identical_content;

    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        if item.bytes.len() as u64 > max_file_size {
            issues.warn(
                "publisher",
                item.key.clone(),
                format!(
                    "file exceeds configured max size ({} > {} bytes)",
                    item.bytes.len(),
                    max_file_size
                ),
            );
        }

        if skip_existing && existing_keys.contains(&item.key) {
            if skip_identical {
                let local_hash = content_hash(&item.bytes);
                if remote_hashes.get(&item.key) == Some(&local_hash) {
                    handles.push(tokio::spawn(async move { Outcome::SkippedIdentical(item.key) }));
                    continue;
                }
            } else {
                handles.push(tokio::spawn(async move { Outcome::SkippedExisting(item.key) }));
                continue;
            }
        }

        let storage = storage.clone();
        let permit = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = permit.acquire_owned().await.expect("semaphore closed");
            match storage.upload(&item.key, item.bytes).await {
                Ok(_) => Outcome::Uploaded(item.key),
                Err(e) => Outcome::Failed(item.key, e),
            }
        }));
    }

    let mut stats = PublishStats::default();
    for handle in handles {
        match handle.await {
            Ok(Outcome::Uploaded(_)) => stats.uploaded += 1,
            Ok(Outcome::SkippedExisting(_)) => stats.skipped_existing += 1,
            Ok(Outcome::SkippedIdentical(_)) => stats.skipped_identical += 1,
            Ok(Outcome::Failed(key, e)) => {
                stats.failed += 1;
                warn!(key, error = %e, "publish failed");
                issues.error("publisher", key, e.to_string());
            }
            Err(e) => {
                stats.failed += 1;
                warn!(error = %e, "publish task panicked");
            }
        }
    }

    stats
}

enum Outcome {
    Uploaded(String),
    SkippedExisting(String),
    SkippedIdentical(String),
    Failed(String, crate::storage::StorageError),
}

/// Builds the primary (job-scoped) destination key for a named artifact.
pub fn primary_key(project: &str, job_id: &str, artifact_name: &str) -> String {
    format!("projects/{project}/{job_id}/{artifact_name}")
}

/// Builds the shared, content-addressed destination key for a media derivative.
pub fn shared_media_key(project: &str, hash: &str, suffix: &str, extension: &str) -> String {
    format!("projects/{project}/_shared/medias/{hash}-{suffix}.{extension}")
}

/// Builds the shared, content-addressed destination key for a rendered post.
pub fn shared_post_key(project: &str, hash: &str) -> String {
    format!("projects/{project}/_shared/posts/{hash}.json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> PublisherConfig {
        PublisherConfig { concurrency: 4, max_file_size_bytes: crate::humanize::ByteSize(1024), skip_existing_files: true, skip_identical_content: true }
    }

    #[tokio::test]
    async fn uploads_new_items_and_reports_stats() {
        let storage = Arc::new(StorageClient::in_memory());
        let issues = IssueCollector::new();
        let items = vec![PublishItem {
            key: "projects/p/job/posts.json".to_string(),
            destination: Destination::Primary,
            bytes: b"{}".to_vec(),
            content_type: "application/json",
        }];
        let stats = publish_all(storage.clone(), items, &config(), &HashSet::new(), &HashMap::new(), &issues).await;
        assert_eq!(stats.uploaded, 1);
        assert!(storage.exists("projects/p/job/posts.json").await.unwrap());
    }

    #[tokio::test]
    async fn skips_existing_file_when_hash_matches() {
        let storage = Arc::new(StorageClient::in_memory());
        let issues = IssueCollector::new();
        let bytes = b"same-content".to_vec();
        let hash = content_hash(&bytes);
        let mut remote = HashMap::new();
        remote.insert("projects/p/_shared/posts/abc.json".to_string(), hash);
        let existing: HashSet<String> = remote.keys().cloned().collect();

        let items = vec![PublishItem {
            key: "projects/p/_shared/posts/abc.json".to_string(),
            destination: Destination::SharedPosts,
            bytes,
            content_type: "application/json",
        }];
        let stats = publish_all(storage, items, &config(), &existing, &remote, &issues).await;
        assert_eq!(stats.skipped_identical, 1);
        assert_eq!(stats.uploaded, 0);
    }

    #[tokio::test]
    async fn skips_existing_primary_file_with_no_embedded_hash() {
        // Primary job-scoped artifacts like `posts.json` carry no content
        // hash in their key; `skipExistingFiles` must still skip them off a
        // bare existence check, independent of the hash-keyed map.
        let storage = Arc::new(StorageClient::in_memory());
        let issues = IssueCollector::new();
        let mut existing = HashSet::new();
        existing.insert("projects/p/job1/posts.json".to_string());

        let items = vec![PublishItem {
            key: "projects/p/job1/posts.json".to_string(),
            destination: Destination::Primary,
            bytes: b"{}".to_vec(),
            content_type: "application/json",
        }];
        let stats = publish_all(storage.clone(), items, &config(), &existing, &HashMap::new(), &issues).await;
        assert_eq!(stats.skipped_existing, 1);
        assert_eq!(stats.uploaded, 0);
        assert!(!storage.exists("projects/p/job1/posts.json").await.unwrap());
    }

    #[tokio::test]
    async fn oversized_file_is_warned_but_still_uploaded() {
        let storage = Arc::new(StorageClient::in_memory());
        let issues = IssueCollector::new();
        let items = vec![PublishItem {
            key: "projects/p/job/big.bin".to_string(),
            destination: Destination::Primary,
            bytes: vec![0u8; 2048],
            content_type: "application/octet-stream",
        }];
        let stats = publish_all(storage, items, &config(), &HashSet::new(), &HashMap::new(), &issues).await;
        assert_eq!(stats.uploaded, 1);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn destination_key_helpers_match_expected_shapes() {
        assert_eq!(primary_key("p", "job1", "posts.json"), "projects/p/job1/posts.json");
        assert_eq!(shared_media_key("p", "abc", "md", "webp"), "projects/p/_shared/medias/abc-md.webp");
        assert_eq!(shared_post_key("p", "abc"), "projects/p/_shared/posts/abc.json");
    }
}
