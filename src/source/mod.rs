//! SourceFetcher: clones a Git repository (shallow, single-branch) into a
//! job-scoped working tree.

use std::path::{Path, PathBuf};

use git2::{FetchOptions, RemoteCallbacks, Repository};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("clone failed for {url}: {source}")]
    CloneFailed { url: String, source: git2::Error },

    #[error("authentication required for host of {0}")]
    AuthRequired(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Input parameters for a source fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub branch: Option<String>,
    /// `Some(1)` (the default) performs a shallow clone; `None` disables
    /// shallow mode, allowing `commit` to be checked out afterward.
    pub depth: Option<u32>,
    pub commit: Option<String>,
    pub github_token: Option<String>,
}

/// Immutable reference to a checked-out working tree.
#[derive(Debug, Clone)]
pub struct RepoSnapshot {
    pub root: PathBuf,
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub origin_url: String,
    pub input_root: PathBuf,
}

fn requires_auth(url: &str) -> bool {
    url.starts_with("git@") || (url.contains("github.com") && !url.starts_with("https://"))
}

/// Clone `request.url` into `{job_root}/source`, returning a `RepoSnapshot`
/// whose `input_root` is the subfolder (if any) used as the vault root.
pub fn fetch(job_root: &Path, request: &FetchRequest, subfolder: Option<&str>) -> Result<RepoSnapshot> {
    let source_dir = job_root.join("source");
    std::fs::create_dir_all(&source_dir)?;

    if requires_auth(&request.url) && request.github_token.is_none() {
        return Err(SourceError::AuthRequired(request.url.clone()));
    }

    let mut callbacks = RemoteCallbacks::new();
    if let Some(token) = request.github_token.clone() {
        callbacks.credentials(move |_url, username_from_url, _allowed| {
            git2::Cred::userpass_plaintext(username_from_url.unwrap_or("x-access-token"), &token)
        });
    }

    let mut fetch_options = FetchOptions::new();
    fetch_options.remote_callbacks(callbacks);
    if let Some(depth) = request.depth.or(Some(1)) {
        fetch_options.depth(depth as i32);
    }

    let mut builder = git2::build::RepoBuilder::new();
    builder.fetch_options(fetch_options);
    if let Some(branch) = &request.branch {
        builder.branch(branch);
    }

    info!(url = %request.url, branch = ?request.branch, "cloning repository");
    let repo = builder
        .clone(&request.url, &source_dir)
        .map_err(|source| SourceError::CloneFailed {
            url: request.url.clone(),
            source,
        })?;

    if request.depth.is_none() {
        if let Some(commit) = &request.commit {
            checkout_commit(&repo, commit).map_err(|source| SourceError::CloneFailed {
                url: request.url.clone(),
                source,
            })?;
        }
    } else if request.commit.is_some() {
        warn!("commit checkout requested but ignored in shallow-clone mode");
    }

    let input_root = match subfolder {
        Some(sub) => source_dir.join(sub),
        None => source_dir.clone(),
    };

    Ok(RepoSnapshot {
        root: source_dir,
        branch: request.branch.clone(),
        commit: if request.depth.is_none() {
            request.commit.clone()
        } else {
            None
        },
        origin_url: request.url.clone(),
        input_root,
    })
}

fn checkout_commit(repo: &Repository, commit: &str) -> std::result::Result<(), git2::Error> {
    let oid = git2::Oid::from_str(commit)?;
    let object = repo.find_object(oid, None)?;
    repo.checkout_tree(&object, None)?;
    repo.set_head_detached(oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_auth_detects_ssh_and_bare_github_urls() {
        assert!(requires_auth("git@github.com:org/repo.git"));
        assert!(!requires_auth("https://github.com/org/repo.git"));
        assert!(!requires_auth("https://gitlab.com/org/repo.git"));
    }

    #[test]
    fn fetch_without_token_on_ssh_url_fails_fast() {
        let dir = tempfile::TempDir::new().unwrap();
        let request = FetchRequest {
            url: "git@github.com:org/repo.git".into(),
            branch: None,
            depth: Some(1),
            commit: None,
            github_token: None,
        };
        let result = fetch(dir.path(), &request, None);
        assert!(matches!(result, Err(SourceError::AuthRequired(_))));
    }
}
