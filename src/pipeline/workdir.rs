//! Per-job working directory lifecycle (spec §4.10): a scratch root under
//! `TEMP_DIR` holding `source/` (SourceFetcher checkout) and `dist/` (build
//! artifacts), removed on drop unless retention is configured.

use std::path::{Path, PathBuf};

use tracing::warn;

/// RAII guard for a job's scratch directory. Dropping it removes the tree
/// unless `retain` is set (`KEEP_TMP_FILES` or a per-job override).
pub struct WorkDir {
    root: PathBuf,
    retain: bool,
}

impl WorkDir {
    pub fn create(base: &Path, job_id: &str, retain: bool) -> std::io::Result<Self> {
        let root = base.join(format!("vaultforge-job-{job_id}"));
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join("dist"))?;
        Ok(Self { root, retain })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self) -> PathBuf {
        self.root.join("source")
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root.join("dist")
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.retain {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.root) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.root.display(), error = %e, "failed to remove job working directory");
            }
        }
    }
}

/// Startup-time sweep of leftover job directories from a prior, uncleanly
/// terminated process (`PURGE_TMP_DIR`).
pub fn purge_stale_dirs(base: &Path) {
    let Ok(entries) = std::fs::read_dir(base) else { return };
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.starts_with("vaultforge-job-") {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(entry.path()) {
            warn!(path = %entry.path().display(), error = %e, "failed to purge stale job directory");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_directory_by_default() {
        let base = tempfile::tempdir().unwrap();
        let root;
        {
            let workdir = WorkDir::create(base.path(), "job1", false).unwrap();
            root = workdir.root().to_path_buf();
            assert!(root.exists());
        }
        assert!(!root.exists());
    }

    #[test]
    fn retained_directory_survives_drop() {
        let base = tempfile::tempdir().unwrap();
        let root;
        {
            let workdir = WorkDir::create(base.path(), "job2", true).unwrap();
            root = workdir.root().to_path_buf();
        }
        assert!(root.exists());
        std::fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn purge_removes_only_job_directories() {
        let base = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(base.path().join("vaultforge-job-old")).unwrap();
        std::fs::create_dir_all(base.path().join("unrelated")).unwrap();
        purge_stale_dirs(base.path());
        assert!(!base.path().join("vaultforge-job-old").exists());
        assert!(base.path().join("unrelated").exists());
    }
}
