use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::error::Result;
use super::partitions::{
    encode_idem_key, encode_job_key, encode_log_key, encode_log_prefix, encode_meta_key,
};
use super::pruning::{PruneStats, prune_expired};

/// Terminal and in-flight status of a job, per the `Received -> Accepted ->
/// Running -> (Completed | Failed | Cancelled)` state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Accepted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A single structured log line captured during job processing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

/// The persisted ledger representation of a job (spec data model §3a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub job_id: String,
    pub task: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub callback_url: Option<String>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn new(job_id: String, task: String, callback_url: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            task,
            status: JobStatus::Accepted,
            created_at: now,
            updated_at: now,
            callback_url,
            result: None,
            error: None,
        }
    }
}

/// Fjall-backed persistent storage for job records, logs, and idempotency
/// mappings. Partitions: `jobs`, `logs`, `idempotency`, `metadata`.
#[derive(Clone)]
pub struct FjallStore {
    keyspace: Keyspace,
    jobs: PartitionHandle,
    logs: PartitionHandle,
    idempotency: PartitionHandle,
    metadata: PartitionHandle,
}

impl FjallStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening job store");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let keyspace = Config::new(path).open()?;
        let jobs = keyspace.open_partition("jobs", PartitionCreateOptions::default())?;
        let logs = keyspace.open_partition("logs", PartitionCreateOptions::default())?;
        let idempotency =
            keyspace.open_partition("idempotency", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;

        Ok(Self {
            keyspace,
            jobs,
            logs,
            idempotency,
            metadata,
        })
    }

    /// In-memory store for tests: a temp directory removed on drop.
    pub fn open_temp() -> Result<(Self, tempfile::TempDir)> {
        let dir = tempfile::TempDir::new()?;
        let store = Self::open(dir.path().join("jobs"))?;
        Ok((store, dir))
    }

    pub fn upsert(&self, record: &JobRecord) -> Result<()> {
        let key = encode_job_key(&record.job_id);
        let value = serde_json::to_vec(record)?;
        self.jobs.insert(key, value)?;
        debug!(job_id = %record.job_id, "upserted job record");
        Ok(())
    }

    pub fn get(&self, job_id: &str) -> Result<Option<JobRecord>> {
        let key = encode_job_key(job_id);
        match self.jobs.get(key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Append one log line, assigning the next monotonic offset for the job.
    pub fn append_log(&self, job_id: &str, level: &str, message: impl Into<String>) -> Result<()> {
        let prefix = encode_log_prefix(job_id);
        let next_offset = self
            .logs
            .prefix(&prefix)
            .last()
            .transpose()?
            .and_then(|(k, _)| super::partitions::decode_log_key(&k))
            .map(|(_, offset)| offset + 1)
            .unwrap_or(0);

        let entry = LogEntry {
            timestamp: Utc::now(),
            level: level.to_string(),
            message: message.into(),
        };
        let key = encode_log_key(job_id, next_offset);
        self.logs.insert(key, serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    /// Read the full log buffer for a job in offset order.
    pub fn read_logs(&self, job_id: &str) -> Result<Vec<LogEntry>> {
        let prefix = encode_log_prefix(job_id);
        let mut entries = Vec::new();
        for item in self.logs.prefix(&prefix) {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    pub fn remember_idempotency(&self, key: &str, job_id: &str) -> Result<()> {
        self.idempotency
            .insert(encode_idem_key(key), job_id.as_bytes())?;
        debug!(key, job_id, "remembered idempotency mapping");
        Ok(())
    }

    pub fn get_idempotent(&self, key: &str) -> Result<Option<String>> {
        match self.idempotency.get(encode_idem_key(key))? {
            Some(value) => Ok(Some(String::from_utf8_lossy(&value).to_string())),
            None => Ok(None),
        }
    }

    pub fn prune_expired(&self) -> Result<PruneStats> {
        prune_expired(
            &self.keyspace,
            &self.jobs,
            &self.logs,
            &self.idempotency,
            &self.metadata,
        )
    }

    pub fn persist(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let job_count = self.jobs.iter().count();
        let log_count = self.logs.iter().count();
        let idem_count = self.idempotency.iter().count();
        Ok(StoreStats {
            job_count,
            log_count,
            idem_count,
        })
    }
}

#[derive(Debug, Clone)]
pub struct StoreStats {
    pub job_count: usize,
    pub log_count: usize,
    pub idem_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_store() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        assert_eq!(store.stats().unwrap().job_count, 0);
    }

    #[test]
    fn upsert_and_get_job() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        let record = JobRecord::new("job_123".into(), "process-all".into(), None);
        store.upsert(&record).unwrap();

        let retrieved = store.get("job_123").unwrap().unwrap();
        assert_eq!(retrieved.job_id, "job_123");
        assert_eq!(retrieved.status, JobStatus::Accepted);
    }

    #[test]
    fn get_nonexistent_job() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        assert!(store.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn idempotency_roundtrip() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        store.remember_idempotency("key_123", "job_456").unwrap();
        assert_eq!(
            store.get_idempotent("key_123").unwrap(),
            Some("job_456".to_string())
        );
        assert_eq!(store.get_idempotent("missing_key").unwrap(), None);
    }

    #[test]
    fn append_and_read_logs_in_order() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        store.append_log("job_1", "info", "starting").unwrap();
        store.append_log("job_1", "warn", "cache miss").unwrap();
        store.append_log("job_1", "info", "done").unwrap();

        let logs = store.read_logs("job_1").unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].message, "starting");
        assert_eq!(logs[2].message, "done");
    }

    #[test]
    fn stats_reflect_inserts() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        store
            .upsert(&JobRecord::new("job_1".into(), "process-all".into(), None))
            .unwrap();
        store.remember_idempotency("key_1", "job_1").unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.job_count, 1);
        assert_eq!(stats.idem_count, 1);
    }

    #[test]
    fn persist_does_not_error() {
        let (store, _dir) = FjallStore::open_temp().unwrap();
        store
            .upsert(&JobRecord::new("job_persist".into(), "process-all".into(), None))
            .unwrap();
        store.persist().unwrap();
    }
}
