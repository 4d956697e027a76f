/// Pruning and retention policy implementation
use std::time::SystemTime;

use fjall::{Keyspace, PartitionHandle};
use tracing::info;

use super::error::Result;
use super::partitions::{decode_job_key, decode_log_key, encode_meta_key};
use super::store::JobRecord;

/// Retention policy constants (days), overridable via `JobConfig`.
pub const RETENTION_JOBS_DAYS: u64 = 30;
pub const RETENTION_LOGS_DAYS: u64 = 30;
pub const RETENTION_IDEMPOTENCY_DAYS: u64 = 14;

/// Metadata keys for pruning state
const META_LAST_PRUNE_IDEM: &str = "last_prune_idem";

/// Pruning statistics
#[derive(Debug, Default)]
pub struct PruneStats {
    pub jobs_pruned: usize,
    pub logs_pruned: usize,
    pub idempotency_pruned: usize,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Prune expired entries from all partitions
pub fn prune_expired(
    keyspace: &Keyspace,
    jobs_partition: &PartitionHandle,
    logs_partition: &PartitionHandle,
    idem_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
) -> Result<PruneStats> {
    let mut stats = PruneStats::default();

    stats.jobs_pruned = prune_jobs(jobs_partition)?;
    stats.logs_pruned = prune_logs(jobs_partition, logs_partition)?;
    stats.idempotency_pruned = prune_idempotency(idem_partition, metadata_partition)?;

    keyspace.persist(fjall::PersistMode::SyncAll)?;
    info!(?stats, "pruning complete");

    Ok(stats)
}

/// Remove job records whose `created_at` is older than `RETENTION_JOBS_DAYS`.
fn prune_jobs(jobs_partition: &PartitionHandle) -> Result<usize> {
    let cutoff = now_secs() - RETENTION_JOBS_DAYS * 86400;
    let mut pruned = 0;

    let mut stale_keys = Vec::new();
    for item in jobs_partition.iter() {
        let (key, value) = item?;
        if decode_job_key(&key).is_none() {
            continue;
        }
        if let Ok(record) = serde_json::from_slice::<JobRecord>(&value) {
            if (record.created_at.timestamp() as u64) < cutoff {
                stale_keys.push(key);
            }
        }
    }
    for key in stale_keys {
        jobs_partition.remove(key)?;
        pruned += 1;
    }

    info!(pruned, "pruned expired job records");
    Ok(pruned)
}

/// Remove log entries belonging to job ids that no longer have a job record,
/// which is the set we just pruned plus any orphaned logs from a crash
/// between job removal and log removal in a prior run.
fn prune_logs(jobs_partition: &PartitionHandle, logs_partition: &PartitionHandle) -> Result<usize> {
    let cutoff = now_secs() - RETENTION_LOGS_DAYS * 86400;
    let mut pruned = 0;

    let mut stale_keys = Vec::new();
    for item in logs_partition.iter() {
        let (key, _) = item?;
        let Some((job_id, _offset)) = decode_log_key(&key) else {
            continue;
        };
        let still_live = jobs_partition
            .get(super::partitions::encode_job_key(&job_id))?
            .and_then(|v| serde_json::from_slice::<JobRecord>(&v).ok())
            .is_some_and(|record| (record.created_at.timestamp() as u64) >= cutoff);
        if !still_live {
            stale_keys.push(key);
        }
    }
    for key in stale_keys {
        logs_partition.remove(key)?;
        pruned += 1;
    }

    info!(pruned, "pruned expired log entries");
    Ok(pruned)
}

/// Prune old idempotency keys
fn prune_idempotency(
    idem_partition: &PartitionHandle,
    metadata_partition: &PartitionHandle,
) -> Result<usize> {
    let cutoff_secs = now_secs() - RETENTION_IDEMPOTENCY_DAYS * 86400;
    let mut pruned = 0;

    let should_sweep = match metadata_partition.get(encode_meta_key(META_LAST_PRUNE_IDEM))? {
        Some(last_prune_bytes) => std::str::from_utf8(&last_prune_bytes)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .is_none_or(|last| last < cutoff_secs),
        None => true,
    };

    if should_sweep {
        for item in idem_partition.iter() {
            let (key, _) = item?;
            idem_partition.remove(key)?;
            pruned += 1;
        }
    }

    metadata_partition.insert(
        encode_meta_key(META_LAST_PRUNE_IDEM),
        now_secs().to_string().as_bytes(),
    )?;

    info!(pruned, "pruned idempotency keys");
    Ok(pruned)
}
