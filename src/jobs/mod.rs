//! Fjall-based persistence layer for job records, logs, and idempotency
//! mappings.
//!
//! Fjall (an embedded LSM key-value store) persists:
//!
//! - Job records (status, timestamps, result/error, callback URL)
//! - Log entries (the per-job log buffer delivered in callbacks)
//! - Idempotency keys (dedup for POST /process retries)
//! - Metadata (pruning cursors)
//!
//! Retention: jobs 30 days, logs 30 days, idempotency keys 14 days
//! (`RETENTION_*_DAYS`, overridable via config). Pruning runs via
//! `FjallStore::prune_expired()`.

pub mod error;
pub mod partitions;
pub mod pruning;
pub mod store;

pub use error::{JobStoreError, Result};
pub use pruning::{PruneStats, RETENTION_IDEMPOTENCY_DAYS, RETENTION_JOBS_DAYS, RETENTION_LOGS_DAYS};
pub use store::{FjallStore, JobRecord, JobStatus, LogEntry, StoreStats};
