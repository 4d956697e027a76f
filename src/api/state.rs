use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::jobs::FjallStore;
use crate::observability::Metrics;
use crate::storage::StorageClient;

/// Shared state threaded through every handler. Each accepted job is
/// `tokio::spawn`ed directly against this state rather than handed to a
/// separate queue/worker process (spec §5).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<FjallStore>,
    pub storage: Arc<StorageClient>,
    pub metrics: Arc<Metrics>,
    pub http_client: reqwest::Client,
    cancellations: Arc<Mutex<HashMap<String, CancellationToken>>>,
}

impl AppState {
    pub fn new(config: Config, store: FjallStore, storage: StorageClient) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            storage: Arc::new(storage),
            metrics: Arc::new(Metrics::new()),
            http_client: reqwest::Client::new(),
            cancellations: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a fresh cancellation token for a job, returning it so the
    /// spawned pipeline can poll it between stages.
    pub fn register_job(&self, job_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.cancellations
            .lock()
            .expect("cancellation registry lock poisoned")
            .insert(job_id.to_string(), token.clone());
        token
    }

    /// Cancels an in-flight job if one is registered; returns whether a
    /// token was found.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        if let Some(token) = self
            .cancellations
            .lock()
            .expect("cancellation registry lock poisoned")
            .get(job_id)
        {
            token.cancel();
            true
        } else {
            false
        }
    }

    /// Drops the bookkeeping entry for a job once it reaches a terminal
    /// state.
    pub fn forget_job(&self, job_id: &str) {
        self.cancellations
            .lock()
            .expect("cancellation registry lock poisoned")
            .remove(job_id);
    }
}
