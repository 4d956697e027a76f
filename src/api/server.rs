use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;

use super::{
    services::{get_job, health, ingest_job, operators_health},
    state::AppState,
};
use crate::config::Config;
use crate::jobs::FjallStore;
use crate::storage::StorageClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Boots the job-submission HTTP service: loads configuration, opens the
/// Fjall ledger, wires the object store, and serves `/process`, `/health`,
/// and the `/operators/*` surfaces until a shutdown signal arrives.
pub async fn run(address: Option<SocketAddr>, config_path: Option<String>) -> Result<(), AnyError> {
    info!("loading configuration");
    let mut config = match config_path {
        Some(path) => Config::load_from_path(path.into())?,
        None => Config::load()?,
    };

    if let Some(address) = address {
        config.server.bind_addr = address;
    }

    if config.job.purge_tmp_dir {
        info!(path = %config.job.temp_dir.display(), "purging stale job directories");
        crate::pipeline::workdir::purge_stale_dirs(&config.job.temp_dir);
    }

    info!(path = %config.server.fjall_path.display(), "opening ledger");
    let store = FjallStore::open(&config.server.fjall_path)?;

    let storage = StorageClient::from_config(&config.storage)?;
    let bind_addr = config.server.bind_addr;
    let max_payload_bytes = config.server.max_payload_bytes.0 as usize;

    let state = AppState::new(config, store, storage);

    let app = Router::new()
        .route("/process", post(ingest_job))
        .route("/health", get(health))
        .route("/operators/jobs/{job_id}", get(get_job))
        .route("/operators/health", get(operators_health))
        .with_state(state)
        // Automatically decompress gzip/deflate/brotli request bodies.
        .layer(RequestDecompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(max_payload_bytes));

    let listener = TcpListener::bind(bind_addr).await?;
    info!(%bind_addr, "vaultforge-worker listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())
            .expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
