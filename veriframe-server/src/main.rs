//! Veriframe Server - REST API for batch image verification
//!
//! Runs the batch engine behind the `/api/v1/batches` endpoints. Jobs left
//! running by a previous process are resumed on startup.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use veriframe_core::{
    BatchVerificationEngine, HttpDetectionClient, HttpIntegrityClient, IntegrityLookup,
    ManipulationDetector, MockDetector, MockIntegrityLookup, UrlImageSource,
};
use veriframe_server::{create_router_with_config, job_store, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("veriframe_server=info,veriframe_core=info,tower_http=info")),
        )
        .with_target(true)
        .init();

    let config = Config::from_env();
    config.validate()?;

    let store = job_store::connect(&config)
        .await
        .context("failed to open job store")?;

    let integrity: Arc<dyn IntegrityLookup> = match &config.integrity_service_url {
        Some(url) => Arc::new(
            HttpIntegrityClient::new(config.service_client_config(url))
                .context("failed to build integrity client")?,
        ),
        None => {
            tracing::warn!("INTEGRITY_SERVICE_URL not set - using mock ledger, no image will verify");
            Arc::new(MockIntegrityLookup::new())
        }
    };

    let detector: Arc<dyn ManipulationDetector> = match &config.detection_service_url {
        Some(url) => Arc::new(
            HttpDetectionClient::new(config.service_client_config(url))
                .context("failed to build detection client")?,
        ),
        None => {
            tracing::warn!("DETECTION_SERVICE_URL not set - using mock detector");
            Arc::new(MockDetector::new())
        }
    };

    let engine = BatchVerificationEngine::new(
        config.engine.clone(),
        store,
        integrity,
        detector,
        Arc::new(UrlImageSource::new(config.image_base_url.clone())),
    );

    if let Err(e) = engine.recover().await {
        tracing::error!(error = %e, "Failed to resume unfinished jobs");
    }

    let app = create_router_with_config(&config, AppState::new(engine.clone()));

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!(
        %addr,
        max_concurrency = config.engine.max_concurrency,
        max_batch_size = config.engine.max_batch_size,
        "Veriframe server listening (docs at /docs)"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    tracing::info!("Stopping batch engine");
    engine.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
