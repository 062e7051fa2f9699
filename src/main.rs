//! voxshift - Audio pitch-transform pipeline service
//!
//! Single-binary HTTP service: upload an audio clip, apply a
//! parametrized pitch transform (delegated to ffmpeg), fetch or
//! download the result. A background retention sweeper expires both
//! original and derived artifacts after a configurable TTL.

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voxshift::config::Cli;
use voxshift::{build_router, AppState, ArtifactStore, Config, RetentionSweeper, TransformEngine};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Log build identification immediately after tracing init
    info!(
        "Starting voxshift v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let cli = Cli::parse();
    let config = Arc::new(Config::resolve(cli)?);
    info!(
        "Storage root: {} (upload ceiling {} bytes, TTL {:?}, sweep every {:?})",
        config.storage_root.display(),
        config.max_upload_bytes,
        config.retention_ttl,
        config.sweep_interval
    );

    // Artifact store owns both directories, created here if missing
    let store = Arc::new(ArtifactStore::open(&config.storage_root, config.max_upload_bytes).await?);

    let engine = Arc::new(TransformEngine::new(
        config.ffmpeg_path.clone(),
        config.base_sample_rate,
        config.transform_timeout,
    ));
    if engine.probe().await {
        info!("✓ ffmpeg available ({})", config.ffmpeg_path);
    } else {
        // Neutral transforms still work without ffmpeg; everything else will fail
        warn!(
            "ffmpeg not executable at '{}' - non-neutral transforms will fail",
            config.ffmpeg_path
        );
    }

    // Retention sweeper runs on the same runtime, cancelled on shutdown
    let shutdown = CancellationToken::new();
    let sweeper = RetentionSweeper::new(
        Arc::clone(&store),
        config.retention_ttl,
        config.sweep_interval,
    );
    let sweeper_handle = sweeper.spawn(shutdown.clone());

    let state = AppState::new(Arc::clone(&config), store, engine);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("voxshift listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    let shutdown_token = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_token.cancel();
        })
        .await?;

    // Let the sweeper finish or abort its current pass before exit
    let _ = sweeper_handle.await;
    info!("voxshift stopped");

    Ok(())
}
