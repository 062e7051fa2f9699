//! voxshift library - audio pitch-transform pipeline
//!
//! File-lifecycle and transform orchestration behind a small HTTP
//! contract: ingest an audio clip, apply a parametrized pitch
//! transform via ffmpeg, stream either artifact back (range-capable),
//! and expire everything through a background retention sweeper.
//!
//! Artifacts have no owner: the opaque id is the capability. Anyone
//! holding an id may fetch it — a deliberate trade-off of this
//! contract, not an oversight.

use axum::{extract::DefaultBodyLimit, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod sweeper;

pub use config::Config;
pub use engine::TransformEngine;
pub use error::{Error, Result};
pub use store::ArtifactStore;
pub use sweeper::RetentionSweeper;

/// Headroom for multipart framing on top of the payload ceiling
const BODY_LIMIT_SLACK: u64 = 1024 * 1024;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ArtifactStore>,
    pub engine: Arc<TransformEngine>,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Arc<Config>, store: Arc<ArtifactStore>, engine: Arc<TransformEngine>) -> Self {
        Self {
            config,
            store,
            engine,
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    let body_limit = (state.config.max_upload_bytes + BODY_LIMIT_SLACK) as usize;

    Router::new()
        .route("/api/upload", post(api::upload::upload_audio))
        .route("/api/transform", post(api::transform::transform_audio))
        .route("/api/audio/:type/:file_id", get(api::stream::stream_audio))
        .route("/api/download/:file_id", get(api::stream::download_audio))
        .route("/health", get(api::health::health))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        // Enable CORS for the UI collaborator
        .layer(CorsLayer::permissive())
}
