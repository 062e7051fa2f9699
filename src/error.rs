//! Error types for voxshift
//!
//! Defines the pipeline error taxonomy using thiserror, plus the HTTP
//! mapping used by all API handlers. Client errors carry stable
//! machine-readable codes; dependency errors are logged in full
//! server-side and returned to the client as opaque messages.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tracing::error;

/// Main error type for the voxshift pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Declared content type is not on the audio allow-list
    #[error("Unsupported content type: {0}")]
    InvalidContentType(String),

    /// Upload exceeds the configured size ceiling
    #[error("Payload exceeds limit of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// Transform parameter outside [0, 100] or not a number
    #[error("Invalid transform parameter: {0}")]
    InvalidParameter(String),

    /// Malformed request (missing field, bad multipart framing)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Artifact does not exist (or never did — the two are not distinguished)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested byte range cannot be satisfied against the file size
    #[error("Range not satisfiable (total size {total})")]
    RangeNotSatisfiable { total: u64 },

    /// Transform source vanished or is unreadable
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    /// External audio tool exited non-zero or could not be spawned
    #[error("Audio engine failed: {0}")]
    EngineProcess(String),

    /// External audio tool exceeded its wall-clock budget and was killed
    #[error("Audio engine timed out after {0:?}")]
    EngineTimeout(Duration),

    /// Filesystem failures in the artifact store
    #[error("Storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    /// HTTP response construction errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenience Result type using the voxshift Error
pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Error::InvalidContentType(mime) => (
                StatusCode::BAD_REQUEST,
                "INVALID_CONTENT_TYPE",
                format!("Unsupported content type: {}. Only audio files are allowed.", mime),
            ),
            Error::PayloadTooLarge { limit } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Payload exceeds limit of {} bytes", limit),
            ),
            Error::InvalidParameter(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_PARAMETER",
                msg.clone(),
            ),
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            Error::NotFound(_) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "File not found".to_string(),
            ),
            Error::RangeNotSatisfiable { total } => {
                // 416 carries the total size so players can retry unranged
                let body = Json(json!({
                    "error": { "code": "RANGE_NOT_SATISFIABLE", "message": "Requested range not satisfiable" }
                }));
                return (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    [(header::CONTENT_RANGE, format!("bytes */{}", total))],
                    body,
                )
                    .into_response();
            }
            // Dependency failures: full detail to the log, opaque message to the client
            Error::SourceUnreadable(detail) => {
                error!("Transform source unreadable: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENGINE_FAILED",
                    "Failed to transform audio".to_string(),
                )
            }
            Error::EngineProcess(detail) => {
                error!("Audio engine failure: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENGINE_FAILED",
                    "Failed to transform audio".to_string(),
                )
            }
            Error::EngineTimeout(budget) => {
                error!("Audio engine timed out after {:?}", budget);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "ENGINE_TIMEOUT",
                    "Failed to transform audio".to_string(),
                )
            }
            Error::Storage(io_err) => {
                error!("Storage I/O failure: {}", io_err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_IO",
                    "Internal storage error".to_string(),
                )
            }
            Error::Http(detail) => {
                error!("HTTP response error: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
            Error::Config(detail) => {
                error!("Configuration error surfaced to handler: {}", detail);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
