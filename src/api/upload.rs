//! Ingest endpoint: multipart audio upload

use crate::error::{Error, Result};
use crate::AppState;
use axum::{
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    file_id: String,
    original_name: String,
    size: u64,
}

/// POST /api/upload - Ingest an original audio artifact
///
/// Expects a multipart form with the audio bytes in the `audio` field.
/// Validation failures (no file, non-audio type, oversize) are client
/// errors; the store never sees invalid input.
pub async fn upload_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>> {
    let limit = state.config.max_upload_bytes;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| map_multipart_error(e, limit))?
    {
        if field.name() != Some("audio") {
            continue;
        }

        let original_name = field.file_name().map(str::to_string);
        let declared_mime = field
            .content_type()
            .map(str::to_string)
            .ok_or_else(|| Error::BadRequest("audio field has no content type".to_string()))?;
        let data = field
            .bytes()
            .await
            .map_err(|e| map_multipart_error(e, limit))?;

        let artifact = state
            .store
            .save_original(&data, &declared_mime, original_name.as_deref())
            .await?;

        info!(
            "Ingested {} ({} bytes, {})",
            artifact.id, artifact.size_bytes, artifact.mime_hint
        );
        return Ok(Json(UploadResponse {
            original_name: original_name.unwrap_or_else(|| artifact.id.to_string()),
            file_id: artifact.id.to_string(),
            size: artifact.size_bytes,
        }));
    }

    Err(Error::BadRequest("no audio file in upload".to_string()))
}

/// Translate multipart extraction failures into the pipeline taxonomy
///
/// Axum reports a body that blew through the configured limit as 413;
/// everything else (truncated stream, malformed framing) is a plain
/// bad request.
fn map_multipart_error(err: MultipartError, limit: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge { limit }
    } else {
        Error::BadRequest(format!("invalid multipart upload: {}", err.body_text()))
    }
}
