//! Fetch endpoints: range-capable streaming and attachment download

use crate::error::{Error, Result};
use crate::store::{ArtifactKind, AudioStream, FileId};
use crate::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::Response,
};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

/// Delivery content type for every artifact, original or derived.
/// Fixed by the external contract regardless of the stored container.
const DELIVERY_CONTENT_TYPE: &str = "audio/mpeg";

/// GET /api/audio/:type/:file_id - Stream an artifact for playback
///
/// `:type` is `original` or `transformed`. Honors a single byte-range
/// request so players can seek without downloading the whole file.
pub async fn stream_audio(
    State(state): State<AppState>,
    Path((type_segment, file_id_raw)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let kind = ArtifactKind::from_public_segment(&type_segment)
        .ok_or_else(|| Error::NotFound(format!("unknown audio type: {}", type_segment)))?;
    let id = FileId::parse(&file_id_raw)?;

    let range_header = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());
    let stream = state.store.stream_read(&id, kind, range_header).await?;

    debug!(
        "Streaming {} {} ({} of {} bytes{})",
        kind,
        id,
        stream.length,
        stream.total_size,
        if stream.range.is_some() { ", partial" } else { "" }
    );

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, DELIVERY_CONTENT_TYPE)
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, stream.length);

    builder = match stream.range {
        Some(range) => builder.status(StatusCode::PARTIAL_CONTENT).header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", range.start, range.end, stream.total_size),
        ),
        None => builder.status(StatusCode::OK),
    };

    builder
        .body(body_from(stream))
        .map_err(|e| Error::Http(format!("response build failed: {}", e)))
}

/// GET /api/download/:file_id - Download a derived artifact
///
/// Serves from the derived set only, as an attachment with a
/// timestamped client-facing filename.
pub async fn download_audio(
    State(state): State<AppState>,
    Path(file_id_raw): Path<String>,
) -> Result<Response> {
    let id = FileId::parse(&file_id_raw)?;
    let stream = state
        .store
        .stream_read(&id, ArtifactKind::Derived, None)
        .await?;

    let download_name = format!(
        "voice-transformed-{}.mp3",
        chrono::Utc::now().timestamp_millis()
    );
    debug!("Download {} as {}", id, download_name);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, DELIVERY_CONTENT_TYPE)
        .header(header::CONTENT_LENGTH, stream.length)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", download_name),
        )
        .body(body_from(stream))
        .map_err(|e| Error::Http(format!("response build failed: {}", e)))
}

/// Build a streaming response body limited to the resolved span
fn body_from(stream: AudioStream) -> Body {
    let length = stream.length;
    Body::from_stream(ReaderStream::new(stream.file.take(length)))
}
