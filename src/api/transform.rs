//! Transform endpoint: dispatch a pitch transform against an original

use crate::engine;
use crate::error::{Error, Result};
use crate::store::{ArtifactKind, FileId};
use crate::AppState;
use axum::{extract::State, Json};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tracing::info;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformResponse {
    transformed_file_id: String,
}

/// POST /api/transform - Produce a derived artifact from an original
///
/// Body: JSON `{"fileId": "...", "transformValue": 0..100}`.
///
/// The body is taken as a raw JSON value so malformed parameters come
/// back as this API's own 400s, not as framework rejections. All
/// validation runs before any store or engine I/O; an engine failure
/// never leaves a derived artifact behind.
pub async fn transform_audio(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<TransformResponse>> {
    let file_id_raw = body
        .get("fileId")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::BadRequest("missing fileId".to_string()))?;
    let parameter = body
        .get("transformValue")
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            Error::InvalidParameter("transformValue must be a number".to_string())
        })?;
    if !parameter.is_finite() || !(0.0..=100.0).contains(&parameter) {
        return Err(Error::InvalidParameter(format!(
            "transformValue must be in [0, 100], got {}",
            parameter
        )));
    }

    let source_id = FileId::parse(file_id_raw)?;
    // Transforms always read from the original set; existence is
    // re-checked here, never cached from an earlier call.
    let source_path = state
        .store
        .resolve(&source_id, ArtifactKind::Original)
        .await?;

    let slot = state.store.allocate_derived();
    let started = Instant::now();
    state
        .engine
        .apply(&source_path, &slot.temp_path, parameter)
        .await?;

    let artifact = state.store.commit_derived(slot, &source_id).await?;
    info!(
        "Transformed {} -> {} (parameter {}, {:+.2} semitones, {:?})",
        source_id,
        artifact.id,
        parameter,
        engine::semitone_shift(parameter),
        started.elapsed()
    );

    Ok(Json(TransformResponse {
        transformed_file_id: artifact.id.to_string(),
    }))
}
