use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

/// Multipart PDF upload. One file per request; the indexing boundary catches
/// everything, reports it, and leaves the session usable for a retry.
pub async fn upload_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    // Handler existence check first, so unknown sessions 404 before parsing.
    state.sessions.session_info(&session_id)?;

    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart payload: {}", err)))?
    {
        let Some(filename) = field.file_name().map(|name| name.to_string()) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {}", err)))?;
        upload = Some((filename, bytes.to_vec()));
        break;
    }

    let (filename, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("no file in upload".to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest(format!("'{}' is empty", filename)));
    }

    let report = state
        .indexer
        .index_bytes(&state.sessions, &session_id, &filename, &bytes)
        .await
        .map_err(|err| {
            tracing::warn!(
                "indexing '{}' for session {} failed: {}",
                filename,
                session_id,
                err
            );
            err
        })?;

    Ok(Json(json!({ "indexed": report })))
}
