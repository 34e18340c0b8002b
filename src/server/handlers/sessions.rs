use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.sessions.create_session()?;
    let session = state.sessions.session_info(&session_id)?;
    Ok(Json(json!({ "session": session })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state.sessions.session_info(&session_id)?;
    Ok(Json(json!({ "session": session })))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.sessions.messages(&session_id)?;

    let formatted: Vec<Value> = messages
        .into_iter()
        .map(|turn| {
            json!({
                "role": turn.role,
                "content": turn.content,
                "timestamp": turn.timestamp,
            })
        })
        .collect();

    Ok(Json(json!({ "messages": formatted })))
}

pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.sessions.reset(&session_id)?;
    Ok(Json(json!({ "success": true })))
}
