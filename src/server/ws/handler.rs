//! WebSocket chat endpoint.
//!
//! One connection drives one session at a time; turns are processed
//! sequentially in arrival order. Chat-turn failures are sent back as error
//! frames and leave the connection and the accumulated history intact.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

use super::protocol::{WsIncomingMessage, WS_APP_PROTOCOL};
use crate::core::errors::ApiError;
use crate::llm::ChatMessage;
use crate::session::{ChatTurn, Role};
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.protocols([WS_APP_PROTOCOL])
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let mut current_session_id = Uuid::new_v4().to_string();
    if state.sessions.ensure_session(&current_session_id).is_err() {
        return;
    }

    while let Some(Ok(msg)) = receiver.next().await {
        let incoming = match msg {
            Message::Text(text) => match serde_json::from_str::<WsIncomingMessage>(&text) {
                Ok(incoming) => incoming,
                Err(_) => continue,
            },
            Message::Close(_) => break,
            _ => continue,
        };

        if let Err(err) = handle_message(&mut sender, &state, &mut current_session_id, incoming)
            .await
        {
            let _ = send_json(
                &mut sender,
                json!({"type": "error", "message": err.to_string()}),
            )
            .await;
        }
    }
}

async fn handle_message(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    current_session_id: &mut String,
    data: WsIncomingMessage,
) -> Result<(), ApiError> {
    if data.msg_type.as_deref() == Some("set_session") {
        if let Some(session_id) = data.session_id {
            state.sessions.ensure_session(&session_id)?;
            *current_session_id = session_id;
            send_json(
                sender,
                json!({"type": "session_changed", "sessionId": current_session_id}),
            )
            .await?;
            send_history(sender, state, current_session_id).await?;
        }
        return Ok(());
    }

    let message_text = data.message.unwrap_or_default();
    if message_text.trim().is_empty() {
        return Ok(());
    }

    let session_id = data
        .session_id
        .unwrap_or_else(|| current_session_id.clone());
    state.sessions.ensure_session(&session_id)?;

    // Readiness gate: chatting before an upload is a configuration error,
    // not a crash.
    let index = state.sessions.index(&session_id)?.ok_or_else(|| {
        ApiError::Config("no document has been indexed for this session yet".to_string())
    })?;

    let prior = state.sessions.append_user_turn(&session_id, &message_text)?;
    let history = to_chat_messages(&prior);

    let standalone = state.chain.reformulate(&history, &message_text).await;
    let context = state.chain.retrieve(index.as_ref(), &standalone).await?;

    send_json(
        sender,
        json!({
            "type": "context",
            "pages": context,
        }),
    )
    .await?;

    let mut stream = match state
        .chain
        .stream_answer(&history, &message_text, &context)
        .await
    {
        Ok(rx) => rx,
        Err(err) => {
            send_json(
                sender,
                json!({"type": "error", "message": format!("{}", err)}),
            )
            .await?;
            return Ok(());
        }
    };

    let mut full_response = String::new();
    while let Some(chunk_result) = stream.recv().await {
        match chunk_result {
            Ok(chunk) => {
                if chunk.is_empty() {
                    continue;
                }
                full_response.push_str(&chunk);
                send_json(sender, json!({"type": "chunk", "message": chunk})).await?;
            }
            Err(err) => {
                send_json(
                    sender,
                    json!({"type": "error", "message": format!("{}", err)}),
                )
                .await?;
                return Ok(());
            }
        }
    }

    send_json(sender, json!({"type": "done"})).await?;

    state
        .sessions
        .append_assistant_turn(&session_id, &full_response)?;

    Ok(())
}

fn to_chat_messages(turns: &[ChatTurn]) -> Vec<ChatMessage> {
    turns
        .iter()
        .map(|turn| ChatMessage {
            role: match turn.role {
                Role::User => "user".to_string(),
                Role::Assistant => "assistant".to_string(),
            },
            content: turn.content.clone(),
        })
        .collect()
}

async fn send_history(
    sender: &mut SplitSink<WebSocket, Message>,
    state: &Arc<AppState>,
    session_id: &str,
) -> Result<(), ApiError> {
    let messages = state.sessions.messages(session_id)?;
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

    send_json(sender, json!({"type": "history", "messages": formatted})).await
}

pub async fn send_json(
    sender: &mut SplitSink<WebSocket, Message>,
    payload: Value,
) -> Result<(), ApiError> {
    let text = serde_json::to_string(&payload).map_err(ApiError::internal)?;
    sender
        .send(Message::Text(text))
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}
