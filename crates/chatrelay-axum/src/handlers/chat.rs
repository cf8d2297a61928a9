//! Chat front door - accept a prompt, hand back a channel to listen on.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use chatrelay_core::ChannelId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::HttpError;
use crate::state::AppState;

/// Acknowledgement returned with every new channel.
pub const CHANNEL_CREATED: &str = "Channel created, start listening for messages";

// ─────────────────────────────────────────────────────────────────────────────
// DTOs (adapter-local)
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for starting a chat session.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
}

/// Response body naming the channel the session publishes to.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub channel_id: ChannelId,
    pub message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Start a relay session.
/// POST /api/chat
///
/// Responds as soon as the session is launched; generation output reaches
/// the returned channel asynchronously.
pub async fn create(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, HttpError> {
    let Json(request) = payload?;
    let message = request.message.unwrap_or_default();

    if message.trim().is_empty() {
        return Err(HttpError::BadRequest("message is required".into()));
    }
    let chars = message.chars().count();
    if chars > state.max_message_chars {
        return Err(HttpError::BadRequest(format!(
            "message is too long ({chars} characters, limit {})",
            state.max_message_chars
        )));
    }

    let handle = state.supervisor.launch(message)?;
    debug!(channel_id = %handle.channel_id(), chars, "Chat request accepted");

    Ok(Json(ChatResponse {
        channel_id: handle.channel_id().clone(),
        message: CHANNEL_CREATED.to_string(),
    }))
}

/// CORS preflight without the CORS headers.
/// OPTIONS /api/chat
pub async fn preflight() -> StatusCode {
    StatusCode::OK
}
