//! OpenAI chat-completions wire types.
//!
//! Only the subset the relay sends and reads is modelled. Domain types live
//! in `chatrelay-core`; this module handles the API layer mapping.

use serde::{Deserialize, Serialize};

// =============================================================================
// Request Types
// =============================================================================

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    /// Model name to use.
    pub model: &'a str,
    /// Array of chat messages.
    pub messages: Vec<ChatMessage<'a>>,
    /// Always true for the relay.
    pub stream: bool,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature (0-2).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

/// A chat message in the request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

impl<'a> ChatMessage<'a> {
    /// A single user turn.
    pub const fn user(content: &'a str) -> Self {
        Self {
            role: "user",
            content,
        }
    }
}

// =============================================================================
// Streaming Response Types
// =============================================================================

/// One `data:` payload of a streaming response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    /// Some OpenAI-compatible backends report failures in-stream.
    #[serde(default)]
    pub error: Option<StreamError>,
}

impl ChatCompletionChunk {
    /// Text delta of the first choice, if any.
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Error object, either in-stream or as a non-2xx response body.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamError {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub error_type: Option<String>,
}

/// Non-2xx response body: `{"error": {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: StreamError,
}

impl ErrorResponse {
    /// Best human-readable rendering of an error body.
    ///
    /// Falls back to the raw text when the body is not OpenAI-shaped.
    #[must_use]
    pub fn describe(raw: &str) -> String {
        match serde_json::from_str::<Self>(raw) {
            Ok(parsed) if !parsed.error.message.is_empty() => parsed.error.message,
            _ => raw.trim().to_string(),
        }
    }
}
