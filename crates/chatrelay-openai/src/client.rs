//! Streaming chat-completions client.

use async_trait::async_trait;
use chatrelay_core::{FragmentStream, GenerationClient, GenerationError};
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Url};
use tracing::{debug, error};

use crate::config::{ConfigError, GenerationConfig};
use crate::models::{ChatCompletionRequest, ChatMessage, ErrorResponse};
use crate::sse::decode_fragments;

/// Idle connections kept per backend host.
const POOL_MAX_IDLE_PER_HOST: usize = 10;

/// [`GenerationClient`] backed by an OpenAI-compatible HTTP API.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    config: GenerationConfig,
    endpoint: Url,
}

impl OpenAiClient {
    /// Validate `config` and build the underlying HTTP client.
    pub fn new(config: GenerationConfig) -> Result<Self, ConfigError> {
        let endpoint = config.completions_url()?;
        let http = Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            config,
            endpoint,
        })
    }

    /// Resolved `/chat/completions` URL.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GenerationError> {
        let body = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![ChatMessage::user(prompt)],
            stream: true,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(model = %self.config.model, "Opening generation stream");

        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.config.api_key)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Failed to reach generation backend: {e}");
                GenerationError::Connect(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let body = ErrorResponse::describe(&text);
            error!(status = status.as_u16(), "Generation backend rejected request: {body}");
            return Err(GenerationError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(decode_fragments(response.bytes_stream()))
    }
}
