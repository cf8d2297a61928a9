//! Generation backend configuration.
//!
//! Everything the client needs is passed in explicitly; nothing about the
//! backend is baked into the client itself.

use std::fmt;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Default OpenAI-compatible API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model name.
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default completion budget per request.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default TCP/TLS connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Invalid generation configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("generation API key is required")]
    MissingApiKey,

    #[error("invalid generation base URL '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("temperature must be within 0.0..=2.0, got {0}")]
    InvalidTemperature(f32),

    #[error("max_tokens must be greater than zero")]
    ZeroMaxTokens,

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Settings for [`OpenAiClient`](crate::OpenAiClient).
#[derive(Clone)]
pub struct GenerationConfig {
    /// Bearer token sent with every request.
    pub api_key: String,
    /// API root; `/chat/completions` is appended.
    pub base_url: String,
    /// Model name sent in the request body.
    pub model: String,
    /// Maximum tokens to generate per session.
    pub max_tokens: u32,
    /// Sampling temperature; backend default when `None`.
    pub temperature: Option<f32>,
    /// Connect timeout. Streams themselves are not time-limited.
    pub connect_timeout: Duration,
}

impl fmt::Debug for GenerationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl GenerationConfig {
    /// Config with default backend settings for the given key.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Check the settings and resolve the completions endpoint.
    pub fn completions_url(&self) -> Result<Url, ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ZeroMaxTokens);
        }
        if let Some(t) = self.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(ConfigError::InvalidTemperature(t));
            }
        }

        let invalid = |reason: String| ConfigError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason,
        };
        let base = Url::parse(self.base_url.trim_end_matches('/'))
            .map_err(|e| invalid(e.to_string()))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", base.scheme())));
        }

        Url::parse(&format!("{}/chat/completions", base.as_str().trim_end_matches('/')))
            .map_err(|e| invalid(e.to_string()))
    }
}
