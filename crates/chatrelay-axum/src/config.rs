//! Process configuration.
//!
//! Every setting is a CLI flag with an environment fallback. `main` loads a
//! `.env` file first, so the three sources stack as flag > env > `.env`.
//! [`Cli::into_settings`] validates the raw values into the typed configs
//! each layer consumes.

use std::time::Duration;

use chatrelay_core::{ChunkFaultPolicy, RelayConfig};
use chatrelay_openai::{
    ConfigError as GenerationConfigError, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    GenerationConfig,
};
use clap::Parser;
use thiserror::Error;

use crate::bootstrap::{CorsConfig, ServerConfig};
use crate::pubsub::{HubConfig, MAX_CHANNEL_HISTORY};

/// Invalid process configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Generation(#[from] GenerationConfigError),

    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },

    #[error("{name} must be at most {max}")]
    TooLarge { name: &'static str, max: usize },

    #[error("PORT and PUBSUB_PORT must differ (both {0})")]
    PortClash(u16),
}

/// Command-line interface for the relay server.
#[derive(Clone, Parser)]
#[command(name = "chatrelay")]
#[command(about = "Relay streamed LLM output to pub/sub channels")]
#[command(version)]
pub struct Cli {
    /// API key for the generation backend
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible API root
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub openai_base_url: String,

    /// Model used for every session
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL)]
    pub openai_model: String,

    /// Completion budget per session
    #[arg(long, env = "OPENAI_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    pub openai_max_tokens: u32,

    /// Sampling temperature (backend default when unset)
    #[arg(long, env = "OPENAI_TEMPERATURE")]
    pub openai_temperature: Option<f32>,

    /// Bind address for both listeners
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the chat API
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Port for the pub/sub subscription endpoints
    #[arg(long, env = "PUBSUB_PORT", default_value_t = 8000)]
    pub pubsub_port: u16,

    /// What to do when a chunk cannot be delivered: abort or best_effort
    #[arg(long, env = "CHUNK_FAULT_POLICY", default_value_t = ChunkFaultPolicy::Abort)]
    pub chunk_fault_policy: ChunkFaultPolicy,

    /// Seconds to wait for running sessions on shutdown
    #[arg(long, env = "SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Events kept per channel for late subscribers
    #[arg(long, env = "CHANNEL_HISTORY", default_value_t = 512)]
    pub channel_history: usize,

    /// Seconds a finished channel stays subscribable
    #[arg(long, env = "CHANNEL_RETENTION_SECS", default_value_t = 300)]
    pub channel_retention_secs: u64,

    /// Upper bound on live channels
    #[arg(long, env = "MAX_CHANNELS", default_value_t = 10_000)]
    pub max_channels: usize,

    /// Longest accepted chat message, in characters
    #[arg(long, env = "MAX_MESSAGE_CHARS", default_value_t = 32_768)]
    pub max_message_chars: usize,

    /// Allowed CORS origins, comma-separated (all when empty or "*")
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,
}

/// Fully validated settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub generation: GenerationConfig,
    pub relay: RelayConfig,
    pub hub: HubConfig,
}

impl Cli {
    /// Validate the raw values into typed configs.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        let nonzero = |name: &'static str, value: usize| {
            if value == 0 {
                Err(ConfigError::Zero { name })
            } else {
                Ok(value)
            }
        };

        let channel_history = nonzero("CHANNEL_HISTORY", self.channel_history)?;
        if channel_history > MAX_CHANNEL_HISTORY {
            return Err(ConfigError::TooLarge {
                name: "CHANNEL_HISTORY",
                max: MAX_CHANNEL_HISTORY,
            });
        }
        let max_channels = nonzero("MAX_CHANNELS", self.max_channels)?;
        let max_message_chars = nonzero("MAX_MESSAGE_CHARS", self.max_message_chars)?;
        if self.port == self.pubsub_port && self.port != 0 {
            return Err(ConfigError::PortClash(self.port));
        }

        let generation = GenerationConfig::new(self.openai_api_key.unwrap_or_default())
            .with_base_url(self.openai_base_url)
            .with_model(self.openai_model)
            .with_max_tokens(self.openai_max_tokens)
            .with_temperature(self.openai_temperature);
        generation.completions_url()?;

        Ok(Settings {
            server: ServerConfig {
                host: self.host,
                port: self.port,
                pubsub_port: self.pubsub_port,
                cors: CorsConfig::from_origins(self.cors_origins),
                shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
                max_message_chars,
            },
            generation,
            relay: RelayConfig {
                chunk_fault_policy: self.chunk_fault_policy,
            },
            hub: HubConfig {
                history: channel_history,
                retention: Duration::from_secs(self.channel_retention_secs),
                max_channels,
                ..HubConfig::default()
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["chatrelay", "--openai-api-key", "sk-test"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_map_into_settings() {
        let settings = parse(&[
            "--port",
            "9090",
            "--pubsub-port",
            "9000",
            "--openai-model",
            "gpt-test",
            "--openai-temperature",
            "0.2",
            "--chunk-fault-policy",
            "abort",
            "--shutdown-grace-secs",
            "2",
            "--channel-history",
            "16",
            "--cors-origins",
            "http://a.test,http://b.test",
        ])
        .into_settings()
        .unwrap();

        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.pubsub_port, 9000);
        assert_eq!(settings.server.shutdown_grace, Duration::from_secs(2));
        assert_eq!(settings.generation.model, "gpt-test");
        assert_eq!(settings.generation.temperature, Some(0.2));
        assert_eq!(settings.relay.chunk_fault_policy, ChunkFaultPolicy::Abort);
        assert_eq!(settings.hub.history, 16);
        assert!(matches!(
            settings.server.cors,
            CorsConfig::AllowOrigins(ref origins) if origins.len() == 2
        ));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let err = parse(&["--port", "7000", "--pubsub-port", "7000"])
            .into_settings()
            .unwrap_err();
        assert_eq!(err, ConfigError::PortClash(7000));

        let err = parse(&["--port", "7001", "--pubsub-port", "7002", "--max-channels", "0"])
            .into_settings()
            .unwrap_err();
        assert_eq!(err, ConfigError::Zero { name: "MAX_CHANNELS" });

        let err = parse(&[
            "--port",
            "7001",
            "--pubsub-port",
            "7002",
            "--openai-temperature",
            "9",
        ])
        .into_settings()
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Generation(GenerationConfigError::InvalidTemperature(9.0))
        );
    }

    #[test]
    fn test_channel_history_is_bounded() {
        let err = parse(&[
            "--port",
            "7001",
            "--pubsub-port",
            "7002",
            "--channel-history",
            "18446744073709551615",
        ])
        .into_settings()
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::TooLarge {
                name: "CHANNEL_HISTORY",
                max: MAX_CHANNEL_HISTORY,
            }
        );

        let settings = parse(&[
            "--port",
            "7001",
            "--pubsub-port",
            "7002",
            "--channel-history",
            "65536",
        ])
        .into_settings()
        .unwrap();
        assert_eq!(settings.hub.history, MAX_CHANNEL_HISTORY);
    }

    #[test]
    fn test_chunk_faults_abort_by_default() {
        let settings = parse(&["--port", "7001", "--pubsub-port", "7002"])
            .into_settings()
            .unwrap();
        assert_eq!(settings.relay.chunk_fault_policy, ChunkFaultPolicy::Abort);
    }

    #[test]
    fn test_missing_api_key_fails_validation() {
        let cli = Cli::parse_from([
            "chatrelay",
            "--openai-api-key",
            "",
            "--port",
            "7001",
            "--pubsub-port",
            "7002",
        ]);
        assert_eq!(
            cli.into_settings().unwrap_err(),
            ConfigError::Generation(GenerationConfigError::MissingApiKey)
        );
    }

    #[test]
    fn test_unknown_fault_policy_is_rejected() {
        let result = Cli::try_parse_from([
            "chatrelay",
            "--openai-api-key",
            "k",
            "--chunk-fault-policy",
            "retry",
        ]);
        assert!(result.is_err());
    }
}
