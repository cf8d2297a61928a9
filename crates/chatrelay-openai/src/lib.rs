//! OpenAI-compatible generation backend for the chat relay.
//!
//! Implements [`chatrelay_core::GenerationClient`] by issuing a streaming
//! `chat/completions` request and decoding the SSE body into text fragments.

#![deny(unsafe_code)]

mod client;
pub mod config;
pub mod models;
pub mod sse;

pub use client::OpenAiClient;
pub use config::{
    ConfigError, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    GenerationConfig,
};
pub use sse::decode_fragments;
