//! HTTP request handlers for the relay API.
//!
//! Handlers are thin: validation and mapping here, session work in
//! `chatrelay_core::SessionSupervisor`.

pub mod chat;

/// Health check endpoint.
pub async fn health_check() -> &'static str {
    "OK"
}
