//! Axum adapter for the chat relay.
//!
//! Serves the chat front door (`POST /api/chat`) and the in-process pub/sub
//! hub's subscription endpoints, and owns the composition root that wires
//! the relay together.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod pubsub;
pub mod routes;
pub mod state;

// Re-export primary types
pub use bootstrap::{AxumContext, CorsConfig, ServerConfig, assemble, bootstrap, start_server};
pub use config::{Cli, ConfigError, Settings};
pub use error::HttpError;
pub use pubsub::{ChannelHub, Delivery, HubConfig, HubError};
pub use routes::{create_pubsub_router, create_router};
pub use state::AppState;
