//! Route definitions and router construction.
//!
//! Two routers share one [`AppState`]: the chat API and the pub/sub
//! subscription endpoints, each served on its own listener.
//!
//! # Path Parameter Syntax
//! Axum 0.8 uses brace syntax for path parameters: `{channel_id}`

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::bootstrap::CorsConfig;
use crate::handlers;
use crate::pubsub;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    match config {
        CorsConfig::AllowAll => CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
        CorsConfig::AllowOrigins(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|o| match o.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %o, "Ignoring unparseable CORS origin");
                        None
                    }
                })
                .collect();
            CorsLayer::new()
                .allow_origin(allowed)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

/// API routes without the `/api` prefix (for nesting under `/api`).
pub(crate) fn api_routes() -> Router<AppState> {
    Router::new().route(
        "/chat",
        post(handlers::chat::create).options(handlers::chat::preflight),
    )
}

/// Create the chat API router.
pub fn create_router(state: AppState, cors_config: &CorsConfig) -> Router {
    let cors = build_cors_layer(cors_config);

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes().with_state(state).layer(cors))
        .layer(TraceLayer::new_for_http())
}

/// Create the pub/sub subscription router.
pub fn create_pubsub_router(state: AppState, cors_config: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/connection/sse/{channel_id}",
            get(pubsub::sse::subscribe),
        )
        .route(
            "/connection/websocket/{channel_id}",
            get(pubsub::ws::subscribe),
        )
        .with_state(state)
        .layer(build_cors_layer(cors_config))
        .layer(TraceLayer::new_for_http())
}
