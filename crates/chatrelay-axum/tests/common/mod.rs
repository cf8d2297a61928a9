//! Shared helpers for chatrelay-axum integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, header};
use chatrelay_axum::{AppState, CorsConfig, HubConfig, assemble, create_pubsub_router, create_router};
use chatrelay_core::RelayConfig;
use chatrelay_core::testing::ScriptedGenerator;
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tower::ServiceExt;

/// CORS origin used by preflight tests.
pub const TEST_CORS_ORIGIN: &str = "http://localhost:3000";

/// Message length limit used by test contexts.
pub const TEST_MAX_MESSAGE_CHARS: usize = 64;

/// A relay wired to a scripted generator, plus both routers.
pub struct TestRelay {
    pub state: AppState,
    pub generator: Arc<ScriptedGenerator>,
    pub api: Router,
    pub pubsub: Router,
}

impl TestRelay {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_cors(generator, &CorsConfig::AllowAll)
    }

    pub fn with_cors(generator: ScriptedGenerator, cors: &CorsConfig) -> Self {
        let generator = Arc::new(generator);
        let state: AppState = Arc::new(assemble(
            generator.clone(),
            RelayConfig::default(),
            HubConfig::default(),
            TEST_MAX_MESSAGE_CHARS,
        ));
        Self {
            api: create_router(Arc::clone(&state), cors),
            pubsub: create_pubsub_router(Arc::clone(&state), cors),
            state,
            generator,
        }
    }
}

/// Serve `app` on an ephemeral local port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

/// `POST /api/chat` with a raw body.
pub async fn post_chat(app: &Router, body: impl Into<Body>) -> Response<Body> {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
        .unwrap()
}

/// `GET` a path.
pub async fn get(app: &Router, uri: &str) -> Response<Body> {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// One parsed SSE event: field name to value, comments dropped.
pub type SseFrame = HashMap<String, String>;

/// Split an SSE body into its events.
pub fn parse_sse(body: &str) -> Vec<SseFrame> {
    body.split("\n\n")
        .filter_map(|block| {
            let frame: SseFrame = block
                .lines()
                .filter(|line| !line.starts_with(':'))
                .filter_map(|line| line.split_once(':'))
                .map(|(field, value)| (field.to_string(), value.trim_start().to_string()))
                .collect();
            (!frame.is_empty()).then_some(frame)
        })
        .collect()
}
