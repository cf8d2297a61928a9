//! End-to-end tests for `OpenAiClient` against a local stand-in backend.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
    routing::post,
};
use chatrelay_core::{GenerationClient, GenerationError};
use chatrelay_openai::{GenerationConfig, OpenAiClient};
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_test::assert_ok;

#[derive(Clone)]
struct Backend {
    status: StatusCode,
    body: String,
    seen: Arc<Mutex<Vec<(HeaderMap, Value)>>>,
}

async fn completions(
    State(backend): State<Backend>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> impl IntoResponse {
    backend
        .seen
        .lock()
        .expect("seen lock")
        .push((headers, request));
    (
        backend.status,
        [(header::CONTENT_TYPE, "text/event-stream")],
        backend.body,
    )
}

/// Start a backend on an ephemeral port and return a client pointed at it.
async fn spawn_backend(
    status: StatusCode,
    body: impl Into<String>,
) -> (OpenAiClient, Arc<Mutex<Vec<(HeaderMap, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let backend = Backend {
        status,
        body: body.into(),
        seen: Arc::clone(&seen),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .with_state(backend);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let config = GenerationConfig::new("sk-test")
        .with_base_url(format!("http://{addr}/v1"))
        .with_model("test-model")
        .with_max_tokens(64);
    (OpenAiClient::new(config).expect("client"), seen)
}

fn delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"content": text}}]})
    )
}

#[tokio::test]
async fn streams_fragments_in_order() {
    let body = format!(
        "data: {}\n\n{}{}data: [DONE]\n\n",
        json!({"choices": [{"index": 0, "delta": {"role": "assistant"}}]}),
        delta("Hel"),
        delta("lo")
    );
    let (client, seen) = spawn_backend(StatusCode::OK, body).await;

    let stream = assert_ok!(client.stream("say hello").await);
    let fragments: Vec<_> = stream.collect().await;
    assert_eq!(fragments, vec![Ok("Hel".to_string()), Ok("lo".to_string())]);

    let seen = seen.lock().expect("seen lock");
    let (headers, request) = &seen[0];
    assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-test");
    assert_eq!(request["model"], "test-model");
    assert_eq!(request["stream"], true);
    assert_eq!(request["max_tokens"], 64);
    assert_eq!(
        request["messages"],
        json!([{"role": "user", "content": "say hello"}])
    );
    assert!(request.get("temperature").is_none());
}

#[tokio::test]
async fn rejected_request_reports_status_and_message() {
    let body = json!({"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}});
    let (client, _) = spawn_backend(StatusCode::UNAUTHORIZED, body.to_string()).await;

    let err = client.stream("hi").await.err().expect("should fail");
    assert_eq!(
        err,
        GenerationError::Upstream {
            status: 401,
            body: "Incorrect API key provided".into(),
        }
    );
}

#[tokio::test]
async fn in_stream_error_ends_fragments() {
    let body = format!(
        "{}data: {}\n\n{}",
        delta("partial"),
        json!({"error": {"message": "rate limited"}}),
        delta("never")
    );
    let (client, _) = spawn_backend(StatusCode::OK, body).await;

    let fragments: Vec<_> = assert_ok!(client.stream("hi").await).collect().await;
    assert_eq!(
        fragments,
        vec![
            Ok("partial".to_string()),
            Err(GenerationError::Backend("rate limited".into())),
        ]
    );
}

#[tokio::test]
async fn empty_body_yields_no_fragments() {
    let (client, _) = spawn_backend(StatusCode::OK, "data: [DONE]\n\n").await;
    let fragments: Vec<_> = assert_ok!(client.stream("hi").await).collect().await;
    assert!(fragments.is_empty());
}
