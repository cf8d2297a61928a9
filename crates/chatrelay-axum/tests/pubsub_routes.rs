//! Integration tests for the subscription endpoints.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::http::{StatusCode, header};
use chatrelay_axum::Delivery;
use chatrelay_axum::handlers::chat::ChatResponse;
use chatrelay_core::testing::ScriptedGenerator;
use chatrelay_core::{ChannelId, EventPublisher, GenerationError, RelayEvent};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::Message;

use common::{TestRelay, body_bytes, get, parse_sse, post_chat, serve};

async fn start_session(relay: &TestRelay, message: &str) -> ChannelId {
    let response = post_chat(&relay.api, format!(r#"{{"message": "{message}"}}"#)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: ChatResponse = serde_json::from_slice(&body_bytes(response).await).unwrap();
    body.channel_id
}

async fn sse_deliveries(relay: &TestRelay, channel: &ChannelId) -> Vec<(String, String, Delivery)> {
    let response = get(&relay.pubsub, &format!("/connection/sse/{channel}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let body = String::from_utf8(body_bytes(response).await).unwrap();
    parse_sse(&body)
        .into_iter()
        .map(|frame| {
            let delivery: Delivery = serde_json::from_str(&frame["data"]).unwrap();
            (frame["event"].clone(), frame["id"].clone(), delivery)
        })
        .collect()
}

#[tokio::test]
async fn sse_replays_completed_session() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["Hel", "lo"]));
    let channel = start_session(&relay, "hello").await;

    let frames = sse_deliveries(&relay, &channel).await;

    let kinds: Vec<&str> = frames.iter().map(|(event, _, _)| event.as_str()).collect();
    assert_eq!(kinds, vec!["start", "chunk", "chunk", "end"]);
    let ids: Vec<&str> = frames.iter().map(|(_, id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["0", "1", "2", "3"]);
    let events: Vec<RelayEvent> = frames.into_iter().map(|(_, _, d)| d.event).collect();
    assert_eq!(
        events,
        vec![
            RelayEvent::Start,
            RelayEvent::chunk("Hel"),
            RelayEvent::chunk("lo"),
            RelayEvent::End,
        ]
    );
}

#[tokio::test]
async fn sse_ends_after_error_event() {
    let relay = TestRelay::new(ScriptedGenerator::failing_to_open(
        GenerationError::Upstream {
            status: 401,
            body: "Incorrect API key provided".into(),
        },
    ));
    let channel = start_session(&relay, "hi").await;

    let frames = sse_deliveries(&relay, &channel).await;
    let kinds: Vec<&str> = frames.iter().map(|(event, _, _)| event.as_str()).collect();
    assert_eq!(kinds, vec!["start", "error"]);
    assert!(
        frames[1]
            .2
            .event
            .payload()
            .contains("Incorrect API key provided")
    );
}

#[tokio::test]
async fn sse_subscriber_before_first_event_sees_whole_session() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["x"]));
    let channel = ChannelId::allocate();

    let pubsub = relay.pubsub.clone();
    let uri = format!("/connection/sse/{channel}");
    let reader = tokio::spawn(async move { body_bytes(get(&pubsub, &uri).await).await });

    // Publish only once the subscriber is attached.
    while relay.state.hub.subscriber_count(&channel).await == 0 {
        tokio::task::yield_now().await;
    }
    for event in [RelayEvent::Start, RelayEvent::chunk("x"), RelayEvent::End] {
        relay.state.hub.publish(&channel, &event).await.unwrap();
    }

    let body = String::from_utf8(reader.await.unwrap()).unwrap();
    let kinds: Vec<String> = parse_sse(&body)
        .into_iter()
        .map(|frame| frame["event"].clone())
        .collect();
    assert_eq!(kinds, vec!["start", "chunk", "end"]);
}

/// Read JSON text frames until the server's close frame.
async fn ws_deliveries(addr: SocketAddr, channel: &ChannelId) -> Vec<Delivery> {
    let url = format!("ws://{addr}/connection/websocket/{channel}");
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.expect("connect");

    let read = async {
        let mut deliveries = Vec::new();
        while let Some(message) = socket.next().await {
            match message.expect("frame") {
                Message::Text(text) => deliveries.push(serde_json::from_str(&text).unwrap()),
                Message::Close(_) => return deliveries,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        panic!("socket ended without a close frame");
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("close frame within timeout")
}

#[tokio::test]
async fn websocket_replays_completed_session_then_closes() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["Hel", "lo"]));
    let channel = start_session(&relay, "hello").await;
    let addr = serve(relay.pubsub.clone()).await;

    let deliveries = ws_deliveries(addr, &channel).await;

    let seqs: Vec<u64> = deliveries.iter().map(|d| d.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
    let events: Vec<RelayEvent> = deliveries.into_iter().map(|d| d.event).collect();
    assert_eq!(
        events,
        vec![
            RelayEvent::Start,
            RelayEvent::chunk("Hel"),
            RelayEvent::chunk("lo"),
            RelayEvent::End,
        ]
    );
}

#[tokio::test]
async fn websocket_subscriber_before_first_event_sees_whole_session() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["x"]));
    let channel = ChannelId::allocate();
    let addr = serve(relay.pubsub.clone()).await;

    let reader = tokio::spawn({
        let channel = channel.clone();
        async move { ws_deliveries(addr, &channel).await }
    });

    while relay.state.hub.subscriber_count(&channel).await == 0 {
        tokio::task::yield_now().await;
    }
    for event in [RelayEvent::Start, RelayEvent::chunk("x"), RelayEvent::error("boom")] {
        relay.state.hub.publish(&channel, &event).await.unwrap();
    }

    let events: Vec<RelayEvent> = reader
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.event)
        .collect();
    assert_eq!(
        events,
        vec![RelayEvent::Start, RelayEvent::chunk("x"), RelayEvent::error("boom")]
    );
}

#[tokio::test]
async fn websocket_frames_are_flat_json() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["Hel"]));
    let channel = start_session(&relay, "hello").await;
    let addr = serve(relay.pubsub.clone()).await;

    let url = format!("ws://{addr}/connection/websocket/{channel}");
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.expect("connect");
    let Some(Ok(Message::Text(text))) = socket.next().await else {
        panic!("expected a text frame");
    };
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&text).unwrap(),
        serde_json::json!({"seq": 0, "type": "start", "message": ""})
    );
}

#[tokio::test]
async fn invalid_channel_id_is_bad_request() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["x"]));
    let response = get(&relay.pubsub, "/connection/sse/bad!id").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscribe_after_close_is_unavailable() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["x"]));
    relay.state.hub.close().await;

    let response = get(
        &relay.pubsub,
        &format!("/connection/sse/{}", ChannelId::allocate()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn pubsub_health_endpoint_returns_ok() {
    let relay = TestRelay::new(ScriptedGenerator::fragments(["x"]));
    let response = get(&relay.pubsub, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
}
