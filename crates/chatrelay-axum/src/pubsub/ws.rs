//! WebSocket subscription transport.
//!
//! `GET /connection/websocket/{channel_id}` upgrades to a WebSocket that
//! carries one JSON text frame per delivery. The server closes the socket
//! after the terminal event; frames from the client are ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use chatrelay_core::ChannelId;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::pubsub::Subscription;
use crate::state::AppState;

/// WebSocket subscription endpoint.
///
/// The subscription is taken before the upgrade completes, so nothing
/// published during the handshake is missed.
pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Response, HttpError> {
    let channel: ChannelId = channel_id.parse()?;
    let subscription = state.hub.subscribe(&channel).await?;
    Ok(ws.on_upgrade(move |socket| relay_to_socket(socket, channel, subscription)))
}

async fn relay_to_socket(socket: WebSocket, channel: ChannelId, subscription: Subscription) {
    let (mut sender, mut receiver) = socket.split();
    let mut deliveries = Box::pin(subscription.into_stream());

    loop {
        tokio::select! {
            next = deliveries.next() => {
                let Some(delivery) = next else { break };
                let text = match serde_json::to_string(&delivery) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(channel_id = %channel, "Failed to serialize delivery: {e}");
                        continue;
                    }
                };
                if sender.send(Message::Text(text.into())).await.is_err() {
                    debug!(channel_id = %channel, "WebSocket subscriber went away");
                    return;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => {
                    debug!(channel_id = %channel, "WebSocket subscriber closed");
                    return;
                }
                Some(Ok(_)) => {}
            },
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}
