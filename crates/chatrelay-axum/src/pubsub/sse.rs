//! SSE subscription transport.
//!
//! `GET /connection/sse/{channel_id}` streams one SSE event per relay event:
//! `event` is the event type, `id` the channel sequence number and `data`
//! the JSON delivery. The response ends after the terminal event.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use chatrelay_core::ChannelId;
use futures_util::stream::{Stream, StreamExt};
use tracing::warn;

use crate::error::HttpError;
use crate::pubsub::Delivery;
use crate::state::AppState;

/// Interval between keep-alive comments.
pub const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// SSE subscription endpoint.
pub async fn subscribe(
    State(state): State<AppState>,
    Path(channel_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>, HttpError> {
    let channel: ChannelId = channel_id.parse()?;
    let subscription = state.hub.subscribe(&channel).await?;

    let events = subscription
        .into_stream()
        .filter_map(|delivery| async move { to_sse_event(&delivery).map(Ok::<_, Infallible>) });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("ping"),
    ))
}

fn to_sse_event(delivery: &Delivery) -> Option<Event> {
    match Event::default()
        .event(delivery.event.kind().as_str())
        .id(delivery.seq.to_string())
        .json_data(delivery)
    {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Failed to serialize delivery: {e}");
            None
        }
    }
}
