//! Event publisher port.
//!
//! The pipeline hands every event to a publisher and awaits the result
//! before moving on, which is what keeps per-channel order intact.
//! Implementations own the transport (in-process hub, external broker, ...)
//! and their own synchronization: many sessions publish concurrently
//! through one shared instance.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ChannelId;
use crate::events::RelayEvent;

/// Reasons a publisher can refuse an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    /// The publisher has been shut down.
    #[error("publisher is closed")]
    Closed,

    /// No room for another channel.
    #[error("channel capacity exceeded ({limit} live channels)")]
    CapacityExceeded { limit: usize },

    /// The channel already received its terminal event.
    #[error("channel {0} already terminated")]
    ChannelTerminated(String),

    /// Transport-specific failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Port for delivering events to a channel's subscribers.
///
/// Events submitted for the same channel must be delivered in submission
/// order. Publishing to a channel nobody listens to is not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish one event to a channel.
    async fn publish(&self, channel: &ChannelId, event: &RelayEvent) -> Result<(), PublishError>;
}
