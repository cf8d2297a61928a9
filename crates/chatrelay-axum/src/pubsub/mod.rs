//! In-process pub/sub: the hub the relay publishes into and the transports
//! subscribers read from.

pub mod hub;
pub mod sse;
pub mod ws;

pub use hub::{ChannelHub, Delivery, HubConfig, HubError, MAX_CHANNEL_HISTORY, Subscription};
