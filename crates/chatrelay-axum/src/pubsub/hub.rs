//! Channel-keyed event hub.
//!
//! Every channel owns a broadcast sender for live subscribers and a bounded
//! replay history for subscribers that attach late. `subscribe()` snapshots
//! the history and registers the live receiver under the same lock, so a
//! subscriber sees each event exactly once, in publish order. A subscriber
//! that falls behind the short live buffer catches up from the history;
//! only one that falls behind the history too loses events, and the jump
//! in `seq` marks the gap.
//!
//! Channels are created on first publish or first subscribe. A channel
//! created by a subscriber stays a placeholder until something is
//! published to it. Placeholders have their own budget, so subscribers
//! cannot use up the room sessions need. A background reaper drops
//! channels once their terminal event is older than the retention window,
//! and placeholders once they are older than it, which also ends their
//! subscriptions.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatrelay_core::{ChannelId, EventPublisher, PublishError, RelayEvent};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Largest accepted replay history per channel.
pub const MAX_CHANNEL_HISTORY: usize = 65_536;

/// Live broadcast slots per channel.
const LIVE_BUFFER: usize = 64;

/// Hub tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Events kept per channel for late subscribers.
    pub history: usize,
    /// How long finished channels and placeholders are kept.
    pub retention: Duration,
    /// Upper bound on channels with published events. Placeholders are
    /// bounded separately by the same number.
    pub max_channels: usize,
    /// How often the reaper runs.
    pub reap_interval: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            history: 512,
            retention: Duration::from_secs(300),
            max_channels: 10_000,
            reap_interval: Duration::from_secs(30),
        }
    }
}

/// Subscription failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HubError {
    #[error("pub/sub hub is closed")]
    Closed,

    #[error("channel capacity exceeded ({limit} live channels)")]
    CapacityExceeded { limit: usize },
}

impl From<HubError> for PublishError {
    fn from(err: HubError) -> Self {
        match err {
            HubError::Closed => Self::Closed,
            HubError::CapacityExceeded { limit } => Self::CapacityExceeded { limit },
        }
    }
}

/// An event as delivered to subscribers, stamped with its position in the
/// channel.
///
/// Serializes flat: `{"seq": 0, "type": "start", "message": ""}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub seq: u64,
    #[serde(flatten)]
    pub event: RelayEvent,
}

struct ChannelState {
    sender: broadcast::Sender<Delivery>,
    history: VecDeque<Delivery>,
    next_seq: u64,
    created_at: Instant,
    terminated_at: Option<Instant>,
}

impl ChannelState {
    fn new(history: usize) -> Self {
        let (sender, _) = broadcast::channel(history.min(LIVE_BUFFER));
        Self {
            sender,
            history: VecDeque::with_capacity(history.min(LIVE_BUFFER)),
            next_seq: 0,
            created_at: Instant::now(),
            terminated_at: None,
        }
    }

    const fn is_placeholder(&self) -> bool {
        self.next_seq == 0
    }

    fn is_expired(&self, now: Instant, retention: Duration) -> bool {
        match self.terminated_at {
            Some(at) => now.duration_since(at) >= retention,
            None => self.is_placeholder() && now.duration_since(self.created_at) >= retention,
        }
    }
}

#[derive(Default)]
struct Registry {
    channels: HashMap<ChannelId, ChannelState>,
    placeholders: usize,
}

impl Registry {
    fn active(&self) -> usize {
        self.channels.len() - self.placeholders
    }

    /// Channel for a subscriber, created as a placeholder if unknown.
    fn attach(
        &mut self,
        channel: &ChannelId,
        config: &HubConfig,
    ) -> Result<&mut ChannelState, HubError> {
        if !self.channels.contains_key(channel) {
            if self.placeholders >= config.max_channels {
                warn!(
                    channel_id = %channel,
                    limit = config.max_channels,
                    "Refusing subscription to unknown channel: placeholder capacity exceeded"
                );
                return Err(HubError::CapacityExceeded {
                    limit: config.max_channels,
                });
            }
            self.placeholders += 1;
        }
        Ok(self
            .channels
            .entry(channel.clone())
            .or_insert_with(|| ChannelState::new(config.history)))
    }

    /// Channel for a publish. Must be followed by a publish under the same
    /// lock, which turns a placeholder into an active channel.
    fn open(
        &mut self,
        channel: &ChannelId,
        config: &HubConfig,
    ) -> Result<&mut ChannelState, HubError> {
        let placeholder = self.channels.get(channel).map(ChannelState::is_placeholder);
        if placeholder != Some(false) && self.active() >= config.max_channels {
            warn!(
                channel_id = %channel,
                limit = config.max_channels,
                "Refusing new channel: capacity exceeded"
            );
            return Err(HubError::CapacityExceeded {
                limit: config.max_channels,
            });
        }
        if placeholder == Some(true) {
            self.placeholders -= 1;
        }
        Ok(self
            .channels
            .entry(channel.clone())
            .or_insert_with(|| ChannelState::new(config.history)))
    }
}

/// In-process pub/sub hub.
pub struct ChannelHub {
    config: HubConfig,
    registry: Arc<Mutex<Registry>>,
    closed: CancellationToken,
}

impl std::fmt::Debug for ChannelHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHub")
            .field("config", &self.config)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ChannelHub {
    /// History is clamped to `1..=MAX_CHANNEL_HISTORY`.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config: HubConfig {
                history: config.history.clamp(1, MAX_CHANNEL_HISTORY),
                ..config
            },
            registry: Arc::new(Mutex::new(Registry::default())),
            closed: CancellationToken::new(),
        }
    }

    /// Attach to `channel`, creating a placeholder if needed.
    pub async fn subscribe(&self, channel: &ChannelId) -> Result<Subscription, HubError> {
        if self.closed.is_cancelled() {
            return Err(HubError::Closed);
        }

        let mut registry = self.registry.lock().await;
        let state = registry.attach(channel, &self.config)?;

        let pending: VecDeque<Delivery> = state.history.iter().cloned().collect();
        let next_seq = pending.front().map_or(state.next_seq, |d| d.seq);
        let live = if state.terminated_at.is_some() {
            None
        } else {
            Some(BroadcastStream::new(state.sender.subscribe()))
        };

        debug!(
            channel_id = %channel,
            replayed = pending.len(),
            "Subscriber attached"
        );
        Ok(Subscription {
            channel: channel.clone(),
            pending,
            live,
            next_seq,
            finished: false,
            registry: Arc::clone(&self.registry),
        })
    }

    /// Number of channels currently held, placeholders included.
    pub async fn channel_count(&self) -> usize {
        self.registry.lock().await.channels.len()
    }

    /// Live subscribers on `channel`.
    pub async fn subscriber_count(&self, channel: &ChannelId) -> usize {
        self.registry
            .lock()
            .await
            .channels
            .get(channel)
            .map_or(0, |state| state.sender.receiver_count())
    }

    /// Drop expired channels. Returns how many were removed.
    pub async fn reap_expired(&self) -> usize {
        let now = Instant::now();
        let retention = self.config.retention;
        let mut registry = self.registry.lock().await;
        let Registry {
            channels,
            placeholders,
        } = &mut *registry;

        let before = channels.len();
        // Dropping a sender ends that channel's subscriptions.
        channels.retain(|_, state| {
            let expired = state.is_expired(now, retention);
            if expired && state.is_placeholder() {
                *placeholders -= 1;
            }
            !expired
        });
        let removed = before - channels.len();
        if removed > 0 {
            debug!(removed, remaining = channels.len(), "Reaped expired channels");
        }
        removed
    }

    /// Run the reaper until the hub is closed.
    pub fn spawn_reaper(self: &Arc<Self>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(hub.config.reap_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = hub.closed.cancelled() => break,
                    _ = ticker.tick() => {
                        hub.reap_expired().await;
                    }
                }
            }
            debug!("Channel reaper stopped");
        })
    }

    /// Refuse further work and end every open subscription.
    pub async fn close(&self) {
        self.closed.cancel();
        let mut registry = self.registry.lock().await;
        let dropped = registry.channels.len();
        // Dropping the senders ends every live receiver.
        registry.channels.clear();
        registry.placeholders = 0;
        info!(channels = dropped, "Pub/sub hub closed");
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[async_trait]
impl EventPublisher for ChannelHub {
    async fn publish(&self, channel: &ChannelId, event: &RelayEvent) -> Result<(), PublishError> {
        if self.closed.is_cancelled() {
            return Err(PublishError::Closed);
        }

        let mut registry = self.registry.lock().await;
        let state = registry.open(channel, &self.config)?;

        if state.terminated_at.is_some() {
            return Err(PublishError::ChannelTerminated(channel.to_string()));
        }

        let delivery = Delivery {
            seq: state.next_seq,
            event: event.clone(),
        };
        state.next_seq += 1;

        if state.history.len() == self.config.history {
            state.history.pop_front();
        }
        state.history.push_back(delivery.clone());
        if event.is_terminal() {
            state.terminated_at = Some(Instant::now());
        }

        // No live subscribers is fine; the history still has it.
        let _ = state.sender.send(delivery);
        Ok(())
    }
}

/// Replay backlog plus live feed for one subscriber.
pub struct Subscription {
    channel: ChannelId,
    pending: VecDeque<Delivery>,
    live: Option<BroadcastStream<Delivery>>,
    next_seq: u64,
    finished: bool,
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("pending", &self.pending.len())
            .field("next_seq", &self.next_seq)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    /// Events already published when the subscription was taken.
    #[must_use]
    pub const fn backlog(&self) -> &VecDeque<Delivery> {
        &self.pending
    }

    /// Backlog, then live events, ending after the terminal event or when
    /// the channel goes away.
    pub fn into_stream(self) -> impl Stream<Item = Delivery> + Send + 'static {
        stream::unfold(self, |mut subscription| async move {
            let delivery = subscription.next_delivery().await?;
            Some((delivery, subscription))
        })
    }

    async fn next_delivery(&mut self) -> Option<Delivery> {
        if self.finished {
            return None;
        }
        loop {
            let delivery = match self.pending.pop_front() {
                Some(delivery) => delivery,
                None => match self.live.as_mut()?.next().await? {
                    Ok(delivery) => delivery,
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        self.resync(skipped).await;
                        continue;
                    }
                },
            };

            // Already delivered from the history.
            if delivery.seq < self.next_seq {
                continue;
            }
            if delivery.seq > self.next_seq {
                warn!(
                    channel_id = %self.channel,
                    missed = delivery.seq - self.next_seq,
                    "Subscriber fell behind the replay history"
                );
            }
            self.next_seq = delivery.seq + 1;
            self.finished = delivery.event.is_terminal();
            return Some(delivery);
        }
    }

    async fn resync(&mut self, skipped: u64) {
        debug!(channel_id = %self.channel, skipped, "Subscriber lagged, resyncing from history");
        let next_seq = self.next_seq;
        let registry = self.registry.lock().await;
        if let Some(state) = registry.channels.get(&self.channel) {
            self.pending.extend(
                state
                    .history
                    .iter()
                    .filter(|d| d.seq >= next_seq)
                    .cloned(),
            );
        }
    }
}
