//! The relay pipeline.
//!
//! Drives one session from prompt to terminal event:
//!
//! 1. **Starting** - publish `start`. If that fails the session is abandoned
//!    before any generation request is made.
//! 2. **Streaming** - open the generation stream and republish every
//!    fragment as a `chunk`, in receipt order.
//! 3. **Terminating** - publish `end` on clean exhaustion, or `error` as soon
//!    as the stream (or, under [`ChunkFaultPolicy::Abort`], delivery) fails.
//!
//! Publication is awaited before the next read, so a session never has two
//! publishes in flight and per-channel order follows from the loop itself.
//! Every await point also watches the shutdown token; a cancelled session
//! stops where it is and publishes nothing further.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info_span, trace, warn};

use crate::domain::{ChannelId, Session, SessionOutcome, SessionPhase, StreamStats};
use crate::events::RelayEvent;
use crate::ports::{EventPublisher, GenerationClient, PublishError};

/// What to do when a `chunk` publish is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkFaultPolicy {
    /// Log the fault, drop that chunk and keep draining the stream.
    BestEffort,
    /// Stop reading and close the session with an `error` event.
    #[default]
    Abort,
}

impl fmt::Display for ChunkFaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BestEffort => write!(f, "best_effort"),
            Self::Abort => write!(f, "abort"),
        }
    }
}

impl FromStr for ChunkFaultPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(Self::BestEffort),
            "abort" => Ok(Self::Abort),
            other => Err(format!(
                "unknown chunk fault policy '{other}' (expected 'best_effort' or 'abort')"
            )),
        }
    }
}

/// Pipeline tuning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayConfig {
    pub chunk_fault_policy: ChunkFaultPolicy,
}

/// Relays generation output for one session at a time.
///
/// Cheap to clone; all clones share the same collaborators.
#[derive(Clone)]
pub struct RelayPipeline {
    publisher: Arc<dyn EventPublisher>,
    generator: Arc<dyn GenerationClient>,
    config: RelayConfig,
}

impl fmt::Debug for RelayPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayPipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RelayPipeline {
    pub fn new(
        publisher: Arc<dyn EventPublisher>,
        generator: Arc<dyn GenerationClient>,
        config: RelayConfig,
    ) -> Self {
        Self {
            publisher,
            generator,
            config,
        }
    }

    /// Run one session to completion (or until `cancel` fires).
    pub async fn run(&self, session: Session, cancel: CancellationToken) -> SessionOutcome {
        let span = info_span!("relay_session", channel_id = %session.channel_id());
        self.drive(&session, &cancel).instrument(span).await
    }

    async fn drive(&self, session: &Session, cancel: &CancellationToken) -> SessionOutcome {
        let channel = session.channel_id();

        match self.publish(channel, &RelayEvent::Start, cancel).await {
            None => {
                return SessionOutcome::Cancelled {
                    phase: SessionPhase::Starting,
                    stats: StreamStats::default(),
                };
            }
            Some(Err(e)) => {
                warn!(error = %e, "Failed to publish start event, abandoning session");
                return SessionOutcome::Aborted {
                    reason: e.to_string(),
                };
            }
            Some(Ok(())) => debug!("Session started"),
        }

        let mut stats = StreamStats::default();

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                return SessionOutcome::Cancelled { phase: SessionPhase::Streaming, stats };
            }
            opened = self.generator.stream(session.prompt()) => opened,
        };

        let mut fragments = match opened {
            Ok(fragments) => fragments,
            Err(e) => {
                warn!(error = %e, "Generation stream could not be opened");
                return self.fail(channel, stats, e.to_string(), cancel).await;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    return SessionOutcome::Cancelled { phase: SessionPhase::Streaming, stats };
                }
                next = fragments.next() => next,
            };

            let fragment = match next {
                None => break,
                Some(Ok(fragment)) => fragment,
                Some(Err(e)) => {
                    warn!(error = %e, published = stats.published, "Generation stream failed");
                    drop(fragments);
                    return self.fail(channel, stats, e.to_string(), cancel).await;
                }
            };

            // chunk payloads are never empty
            if fragment.is_empty() {
                continue;
            }

            trace!(len = fragment.len(), "Relaying fragment");
            match self.publish(channel, &RelayEvent::chunk(fragment), cancel).await {
                None => {
                    return SessionOutcome::Cancelled {
                        phase: SessionPhase::Streaming,
                        stats,
                    };
                }
                Some(Ok(())) => stats.published += 1,
                Some(Err(e)) => match self.config.chunk_fault_policy {
                    ChunkFaultPolicy::BestEffort => {
                        stats.dropped += 1;
                        warn!(error = %e, dropped = stats.dropped, "Failed to publish chunk, continuing");
                    }
                    ChunkFaultPolicy::Abort => {
                        warn!(error = %e, "Failed to publish chunk, aborting session");
                        drop(fragments);
                        let reason = format!("failed to deliver generated text: {e}");
                        return self.fail(channel, stats, reason, cancel).await;
                    }
                },
            }
        }
        drop(fragments);

        match self.publish(channel, &RelayEvent::End, cancel).await {
            None => SessionOutcome::Cancelled {
                phase: SessionPhase::Terminating,
                stats,
            },
            Some(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Failed to publish end event");
                }
                SessionOutcome::Completed {
                    stats,
                    terminal_delivered: result.is_ok(),
                }
            }
        }
    }

    /// Publish the terminal `error` event. No retry on failure.
    async fn fail(
        &self,
        channel: &ChannelId,
        stats: StreamStats,
        reason: String,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let event = RelayEvent::error(reason.clone());
        match self.publish(channel, &event, cancel).await {
            None => SessionOutcome::Cancelled {
                phase: SessionPhase::Terminating,
                stats,
            },
            Some(result) => {
                if let Err(e) = &result {
                    warn!(error = %e, "Failed to publish error event");
                }
                SessionOutcome::Failed {
                    stats,
                    reason,
                    terminal_delivered: result.is_ok(),
                }
            }
        }
    }

    /// Publish unless shutdown wins the race. `None` means cancelled.
    async fn publish(
        &self,
        channel: &ChannelId,
        event: &RelayEvent,
        cancel: &CancellationToken,
    ) -> Option<Result<(), PublishError>> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.publisher.publish(channel, event) => Some(result),
        }
    }
}
