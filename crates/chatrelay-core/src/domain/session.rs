//! Relay session types.
//!
//! A session is never persisted. It exists as the local state of one
//! pipeline task and is gone once the terminal event has been published.

use std::fmt;

use super::channel::ChannelId;

/// One prompt being relayed to one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    channel_id: ChannelId,
    prompt: String,
}

impl Session {
    /// Start a session on a freshly allocated channel.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::with_channel(ChannelId::allocate(), prompt)
    }

    /// Build a session for an already allocated channel.
    pub fn with_channel(channel_id: ChannelId, prompt: impl Into<String>) -> Self {
        Self {
            channel_id,
            prompt: prompt.into(),
        }
    }

    #[must_use]
    pub const fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }
}

/// Pipeline state, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Starting,
    Streaming,
    Terminating,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Terminating => write!(f, "terminating"),
        }
    }
}

/// Counters accumulated while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Chunks accepted by the publisher.
    pub published: usize,
    /// Chunks the publisher rejected (best-effort policy only).
    pub dropped: usize,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Stream exhausted; `end` was attempted.
    Completed {
        stats: StreamStats,
        /// False when the `end` publish itself failed.
        terminal_delivered: bool,
    },
    /// Generation or delivery failed; `error` was attempted.
    Failed {
        stats: StreamStats,
        reason: String,
        /// False when the `error` publish itself failed.
        terminal_delivered: bool,
    },
    /// The `start` publish failed; generation was never attempted.
    Aborted { reason: String },
    /// Process shutdown interrupted the session in the given phase.
    Cancelled { phase: SessionPhase, stats: StreamStats },
}

impl SessionOutcome {
    /// Short label for structured logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Failed { .. } => "failed",
            Self::Aborted { .. } => "aborted",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Streaming counters, zeroed for sessions that never streamed.
    #[must_use]
    pub const fn stats(&self) -> StreamStats {
        match self {
            Self::Completed { stats, .. }
            | Self::Failed { stats, .. }
            | Self::Cancelled { stats, .. } => *stats,
            Self::Aborted { .. } => StreamStats {
                published: 0,
                dropped: 0,
            },
        }
    }
}
