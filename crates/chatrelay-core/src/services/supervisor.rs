//! Session supervisor.
//!
//! Launches one tracked task per relay session and drains them on shutdown.
//!
//! Key design decisions:
//! - **Allocate-then-spawn**: the channel id exists before the task does, so
//!   the caller can answer its HTTP request without waiting on generation
//! - **Tracked tasks**: sessions live in a `TaskTracker`, never detached
//! - **Derived cancellation**: each session gets a child of the process
//!   shutdown token
//! - **Bounded drain**: `shutdown()` waits at most the given grace period

use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::domain::{ChannelId, Session, SessionOutcome};
use crate::services::relay::RelayPipeline;

/// Error from supervisor operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    /// Shutdown has begun; no new sessions are accepted.
    #[error("relay is shutting down")]
    ShuttingDown,
}

/// Handle to a launched session.
///
/// Dropping it does not stop the session; the supervisor keeps tracking it.
#[derive(Debug)]
pub struct SessionHandle {
    channel_id: ChannelId,
    task: JoinHandle<SessionOutcome>,
}

impl SessionHandle {
    #[must_use]
    pub const fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Wait for the session to finish.
    pub async fn outcome(self) -> Result<SessionOutcome, JoinError> {
        self.task.await
    }
}

/// Result of a bounded drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// All sessions finished within the grace period.
    pub drained: bool,
    /// Sessions still running when the grace period ran out.
    pub abandoned: usize,
}

/// Owns every in-flight relay session.
#[derive(Debug)]
pub struct SessionSupervisor {
    pipeline: RelayPipeline,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    /// Create a supervisor whose sessions are cancelled with `shutdown`.
    pub fn new(pipeline: RelayPipeline, shutdown: CancellationToken) -> Self {
        Self {
            pipeline,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    /// Allocate a channel and start relaying `prompt` to it.
    ///
    /// Returns as soon as the task is spawned. Must be called from within a
    /// tokio runtime.
    pub fn launch(&self, prompt: impl Into<String>) -> Result<SessionHandle, SupervisorError> {
        if self.shutdown.is_cancelled() {
            return Err(SupervisorError::ShuttingDown);
        }

        let session = Session::new(prompt);
        let channel_id = session.channel_id().clone();
        let pipeline = self.pipeline.clone();
        let cancel = self.shutdown.child_token();
        let task_channel = channel_id.clone();

        let task = self.tracker.spawn(async move {
            let outcome = pipeline.run(session, cancel).await;
            let stats = outcome.stats();
            info!(
                channel_id = %task_channel,
                outcome = outcome.label(),
                published = stats.published,
                dropped = stats.dropped,
                "Relay session finished"
            );
            outcome
        });

        info!(channel_id = %channel_id, "Relay session launched");
        Ok(SessionHandle { channel_id, task })
    }

    /// Number of sessions currently running.
    #[must_use]
    pub fn active_sessions(&self) -> usize {
        self.tracker.len()
    }

    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Cancel every session and wait up to `grace` for them to stop.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownReport {
        self.shutdown.cancel();
        self.tracker.close();

        let active = self.tracker.len();
        if active > 0 {
            info!(active, grace_ms = grace.as_millis(), "Draining relay sessions");
        }

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            ShutdownReport {
                drained: true,
                abandoned: 0,
            }
        } else {
            let abandoned = self.tracker.len();
            warn!(abandoned, "Relay sessions did not stop within the grace period");
            ShutdownReport {
                drained: false,
                abandoned,
            }
        }
    }
}
