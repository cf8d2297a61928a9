//! Generation stream port.
//!
//! A generation client turns one prompt into a lazy, finite stream of text
//! fragments. The stream is consumed once; a session never restarts it.
//! Fragment boundaries are whatever the backend produced: adapters must not
//! buffer or merge fragments, because subscribers see each one as a chunk.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

/// Lazy sequence of fragments. Ends on exhaustion; an `Err` item ends it
/// with a failure.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

/// Failures surfaced by a generation backend.
///
/// The `Display` rendering is what subscribers see in the `error` event, so
/// messages are phrased for humans.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    /// The request could not be sent (connect, TLS, timeout).
    #[error("failed to reach generation backend: {0}")]
    Connect(String),

    /// The backend answered with a non-success status.
    #[error("generation backend returned {status}: {body}")]
    Upstream { status: u16, body: String },

    /// The response body broke off mid-stream.
    #[error("generation stream interrupted: {0}")]
    Interrupted(String),

    /// A stream event could not be decoded.
    #[error("malformed generation stream: {0}")]
    Decode(String),

    /// The backend reported an error inside the stream.
    #[error("generation backend error: {0}")]
    Backend(String),
}

/// Port for streaming text generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Issue one generation request for `prompt`.
    ///
    /// Failing here is equivalent to the stream failing on its first read.
    async fn stream(&self, prompt: &str) -> Result<FragmentStream, GenerationError>;
}
