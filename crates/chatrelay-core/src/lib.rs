//! Core of the chat relay.
//!
//! Domain types (channel ids, relay events, sessions), the collaborator
//! ports the relay depends on, and the services that drive a session from
//! prompt to terminal event. Transport adapters live in sibling crates.

pub mod domain;
pub mod events;
pub mod ports;
pub mod services;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use domain::{
    CHANNEL_PREFIX, ChannelId, ChannelIdError, Session, SessionOutcome, SessionPhase, StreamStats,
};
pub use events::{EventKind, RelayEvent};
pub use ports::{EventPublisher, FragmentStream, GenerationClient, GenerationError, PublishError};
pub use services::{
    ChunkFaultPolicy, RelayConfig, RelayPipeline, SessionHandle, SessionSupervisor,
    ShutdownReport, SupervisorError,
};
