//! Port definitions (trait abstractions) for external collaborators.
//!
//! Ports define the interfaces the relay pipeline expects from
//! infrastructure. They contain no transport details and use only domain
//! types.
//!
//! # Design Rules
//!
//! - No HTTP, broker or backend schema types in any signature
//! - Implementations synchronize internally; callers never lock around them

pub mod generation;
pub mod publisher;

pub use generation::{FragmentStream, GenerationClient, GenerationError};
pub use publisher::{EventPublisher, PublishError};

#[cfg(test)]
pub use generation::MockGenerationClient;
#[cfg(test)]
pub use publisher::MockEventPublisher;
