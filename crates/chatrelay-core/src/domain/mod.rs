//! Core domain types.
//!
//! These types represent the pure domain model, independent of any
//! transport concerns (HTTP, pub/sub, generation backend).
//!
//! # Structure
//!
//! - `channel` - Channel identity allocation and parsing
//! - `session` - Session, phase and outcome types

pub mod channel;
pub mod session;

pub use channel::{CHANNEL_PREFIX, ChannelId, ChannelIdError, MAX_CHANNEL_ID_LEN};
pub use session::{Session, SessionOutcome, SessionPhase, StreamStats};
