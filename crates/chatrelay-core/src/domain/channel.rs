//! Channel identity allocation.
//!
//! Every relay session publishes to its own channel. The identifier is the
//! only addressing key subscribers have, so it must be unguessable enough
//! that unrelated clients never collide.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Namespace prefix applied to every allocated channel identifier.
pub const CHANNEL_PREFIX: &str = "chat:";

/// Upper bound on the length of a channel identifier accepted from clients.
pub const MAX_CHANNEL_ID_LEN: usize = 128;

/// Opaque identifier of a relay channel.
///
/// Allocated identifiers look like `chat:5f0c4b5e-...`. Identifiers coming
/// back from subscribers are parsed with [`ChannelId::from_str`], which only
/// checks that the value is a plausible key; unknown channels are handled by
/// the pub/sub side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Allocate a fresh, collision-resistant channel identifier.
    ///
    /// Backed by a random (v4) UUID. Performs no I/O and cannot fail.
    #[must_use]
    pub fn allocate() -> Self {
        Self(format!("{CHANNEL_PREFIX}{}", Uuid::new_v4()))
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ChannelId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Reasons a client-supplied channel identifier is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelIdError {
    #[error("channel id is empty")]
    Empty,

    #[error("channel id exceeds {MAX_CHANNEL_ID_LEN} bytes")]
    TooLong,

    #[error("channel id contains invalid character {0:?}")]
    InvalidChar(char),
}

impl FromStr for ChannelId {
    type Err = ChannelIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ChannelIdError::Empty);
        }
        if s.len() > MAX_CHANNEL_ID_LEN {
            return Err(ChannelIdError::TooLong);
        }
        if let Some(bad) = s
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')))
        {
            return Err(ChannelIdError::InvalidChar(bad));
        }
        Ok(Self(s.to_string()))
    }
}
