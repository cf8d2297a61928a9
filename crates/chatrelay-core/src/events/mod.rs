//! Relay events delivered to channel subscribers.
//!
//! # Wire Format
//!
//! Events serialize with a `type` tag and a `message` payload, the shape
//! subscriber clients already understand:
//!
//! ```json
//! { "type": "chunk", "message": "Hel" }
//! ```
//!
//! `start` and `end` carry an empty `message`. In memory the payload only
//! exists on the variants that need it.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Discriminant of a [`RelayEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Chunk,
    End,
    Error,
}

impl EventKind {
    /// Wire name of the event type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Chunk => "chunk",
            Self::End => "end",
            Self::Error => "error",
        }
    }

    /// Whether this kind closes a session.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::End | Self::Error)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of information published to a channel.
///
/// Per session the published sequence is always a prefix of
/// `Start, Chunk*, End` or `Start, Chunk*, Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireEvent", into = "WireEvent")]
pub enum RelayEvent {
    /// Generation is about to begin.
    Start,
    /// An incremental fragment of generated text, verbatim.
    Chunk { text: String },
    /// Generation finished cleanly.
    End,
    /// Generation (or delivery, under the abort policy) failed.
    Error { description: String },
}

impl RelayEvent {
    /// Create a chunk event.
    pub fn chunk(text: impl Into<String>) -> Self {
        Self::Chunk { text: text.into() }
    }

    /// Create an error event.
    pub fn error(description: impl Into<String>) -> Self {
        Self::Error {
            description: description.into(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Start => EventKind::Start,
            Self::Chunk { .. } => EventKind::Chunk,
            Self::End => EventKind::End,
            Self::Error { .. } => EventKind::Error,
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// The payload as it appears on the wire (empty for `start`/`end`).
    #[must_use]
    pub fn payload(&self) -> &str {
        match self {
            Self::Start | Self::End => "",
            Self::Chunk { text } => text,
            Self::Error { description } => description,
        }
    }
}

/// Flat serialized form of a [`RelayEvent`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    message: String,
}

impl From<RelayEvent> for WireEvent {
    fn from(event: RelayEvent) -> Self {
        let kind = event.kind();
        let message = match event {
            RelayEvent::Start | RelayEvent::End => String::new(),
            RelayEvent::Chunk { text } => text,
            RelayEvent::Error { description } => description,
        };
        Self { kind, message }
    }
}

impl From<WireEvent> for RelayEvent {
    fn from(wire: WireEvent) -> Self {
        match wire.kind {
            EventKind::Start => Self::Start,
            EventKind::Chunk => Self::Chunk { text: wire.message },
            EventKind::End => Self::End,
            EventKind::Error => Self::Error {
                description: wire.message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_and_end_carry_empty_message() {
        assert_eq!(
            serde_json::to_value(RelayEvent::Start).unwrap(),
            json!({"type": "start", "message": ""})
        );
        assert_eq!(
            serde_json::to_value(RelayEvent::End).unwrap(),
            json!({"type": "end", "message": ""})
        );
    }

    #[test]
    fn test_chunk_and_error_wire_shape() {
        assert_eq!(
            serde_json::to_value(RelayEvent::chunk("Hel")).unwrap(),
            json!({"type": "chunk", "message": "Hel"})
        );
        assert_eq!(
            serde_json::to_value(RelayEvent::error("Error: boom")).unwrap(),
            json!({"type": "error", "message": "Error: boom"})
        );
    }

    #[test]
    fn test_deserialize_ignores_message_on_start() {
        let event: RelayEvent =
            serde_json::from_value(json!({"type": "start", "message": "ignored"})).unwrap();
        assert_eq!(event, RelayEvent::Start);

        let event: RelayEvent = serde_json::from_value(json!({"type": "end"})).unwrap();
        assert_eq!(event, RelayEvent::End);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<RelayEvent>(json!({"type": "progress"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(!RelayEvent::Start.is_terminal());
        assert!(!RelayEvent::chunk("x").is_terminal());
        assert!(RelayEvent::End.is_terminal());
        assert!(RelayEvent::error("x").is_terminal());
    }
}
