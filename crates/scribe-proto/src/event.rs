//! Document events delivered to watch streams.

use scribe_crdt::ActorId;
use serde::{Deserialize, Serialize};

/// What happened to a watched document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocEventKind {
    /// A client pushed changes to the document.
    DocumentChanged,
    /// A client started watching the document.
    DocumentsWatched,
    /// A client stopped watching the document.
    DocumentsUnwatched,
}

impl DocEventKind {
    /// Static code for metrics labeling.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::DocumentChanged => "document_changed",
            Self::DocumentsWatched => "documents_watched",
            Self::DocumentsUnwatched => "documents_unwatched",
        }
    }
}

/// An event on a per-document topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocEvent {
    /// Event kind.
    pub kind: DocEventKind,
    /// The document the event belongs to.
    pub document_key: String,
    /// The client that caused the event. Subscribers never receive their own
    /// events.
    pub publisher: ActorId,
}

impl DocEvent {
    /// Create an event.
    #[must_use]
    pub fn new(kind: DocEventKind, document_key: impl Into<String>, publisher: ActorId) -> Self {
        Self {
            kind,
            document_key: document_key.into(),
            publisher,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_crdt::ACTOR_ID_LEN;

    #[test]
    fn test_event_round_trip() {
        let event = DocEvent::new(
            DocEventKind::DocumentChanged,
            "doc-1",
            ActorId::from_bytes([3; ACTOR_ID_LEN]),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: DocEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert_eq!(event.kind.code(), "document_changed");
    }
}
