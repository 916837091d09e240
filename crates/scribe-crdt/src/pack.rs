//! Change packs: the unit exchanged between replicas and the agent.

use serde::{Deserialize, Serialize};

use crate::change::Change;
use crate::checkpoint::Checkpoint;

/// A batch of changes for one document, together with the sender's
/// checkpoint and, in the pull direction, optionally a snapshot that
/// shortcuts replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangePack {
    document_key: String,
    checkpoint: Checkpoint,
    snapshot: Option<Vec<u8>>,
    changes: Vec<Change>,
}

impl ChangePack {
    /// Create a pack.
    #[must_use]
    pub fn new(
        document_key: String,
        checkpoint: Checkpoint,
        snapshot: Option<Vec<u8>>,
        changes: Vec<Change>,
    ) -> Self {
        Self {
            document_key,
            checkpoint,
            snapshot,
            changes,
        }
    }

    /// The document this pack belongs to.
    #[must_use]
    pub fn document_key(&self) -> &str {
        &self.document_key
    }

    /// The sender's checkpoint.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Snapshot bytes, when the sender included one.
    #[must_use]
    pub fn snapshot(&self) -> Option<&[u8]> {
        self.snapshot.as_deref()
    }

    /// The changes carried by this pack.
    #[must_use]
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Whether the pack carries any changes. The agent only serializes
    /// request handling on the per-document lock when this is true.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }
}
