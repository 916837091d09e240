//! The document replica.
//!
//! A replica owns a root, a change id tracking the local clock, the
//! checkpoint against the agent and the locally authored changes not yet
//! acknowledged. Mutations run inside [`Document::update`] against a trial
//! copy of the root, so a failed closure leaves the replica untouched.

use serde::{Deserialize, Serialize};

use crate::builder::ObjectScope;
use crate::change::{Change, ChangeContext, ChangeId};
use crate::checkpoint::Checkpoint;
use crate::clock::ActorId;
use crate::error::CrdtError;
use crate::pack::ChangePack;
use crate::root::Root;

/// Whether the document is attached at the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Detached,
    Attached,
}

/// A replicated document.
#[derive(Debug, Clone)]
pub struct Document {
    key: String,
    status: DocumentStatus,
    actor: ActorId,
    root: Root,
    change_id: ChangeId,
    checkpoint: Checkpoint,
    local_changes: Vec<Change>,
}

impl Document {
    /// Create a detached, empty document.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            status: DocumentStatus::Detached,
            actor: ActorId::INITIAL,
            root: Root::new(),
            change_id: ChangeId::initial(ActorId::INITIAL),
            checkpoint: Checkpoint::initial(),
            local_changes: Vec::new(),
        }
    }

    /// Document key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The actor editing through this replica.
    #[must_use]
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Bind the replica to its (server-assigned) actor identity.
    pub fn set_actor(&mut self, actor: ActorId) {
        self.actor = actor;
        self.change_id = self.change_id.with_actor(actor);
    }

    /// Attachment status at the agent.
    #[must_use]
    pub fn status(&self) -> DocumentStatus {
        self.status
    }

    /// Record the attachment status.
    pub fn set_status(&mut self, status: DocumentStatus) {
        self.status = status;
    }

    /// Whether the document is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.status == DocumentStatus::Attached
    }

    /// Current checkpoint against the agent.
    #[must_use]
    pub fn checkpoint(&self) -> Checkpoint {
        self.checkpoint
    }

    /// Whether locally authored changes await acknowledgment.
    #[must_use]
    pub fn has_local_changes(&self) -> bool {
        !self.local_changes.is_empty()
    }

    /// Run a mutation closure. Operations are recorded into a single change;
    /// an error from the closure discards everything, including partial
    /// mutations.
    pub fn update<F>(&mut self, updater: F, message: Option<&str>) -> Result<(), CrdtError>
    where
        F: FnOnce(&mut ObjectScope<'_>) -> Result<(), CrdtError>,
    {
        let mut ctx = ChangeContext::new(self.change_id.next(), message.map(String::from));
        let mut trial = self.root.clone();
        {
            let mut scope = ObjectScope::new(&mut trial, &mut ctx, self.root.created());
            updater(&mut scope)?;
        }

        if let Some(change) = ctx.into_change() {
            self.root = trial;
            self.change_id = change.id();
            self.local_changes.push(change);
        }
        Ok(())
    }

    /// JSON projection of the visible document state.
    #[must_use]
    pub fn marshal(&self) -> serde_json::Value {
        self.root.marshal()
    }

    /// Pack the unacknowledged local changes for a push.
    #[must_use]
    pub fn create_change_pack(&self) -> ChangePack {
        ChangePack::new(
            self.key.clone(),
            self.checkpoint,
            None,
            self.local_changes.clone(),
        )
    }

    /// Apply a pulled pack: optional snapshot, then remote changes in order,
    /// then checkpoint accounting. Changes authored by this replica are
    /// skipped (they are already applied) but still advance the clock.
    ///
    /// A snapshot replaces the root wholesale, so the un-acked local changes
    /// are replayed onto it: the agent's snapshot and its own-excluded tail
    /// may both predate them. Replay is idempotent for changes the snapshot
    /// already contains.
    pub fn apply_change_pack(&mut self, pack: &ChangePack) -> Result<(), CrdtError> {
        if let Some(bytes) = pack.snapshot() {
            let mut root = decode_root(bytes)?;
            for change in &self.local_changes {
                change.execute(&mut root)?;
            }
            self.root = root;
        }

        for change in pack.changes() {
            if change.id().actor() != self.actor {
                change.execute(&mut self.root)?;
            }
            self.change_id = self.change_id.sync_lamport(change.id().lamport());
        }

        self.checkpoint = self.checkpoint.forward(&pack.checkpoint());
        let acked = self.checkpoint.client_seq();
        self.local_changes
            .retain(|change| change.id().client_seq() > acked);
        Ok(())
    }

    /// Serialize the full root state.
    pub fn create_snapshot(&self) -> Result<Vec<u8>, CrdtError> {
        serde_json::to_vec(&self.root).map_err(|e| CrdtError::SnapshotEncode(e.to_string()))
    }

    /// Replace the root with a snapshot's state.
    pub fn load_snapshot(&mut self, bytes: &[u8]) -> Result<(), CrdtError> {
        self.root = decode_root(bytes)?;
        Ok(())
    }

    /// Deep-copy the replica, rebuilding text elements run by run.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut copy = self.clone();
        copy.root = self.root.deep_copy();
        copy
    }
}

/// Replay a sequence of changes onto an optional snapshot base. This is how
/// the agent reconstructs document state for snapshotting.
pub fn replay_changes(
    snapshot: Option<&[u8]>,
    changes: &[Change],
) -> Result<Root, CrdtError> {
    let mut root = match snapshot {
        Some(bytes) => decode_root(bytes)?,
        None => Root::new(),
    };
    for change in changes {
        change.execute(&mut root)?;
    }
    Ok(root)
}

/// Serialize a root for storage.
pub fn encode_root(root: &Root) -> Result<Vec<u8>, CrdtError> {
    serde_json::to_vec(root).map_err(|e| CrdtError::SnapshotEncode(e.to_string()))
}

fn decode_root(bytes: &[u8]) -> Result<Root, CrdtError> {
    let mut root: Root =
        serde_json::from_slice(bytes).map_err(|e| CrdtError::SnapshotDecode(e.to_string()))?;
    root.rebuild_indexes();
    Ok(root)
}
