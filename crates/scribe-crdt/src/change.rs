//! Changes: atomic batches of operations.

use serde::{Deserialize, Serialize};

use crate::clock::{ActorId, Ticket};
use crate::error::CrdtError;
use crate::operation::Operation;
use crate::root::Root;

/// Identity of a change: the author's per-client sequence number, the
/// change's Lamport time and the author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeId {
    client_seq: u32,
    lamport: u64,
    actor: ActorId,
}

impl ChangeId {
    /// Create a change id.
    #[must_use]
    pub fn new(client_seq: u32, lamport: u64, actor: ActorId) -> Self {
        Self {
            client_seq,
            lamport,
            actor,
        }
    }

    /// The id state of a replica that has produced no changes yet.
    #[must_use]
    pub fn initial(actor: ActorId) -> Self {
        Self::new(0, 0, actor)
    }

    /// Per-client sequence number.
    #[must_use]
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// Lamport time.
    #[must_use]
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// Author.
    #[must_use]
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Id for the next locally authored change.
    #[must_use]
    pub fn next(&self) -> Self {
        Self::new(self.client_seq + 1, self.lamport + 1, self.actor)
    }

    /// Drive the local clock past a remote change:
    /// `lamport = max(local, remote) + 1`.
    #[must_use]
    pub fn sync_lamport(&self, remote_lamport: u64) -> Self {
        Self::new(
            self.client_seq,
            self.lamport.max(remote_lamport) + 1,
            self.actor,
        )
    }

    /// Rebind the id to another actor. Used when a detached replica learns
    /// its server-assigned identity.
    #[must_use]
    pub fn with_actor(&self, actor: ActorId) -> Self {
        Self::new(self.client_seq, self.lamport, actor)
    }
}

/// An atomic list of operations authored by one replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    id: ChangeId,
    message: Option<String>,
    operations: Vec<Operation>,
    /// Assigned by the agent when the change is persisted.
    server_seq: Option<u64>,
}

impl Change {
    /// Create a change.
    #[must_use]
    pub fn new(id: ChangeId, message: Option<String>, operations: Vec<Operation>) -> Self {
        Self {
            id,
            message,
            operations,
            server_seq: None,
        }
    }

    /// Change identity.
    #[must_use]
    pub fn id(&self) -> ChangeId {
        self.id
    }

    /// Optional human-readable description.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Operations in execution order.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Server-assigned sequence, once persisted.
    #[must_use]
    pub fn server_seq(&self) -> Option<u64> {
        self.server_seq
    }

    /// Record the server-assigned sequence.
    pub fn set_server_seq(&mut self, server_seq: u64) {
        self.server_seq = Some(server_seq);
    }

    /// Execute all operations against a root, in order.
    pub fn execute(&self, root: &mut Root) -> Result<(), CrdtError> {
        for operation in &self.operations {
            operation.execute(root)?;
        }
        Ok(())
    }
}

/// Records operations and issues tickets while a local mutation runs.
///
/// Tickets share the change's Lamport time; the delimiter distinguishes
/// operations within the change and is what makes every issued ticket unique.
#[derive(Debug)]
pub struct ChangeContext {
    id: ChangeId,
    message: Option<String>,
    operations: Vec<Operation>,
    delimiter: u32,
}

impl ChangeContext {
    /// Start recording a change with the given identity.
    #[must_use]
    pub fn new(id: ChangeId, message: Option<String>) -> Self {
        Self {
            id,
            message,
            operations: Vec::new(),
            delimiter: 0,
        }
    }

    /// Issue the next ticket within this change.
    pub fn issue_ticket(&mut self) -> Ticket {
        self.delimiter += 1;
        Ticket::new(self.id.lamport(), self.delimiter, self.id.actor())
    }

    /// Record an operation.
    pub fn push(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    /// Whether any operation was recorded.
    #[must_use]
    pub fn has_operations(&self) -> bool {
        !self.operations.is_empty()
    }

    /// Materialize the recorded operations into a change. Returns `None`
    /// when nothing was recorded.
    #[must_use]
    pub fn into_change(self) -> Option<Change> {
        if self.operations.is_empty() {
            return None;
        }
        Some(Change::new(self.id, self.message, self.operations))
    }
}
