//! Checkpoints: a client's cursor into a document's change log.

use serde::{Deserialize, Serialize};

/// `(server_seq, client_seq)`: the last server-assigned sequence this client
/// has observed and the last locally authored change the server acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    server_seq: u64,
    client_seq: u32,
}

impl Checkpoint {
    /// Create a checkpoint.
    #[must_use]
    pub fn new(server_seq: u64, client_seq: u32) -> Self {
        Self {
            server_seq,
            client_seq,
        }
    }

    /// The zero checkpoint of a freshly attached client.
    #[must_use]
    pub fn initial() -> Self {
        Self::default()
    }

    /// Last observed server sequence.
    #[must_use]
    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// Last acknowledged client sequence.
    #[must_use]
    pub fn client_seq(&self) -> u32 {
        self.client_seq
    }

    /// Component-wise maximum; checkpoints only move forward.
    #[must_use]
    pub fn forward(&self, other: &Checkpoint) -> Self {
        Self::new(
            self.server_seq.max(other.server_seq),
            self.client_seq.max(other.client_seq),
        )
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(s{}, c{})", self.server_seq, self.client_seq)
    }
}
