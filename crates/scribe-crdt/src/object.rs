//! Replicated object: string keys mapping to replicated elements.
//!
//! Each key holds every element ever set under it, ordered by creation
//! ticket. The top (highest ticket) entry is the key's current element;
//! shadowed entries are retained so concurrent removes targeting them stay
//! resolvable. Whether the top entry is *visible* depends on its tombstone
//! state, which lives in the element table, not here.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::clock::Ticket;

/// Key-to-elements mapping of a replicated object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Object {
    members: HashMap<String, BTreeSet<Ticket>>,
}

impl Object {
    /// Create an empty object.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an element under `key`. Concurrent sets on the same key resolve
    /// by ticket: the highest creation ticket is the key's element.
    pub fn set(&mut self, key: &str, created_at: Ticket) {
        self.members
            .entry(key.to_string())
            .or_default()
            .insert(created_at);
    }

    /// The current (highest-ticket) element under `key`, tombstoned or not.
    #[must_use]
    pub fn top(&self, key: &str) -> Option<Ticket> {
        self.members
            .get(key)
            .and_then(|queue| queue.iter().next_back())
            .copied()
    }

    /// Whether any element was ever set under `key`.
    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.members.contains_key(key)
    }

    /// Iterate `(key, top element)` pairs in arbitrary order.
    pub fn members(&self) -> impl Iterator<Item = (&str, Ticket)> {
        self.members.iter().filter_map(|(key, queue)| {
            queue
                .iter()
                .next_back()
                .map(|ticket| (key.as_str(), *ticket))
        })
    }

    /// Find the key whose queue contains the given element.
    #[must_use]
    pub fn key_of(&self, created_at: Ticket) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, queue)| queue.contains(&created_at))
            .map(|(key, _)| key.as_str())
    }
}
