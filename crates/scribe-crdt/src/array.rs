//! Replicated array: a positionally ordered list of element references.
//!
//! Arrays reuse the RGA-split core with one-element runs, so the ordering,
//! tombstoning and concurrent-insert tie-break all behave exactly like text.
//! Runs never split because every run has length one. The referenced
//! elements themselves live in the document's element table.

use serde::{Deserialize, Serialize};

use crate::clock::Ticket;
use crate::error::CrdtError;
use crate::rga::{RgaNodeId, RgaTreeSplit, RgaValue};

/// A single-element run referencing an element by its creation ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementRef(Ticket);

impl ElementRef {
    /// The referenced element's creation ticket.
    #[must_use]
    pub fn element(&self) -> Ticket {
        self.0
    }
}

impl Default for ElementRef {
    fn default() -> Self {
        Self(Ticket::initial())
    }
}

impl std::fmt::Display for ElementRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl RgaValue for ElementRef {
    fn content_len(&self) -> usize {
        1
    }

    fn split_at(&mut self, _offset: usize) -> Self {
        // Single-element runs expose no interior offsets.
        unreachable!("element references never split")
    }
}

/// Replicated array state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Array {
    list: RgaTreeSplit<ElementRef>,
}

impl Array {
    /// Create an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self {
            list: RgaTreeSplit::new(),
        }
    }

    /// Number of visible entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Whether there are no visible entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Creation ticket of the last visible entry, or the initial ticket when
    /// the array is empty. New local appends anchor here.
    #[must_use]
    pub fn last_created(&self) -> Ticket {
        self.list
            .nodes()
            .filter(|n| !n.is_removed())
            .last()
            .map_or_else(Ticket::initial, |n| n.created_at())
    }

    /// Insert the element created at `executed_at` after the entry created at
    /// `prev_created` (the initial ticket anchors at the front).
    pub fn add(
        &mut self,
        prev_created: Ticket,
        element: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        if self.list.find_node(&RgaNodeId::new(element, 0)).is_some() {
            // Replayed insert.
            return Ok(());
        }
        self.list.insert_after_created(
            prev_created,
            RgaNodeId::new(element, 0),
            ElementRef(element),
            executed_at,
        )?;
        Ok(())
    }

    /// Relocate the entry for `element` to just after `prev_created`.
    pub fn move_after(
        &mut self,
        prev_created: Ticket,
        element: Ticket,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        let target = self
            .list
            .find_node(&RgaNodeId::new(element, 0))
            .ok_or(CrdtError::ElementNotFound(element))?;
        self.list.move_after_created(prev_created, target, executed_at)
    }

    /// Tombstone the entry for `element`. Returns whether the entry changed.
    pub fn remove(&mut self, element: Ticket, executed_at: Ticket) -> Result<bool, CrdtError> {
        let target = self
            .list
            .find_node(&RgaNodeId::new(element, 0))
            .ok_or(CrdtError::ElementNotFound(element))?;
        Ok(self.list.remove_node(target, executed_at))
    }

    /// The element at a visible index.
    #[must_use]
    pub fn get(&mut self, index: usize) -> Option<Ticket> {
        if index >= self.len() {
            return None;
        }
        let pos = self.list.find_pos(index);
        Some(pos.id().created_at())
    }

    /// Visible element tickets in order.
    pub fn elements(&self) -> impl Iterator<Item = Ticket> + '_ {
        self.list.visible_values().map(ElementRef::element)
    }

    /// Whether the array holds an entry (visible or tombstoned) for the
    /// element.
    #[must_use]
    pub fn contains(&self, element: Ticket) -> bool {
        self.list.find_node(&RgaNodeId::new(element, 0)).is_some()
    }

    /// Rebuild run lookups after deserialization.
    pub fn rebuild_index(&mut self) {
        self.list.rebuild_index();
    }
}

impl Default for Array {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ActorId, ACTOR_ID_LEN};

    fn ticket(lamport: u64, actor_byte: u8) -> Ticket {
        Ticket::new(lamport, 0, ActorId::from_bytes([actor_byte; ACTOR_ID_LEN]))
    }

    fn collect(array: &Array) -> Vec<Ticket> {
        array.elements().collect()
    }

    #[test]
    fn test_append_preserves_order() {
        let mut array = Array::new();
        let t1 = ticket(1, 1);
        let t2 = ticket(2, 1);
        array.add(Ticket::initial(), t1, t1).unwrap();
        array.add(t1, t2, t2).unwrap();

        assert_eq!(collect(&array), vec![t1, t2]);
        assert_eq!(array.len(), 2);
    }

    #[test]
    fn test_concurrent_adds_at_same_anchor() {
        // Two actors append after the same anchor; the higher ticket lands
        // leftmost regardless of arrival order.
        let t1 = ticket(1, 1);
        let t2 = ticket(1, 2);

        let mut forward = Array::new();
        forward.add(Ticket::initial(), t1, t1).unwrap();
        forward.add(Ticket::initial(), t2, t2).unwrap();

        let mut reverse = Array::new();
        reverse.add(Ticket::initial(), t2, t2).unwrap();
        reverse.add(Ticket::initial(), t1, t1).unwrap();

        assert_eq!(collect(&forward), vec![t2, t1]);
        assert_eq!(collect(&forward), collect(&reverse));
    }

    #[test]
    fn test_remove_tombstones_entry() {
        let mut array = Array::new();
        let t1 = ticket(1, 1);
        let t2 = ticket(2, 1);
        array.add(Ticket::initial(), t1, t1).unwrap();
        array.add(t1, t2, t2).unwrap();

        assert!(array.remove(t1, ticket(3, 1)).unwrap());
        assert_eq!(collect(&array), vec![t2]);
        // The entry is retained for merge resolution.
        assert!(array.contains(t1));

        // A stale concurrent remove cannot rewind the tombstone.
        assert!(!array.remove(t1, ticket(2, 2)).unwrap());
    }

    #[test]
    fn test_replayed_add_is_a_no_op() {
        let mut array = Array::new();
        let t1 = ticket(1, 1);
        array.add(Ticket::initial(), t1, t1).unwrap();
        array.add(Ticket::initial(), t1, t1).unwrap();
        assert_eq!(array.len(), 1);
    }

    #[test]
    fn test_move_after() {
        let mut array = Array::new();
        let t1 = ticket(1, 1);
        let t2 = ticket(2, 1);
        let t3 = ticket(3, 1);
        array.add(Ticket::initial(), t1, t1).unwrap();
        array.add(t1, t2, t2).unwrap();
        array.add(t2, t3, t3).unwrap();

        array.move_after(Ticket::initial(), t3, ticket(4, 1)).unwrap();
        assert_eq!(collect(&array), vec![t3, t1, t2]);
    }

    #[test]
    fn test_get_by_index_skips_tombstones() {
        let mut array = Array::new();
        let t1 = ticket(1, 1);
        let t2 = ticket(2, 1);
        array.add(Ticket::initial(), t1, t1).unwrap();
        array.add(t1, t2, t2).unwrap();
        array.remove(t1, ticket(3, 1)).unwrap();

        assert_eq!(array.get(0), Some(t2));
        assert_eq!(array.get(1), None);
    }
}
