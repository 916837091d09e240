//! RGA-split list: an ordered sequence CRDT with run splitting.
//!
//! The list holds runs of content (character runs for text, single element
//! references for arrays) in two structures that share one arena:
//!
//! - a doubly linked list giving the logical merge order, and
//! - a splay tree indexed by visible length for positional lookup.
//!
//! Runs are identified by `(creation ticket, split offset)`. Editing the
//! middle of a run splits it; the right part keeps the creation ticket with
//! the offset advanced, so positions recorded before the split still resolve.
//! Removed runs are tombstoned in place (weight zero) and physically retained
//! so concurrent edits anchored on them keep working.
//!
//! Concurrent inserts at the same anchor are ordered by the RGA tie-break:
//! while the successor's creation ticket is greater than the inserting
//! ticket, the anchor slides right, so the higher ticket ends up leftmost.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::clock::{ActorId, Ticket};
use crate::error::CrdtError;
use crate::splay::{NodeIdx, SplayTree, Weighted};

/// Content stored in a run.
pub trait RgaValue: Clone {
    /// Visible length of the run in position units (code points for text,
    /// 1 for element references).
    fn content_len(&self) -> usize;

    /// Truncate the run to `[..offset)` and return the `[offset..)` part.
    /// Callers guarantee `0 < offset < content_len()`.
    fn split_at(&mut self, offset: usize) -> Self;
}

/// Identity of a run: the creation ticket plus the split offset within the
/// originally inserted content.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RgaNodeId {
    created_at: Ticket,
    offset: u32,
}

impl RgaNodeId {
    /// Create a run id.
    #[must_use]
    pub fn new(created_at: Ticket, offset: u32) -> Self {
        Self { created_at, offset }
    }

    /// The creation ticket shared by all splits of the original run.
    #[must_use]
    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    /// Split offset within the originally inserted run.
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    fn advanced(&self, by: u32) -> Self {
        Self::new(self.created_at, self.offset + by)
    }
}

/// A logical position inside the list: a run id plus an offset relative to
/// that run's start. A relative offset of zero addresses the boundary just
/// before the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RgaPos {
    id: RgaNodeId,
    relative_offset: u32,
}

impl RgaPos {
    /// Create a position from a run id and relative offset.
    #[must_use]
    pub fn new(id: RgaNodeId, relative_offset: u32) -> Self {
        Self {
            id,
            relative_offset,
        }
    }

    /// The run id this position is anchored on.
    #[must_use]
    pub fn id(&self) -> RgaNodeId {
        self.id
    }

    /// Offset relative to the anchored run's start.
    #[must_use]
    pub fn relative_offset(&self) -> u32 {
        self.relative_offset
    }

    /// Absolute id within the original run, stable across later splits.
    #[must_use]
    pub fn absolute_id(&self) -> RgaNodeId {
        self.id.advanced(self.relative_offset)
    }
}

/// One run of the list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgaNode<V> {
    id: RgaNodeId,
    value: V,
    removed_at: Option<Ticket>,
    prev: Option<NodeIdx>,
    next: Option<NodeIdx>,
    /// Run immediately left of this one when it was inserted (or split off).
    /// May point at a tombstoned run.
    ins_prev: Option<NodeIdx>,
    ins_next: Option<NodeIdx>,
}

impl<V: RgaValue> RgaNode<V> {
    fn new(id: RgaNodeId, value: V) -> Self {
        Self {
            id,
            value,
            removed_at: None,
            prev: None,
            next: None,
            ins_prev: None,
            ins_next: None,
        }
    }

    /// Run id.
    #[must_use]
    pub fn id(&self) -> RgaNodeId {
        self.id
    }

    /// Creation ticket of the run.
    #[must_use]
    pub fn created_at(&self) -> Ticket {
        self.id.created_at
    }

    /// Run content.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Removal ticket, if tombstoned.
    #[must_use]
    pub fn removed_at(&self) -> Option<Ticket> {
        self.removed_at
    }

    /// Whether the run is tombstoned.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Insertion predecessor, if linked.
    #[must_use]
    pub fn ins_prev(&self) -> Option<NodeIdx> {
        self.ins_prev
    }

    fn content_len(&self) -> usize {
        self.value.content_len()
    }
}

impl<V: RgaValue> Weighted for RgaNode<V> {
    fn weight(&self) -> usize {
        if self.removed_at.is_some() {
            0
        } else {
            self.value.content_len()
        }
    }
}

/// The RGA-split list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RgaTreeSplit<V: RgaValue> {
    tree: SplayTree<RgaNode<V>>,
    head: NodeIdx,
    /// Run lookup by id. Rebuilt after deserialization, so it is not part of
    /// the serialized form.
    #[serde(skip)]
    by_id: BTreeMap<RgaNodeId, NodeIdx>,
}

impl<V: RgaValue + Default> RgaTreeSplit<V> {
    /// Create a list containing only the zero-length head run.
    #[must_use]
    pub fn new() -> Self {
        let mut tree = SplayTree::new();
        let head_id = RgaNodeId::new(Ticket::initial(), 0);
        let head = tree.insert(RgaNode::new(head_id, V::default()));
        let mut by_id = BTreeMap::new();
        by_id.insert(head_id, head);
        Self { tree, head, by_id }
    }
}

impl<V: RgaValue + Default> Default for RgaTreeSplit<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: RgaValue> RgaTreeSplit<V> {
    /// Visible length of the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.weight()
    }

    /// Whether the list has no visible content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sentinel head run.
    #[must_use]
    pub fn head(&self) -> NodeIdx {
        self.head
    }

    /// Borrow a run.
    #[must_use]
    pub fn node(&self, idx: NodeIdx) -> &RgaNode<V> {
        self.tree.value(idx)
    }

    /// Look up a run by exact id.
    #[must_use]
    pub fn find_node(&self, id: &RgaNodeId) -> Option<NodeIdx> {
        self.by_id.get(id).copied()
    }

    /// Iterate runs in list order, head excluded.
    pub fn nodes(&self) -> impl Iterator<Item = &RgaNode<V>> {
        let mut cursor = self.node(self.head).next;
        std::iter::from_fn(move || {
            let idx = cursor?;
            let node = self.node(idx);
            cursor = node.next;
            Some(node)
        })
    }

    /// Resolve an index to a position. Boundary indexes resolve to the end of
    /// the run on their left; tombstoned runs are skipped.
    pub fn find_pos(&mut self, index: usize) -> RgaPos {
        match self.tree.find(index) {
            Some((idx, offset)) => {
                let node = self.tree.value(idx);
                RgaPos::new(node.id, u32::try_from(offset).unwrap_or(u32::MAX))
            }
            None => RgaPos::new(self.node(self.head).id, 0),
        }
    }

    /// Resolve an index range to a pair of positions.
    pub fn create_range(&mut self, from: usize, to: usize) -> (RgaPos, RgaPos) {
        let from_pos = self.find_pos(from);
        if from == to {
            return (from_pos, from_pos);
        }
        (from_pos, self.find_pos(to))
    }

    /// Insert a freshly created run right after `prev`, with no concurrency
    /// skip. Used for local appends and deep-copy reconstruction.
    pub fn insert_after(&mut self, prev: NodeIdx, id: RgaNodeId, value: V) -> NodeIdx {
        let idx = self.tree.insert_after(Some(prev), RgaNode::new(id, value));
        self.link_after(prev, idx);
        self.tree.value_mut(idx).ins_prev = Some(prev);
        self.by_id.insert(id, idx);
        idx
    }

    /// Insert a run created at `executed_at` after the run with creation
    /// ticket `prev_created`, applying the RGA tie-break against concurrent
    /// siblings.
    pub fn insert_after_created(
        &mut self,
        prev_created: Ticket,
        id: RgaNodeId,
        value: V,
        executed_at: Ticket,
    ) -> Result<NodeIdx, CrdtError> {
        let anchor = self
            .find_node(&RgaNodeId::new(prev_created, 0))
            .ok_or(CrdtError::RunNotFound(prev_created))?;
        let anchor = self.skip_concurrent(anchor, &executed_at);
        let idx = self.insert_after(anchor, id, value);
        Ok(idx)
    }

    /// Edit: tombstone the runs covered by `[from, to)` (gated per actor by
    /// `latest_by_actor`), then insert `content` at `from`. Returns the caret
    /// position after the edit and the maximum creation ticket tombstoned per
    /// actor, for transmission to other replicas.
    pub fn edit(
        &mut self,
        from: &RgaPos,
        to: &RgaPos,
        latest_by_actor: Option<&HashMap<ActorId, Ticket>>,
        content: V,
        executed_at: Ticket,
    ) -> Result<(RgaPos, HashMap<ActorId, Ticket>), CrdtError> {
        let (to_left, to_right) = self.find_node_with_split(to, &executed_at)?;
        let (from_left, from_right) = self.find_node_with_split(from, &executed_at)?;

        let candidates = self.find_between(from_right, to_right);
        let touched = self.delete_nodes(&candidates, latest_by_actor, executed_at);

        let caret = if content.content_len() > 0 {
            let len = u32::try_from(content.content_len()).unwrap_or(u32::MAX);
            let inserted = self.insert_after(from_left, RgaNodeId::new(executed_at, 0), content);
            RgaPos::new(self.node(inserted).id, len)
        } else {
            match to_right {
                Some(idx) => RgaPos::new(self.node(idx).id, 0),
                None => {
                    let left = self.node(to_left);
                    RgaPos::new(left.id, u32::try_from(left.content_len()).unwrap_or(u32::MAX))
                }
            }
        };

        Ok((caret, touched))
    }

    /// Physically relocate `target` to just after the run created at
    /// `prev_created`, with the concurrency skip. The run keeps its identity.
    pub fn move_after_created(
        &mut self,
        prev_created: Ticket,
        target: NodeIdx,
        executed_at: Ticket,
    ) -> Result<(), CrdtError> {
        let anchor = self
            .find_node(&RgaNodeId::new(prev_created, 0))
            .ok_or(CrdtError::RunNotFound(prev_created))?;
        if anchor == target {
            return Ok(());
        }

        self.unlink(target);
        let anchor = self.skip_concurrent(anchor, &executed_at);
        self.tree.reinsert_after(Some(anchor), target);
        self.link_after(anchor, target);
        Ok(())
    }

    /// Tombstone the given runs, honoring the per-actor gate: a run is only
    /// removable when its creation ticket is at most the gate for its actor
    /// (no gate map means no limit; an absent actor entry means nothing by
    /// that actor is removable). Returns the max creation ticket tombstoned
    /// per actor.
    pub fn delete_nodes(
        &mut self,
        candidates: &[NodeIdx],
        latest_by_actor: Option<&HashMap<ActorId, Ticket>>,
        executed_at: Ticket,
    ) -> HashMap<ActorId, Ticket> {
        let mut touched: HashMap<ActorId, Ticket> = HashMap::new();

        for &idx in candidates {
            let node = self.tree.value(idx);
            let created_at = node.created_at();
            let actor = created_at.actor();

            let gate = match latest_by_actor {
                None => Ticket::max(),
                Some(map) => map.get(&actor).copied().unwrap_or_else(Ticket::initial),
            };
            if created_at.after(&gate) {
                continue;
            }
            if let Some(removed_at) = node.removed_at {
                if !executed_at.after(&removed_at) {
                    continue;
                }
            }

            self.tree.value_mut(idx).removed_at = Some(executed_at);
            self.tree.update_weight(idx);

            touched
                .entry(actor)
                .and_modify(|t| {
                    if created_at.after(t) {
                        *t = created_at;
                    }
                })
                .or_insert(created_at);
        }

        touched
    }

    /// Tombstone one run under the removal LWW rule (a removal ticket only
    /// advances). Returns whether the run state changed.
    pub fn remove_node(&mut self, idx: NodeIdx, executed_at: Ticket) -> bool {
        let node = self.tree.value(idx);
        if let Some(removed_at) = node.removed_at {
            if !executed_at.after(&removed_at) {
                return false;
            }
        }
        self.tree.value_mut(idx).removed_at = Some(executed_at);
        self.tree.update_weight(idx);
        true
    }

    /// Restore a tombstone while rebuilding a copied list; no LWW gating.
    pub fn restore_removed(&mut self, idx: NodeIdx, removed_at: Ticket) {
        self.tree.value_mut(idx).removed_at = Some(removed_at);
        self.tree.update_weight(idx);
    }

    /// Re-link an insertion predecessor while rebuilding a copied list.
    pub fn set_ins_prev(&mut self, idx: NodeIdx, prev: NodeIdx) {
        self.tree.value_mut(idx).ins_prev = Some(prev);
        self.tree.value_mut(prev).ins_next = Some(idx);
    }

    /// Run indices in list order, head excluded.
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIdx> + '_ {
        let mut cursor = self.node(self.head).next;
        std::iter::from_fn(move || {
            let idx = cursor?;
            cursor = self.node(idx).next;
            Some(idx)
        })
    }

    /// Visible content in list order.
    pub fn visible_values(&self) -> impl Iterator<Item = &V> {
        self.nodes()
            .filter(|n| !n.is_removed())
            .map(|n| &n.value)
    }

    /// Structure dump for debugging: each run as `id{content}` with `!` on
    /// tombstones.
    #[must_use]
    pub fn annotated_string(&self) -> String
    where
        V: Display,
    {
        let mut out = String::new();
        for node in self.nodes() {
            let marker = if node.is_removed() { "!" } else { "" };
            out.push_str(&format!(
                "[{}:{}{}]{{{}}}",
                node.id.created_at, node.id.offset, marker, node.value
            ));
        }
        out
    }

    /// Rebuild the id index after deserialization and verify insertion links.
    /// A dangling `ins_prev` is tolerated with a warning: the order is still
    /// recoverable from the physical links.
    pub fn rebuild_index(&mut self) {
        self.by_id.clear();
        let mut cursor = Some(self.head);
        while let Some(idx) = cursor {
            let node = self.tree.value(idx);
            self.by_id.insert(node.id, idx);
            cursor = node.next;
        }

        let mut cursor = self.node(self.head).next;
        while let Some(idx) = cursor {
            let node = self.tree.value(idx);
            if node.ins_prev.is_none() {
                tracing::warn!(run = %node.id.created_at, "run has no insertion predecessor");
            }
            cursor = node.next;
        }
    }

    /// Locate the anchor run for a position, splitting when the position
    /// falls inside a run, then slide right past concurrent runs with a
    /// greater creation ticket. Returns the anchor and its successor.
    fn find_node_with_split(
        &mut self,
        pos: &RgaPos,
        updated_at: &Ticket,
    ) -> Result<(NodeIdx, Option<NodeIdx>), CrdtError> {
        let absolute = pos.absolute_id();
        let idx = self.find_floor_prefer_left(&absolute)?;
        let node = self.tree.value(idx);
        let relative = (absolute.offset - node.id.offset) as usize;

        let anchor = if relative == 0 {
            // The boundary just before the run belongs to its predecessor.
            self.tree.value(idx).prev.unwrap_or(idx)
        } else {
            self.split_node(idx, relative);
            idx
        };

        let anchor = self.skip_concurrent(anchor, updated_at);
        let right = self.tree.value(anchor).next;
        Ok((anchor, right))
    }

    /// Floor lookup by absolute id. When the id lands exactly on the start of
    /// a split-off right part, prefer the left sibling so the position keeps
    /// addressing the original boundary.
    fn find_floor_prefer_left(&self, id: &RgaNodeId) -> Result<NodeIdx, CrdtError> {
        let (found_id, idx) = self
            .by_id
            .range(..=*id)
            .next_back()
            .filter(|(found, _)| found.created_at == id.created_at)
            .map(|(found, idx)| (*found, *idx))
            .ok_or(CrdtError::RunNotFound(id.created_at))?;

        if id.offset > 0 && found_id.offset == id.offset {
            return self
                .tree
                .value(idx)
                .ins_prev
                .ok_or(CrdtError::DanglingInsertionLink(id.created_at));
        }
        Ok(idx)
    }

    /// Split the run at `offset` if the offset is interior; cached weights and
    /// both link chains are updated. No-op at the boundaries.
    fn split_node(&mut self, idx: NodeIdx, offset: usize) {
        let node = self.tree.value(idx);
        if offset == 0 || offset >= node.content_len() {
            return;
        }

        let right_id = node.id.advanced(u32::try_from(offset).unwrap_or(u32::MAX));
        let removed_at = node.removed_at;
        let old_ins_next = node.ins_next;

        let right_value = self.tree.value_mut(idx).value.split_at(offset);
        self.tree.update_weight(idx);

        let mut right = RgaNode::new(right_id, right_value);
        right.removed_at = removed_at;
        let right_idx = self.tree.insert_after(Some(idx), right);
        self.link_after(idx, right_idx);
        self.by_id.insert(right_id, right_idx);

        // Splice the right part into the insertion chain between the left
        // part and its previous insertion successor.
        self.tree.value_mut(right_idx).ins_prev = Some(idx);
        self.tree.value_mut(right_idx).ins_next = old_ins_next;
        self.tree.value_mut(idx).ins_next = Some(right_idx);
        if let Some(ins_next) = old_ins_next {
            self.tree.value_mut(ins_next).ins_prev = Some(right_idx);
        }
    }

    /// Runs from `from` (inclusive) up to `until` (exclusive) in list order.
    fn find_between(&self, from: Option<NodeIdx>, until: Option<NodeIdx>) -> Vec<NodeIdx> {
        let mut out = Vec::new();
        let mut cursor = from;
        while let Some(idx) = cursor {
            if Some(idx) == until {
                break;
            }
            out.push(idx);
            cursor = self.tree.value(idx).next;
        }
        out
    }

    /// RGA tie-break: among concurrent inserts at one anchor the higher
    /// ticket must end up leftmost, so a lower-ticket insert slides its
    /// anchor right past already-placed higher-ticket runs.
    fn skip_concurrent(&self, mut anchor: NodeIdx, executed_at: &Ticket) -> NodeIdx {
        while let Some(next) = self.tree.value(anchor).next {
            if !self.tree.value(next).created_at().after(executed_at) {
                break;
            }
            anchor = next;
        }
        anchor
    }

    fn link_after(&mut self, prev: NodeIdx, idx: NodeIdx) {
        let next = self.tree.value(prev).next;
        self.tree.value_mut(idx).prev = Some(prev);
        self.tree.value_mut(idx).next = next;
        self.tree.value_mut(prev).next = Some(idx);
        if let Some(next) = next {
            self.tree.value_mut(next).prev = Some(idx);
        }
    }

    fn unlink(&mut self, idx: NodeIdx) {
        let prev = self.tree.value(idx).prev;
        let next = self.tree.value(idx).next;
        if let Some(prev) = prev {
            self.tree.value_mut(prev).next = next;
        }
        if let Some(next) = next {
            self.tree.value_mut(next).prev = prev;
        }
        self.tree.value_mut(idx).prev = None;
        self.tree.value_mut(idx).next = None;
        self.tree.delete(idx);
    }
}
