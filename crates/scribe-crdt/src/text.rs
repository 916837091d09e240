//! Rich-text element backed by the RGA-split list.
//!
//! Content is stored as UTF-8 runs; offsets are counted in Unicode code
//! points, matching what editor frontends send. Each actor additionally owns
//! a selection range resolved against run positions so carets survive
//! concurrent edits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::{ActorId, Ticket};
use crate::error::CrdtError;
use crate::rga::{RgaNodeId, RgaPos, RgaTreeSplit, RgaValue};

/// A run of text. Caches its code-point count so splay weight lookups stay
/// O(1) on multi-byte content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TextChunk {
    value: String,
    chars: usize,
}

impl TextChunk {
    /// Wrap a string as a run.
    #[must_use]
    pub fn new(value: String) -> Self {
        let chars = value.chars().count();
        Self { value, chars }
    }

    /// The run's content.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl From<String> for TextChunk {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<TextChunk> for String {
    fn from(chunk: TextChunk) -> Self {
        chunk.value
    }
}

impl std::fmt::Display for TextChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

impl RgaValue for TextChunk {
    fn content_len(&self) -> usize {
        self.chars
    }

    fn split_at(&mut self, offset: usize) -> Self {
        let byte_offset = self
            .value
            .char_indices()
            .nth(offset)
            .map_or(self.value.len(), |(i, _)| i);
        let right = self.value.split_off(byte_offset);
        let right_chars = self.chars - offset;
        self.chars = offset;
        Self {
            value: right,
            chars: right_chars,
        }
    }
}

/// One actor's selection range.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Selection {
    from: RgaPos,
    to: RgaPos,
    updated_at: Ticket,
}

impl Selection {
    /// Selection start.
    #[must_use]
    pub fn from_pos(&self) -> RgaPos {
        self.from
    }

    /// Selection end.
    #[must_use]
    pub fn to_pos(&self) -> RgaPos {
        self.to
    }
}

/// Replicated text content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Text {
    runs: RgaTreeSplit<TextChunk>,
    selections: HashMap<ActorId, Selection>,
}

impl Text {
    /// Create empty text.
    #[must_use]
    pub fn new() -> Self {
        Self {
            runs: RgaTreeSplit::new(),
            selections: HashMap::new(),
        }
    }

    /// Visible length in code points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Whether there is no visible content.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Resolve an index range to run positions.
    pub fn create_range(&mut self, from: usize, to: usize) -> (RgaPos, RgaPos) {
        self.runs.create_range(from, to)
    }

    /// Replace `[from, to)` with `content`. Returns the caret after the edit
    /// and the per-actor maximum creation ticket tombstoned, which remote
    /// replicas use to gate their own deletions.
    pub fn edit(
        &mut self,
        from: &RgaPos,
        to: &RgaPos,
        latest_by_actor: Option<&HashMap<ActorId, Ticket>>,
        content: &str,
        executed_at: Ticket,
    ) -> Result<(RgaPos, HashMap<ActorId, Ticket>), CrdtError> {
        self.runs.edit(
            from,
            to,
            latest_by_actor,
            TextChunk::new(content.to_string()),
            executed_at,
        )
    }

    /// Update the acting replica's selection; last writer wins per actor.
    pub fn select(&mut self, from: RgaPos, to: RgaPos, executed_at: Ticket) {
        let actor = executed_at.actor();
        match self.selections.get(&actor) {
            Some(prev) if !executed_at.after(&prev.updated_at) => {}
            _ => {
                self.selections.insert(
                    actor,
                    Selection {
                        from,
                        to,
                        updated_at: executed_at,
                    },
                );
            }
        }
    }

    /// An actor's current selection.
    #[must_use]
    pub fn selection(&self, actor: &ActorId) -> Option<&Selection> {
        self.selections.get(actor)
    }

    /// Whether a run with this creation ticket exists (any split of it).
    #[must_use]
    pub fn has_run(&self, created_at: Ticket) -> bool {
        self.runs.find_node(&RgaNodeId::new(created_at, 0)).is_some()
    }

    /// Visible content as a string.
    #[must_use]
    pub fn content(&self) -> String {
        self.runs.visible_values().map(TextChunk::as_str).collect()
    }

    /// Structure dump for debugging.
    #[must_use]
    pub fn annotated_string(&self) -> String {
        self.runs.annotated_string()
    }

    /// Rebuild run lookups after deserialization.
    pub fn rebuild_index(&mut self) {
        self.runs.rebuild_index();
    }

    /// Copy the text by replaying its runs into a fresh list, restoring
    /// tombstones and insertion links. A run whose insertion predecessor
    /// cannot be resolved is tolerated: the physical order is already
    /// correct, so this only logs a warning.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut runs: RgaTreeSplit<TextChunk> = RgaTreeSplit::new();
        let mut current = runs.head();

        for node in self.runs.nodes() {
            current = runs.insert_after(current, node.id(), node.value().clone());
            if let Some(removed_at) = node.removed_at() {
                runs.restore_removed(current, removed_at);
            }
        }

        // Second pass: restore insertion links now every run exists.
        let sources: Vec<(RgaNodeId, Option<RgaNodeId>)> = self
            .runs
            .nodes()
            .map(|node| {
                let ins_prev_id = node.ins_prev().map(|idx| self.runs.node(idx).id());
                (node.id(), ins_prev_id)
            })
            .collect();
        for (id, ins_prev_id) in sources {
            let Some(idx) = runs.find_node(&id) else {
                continue;
            };
            match ins_prev_id.and_then(|prev_id| runs.find_node(&prev_id)) {
                Some(prev) => runs.set_ins_prev(idx, prev),
                None => {
                    tracing::warn!(run = %id.created_at(), "insertion predecessor missing during copy");
                }
            }
        }

        Self {
            runs,
            selections: self.selections.clone(),
        }
    }
}

impl Default for Text {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ACTOR_ID_LEN;

    fn actor(byte: u8) -> ActorId {
        ActorId::from_bytes([byte; ACTOR_ID_LEN])
    }

    fn ticket(lamport: u64, actor_byte: u8) -> Ticket {
        Ticket::new(lamport, 0, actor(actor_byte))
    }

    fn edit(text: &mut Text, from: usize, to: usize, content: &str, at: Ticket) {
        let (from_pos, to_pos) = text.create_range(from, to);
        text.edit(&from_pos, &to_pos, None, content, at).unwrap();
    }

    #[test]
    fn test_edit_and_content() {
        let mut text = Text::new();
        edit(&mut text, 0, 0, "hello world", ticket(1, 1));
        edit(&mut text, 5, 11, "!", ticket(2, 1));
        assert_eq!(text.content(), "hello!");
        assert_eq!(text.len(), 6);
    }

    #[test]
    fn test_offsets_are_code_points() {
        let mut text = Text::new();
        edit(&mut text, 0, 0, "héllo", ticket(1, 1));
        assert_eq!(text.len(), 5);
        edit(&mut text, 1, 2, "", ticket(2, 1));
        assert_eq!(text.content(), "hllo");
    }

    #[test]
    fn test_select_is_lww_per_actor() {
        let mut text = Text::new();
        edit(&mut text, 0, 0, "abcd", ticket(1, 1));

        let (from, to) = text.create_range(0, 2);
        text.select(from, to, ticket(3, 1));
        // A stale selection from the same actor must not win.
        let (stale_from, stale_to) = text.create_range(1, 3);
        text.select(stale_from, stale_to, ticket(2, 1));

        let selection = text.selection(&actor(1)).unwrap();
        assert_eq!(selection.from_pos(), from);
        assert_eq!(selection.to_pos(), to);

        // Another actor's selection is independent.
        let (b_from, b_to) = text.create_range(3, 4);
        text.select(b_from, b_to, ticket(2, 2));
        assert!(text.selection(&actor(2)).is_some());
        assert_eq!(text.selection(&actor(1)).unwrap().from_pos(), from);
    }

    #[test]
    fn test_deep_copy_preserves_content_and_tombstones() {
        let mut text = Text::new();
        edit(&mut text, 0, 0, "abcdef", ticket(1, 1));
        edit(&mut text, 2, 4, "", ticket(2, 1));
        assert_eq!(text.content(), "abef");

        let mut copy = text.deep_copy();
        assert_eq!(copy.content(), "abef");

        // The copy is independently editable.
        edit(&mut copy, 0, 1, "", ticket(3, 1));
        assert_eq!(copy.content(), "bef");
        assert_eq!(text.content(), "abef");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut text = Text::new();
        edit(&mut text, 0, 0, "abcdef", ticket(1, 1));
        edit(&mut text, 2, 4, "", ticket(2, 1));

        let bytes = serde_json::to_vec(&text).unwrap();
        let mut back: Text = serde_json::from_slice(&bytes).unwrap();
        back.rebuild_index();

        assert_eq!(back.content(), "abef");
        edit(&mut back, 2, 4, "", ticket(3, 1));
        assert_eq!(back.content(), "ab");
    }
}
