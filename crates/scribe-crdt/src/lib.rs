//! Replicated JSON document engine.
//!
//! This crate implements the convergence core of the scribed framework:
//! replicas mutate JSON-like documents locally and exchange change packs;
//! any two replicas that have observed the same changes hold identical
//! state, with no coordination beyond a logical clock.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Document (replica)                            │
//! │   update(closure) ── ObjectScope/… builders   │
//! │   apply_change_pack(pack) ── replay           │
//! ├───────────────────────────────────────────────┤
//! │ Root: element table keyed by creation ticket  │
//! │   Object · Array · Text · Counter · Primitive │
//! ├───────────────────────────────────────────────┤
//! │ RGA-split list (text/array ordering)          │
//! │   linked runs + splay tree by visible length  │
//! ├───────────────────────────────────────────────┤
//! │ Ticket: (lamport, delimiter, actor)           │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Conflict resolution is last-writer-wins on the ticket order for scalar
//! state, RGA ordering for sequences and commutative summation for counters.
//! Tombstones are retained so concurrent operations anchored on removed
//! state stay resolvable.

pub mod array;
pub mod builder;
pub mod change;
pub mod checkpoint;
pub mod clock;
pub mod counter;
pub mod document;
pub mod element;
pub mod error;
pub mod object;
pub mod operation;
pub mod pack;
pub mod rga;
pub mod root;
pub mod splay;
pub mod text;
pub mod value;

pub use array::Array;
pub use builder::{ArrayScope, CounterScope, ObjectScope, TextScope};
pub use change::{Change, ChangeContext, ChangeId};
pub use checkpoint::Checkpoint;
pub use clock::{ActorId, Ticket, ACTOR_ID_LEN};
pub use counter::{Counter, CounterOperand, CounterValue};
pub use document::{replay_changes, Document, DocumentStatus};
pub use element::{Element, ElementData};
pub use error::CrdtError;
pub use object::Object;
pub use operation::{ElementSeed, Operation};
pub use pack::ChangePack;
pub use rga::{RgaNodeId, RgaPos, RgaTreeSplit, RgaValue};
pub use root::Root;
pub use splay::{NodeIdx, SplayTree, Weighted};
pub use text::{Text, TextChunk};
pub use value::Primitive;

/// Result type for document engine operations.
pub type Result<T> = std::result::Result<T, CrdtError>;

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify all public re-exports are accessible.
    #[test]
    fn test_public_reexports() {
        let actor = ActorId::from_bytes([1; ACTOR_ID_LEN]);
        let _ticket = Ticket::new(1, 0, actor);
        let _checkpoint = Checkpoint::initial();
        let _doc = Document::new("doc");
        let _counter = Counter::new(CounterValue::Integer(0));
        let _text = Text::new();
    }
}
