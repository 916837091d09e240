//! The operation set.
//!
//! Operations are the unit of replication: a local mutation records one, a
//! remote change replays them. Every operation addresses its target element
//! by creation ticket (`parent`) and carries the ticket it was executed at.
//! Execution is idempotent for the same `executed_at`: replays fall through
//! the LWW guards or are detected by already-registered identities.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::clock::{ActorId, Ticket};
use crate::counter::{Counter, CounterOperand, CounterValue};
use crate::element::{Element, ElementData};
use crate::error::CrdtError;
use crate::object::Object;
use crate::rga::RgaPos;
use crate::root::Root;
use crate::text::Text;
use crate::value::Primitive;

/// Payload for operations that create an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementSeed {
    Primitive { value: Primitive },
    Counter { value: CounterValue },
    Object,
    Array,
    Text,
}

impl ElementSeed {
    fn grow(&self, created_at: Ticket) -> Element {
        let data = match self {
            Self::Primitive { value } => ElementData::Primitive(value.clone()),
            Self::Counter { value } => ElementData::Counter(Counter::new(*value)),
            Self::Object => ElementData::Object(Object::new()),
            Self::Array => ElementData::Array(Array::new()),
            Self::Text => ElementData::Text(Text::new()),
        };
        Element::new(created_at, data)
    }
}

/// A single replicated operation. The wire form is a tagged encoding with
/// fields specific to each kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Set a key on an object to a newly created element.
    Set {
        parent: Ticket,
        key: String,
        value: ElementSeed,
        executed_at: Ticket,
    },
    /// Append a newly created element to an array, after `prev`.
    Add {
        parent: Ticket,
        prev: Ticket,
        value: ElementSeed,
        executed_at: Ticket,
    },
    /// Move an array element to just after `prev`.
    Move {
        parent: Ticket,
        prev: Ticket,
        target: Ticket,
        executed_at: Ticket,
    },
    /// Tombstone an element held by an object or array.
    Remove {
        parent: Ticket,
        target: Ticket,
        executed_at: Ticket,
    },
    /// Replace a text range with new content.
    Edit {
        parent: Ticket,
        from: RgaPos,
        to: RgaPos,
        latest_by_actor: HashMap<ActorId, Ticket>,
        content: String,
        executed_at: Ticket,
    },
    /// Update the acting replica's text selection.
    Select {
        parent: Ticket,
        from: RgaPos,
        to: RgaPos,
        executed_at: Ticket,
    },
    /// Add a delta to a counter.
    Increase {
        parent: Ticket,
        operand: CounterOperand,
        executed_at: Ticket,
    },
}

impl Operation {
    /// The ticket this operation was executed at.
    #[must_use]
    pub fn executed_at(&self) -> Ticket {
        match self {
            Self::Set { executed_at, .. }
            | Self::Add { executed_at, .. }
            | Self::Move { executed_at, .. }
            | Self::Remove { executed_at, .. }
            | Self::Edit { executed_at, .. }
            | Self::Select { executed_at, .. }
            | Self::Increase { executed_at, .. } => *executed_at,
        }
    }

    /// The creation ticket of the element this operation targets.
    #[must_use]
    pub fn parent(&self) -> Ticket {
        match self {
            Self::Set { parent, .. }
            | Self::Add { parent, .. }
            | Self::Move { parent, .. }
            | Self::Remove { parent, .. }
            | Self::Edit { parent, .. }
            | Self::Select { parent, .. }
            | Self::Increase { parent, .. } => *parent,
        }
    }

    /// Short kind name for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Set { .. } => "set",
            Self::Add { .. } => "add",
            Self::Move { .. } => "move",
            Self::Remove { .. } => "remove",
            Self::Edit { .. } => "edit",
            Self::Select { .. } => "select",
            Self::Increase { .. } => "increase",
        }
    }

    /// Apply this operation to a document root.
    pub fn execute(&self, root: &mut Root) -> Result<(), CrdtError> {
        match self {
            Self::Set {
                parent,
                key,
                value,
                executed_at,
            } => {
                root.register(value.grow(*executed_at));
                root.element_mut(*parent)?
                    .as_object_mut()?
                    .set(key, *executed_at);
                Ok(())
            }
            Self::Add {
                parent,
                prev,
                value,
                executed_at,
            } => {
                root.register(value.grow(*executed_at));
                root.element_mut(*parent)?
                    .as_array_mut()?
                    .add(*prev, *executed_at, *executed_at)
            }
            Self::Move {
                parent,
                prev,
                target,
                executed_at,
            } => {
                // LWW on the element's move ticket decides whether this move
                // still applies.
                if !root.element_mut(*target)?.record_move(*executed_at) {
                    return Ok(());
                }
                root.element_mut(*parent)?
                    .as_array_mut()?
                    .move_after(*prev, *target, *executed_at)
            }
            Self::Remove {
                parent,
                target,
                executed_at,
            } => {
                root.element_mut(*target)?.remove(*executed_at);
                // Arrays additionally tombstone the list entry so positional
                // weights drop; objects resolve visibility via the element.
                let parent_elem = root.element_mut(*parent)?;
                if let ElementData::Array(array) = parent_elem.data_mut() {
                    array.remove(*target, *executed_at)?;
                }
                Ok(())
            }
            Self::Edit {
                parent,
                from,
                to,
                latest_by_actor,
                content,
                executed_at,
            } => {
                let text = root.element_mut(*parent)?.as_text_mut()?;
                if !content.is_empty() && text.has_run(*executed_at) {
                    // Replayed edit: the inserted run already exists.
                    return Ok(());
                }
                text.edit(from, to, Some(latest_by_actor), content, *executed_at)?;
                Ok(())
            }
            Self::Select {
                parent,
                from,
                to,
                executed_at,
            } => {
                root.element_mut(*parent)?
                    .as_text_mut()?
                    .select(*from, *to, *executed_at);
                Ok(())
            }
            Self::Increase {
                parent,
                operand,
                executed_at,
            } => {
                root.element_mut(*parent)?
                    .as_counter_mut()?
                    .increase(*operand, *executed_at)?;
                Ok(())
            }
        }
    }
}
