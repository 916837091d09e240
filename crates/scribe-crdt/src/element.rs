//! Replicated elements and their lifecycle metadata.

use serde::{Deserialize, Serialize};

use crate::array::Array;
use crate::clock::Ticket;
use crate::counter::Counter;
use crate::error::CrdtError;
use crate::object::Object;
use crate::text::Text;
use crate::value::Primitive;

/// The payload of a replicated element.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum ElementData {
    Primitive(Primitive),
    Counter(Counter),
    Object(Object),
    Array(Array),
    Text(Text),
}

impl ElementData {
    /// Kind name for diagnostics and type errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Primitive(_) => "primitive",
            Self::Counter(_) => "counter",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::Text(_) => "text",
        }
    }
}

/// A replicated element: payload plus the tickets governing its lifecycle.
///
/// `removed_at` only ever advances, and `moved_at` records the greatest
/// competing move, so concurrent lifecycle changes resolve identically on
/// every replica.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Element {
    created_at: Ticket,
    moved_at: Option<Ticket>,
    removed_at: Option<Ticket>,
    data: ElementData,
}

impl Element {
    /// Create an element.
    #[must_use]
    pub fn new(created_at: Ticket, data: ElementData) -> Self {
        Self {
            created_at,
            moved_at: None,
            removed_at: None,
            data,
        }
    }

    /// Creation ticket; the element's identity.
    #[must_use]
    pub fn created_at(&self) -> Ticket {
        self.created_at
    }

    /// Latest move ticket.
    #[must_use]
    pub fn moved_at(&self) -> Option<Ticket> {
        self.moved_at
    }

    /// Removal ticket, if tombstoned.
    #[must_use]
    pub fn removed_at(&self) -> Option<Ticket> {
        self.removed_at
    }

    /// Whether the element is tombstoned.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.removed_at.is_some()
    }

    /// Payload.
    #[must_use]
    pub fn data(&self) -> &ElementData {
        &self.data
    }

    /// Mutable payload.
    pub fn data_mut(&mut self) -> &mut ElementData {
        &mut self.data
    }

    /// Tombstone the element; the removal ticket only advances.
    /// Returns whether the state changed.
    pub fn remove(&mut self, executed_at: Ticket) -> bool {
        match self.removed_at {
            Some(removed_at) if !executed_at.after(&removed_at) => false,
            _ => {
                self.removed_at = Some(executed_at);
                true
            }
        }
    }

    /// Record a move; the greatest competing ticket wins.
    /// Returns whether this move is the new winner.
    pub fn record_move(&mut self, executed_at: Ticket) -> bool {
        match self.moved_at {
            Some(moved_at) if !executed_at.after(&moved_at) => false,
            _ => {
                self.moved_at = Some(executed_at);
                true
            }
        }
    }

    /// Borrow the payload as an object.
    pub fn as_object(&self) -> Result<&Object, CrdtError> {
        match &self.data {
            ElementData::Object(o) => Ok(o),
            other => Err(CrdtError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Mutably borrow the payload as an object.
    pub fn as_object_mut(&mut self) -> Result<&mut Object, CrdtError> {
        match &mut self.data {
            ElementData::Object(o) => Ok(o),
            other => Err(CrdtError::TypeMismatch {
                expected: "object",
                found: other.kind(),
            }),
        }
    }

    /// Mutably borrow the payload as an array.
    pub fn as_array_mut(&mut self) -> Result<&mut Array, CrdtError> {
        match &mut self.data {
            ElementData::Array(a) => Ok(a),
            other => Err(CrdtError::TypeMismatch {
                expected: "array",
                found: other.kind(),
            }),
        }
    }

    /// Borrow the payload as an array.
    pub fn as_array(&self) -> Result<&Array, CrdtError> {
        match &self.data {
            ElementData::Array(a) => Ok(a),
            other => Err(CrdtError::TypeMismatch {
                expected: "array",
                found: other.kind(),
            }),
        }
    }

    /// Mutably borrow the payload as text.
    pub fn as_text_mut(&mut self) -> Result<&mut Text, CrdtError> {
        match &mut self.data {
            ElementData::Text(t) => Ok(t),
            other => Err(CrdtError::TypeMismatch {
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    /// Borrow the payload as text.
    pub fn as_text(&self) -> Result<&Text, CrdtError> {
        match &self.data {
            ElementData::Text(t) => Ok(t),
            other => Err(CrdtError::TypeMismatch {
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    /// Mutably borrow the payload as a counter.
    pub fn as_counter_mut(&mut self) -> Result<&mut Counter, CrdtError> {
        match &mut self.data {
            ElementData::Counter(c) => Ok(c),
            other => Err(CrdtError::TypeMismatch {
                expected: "counter",
                found: other.kind(),
            }),
        }
    }

    /// Borrow the payload as a counter.
    pub fn as_counter(&self) -> Result<&Counter, CrdtError> {
        match &self.data {
            ElementData::Counter(c) => Ok(c),
            other => Err(CrdtError::TypeMismatch {
                expected: "counter",
                found: other.kind(),
            }),
        }
    }
}
