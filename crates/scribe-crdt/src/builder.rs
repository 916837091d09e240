//! Typed mutation scopes.
//!
//! A mutation closure receives an [`ObjectScope`] for the document root.
//! Every method issues a ticket from the change context, applies the
//! operation to the root and records it, so the local state and the
//! replicated operation can never drift apart. Sub-scopes borrow the parent
//! scope, which keeps mutations sequential within one update.

use crate::change::ChangeContext;
use crate::clock::Ticket;
use crate::counter::{CounterOperand, CounterValue};
use crate::error::CrdtError;
use crate::operation::{ElementSeed, Operation};
use crate::root::Root;
use crate::value::Primitive;

/// Scope over a replicated object.
pub struct ObjectScope<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Scope over a replicated array.
pub struct ArrayScope<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Scope over replicated text.
pub struct TextScope<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

/// Scope over a replicated counter.
pub struct CounterScope<'a> {
    root: &'a mut Root,
    ctx: &'a mut ChangeContext,
    target: Ticket,
}

impl<'a> ObjectScope<'a> {
    pub(crate) fn new(root: &'a mut Root, ctx: &'a mut ChangeContext, target: Ticket) -> Self {
        Self { root, ctx, target }
    }

    /// Set `key` to a scalar value.
    pub fn set(&mut self, key: &str, value: impl Into<Primitive>) -> Result<(), CrdtError> {
        self.set_seed(
            key,
            ElementSeed::Primitive {
                value: value.into(),
            },
        )?;
        Ok(())
    }

    /// Set `key` to a new empty object and scope into it.
    pub fn set_new_object(&mut self, key: &str) -> Result<ObjectScope<'_>, CrdtError> {
        let created = self.set_seed(key, ElementSeed::Object)?;
        Ok(ObjectScope::new(self.root, self.ctx, created))
    }

    /// Set `key` to a new empty array and scope into it.
    pub fn set_new_array(&mut self, key: &str) -> Result<ArrayScope<'_>, CrdtError> {
        let created = self.set_seed(key, ElementSeed::Array)?;
        Ok(ArrayScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    /// Set `key` to new empty text and scope into it.
    pub fn set_new_text(&mut self, key: &str) -> Result<TextScope<'_>, CrdtError> {
        let created = self.set_seed(key, ElementSeed::Text)?;
        Ok(TextScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    /// Set `key` to a new counter and scope into it.
    pub fn set_new_counter(
        &mut self,
        key: &str,
        value: CounterValue,
    ) -> Result<CounterScope<'_>, CrdtError> {
        let created = self.set_seed(key, ElementSeed::Counter { value })?;
        Ok(CounterScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    /// Tombstone the element currently held under `key`.
    pub fn remove(&mut self, key: &str) -> Result<(), CrdtError> {
        let target = self
            .element()?
            .as_object()?
            .top(key)
            .ok_or_else(|| CrdtError::KeyNotFound(key.to_string()))?;
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Remove {
            parent: self.target,
            target,
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(())
    }

    /// Scope into the object under `key`.
    pub fn object(&mut self, key: &str) -> Result<ObjectScope<'_>, CrdtError> {
        let created = self.child(key)?;
        self.root.element(created)?.as_object()?;
        Ok(ObjectScope::new(self.root, self.ctx, created))
    }

    /// Scope into the array under `key`.
    pub fn array(&mut self, key: &str) -> Result<ArrayScope<'_>, CrdtError> {
        let created = self.child(key)?;
        self.root.element(created)?.as_array()?;
        Ok(ArrayScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    /// Scope into the text under `key`.
    pub fn text(&mut self, key: &str) -> Result<TextScope<'_>, CrdtError> {
        let created = self.child(key)?;
        self.root.element(created)?.as_text()?;
        Ok(TextScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    /// Scope into the counter under `key`.
    pub fn counter(&mut self, key: &str) -> Result<CounterScope<'_>, CrdtError> {
        let created = self.child(key)?;
        self.root.element(created)?.as_counter()?;
        Ok(CounterScope {
            root: &mut *self.root,
            ctx: &mut *self.ctx,
            target: created,
        })
    }

    fn element(&self) -> Result<&crate::element::Element, CrdtError> {
        self.root.element(self.target)
    }

    fn child(&self, key: &str) -> Result<Ticket, CrdtError> {
        let top = self
            .element()?
            .as_object()?
            .top(key)
            .ok_or_else(|| CrdtError::KeyNotFound(key.to_string()))?;
        if self.root.element(top)?.is_removed() {
            return Err(CrdtError::KeyNotFound(key.to_string()));
        }
        Ok(top)
    }

    fn set_seed(&mut self, key: &str, value: ElementSeed) -> Result<Ticket, CrdtError> {
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Set {
            parent: self.target,
            key: key.to_string(),
            value,
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(executed_at)
    }
}

impl ArrayScope<'_> {
    /// Number of visible entries.
    pub fn len(&self) -> Result<usize, CrdtError> {
        Ok(self.root.element(self.target)?.as_array()?.len())
    }

    /// Whether there are no visible entries.
    pub fn is_empty(&self) -> Result<bool, CrdtError> {
        Ok(self.len()? == 0)
    }

    /// Append a scalar value. Returns the new element's creation ticket.
    pub fn push(&mut self, value: impl Into<Primitive>) -> Result<Ticket, CrdtError> {
        let prev = self.root.element(self.target)?.as_array()?.last_created();
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Add {
            parent: self.target,
            prev,
            value: ElementSeed::Primitive {
                value: value.into(),
            },
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(executed_at)
    }

    /// Tombstone the entry at a visible index.
    pub fn remove(&mut self, index: usize) -> Result<(), CrdtError> {
        let target = self.ticket_at(index)?;
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Remove {
            parent: self.target,
            target,
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(())
    }

    /// Move the entry at `target_index` to just after the entry at
    /// `prev_index`, or to the front when `prev_index` is `None`.
    pub fn move_after(
        &mut self,
        target_index: usize,
        prev_index: Option<usize>,
    ) -> Result<(), CrdtError> {
        let target = self.ticket_at(target_index)?;
        let prev = match prev_index {
            Some(index) => self.ticket_at(index)?,
            None => Ticket::initial(),
        };
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Move {
            parent: self.target,
            prev,
            target,
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(())
    }

    fn ticket_at(&mut self, index: usize) -> Result<Ticket, CrdtError> {
        let array = self.root.element_mut(self.target)?.as_array_mut()?;
        let len = array.len();
        array
            .get(index)
            .ok_or(CrdtError::IndexOutOfBounds { index, len })
    }
}

impl TextScope<'_> {
    /// Visible length in code points.
    pub fn len(&self) -> Result<usize, CrdtError> {
        Ok(self.root.element(self.target)?.as_text()?.len())
    }

    /// Whether there is no visible content.
    pub fn is_empty(&self) -> Result<bool, CrdtError> {
        Ok(self.len()? == 0)
    }

    /// Replace `[from, to)` with `content`.
    pub fn edit(&mut self, from: usize, to: usize, content: &str) -> Result<(), CrdtError> {
        let executed_at = self.ctx.issue_ticket();
        let text = self.root.element_mut(self.target)?.as_text_mut()?;
        let len = text.len();
        if from > to || to > len {
            return Err(CrdtError::IndexOutOfBounds { index: to, len });
        }

        let (from_pos, to_pos) = text.create_range(from, to);
        // Local edits are ungated; the touched tickets become the gate for
        // remote replays of this operation.
        let (_, latest_by_actor) = text.edit(&from_pos, &to_pos, None, content, executed_at)?;
        self.ctx.push(Operation::Edit {
            parent: self.target,
            from: from_pos,
            to: to_pos,
            latest_by_actor,
            content: content.to_string(),
            executed_at,
        });
        Ok(())
    }

    /// Update this replica's selection to `[from, to)`.
    pub fn select(&mut self, from: usize, to: usize) -> Result<(), CrdtError> {
        let executed_at = self.ctx.issue_ticket();
        let text = self.root.element_mut(self.target)?.as_text_mut()?;
        let len = text.len();
        if from > to || to > len {
            return Err(CrdtError::IndexOutOfBounds { index: to, len });
        }

        let (from_pos, to_pos) = text.create_range(from, to);
        text.select(from_pos, to_pos, executed_at);
        self.ctx.push(Operation::Select {
            parent: self.target,
            from: from_pos,
            to: to_pos,
            executed_at,
        });
        Ok(())
    }

    /// Visible content.
    pub fn content(&self) -> Result<String, CrdtError> {
        Ok(self.root.element(self.target)?.as_text()?.content())
    }
}

impl CounterScope<'_> {
    /// Add a delta to the counter.
    pub fn increase(&mut self, operand: impl Into<CounterOperand>) -> Result<(), CrdtError> {
        let executed_at = self.ctx.issue_ticket();
        let op = Operation::Increase {
            parent: self.target,
            operand: operand.into(),
            executed_at,
        };
        op.execute(self.root)?;
        self.ctx.push(op);
        Ok(())
    }

    /// Current value.
    pub fn value(&self) -> Result<CounterValue, CrdtError> {
        Ok(self.root.element(self.target)?.as_counter()?.value())
    }
}
