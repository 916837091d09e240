//! Replicated counters.
//!
//! A counter is a numeric register whose `increase` commutes: concurrent
//! deltas resolve by summation regardless of delivery order, so no ticket
//! comparison is involved beyond element lifecycle.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::{ActorId, Ticket};
use crate::error::CrdtError;

/// Counter state, fixed to one numeric kind at creation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CounterValue {
    Integer(i32),
    Long(i64),
    Double(f64),
}

impl CounterValue {
    /// Kind name for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
        }
    }

    /// JSON representation used by document marshaling.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Integer(v) => serde_json::Value::from(*v),
            Self::Long(v) => serde_json::Value::from(*v),
            Self::Double(v) => serde_json::Value::from(*v),
        }
    }
}

/// An operand accepted by `increase`.
///
/// The set is closed: signed integers up to 64 bits, unsigned up to 32 bits,
/// and both float widths. `u64` and pointer-width values cannot be
/// represented losslessly in every counter kind and are rejected at the API
/// boundary by not being constructible.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CounterOperand {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
    F64(f64),
}

impl CounterOperand {
    fn as_i64(self) -> Option<i64> {
        match self {
            Self::I8(v) => Some(i64::from(v)),
            Self::I16(v) => Some(i64::from(v)),
            Self::I32(v) => Some(i64::from(v)),
            Self::I64(v) => Some(v),
            Self::U8(v) => Some(i64::from(v)),
            Self::U16(v) => Some(i64::from(v)),
            Self::U32(v) => Some(i64::from(v)),
            Self::F32(_) | Self::F64(_) => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Self::I8(v) => f64::from(v),
            Self::I16(v) => f64::from(v),
            Self::I32(v) => f64::from(v),
            Self::I64(v) => v as f64,
            Self::U8(v) => f64::from(v),
            Self::U16(v) => f64::from(v),
            Self::U32(v) => f64::from(v),
            Self::F32(v) => f64::from(v),
            Self::F64(v) => v,
        }
    }
}

macro_rules! operand_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for CounterOperand {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        })*
    };
}

operand_from! {
    i8 => I8, i16 => I16, i32 => I32, i64 => I64,
    u8 => U8, u16 => U16, u32 => U32,
    f32 => F32, f64 => F64,
}

impl CounterValue {
    /// Add `operand` to the counter, coercing it to the counter's declared
    /// kind. Integer counters reject float operands; wrapping arithmetic
    /// keeps concurrent sums associative at the representation limits.
    pub fn increase(&mut self, operand: CounterOperand) -> Result<(), CrdtError> {
        match self {
            Self::Integer(v) => {
                let delta = operand
                    .as_i64()
                    .ok_or(CrdtError::UnsupportedOperand("float delta on integer counter"))?;
                *v = v.wrapping_add(delta as i32);
            }
            Self::Long(v) => {
                let delta = operand
                    .as_i64()
                    .ok_or(CrdtError::UnsupportedOperand("float delta on long counter"))?;
                *v = v.wrapping_add(delta);
            }
            Self::Double(v) => {
                *v += operand.as_f64();
            }
        }
        Ok(())
    }
}

/// A counter element: the running value plus a per-actor watermark of the
/// last applied increase, which makes replaying an increase a no-op while
/// still summing concurrent deltas from different actors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    value: CounterValue,
    applied: HashMap<ActorId, Ticket>,
}

impl Counter {
    /// Create a counter with an initial value.
    #[must_use]
    pub fn new(value: CounterValue) -> Self {
        Self {
            value,
            applied: HashMap::new(),
        }
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> CounterValue {
        self.value
    }

    /// Apply an increase issued at `executed_at`. Returns `false` when the
    /// ticket was already applied (replay).
    pub fn increase(
        &mut self,
        operand: CounterOperand,
        executed_at: Ticket,
    ) -> Result<bool, CrdtError> {
        let actor = executed_at.actor();
        if let Some(last) = self.applied.get(&actor) {
            if !executed_at.after(last) {
                return Ok(false);
            }
        }
        self.value.increase(operand)?;
        self.applied.insert(actor, executed_at);
        Ok(true)
    }
}
