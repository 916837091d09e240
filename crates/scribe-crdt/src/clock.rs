//! Logical clocks for causal ordering.
//!
//! This module provides the time primitives every replicated element is
//! stamped with:
//! - `ActorId`: unique identifier of a replica (12 bytes, hex-printable).
//! - `Ticket`: a Lamport timestamp extended with a per-change delimiter and
//!   the issuing actor, forming a total order across the cluster.

use std::cmp::Ordering;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of raw bytes in an [`ActorId`].
pub const ACTOR_ID_LEN: usize = 12;

/// A unique identifier for a replica (client) in the cluster.
///
/// Printable as 24 hex characters. The all-zero id is reserved for elements
/// that exist before any actor touched them (the document root, list heads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId([u8; ACTOR_ID_LEN]);

impl ActorId {
    /// The reserved all-zero actor.
    pub const INITIAL: ActorId = ActorId([0; ACTOR_ID_LEN]);

    /// Create an actor id from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; ACTOR_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse an actor id from its 24-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let raw = hex::decode(s)?;
        let bytes: [u8; ACTOR_ID_LEN] = raw
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(bytes))
    }

    /// Hex form of this actor id.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw bytes of this actor id.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_LEN] {
        &self.0
    }

    /// Whether this is the reserved initial actor.
    #[must_use]
    pub fn is_initial(&self) -> bool {
        *self == Self::INITIAL
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// Actor ids travel as hex strings so they stay readable in JSON packs and
// usable as map keys.
impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ActorId::from_hex(&s).map_err(|e| D::Error::custom(format!("invalid actor id: {e}")))
    }
}

/// A Lamport timestamp tagged with the issuing actor.
///
/// Ordering compares `lamport`, then `delimiter`, then the actor bytes, so
/// every two tickets in the cluster are comparable. The `delimiter` is bumped
/// once per operation within a change, which keeps tickets issued inside a
/// single change distinct while sharing the change's Lamport time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ticket {
    lamport: u64,
    delimiter: u32,
    actor: ActorId,
}

impl Ticket {
    /// Create a ticket from its parts.
    #[must_use]
    pub fn new(lamport: u64, delimiter: u32, actor: ActorId) -> Self {
        Self {
            lamport,
            delimiter,
            actor,
        }
    }

    /// The distinguished ticket that sorts below all tickets issued by any
    /// actor. Real tickets always carry a Lamport time of at least 1.
    #[must_use]
    pub fn initial() -> Self {
        Self::new(0, 0, ActorId::INITIAL)
    }

    /// The ticket that sorts above every ticket an actor can issue. Used as
    /// the "no gate" bound when deleting locally.
    #[must_use]
    pub fn max() -> Self {
        Self::new(u64::MAX, u32::MAX, ActorId([u8::MAX; ACTOR_ID_LEN]))
    }

    /// Lamport component.
    #[must_use]
    pub fn lamport(&self) -> u64 {
        self.lamport
    }

    /// Delimiter component.
    #[must_use]
    pub fn delimiter(&self) -> u32 {
        self.delimiter
    }

    /// The actor that issued this ticket.
    #[must_use]
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Whether this ticket sorts strictly after `other`.
    #[must_use]
    pub fn after(&self, other: &Ticket) -> bool {
        self > other
    }
}

impl PartialOrd for Ticket {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ticket {
    fn cmp(&self, other: &Self) -> Ordering {
        self.lamport
            .cmp(&other.lamport)
            .then(self.delimiter.cmp(&other.delimiter))
            .then(self.actor.cmp(&other.actor))
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.lamport, self.delimiter, self.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(byte: u8) -> ActorId {
        ActorId::from_bytes([byte; ACTOR_ID_LEN])
    }

    #[test]
    fn test_actor_id_hex_round_trip() {
        let id = actor(0xab);
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(ActorId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_actor_id_rejects_bad_hex() {
        assert!(ActorId::from_hex("zz").is_err());
        assert!(ActorId::from_hex("abcd").is_err()); // too short
    }

    #[test]
    fn test_initial_actor_is_zero() {
        assert!(ActorId::INITIAL.is_initial());
        assert_eq!(ActorId::INITIAL.to_hex(), "000000000000000000000000");
    }

    #[test]
    fn test_ticket_ordering() {
        let a = actor(1);
        let b = actor(2);

        let t1 = Ticket::new(1, 0, a);
        let t2 = Ticket::new(1, 1, a);
        let t3 = Ticket::new(2, 0, a);
        let t4 = Ticket::new(1, 0, b);

        assert!(t1 < t2);
        assert!(t2 < t3);
        // Same lamport and delimiter: actor bytes break the tie.
        assert!(t1 < t4);
        assert!(t4.after(&t1));
    }

    #[test]
    fn test_initial_ticket_sorts_below_everything() {
        let initial = Ticket::initial();
        let smallest_real = Ticket::new(1, 0, ActorId::INITIAL);
        assert!(initial < smallest_real);
        assert!(initial < Ticket::max());
    }

    #[test]
    fn test_ticket_serde_round_trip() {
        let t = Ticket::new(7, 3, actor(9));
        let json = serde_json::to_string(&t).unwrap();
        let back: Ticket = serde_json::from_str(&json).unwrap();
        assert_eq!(t, back);
    }
}
