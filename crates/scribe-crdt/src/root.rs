//! Document root: the element table and JSON projection.
//!
//! Every element ever created is registered here under its creation ticket so
//! operations can address their targets directly. Elements that become
//! unreachable from the root object (shadowed object values, tombstones whose
//! parents are gone) are garbage but deliberately retained: concurrent
//! operations may still reference them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::clock::Ticket;
use crate::element::{Element, ElementData};
use crate::error::CrdtError;
use crate::object::Object;

/// The element table plus the root object's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Root {
    root_created: Ticket,
    #[serde(with = "ticket_table")]
    elements: HashMap<Ticket, Element>,
}

impl Root {
    /// Create a root holding a single empty object at the initial ticket.
    #[must_use]
    pub fn new() -> Self {
        let root_created = Ticket::initial();
        let mut elements = HashMap::new();
        elements.insert(
            root_created,
            Element::new(root_created, ElementData::Object(Object::new())),
        );
        Self {
            root_created,
            elements,
        }
    }

    /// Creation ticket of the root object.
    #[must_use]
    pub fn created(&self) -> Ticket {
        self.root_created
    }

    /// Register a freshly created element. Re-registering the same ticket is
    /// a no-op so replayed creations cannot reset element state.
    pub fn register(&mut self, element: Element) {
        self.elements.entry(element.created_at()).or_insert(element);
    }

    /// Whether an element with this creation ticket exists.
    #[must_use]
    pub fn contains(&self, created_at: Ticket) -> bool {
        self.elements.contains_key(&created_at)
    }

    /// Look up an element.
    pub fn element(&self, created_at: Ticket) -> Result<&Element, CrdtError> {
        self.elements
            .get(&created_at)
            .ok_or(CrdtError::ElementNotFound(created_at))
    }

    /// Look up an element mutably.
    pub fn element_mut(&mut self, created_at: Ticket) -> Result<&mut Element, CrdtError> {
        self.elements
            .get_mut(&created_at)
            .ok_or(CrdtError::ElementNotFound(created_at))
    }

    /// Number of registered elements, live or garbage.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// JSON projection of the visible document state.
    #[must_use]
    pub fn marshal(&self) -> serde_json::Value {
        self.marshal_element(self.root_created)
            .unwrap_or(serde_json::Value::Null)
    }

    /// Deep-copy the root, rebuilding text elements run by run so their
    /// insertion links are verified along the way.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        let mut copy = self.clone();
        for element in copy.elements.values_mut() {
            if let ElementData::Text(text) = element.data_mut() {
                *text = text.deep_copy();
            }
        }
        copy
    }

    /// Rebuild derived lookups after deserialization.
    pub fn rebuild_indexes(&mut self) {
        for element in self.elements.values_mut() {
            match element.data_mut() {
                ElementData::Text(text) => text.rebuild_index(),
                ElementData::Array(array) => array.rebuild_index(),
                _ => {}
            }
        }
    }

    fn marshal_element(&self, created_at: Ticket) -> Option<serde_json::Value> {
        let element = self.elements.get(&created_at)?;
        let value = match element.data() {
            ElementData::Primitive(p) => p.to_json(),
            ElementData::Counter(c) => c.value().to_json(),
            ElementData::Text(t) => serde_json::Value::from(t.content()),
            ElementData::Object(object) => {
                let mut map = serde_json::Map::new();
                for (key, ticket) in object.members() {
                    let child = self.elements.get(&ticket)?;
                    if child.is_removed() {
                        continue;
                    }
                    if let Some(value) = self.marshal_element(ticket) {
                        map.insert(key.to_string(), value);
                    }
                }
                serde_json::Value::Object(map)
            }
            ElementData::Array(array) => {
                let mut items = Vec::new();
                for ticket in array.elements() {
                    let child = self.elements.get(&ticket)?;
                    if child.is_removed() {
                        continue;
                    }
                    if let Some(value) = self.marshal_element(ticket) {
                        items.push(value);
                    }
                }
                serde_json::Value::Array(items)
            }
        };
        Some(value)
    }
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize the element table as a sequence of entries: tickets are structs
/// and cannot be JSON object keys.
mod ticket_table {
    use super::*;
    use serde::ser::SerializeSeq;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        map: &HashMap<Ticket, Element>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(map.len()))?;
        for entry in map {
            seq.serialize_element(&entry)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<HashMap<Ticket, Element>, D::Error> {
        let entries = Vec::<(Ticket, Element)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ActorId, ACTOR_ID_LEN};
    use crate::value::Primitive;

    fn ticket(lamport: u64, actor_byte: u8) -> Ticket {
        Ticket::new(lamport, 0, ActorId::from_bytes([actor_byte; ACTOR_ID_LEN]))
    }

    #[test]
    fn test_root_starts_as_empty_object() {
        let root = Root::new();
        assert_eq!(root.marshal(), serde_json::json!({}));
    }

    #[test]
    fn test_register_and_marshal() {
        let mut root = Root::new();
        let t1 = ticket(1, 1);
        root.register(Element::new(
            t1,
            ElementData::Primitive(Primitive::from("v")),
        ));
        root.element_mut(root.created())
            .unwrap()
            .as_object_mut()
            .unwrap()
            .set("k", t1);

        assert_eq!(root.marshal(), serde_json::json!({"k": "v"}));
    }

    #[test]
    fn test_removed_elements_are_hidden_but_retained() {
        let mut root = Root::new();
        let t1 = ticket(1, 1);
        root.register(Element::new(
            t1,
            ElementData::Primitive(Primitive::from("v")),
        ));
        root.element_mut(root.created())
            .unwrap()
            .as_object_mut()
            .unwrap()
            .set("k", t1);

        root.element_mut(t1).unwrap().remove(ticket(2, 1));
        assert_eq!(root.marshal(), serde_json::json!({}));
        assert!(root.contains(t1));
    }

    #[test]
    fn test_replayed_register_keeps_state() {
        let mut root = Root::new();
        let t1 = ticket(1, 1);
        root.register(Element::new(
            t1,
            ElementData::Primitive(Primitive::from("first")),
        ));
        root.register(Element::new(
            t1,
            ElementData::Primitive(Primitive::from("second")),
        ));

        match root.element(t1).unwrap().data() {
            ElementData::Primitive(Primitive::String(s)) => assert_eq!(s, "first"),
            other => panic!("unexpected element data: {other:?}"),
        }
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut root = Root::new();
        let t1 = ticket(1, 1);
        root.register(Element::new(
            t1,
            ElementData::Primitive(Primitive::from(42i32)),
        ));
        root.element_mut(root.created())
            .unwrap()
            .as_object_mut()
            .unwrap()
            .set("n", t1);

        let bytes = serde_json::to_vec(&root).unwrap();
        let mut back: Root = serde_json::from_slice(&bytes).unwrap();
        back.rebuild_indexes();
        assert_eq!(back.marshal(), root.marshal());
    }
}
