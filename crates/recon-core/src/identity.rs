//! Identity store: (owner node, output slot, document) -> bound entity.
//!
//! Bindings are plain ids. Validity is never cached: `read` asks the live
//! document every call, so an entity deleted behind the engine's back just
//! reads as unbound.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::ids::{DocumentId, EntityId, NodeId, SlotKey};

/// One persisted binding.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedSlot {
    pub node: NodeId,
    pub slot: String,
    pub document: DocumentId,
    pub entity: EntityId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityStore {
    bindings: BTreeMap<SlotKey, EntityId>,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_slots(slots: impl IntoIterator<Item = TrackedSlot>) -> Self {
        let bindings = slots
            .into_iter()
            .map(|s| (SlotKey::new(s.node, s.slot, s.document), s.entity))
            .collect();
        Self { bindings }
    }

    /// Bound entity if it is still alive in `document`.
    pub fn read(&self, key: &SlotKey, document: &dyn Document) -> Option<EntityId> {
        let id = *self.bindings.get(key)?;
        if key.document == document.id() && document.is_valid(id) {
            Some(id)
        } else {
            None
        }
    }

    /// Raw binding, alive or not.
    pub fn bound(&self, key: &SlotKey) -> Option<EntityId> {
        self.bindings.get(key).copied()
    }

    /// Bind `key`, replacing any previous binding. Returns the previous one.
    pub fn write(&mut self, key: SlotKey, entity: EntityId) -> Option<EntityId> {
        self.bindings.insert(key, entity)
    }

    pub fn clear(&mut self, key: &SlotKey) -> Option<EntityId> {
        self.bindings.remove(key)
    }

    /// Put back a binding captured before a rolled back write.
    pub fn restore(&mut self, key: SlotKey, previous: Option<EntityId>) {
        match previous {
            Some(id) => {
                self.bindings.insert(key, id);
            }
            None => {
                self.bindings.remove(&key);
            }
        }
    }

    /// Ids bound to any slot of `node`, including ones already deleted.
    pub fn tracked_ids(&self, node: &NodeId, document: DocumentId) -> BTreeSet<EntityId> {
        self.bindings
            .iter()
            .filter(|(k, _)| &k.node == node && k.document == document)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Key bound to `entity`, if any.
    pub fn owner_of(&self, entity: EntityId, document: DocumentId) -> Option<&SlotKey> {
        self.bindings
            .iter()
            .find(|(k, id)| **id == entity && k.document == document)
            .map(|(k, _)| k)
    }

    pub fn slots(&self) -> impl Iterator<Item = TrackedSlot> + '_ {
        self.bindings.iter().map(|(k, id)| TrackedSlot {
            node: k.node.clone(),
            slot: k.slot.clone(),
            document: k.document,
            entity: *id,
        })
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::CreateRequest;
    use crate::geometry::Geometry;
    use crate::kind::EntityKind;
    use crate::memory::MemoryDocument;

    fn level(doc: &mut MemoryDocument) -> EntityId {
        doc.edit("create", |d| {
            d.create_entity(
                EntityKind::Level,
                &CreateRequest {
                    category: None,
                    type_name: None,
                    geometry: Geometry::Elevation(0.0),
                    attributes: Default::default(),
                },
            )
        })
        .unwrap()
    }

    #[test]
    fn test_read_revalidates_against_document() {
        let mut doc = MemoryDocument::new();
        let id = level(&mut doc);
        let key = SlotKey::new(NodeId::new("n"), "Level", doc.id());
        let mut store = IdentityStore::new();
        assert_eq!(store.write(key.clone(), id), None);
        assert_eq!(store.read(&key, &doc), Some(id));

        doc.edit("delete", |d| d.delete_entity(id)).unwrap();
        assert_eq!(store.read(&key, &doc), None);
        // the binding itself survives until rebound
        assert_eq!(store.bound(&key), Some(id));
    }

    #[test]
    fn test_read_ignores_other_document() {
        let mut doc = MemoryDocument::new();
        let id = level(&mut doc);
        let other = MemoryDocument::new();
        let key = SlotKey::new(NodeId::new("n"), "Level", other.id());
        let mut store = IdentityStore::new();
        store.write(key.clone(), id);
        assert_eq!(store.read(&key, &doc), None);
    }

    #[test]
    fn test_write_replaces_single_binding() {
        let doc = DocumentId::new();
        let key = SlotKey::new(NodeId::new("n"), "Grid", doc);
        let mut store = IdentityStore::new();
        store.write(key.clone(), EntityId(1));
        assert_eq!(store.write(key.clone(), EntityId(2)), Some(EntityId(1)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.tracked_ids(&NodeId::new("n"), doc), BTreeSet::from([EntityId(2)]));

        store.restore(key.clone(), Some(EntityId(1)));
        assert_eq!(store.bound(&key), Some(EntityId(1)));
        store.restore(key.clone(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_slots_round_trip() {
        let doc = DocumentId::new();
        let mut store = IdentityStore::new();
        store.write(SlotKey::new(NodeId::new("a"), "Floor", doc), EntityId(3));
        store.write(SlotKey::new(NodeId::new("b"), "Grid", doc), EntityId(4));
        let rebuilt = IdentityStore::from_slots(store.slots().collect::<Vec<_>>());
        assert_eq!(rebuilt, store);
        assert_eq!(
            rebuilt.owner_of(EntityId(4), doc).map(|k| k.node.as_str()),
            Some("b")
        );
    }
}
