//! In-memory reference implementation of [`Document`].
//!
//! Transactions snapshot the whole entity table on begin and restore it on
//! rollback. Good enough for tests and for hosting small graphs without a
//! database.

use std::collections::{BTreeMap, BTreeSet};

use crate::document::{ChangeSet, CreateRequest, Document, EntityRecord};
use crate::error::DocumentError;
use crate::geometry::Geometry;
use crate::ids::{DocumentId, EntityId};
use crate::kind::EntityKind;
use crate::naming::names_equal;
use crate::value::AttributeValue;

#[derive(Clone)]
struct Snapshot {
    entities: BTreeMap<EntityId, EntityRecord>,
    dependents: BTreeMap<EntityId, BTreeSet<EntityId>>,
    next_id: i64,
    mutations: u64,
}

pub struct MemoryDocument {
    id: DocumentId,
    entities: BTreeMap<EntityId, EntityRecord>,
    /// host -> entities that cannot exist without it
    dependents: BTreeMap<EntityId, BTreeSet<EntityId>>,
    /// (kind, type name) -> family
    types: BTreeMap<(EntityKind, String), String>,
    next_id: i64,
    mutations: u64,
    transaction: Option<(String, Snapshot)>,
    pending: ChangeSet,
    committed: Vec<ChangeSet>,
}

impl MemoryDocument {
    pub fn new() -> Self {
        let mut types = BTreeMap::new();
        for kind in EntityKind::ALL {
            for (name, family) in kind.default_types() {
                types.insert((kind, name.to_string()), family.to_string());
            }
        }
        Self {
            id: DocumentId::new(),
            entities: BTreeMap::new(),
            dependents: BTreeMap::new(),
            types,
            next_id: 1,
            mutations: 0,
            transaction: None,
            pending: ChangeSet::default(),
            committed: Vec::new(),
        }
    }

    /// Total successful mutating calls, rolled back ones excluded.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityRecord> {
        self.entities.values()
    }

    pub fn add_type(&mut self, kind: EntityKind, name: &str, family: &str) {
        self.types
            .insert((kind, name.to_string()), family.to_string());
    }

    /// Make `dependent` block deletion of `host`.
    pub fn add_dependent(&mut self, host: EntityId, dependent: EntityId) {
        self.dependents.entry(host).or_default().insert(dependent);
    }

    fn require_transaction(&self) -> Result<(), DocumentError> {
        if self.transaction.is_none() {
            return Err(DocumentError::Transaction(
                "document modification outside of a transaction".to_string(),
            ));
        }
        Ok(())
    }

    fn record_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord, DocumentError> {
        self.require_transaction()?;
        self.entities.get_mut(&id).ok_or(DocumentError::NotFound(id))
    }

    fn touched(&mut self, id: EntityId) {
        self.mutations += 1;
        self.pending.record_modified(id);
    }

    fn name_taken(&self, kind: EntityKind, category: &str, name: &str, except: EntityId) -> bool {
        self.entities.values().any(|e| {
            e.id != except && e.kind == kind && e.category == category && names_equal(&e.name, name)
        })
    }
}

impl Default for MemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl Document for MemoryDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn entity(&self, id: EntityId) -> Option<EntityRecord> {
        self.entities.get(&id).cloned()
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    fn create_entity(
        &mut self,
        kind: EntityKind,
        request: &CreateRequest,
    ) -> Result<EntityId, DocumentError> {
        self.require_transaction()?;
        kind.check_geometry(&request.geometry)?;

        let type_name = match &request.type_name {
            Some(name) => name.clone(),
            None => kind
                .default_types()
                .first()
                .map(|(name, _)| name.to_string())
                .ok_or_else(|| {
                    DocumentError::ConstraintViolation(format!("no default type for {kind}"))
                })?,
        };
        let family = self.type_family(kind, &type_name).ok_or_else(|| {
            DocumentError::ConstraintViolation(format!("unknown {kind} type '{type_name}'"))
        })?;

        for attribute in request.attributes.keys() {
            kind.check_writable(attribute)?;
        }

        let id = EntityId(self.next_id);
        self.next_id += 1;
        let category = request
            .category
            .clone()
            .unwrap_or_else(|| kind.default_category().to_string());

        self.entities.insert(
            id,
            EntityRecord {
                id,
                kind,
                category,
                // placeholder until the engine assigns the resolved name
                name: format!("{}-{}", kind, id.0),
                type_name,
                family,
                geometry: request.geometry.clone(),
                attributes: request.attributes.clone(),
                pinned: false,
            },
        );
        self.mutations += 1;
        self.pending.record_added(id);
        Ok(id)
    }

    fn edit_geometry(&mut self, id: EntityId, geometry: &Geometry) -> Result<(), DocumentError> {
        let record = self.record_mut(id)?;
        record.kind.check_geometry(geometry)?;
        if record.geometry.segment_count() != geometry.segment_count() {
            return Err(DocumentError::ConstraintViolation(format!(
                "cannot edit {} segments into {} in place",
                record.geometry.segment_count(),
                geometry.segment_count()
            )));
        }
        record.geometry = geometry.clone();
        self.touched(id);
        Ok(())
    }

    fn change_type(&mut self, id: EntityId, type_name: &str) -> Result<(), DocumentError> {
        self.require_transaction()?;
        let kind = self
            .entities
            .get(&id)
            .map(|e| e.kind)
            .ok_or(DocumentError::NotFound(id))?;
        let family = self.type_family(kind, type_name).ok_or_else(|| {
            DocumentError::ConstraintViolation(format!("unknown {kind} type '{type_name}'"))
        })?;
        let record = self.record_mut(id)?;
        if record.family != family {
            return Err(DocumentError::ConstraintViolation(format!(
                "type '{type_name}' belongs to family '{family}', not '{}'",
                record.family
            )));
        }
        record.type_name = type_name.to_string();
        self.touched(id);
        Ok(())
    }

    fn delete_entity(&mut self, id: EntityId) -> Result<(), DocumentError> {
        self.require_transaction()?;
        if !self.entities.contains_key(&id) {
            return Err(DocumentError::NotFound(id));
        }
        let blocked = self
            .dependents
            .get(&id)
            .is_some_and(|deps| deps.iter().any(|d| self.entities.contains_key(d)));
        if blocked {
            return Err(DocumentError::HasIrremovableDependents(id));
        }
        self.entities.remove(&id);
        self.dependents.remove(&id);
        self.mutations += 1;
        self.pending.record_deleted(id);
        Ok(())
    }

    fn set_attribute(
        &mut self,
        id: EntityId,
        attribute: &str,
        value: AttributeValue,
    ) -> Result<(), DocumentError> {
        let record = self.record_mut(id)?;
        record.kind.check_writable(attribute)?;
        record.attributes.insert(attribute.to_string(), value);
        self.touched(id);
        Ok(())
    }

    fn set_name(&mut self, id: EntityId, name: &str) -> Result<(), DocumentError> {
        let record = self.record_mut(id)?;
        let (kind, category) = (record.kind, record.category.clone());
        if name.trim().is_empty() {
            return Err(DocumentError::ConstraintViolation(
                "name cannot be empty".to_string(),
            ));
        }
        if self.name_taken(kind, &category, name, id) {
            return Err(DocumentError::ConstraintViolation(format!(
                "name '{name}' is already in use"
            )));
        }
        if let Some(record) = self.entities.get_mut(&id) {
            record.name = name.to_string();
        }
        self.touched(id);
        Ok(())
    }

    fn set_pinned(&mut self, id: EntityId, pinned: bool) -> Result<(), DocumentError> {
        let record = self.record_mut(id)?;
        record.pinned = pinned;
        self.touched(id);
        Ok(())
    }

    fn names_in_scope(&self, kind: EntityKind, category: &str) -> Vec<(EntityId, String)> {
        self.entities
            .values()
            .filter(|e| e.kind == kind && e.category == category)
            .map(|e| (e.id, e.name.clone()))
            .collect()
    }

    fn type_family(&self, kind: EntityKind, type_name: &str) -> Option<String> {
        self.types.get(&(kind, type_name.to_string())).cloned()
    }

    fn begin_transaction(&mut self, name: &str) -> Result<(), DocumentError> {
        if let Some((open, _)) = &self.transaction {
            return Err(DocumentError::Transaction(format!(
                "cannot start '{name}' while '{open}' is open"
            )));
        }
        let snapshot = Snapshot {
            entities: self.entities.clone(),
            dependents: self.dependents.clone(),
            next_id: self.next_id,
            mutations: self.mutations,
        };
        self.transaction = Some((name.to_string(), snapshot));
        self.pending = ChangeSet::default();
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), DocumentError> {
        if self.transaction.take().is_none() {
            return Err(DocumentError::Transaction(
                "no open transaction to commit".to_string(),
            ));
        }
        let changes = std::mem::take(&mut self.pending);
        if !changes.is_empty() {
            self.committed.push(changes);
        }
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), DocumentError> {
        let (_, snapshot) = self.transaction.take().ok_or_else(|| {
            DocumentError::Transaction("no open transaction to roll back".to_string())
        })?;
        self.entities = snapshot.entities;
        self.dependents = snapshot.dependents;
        // ids handed out inside the rolled back transaction stay burned
        self.next_id = self.next_id.max(snapshot.next_id);
        self.mutations = snapshot.mutations;
        self.pending = ChangeSet::default();
        Ok(())
    }

    fn take_changes(&mut self) -> Option<ChangeSet> {
        let mut merged: Option<ChangeSet> = None;
        for changes in self.committed.drain(..) {
            match merged.as_mut() {
                Some(m) => m.merge(changes),
                None => merged = Some(changes),
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    fn square() -> Geometry {
        Geometry::Profile(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 0.0, 0.0),
            Point::new(10.0, 10.0, 0.0),
            Point::new(0.0, 10.0, 0.0),
        ])
    }

    fn floor_request() -> CreateRequest {
        CreateRequest {
            category: None,
            type_name: None,
            geometry: square(),
            attributes: Default::default(),
        }
    }

    #[test]
    fn test_mutation_requires_transaction() {
        let mut doc = MemoryDocument::new();
        let err = doc
            .create_entity(EntityKind::Floor, &floor_request())
            .unwrap_err();
        assert!(matches!(err, DocumentError::Transaction(_)));
    }

    #[test]
    fn test_create_and_notify() {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        let record = doc.entity(id).unwrap();
        assert_eq!(record.type_name, "Basic");
        assert_eq!(record.family, "Floor");
        assert_eq!(record.category, "Floors");

        let changes = doc.take_changes().unwrap();
        assert!(changes.added.contains(&id));
        assert!(doc.take_changes().is_none());
    }

    #[test]
    fn test_rollback_restores_state() {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        doc.take_changes();
        let before = doc.mutation_count();

        let result: Result<(), DocumentError> = doc.edit("fail", |d| {
            d.delete_entity(id)?;
            Err(DocumentError::ConstraintViolation("boom".into()))
        });
        assert!(result.is_err());
        assert!(doc.is_valid(id));
        assert_eq!(doc.mutation_count(), before);
        assert!(doc.take_changes().is_none());
    }

    #[test]
    fn test_ids_not_reused_after_rollback() {
        let mut doc = MemoryDocument::new();
        doc.begin_transaction("a").unwrap();
        let first = doc.create_entity(EntityKind::Floor, &floor_request()).unwrap();
        doc.rollback_transaction().unwrap();
        let second = doc
            .edit("b", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_dependents_block_deletion() {
        let mut doc = MemoryDocument::new();
        let (host, child) = doc
            .edit("create", |d| {
                Ok((
                    d.create_entity(EntityKind::Floor, &floor_request())?,
                    d.create_entity(EntityKind::Floor, &floor_request())?,
                ))
            })
            .unwrap();
        doc.add_dependent(host, child);
        let err = doc.edit("delete", |d| d.delete_entity(host)).unwrap_err();
        assert_eq!(err, DocumentError::HasIrremovableDependents(host));
    }

    #[test]
    fn test_type_change_across_family_rejected() {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        assert!(doc.edit("t", |d| d.change_type(id, "Generic 300mm")).is_ok());
        let err = doc
            .edit("t", |d| d.change_type(id, "Foundation Slab"))
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_names_unique_per_scope() {
        let mut doc = MemoryDocument::new();
        let (a, b) = doc
            .edit("create", |d| {
                Ok((
                    d.create_entity(EntityKind::Floor, &floor_request())?,
                    d.create_entity(EntityKind::Floor, &floor_request())?,
                ))
            })
            .unwrap();
        doc.edit("name", |d| d.set_name(a, "Floor")).unwrap();
        let err = doc.edit("name", |d| d.set_name(b, "floor")).unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_read_only_attribute_rejected() {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        let err = doc
            .edit("set", |d| d.set_attribute(id, "area", AttributeValue::Double(1.0)))
            .unwrap_err();
        assert!(matches!(err, DocumentError::ReadOnlyAttribute { .. }));
        let area = doc.get_attribute(id, "area").unwrap().unwrap();
        assert_eq!(area.as_f64(), Some(100.0));
    }

    #[test]
    fn test_segment_count_change_rejected_in_place() {
        let mut doc = MemoryDocument::new();
        let id = doc
            .edit("create", |d| d.create_entity(EntityKind::Floor, &floor_request()))
            .unwrap();
        let triangle = Geometry::Profile(vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(10.0, 0.0, 0.0),
            Point::new(0.0, 10.0, 0.0),
        ]);
        let err = doc
            .edit("edit", |d| d.edit_geometry(id, &triangle))
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }
}
