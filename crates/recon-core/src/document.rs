//! Host document interface consumed by the engine.
//!
//! The document owns entity lifetime. The engine only holds `EntityId`s
//! and re-reads records through this trait every time it needs them.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::geometry::Geometry;
use crate::ids::{DocumentId, EntityId};
use crate::kind::EntityKind;
use crate::value::{AttributeValue, Attributes};

/// Snapshot of an entity as the document currently stores it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,
    pub category: String,
    pub name: String,
    pub type_name: String,
    pub family: String,
    pub geometry: Geometry,
    /// Explicitly set writable attributes. Computed ones are derived on read.
    pub attributes: Attributes,
    pub pinned: bool,
}

impl EntityRecord {
    /// Attribute value including computed and identity attributes.
    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        match (self.kind, name) {
            (_, "type") => Some(AttributeValue::Text(self.type_name.clone())),
            (_, "family") => Some(AttributeValue::Text(self.family.clone())),
            (EntityKind::Floor, "area") => Some(AttributeValue::Double(self.geometry.area())),
            (EntityKind::Level, "elevation") => {
                Some(AttributeValue::Double(self.geometry.min_z()))
            }
            _ => self.attributes.get(name).cloned(),
        }
    }
}

/// Everything needed to create an entity in one document call.
#[derive(Clone, Debug, PartialEq)]
pub struct CreateRequest {
    pub category: Option<String>,
    pub type_name: Option<String>,
    pub geometry: Geometry,
    pub attributes: Attributes,
}

/// Entities added, modified and deleted by one or more committed
/// transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: BTreeSet<EntityId>,
    pub modified: BTreeSet<EntityId>,
    pub deleted: BTreeSet<EntityId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn record_added(&mut self, id: EntityId) {
        self.added.insert(id);
    }

    /// A modification of an entity added in the same set is folded into the add.
    pub fn record_modified(&mut self, id: EntityId) {
        if !self.added.contains(&id) {
            self.modified.insert(id);
        }
    }

    /// An entity added and deleted in the same set was never observable.
    pub fn record_deleted(&mut self, id: EntityId) {
        self.modified.remove(&id);
        if !self.added.remove(&id) {
            self.deleted.insert(id);
        }
    }

    /// Fold a later set into this one. Unlike `record_deleted`, a deletion
    /// of an entity added by an earlier set is kept: observers may already
    /// hold its id.
    pub fn merge(&mut self, other: ChangeSet) {
        for id in other.added {
            self.record_added(id);
        }
        for id in other.modified {
            self.record_modified(id);
        }
        for id in other.deleted {
            self.added.remove(&id);
            self.modified.remove(&id);
            self.deleted.insert(id);
        }
    }
}

/// Mutation primitives of the host document.
///
/// Every mutating call must happen inside `begin_transaction` /
/// `commit_transaction`. The API is not reentrant: one open transaction at
/// a time, driven from a single thread.
pub trait Document {
    fn id(&self) -> DocumentId;

    /// Live record, `None` once the entity has been deleted.
    fn entity(&self, id: EntityId) -> Option<EntityRecord>;

    /// Like `entity`, but a backend failure is reported instead of read as
    /// a missing entity.
    fn try_entity(&self, id: EntityId) -> Result<Option<EntityRecord>, DocumentError> {
        Ok(self.entity(id))
    }

    fn is_valid(&self, id: EntityId) -> bool {
        self.entity(id).is_some()
    }

    fn create_entity(
        &mut self,
        kind: EntityKind,
        request: &CreateRequest,
    ) -> Result<EntityId, DocumentError>;

    /// Replace the defining geometry in place. Rejected with a
    /// `ConstraintViolation` when the topology has no in-place edit.
    fn edit_geometry(&mut self, id: EntityId, geometry: &Geometry) -> Result<(), DocumentError>;

    fn change_type(&mut self, id: EntityId, type_name: &str) -> Result<(), DocumentError>;

    fn delete_entity(&mut self, id: EntityId) -> Result<(), DocumentError>;

    fn get_attribute(
        &self,
        id: EntityId,
        attribute: &str,
    ) -> Result<Option<AttributeValue>, DocumentError> {
        let record = self.entity(id).ok_or(DocumentError::NotFound(id))?;
        Ok(record.attribute(attribute))
    }

    fn set_attribute(
        &mut self,
        id: EntityId,
        attribute: &str,
        value: AttributeValue,
    ) -> Result<(), DocumentError>;

    /// Rename. Names are unique per (kind, category); a taken name is a
    /// `ConstraintViolation`.
    fn set_name(&mut self, id: EntityId, name: &str) -> Result<(), DocumentError>;

    fn set_pinned(&mut self, id: EntityId, pinned: bool) -> Result<(), DocumentError>;

    /// Current names in the (kind, category) namespace.
    fn names_in_scope(&self, kind: EntityKind, category: &str) -> Vec<(EntityId, String)>;

    /// Family of a known type, `None` if the document has no such type.
    fn type_family(&self, kind: EntityKind, type_name: &str) -> Option<String>;

    fn begin_transaction(&mut self, name: &str) -> Result<(), DocumentError>;

    fn commit_transaction(&mut self) -> Result<(), DocumentError>;

    fn rollback_transaction(&mut self) -> Result<(), DocumentError>;

    /// Drain change notifications accumulated by committed transactions.
    fn take_changes(&mut self) -> Option<ChangeSet>;

    /// Open, run and commit a transaction; roll back if `f` fails.
    fn edit<T>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Self) -> Result<T, DocumentError>,
    ) -> Result<T, DocumentError>
    where
        Self: Sized,
    {
        self.begin_transaction(name)?;
        match f(self) {
            Ok(value) => {
                self.commit_transaction()?;
                Ok(value)
            }
            Err(e) => {
                self.rollback_transaction()?;
                Err(e)
            }
        }
    }
}
