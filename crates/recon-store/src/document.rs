//! SQLite-backed host document.
//!
//! One node transaction maps onto one SQLite savepoint. Committed change
//! sets are appended to `change_log` inside the same savepoint, so other
//! processes (the CLI's edit commands) and later sessions see them.

use std::path::Path;

use recon_core::naming::names_equal;
use recon_core::{
    AttributeValue, Attributes, ChangeSet, CreateRequest, Document, DocumentError, DocumentId, EntityId,
    EntityKind, EntityRecord, Geometry, IdentityStore, TrackedSlot,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::error::{Result, StoreError};
use crate::schema;

const SAVEPOINT: &str = "recon_edit";

pub struct SqliteDocument {
    conn: Connection,
    id: DocumentId,
    /// Name of the open transaction, if any.
    transaction: Option<String>,
    pending: ChangeSet,
    /// Label stored with change log rows, e.g. "engine" or "user".
    source: String,
}

fn to_store(e: rusqlite::Error) -> DocumentError {
    StoreError::from(e).into()
}

const ENTITY_COLUMNS: &str =
    "SELECT id, kind, category, name, type_name, family, geometry, pinned FROM entities";

/// Raw `entities` row before attributes are attached.
struct EntityRow {
    id: i64,
    kind: String,
    category: String,
    name: String,
    type_name: String,
    family: String,
    geometry: String,
    pinned: bool,
}

impl EntityRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            category: row.get(2)?,
            name: row.get(3)?,
            type_name: row.get(4)?,
            family: row.get(5)?,
            geometry: row.get(6)?,
            pinned: row.get::<_, i64>(7)? != 0,
        })
    }
}

impl SqliteDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        let id = schema::document_id(&conn)?;
        Ok(Self {
            conn,
            id,
            transaction: None,
            pending: ChangeSet::default(),
            source: "engine".to_string(),
        })
    }

    /// Label change log rows written from now on.
    pub fn set_source(&mut self, source: &str) {
        self.source = source.to_string();
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    fn load_entity(&self, id: EntityId) -> Result<Option<EntityRecord>> {
        let row = self
            .conn
            .query_row(
                &format!("{ENTITY_COLUMNS} WHERE id = ?1"),
                [id.0],
                EntityRow::from_row,
            )
            .optional()?;
        match row {
            Some(row) => Ok(Some(self.build_record(row)?)),
            None => Ok(None),
        }
    }

    fn build_record(&self, row: EntityRow) -> Result<EntityRecord> {
        let kind: EntityKind = row.kind.parse().map_err(StoreError::InvalidData)?;
        let geometry: Geometry = serde_json::from_str(&row.geometry)?;

        let mut stmt = self
            .conn
            .prepare("SELECT name, value FROM attributes WHERE entity_id = ?1")?;
        let values: Vec<(String, String)> = stmt
            .query_map([row.id], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<std::result::Result<_, _>>()?;
        let mut attributes = Attributes::new();
        for (attr, value) in values {
            attributes.insert(attr, serde_json::from_str::<AttributeValue>(&value)?);
        }

        Ok(EntityRecord {
            id: EntityId(row.id),
            kind,
            category: row.category,
            name: row.name,
            type_name: row.type_name,
            family: row.family,
            geometry,
            attributes,
            pinned: row.pinned,
        })
    }

    /// Every entity, ordered by id.
    pub fn entities(&self) -> Result<Vec<EntityRecord>> {
        let mut stmt = self.conn.prepare(&format!("{ENTITY_COLUMNS} ORDER BY id"))?;
        let rows: Vec<EntityRow> = stmt
            .query_map([], EntityRow::from_row)?
            .collect::<std::result::Result<_, _>>()?;
        rows.into_iter().map(|row| self.build_record(row)).collect()
    }

    /// Make `dependent` block deletion of `host`.
    pub fn add_dependent(&self, host: EntityId, dependent: EntityId) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO dependents (host_id, dependent_id) VALUES (?1, ?2)",
            params![host.0, dependent.0],
        )?;
        Ok(())
    }

    /// Number of change log rows not yet handed out by `take_changes`.
    pub fn pending_change_count(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM change_log WHERE consumed = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // --- Identity bindings ---

    pub fn load_bindings(&self) -> Result<IdentityStore> {
        let mut stmt = self.conn.prepare(
            "SELECT node, slot, entity_id FROM tracked_slots WHERE document = ?1
             ORDER BY node, slot",
        )?;
        let slots: Vec<TrackedSlot> = stmt
            .query_map([self.id.to_string()], |row| {
                Ok(TrackedSlot {
                    node: recon_core::NodeId(row.get(0)?),
                    slot: row.get(1)?,
                    document: self.id,
                    entity: EntityId(row.get(2)?),
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(IdentityStore::from_slots(slots))
    }

    /// Replace this document's persisted bindings with `identity`'s.
    pub fn save_bindings(&self, identity: &IdentityStore) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM tracked_slots WHERE document = ?1",
            [self.id.to_string()],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO tracked_slots (node, slot, document, entity_id)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for slot in identity.slots().filter(|s| s.document == self.id) {
                insert.execute(params![
                    slot.node.as_str(),
                    slot.slot,
                    slot.document.to_string(),
                    slot.entity.0
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // --- Internals ---

    fn require_transaction(&self) -> std::result::Result<(), DocumentError> {
        if self.transaction.is_none() {
            return Err(DocumentError::Transaction(
                "document modification outside of a transaction".to_string(),
            ));
        }
        Ok(())
    }

    fn require_entity(&self, id: EntityId) -> std::result::Result<EntityRecord, DocumentError> {
        self.require_transaction()?;
        self.load_entity(id)?.ok_or(DocumentError::NotFound(id))
    }

    fn write_attribute(
        &self,
        id: EntityId,
        attribute: &str,
        value: &AttributeValue,
    ) -> std::result::Result<(), DocumentError> {
        let json = serde_json::to_string(value).map_err(StoreError::from)?;
        self.conn
            .execute(
                "INSERT OR REPLACE INTO attributes (entity_id, name, value) VALUES (?1, ?2, ?3)",
                params![id.0, attribute, json],
            )
            .map_err(to_store)?;
        Ok(())
    }

    fn write_change_log(&self, changes: &ChangeSet) -> Result<()> {
        let mut insert = self
            .conn
            .prepare("INSERT INTO change_log (entity_id, change, source) VALUES (?1, ?2, ?3)")?;
        for (ids, change) in [
            (&changes.added, "added"),
            (&changes.modified, "modified"),
            (&changes.deleted, "deleted"),
        ] {
            for id in ids {
                insert.execute(params![id.0, change, self.source])?;
            }
        }
        Ok(())
    }

    fn scope_names(&self, kind: EntityKind, category: &str) -> Result<Vec<(EntityId, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM entities WHERE kind = ?1 AND category = ?2")?;
        let names = stmt
            .query_map(params![kind.as_str(), category], |row| {
                Ok((EntityId(row.get(0)?), row.get(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names)
    }

    /// Fold every unconsumed change log row into one set and mark the rows
    /// consumed. Rows written by other connections are included.
    fn drain_change_log(&self) -> Result<ChangeSet> {
        let mut stmt = self.conn.prepare(
            "SELECT seq, entity_id, change FROM change_log WHERE consumed = 0 ORDER BY seq",
        )?;
        let rows: Vec<(i64, i64, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        let mut changes = ChangeSet::default();
        let mut last = None;
        for (seq, entity, change) in rows {
            let id = EntityId(entity);
            let mut set = ChangeSet::default();
            match change.as_str() {
                "added" => set.record_added(id),
                "modified" => set.record_modified(id),
                "deleted" => set.record_deleted(id),
                other => {
                    return Err(StoreError::InvalidData(format!(
                        "unknown change '{other}' in change log"
                    )));
                }
            }
            changes.merge(set);
            last = Some(seq);
        }
        if let Some(last) = last {
            self.conn.execute(
                "UPDATE change_log SET consumed = 1 WHERE consumed = 0 AND seq <= ?1",
                [last],
            )?;
        }
        Ok(changes)
    }
}

impl Document for SqliteDocument {
    fn id(&self) -> DocumentId {
        self.id
    }

    fn entity(&self, id: EntityId) -> Option<EntityRecord> {
        match self.load_entity(id) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(entity = %id, "failed to load entity: {e}");
                None
            }
        }
    }

    fn try_entity(
        &self,
        id: EntityId,
    ) -> std::result::Result<Option<EntityRecord>, DocumentError> {
        Ok(self.load_entity(id)?)
    }

    fn create_entity(
        &mut self,
        kind: EntityKind,
        request: &CreateRequest,
    ) -> std::result::Result<EntityId, DocumentError> {
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

        let category = request
            .category
            .clone()
            .unwrap_or_else(|| kind.default_category().to_string());
        let geometry = serde_json::to_string(&request.geometry).map_err(StoreError::from)?;

        // the real name is assigned right after creation
        let placeholder = format!("{kind}-pending");
        self.conn
            .execute(
                "INSERT INTO entities (kind, category, name, type_name, family, geometry, pinned)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
                params![kind.as_str(), category, placeholder, type_name, family, geometry],
            )
            .map_err(to_store)?;
        let id = EntityId(self.conn.last_insert_rowid());
        self.conn
            .execute(
                "UPDATE entities SET name = ?1 WHERE id = ?2",
                params![format!("{kind}-{}", id.0), id.0],
            )
            .map_err(to_store)?;

        for (attribute, value) in &request.attributes {
            self.write_attribute(id, attribute, value)?;
        }
        self.pending.record_added(id);
        Ok(id)
    }

    fn edit_geometry(
        &mut self,
        id: EntityId,
        geometry: &Geometry,
    ) -> std::result::Result<(), DocumentError> {
        let record = self.require_entity(id)?;
        record.kind.check_geometry(geometry)?;
        if record.geometry.segment_count() != geometry.segment_count() {
            return Err(DocumentError::ConstraintViolation(format!(
                "cannot edit {} segments into {} in place",
                record.geometry.segment_count(),
                geometry.segment_count()
            )));
        }
        let json = serde_json::to_string(geometry).map_err(StoreError::from)?;
        self.conn
            .execute(
                "UPDATE entities SET geometry = ?1 WHERE id = ?2",
                params![json, id.0],
            )
            .map_err(to_store)?;
        self.pending.record_modified(id);
        Ok(())
    }

    fn change_type(&mut self, id: EntityId, type_name: &str) -> std::result::Result<(), DocumentError> {
        let record = self.require_entity(id)?;
        let family = self.type_family(record.kind, type_name).ok_or_else(|| {
            DocumentError::ConstraintViolation(format!(
                "unknown {} type '{type_name}'",
                record.kind
            ))
        })?;
        if family != record.family {
            return Err(DocumentError::ConstraintViolation(format!(
                "type '{type_name}' belongs to family '{family}', not '{}'",
                record.family
            )));
        }
        self.conn
            .execute(
                "UPDATE entities SET type_name = ?1 WHERE id = ?2",
                params![type_name, id.0],
            )
            .map_err(to_store)?;
        self.pending.record_modified(id);
        Ok(())
    }

    fn delete_entity(&mut self, id: EntityId) -> std::result::Result<(), DocumentError> {
        self.require_entity(id)?;
        let blocked: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM dependents WHERE host_id = ?1",
                [id.0],
                |row| row.get(0),
            )
            .map_err(to_store)?;
        if blocked > 0 {
            return Err(DocumentError::HasIrremovableDependents(id));
        }
        self.conn
            .execute("DELETE FROM entities WHERE id = ?1", [id.0])
            .map_err(to_store)?;
        self.pending.record_deleted(id);
        Ok(())
    }

    fn set_attribute(
        &mut self,
        id: EntityId,
        attribute: &str,
        value: AttributeValue,
    ) -> std::result::Result<(), DocumentError> {
        let record = self.require_entity(id)?;
        record.kind.check_writable(attribute)?;
        self.write_attribute(id, attribute, &value)?;
        self.pending.record_modified(id);
        Ok(())
    }

    fn set_name(&mut self, id: EntityId, name: &str) -> std::result::Result<(), DocumentError> {
        let record = self.require_entity(id)?;
        if name.trim().is_empty() {
            return Err(DocumentError::ConstraintViolation(
                "name cannot be empty".to_string(),
            ));
        }
        let taken = self
            .names_in_scope(record.kind, &record.category)
            .iter()
            .any(|(other, existing)| *other != id && names_equal(existing, name));
        if taken {
            return Err(DocumentError::ConstraintViolation(format!(
                "name '{name}' is already in use"
            )));
        }
        self.conn
            .execute(
                "UPDATE entities SET name = ?1 WHERE id = ?2",
                params![name, id.0],
            )
            .map_err(to_store)?;
        self.pending.record_modified(id);
        Ok(())
    }

    fn set_pinned(&mut self, id: EntityId, pinned: bool) -> std::result::Result<(), DocumentError> {
        self.require_entity(id)?;
        self.conn
            .execute(
                "UPDATE entities SET pinned = ?1 WHERE id = ?2",
                params![pinned as i64, id.0],
            )
            .map_err(to_store)?;
        self.pending.record_modified(id);
        Ok(())
    }

    fn names_in_scope(&self, kind: EntityKind, category: &str) -> Vec<(EntityId, String)> {
        match self.scope_names(kind, category) {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(%kind, category, "failed to list names: {e}");
                Vec::new()
            }
        }
    }

    fn type_family(&self, kind: EntityKind, type_name: &str) -> Option<String> {
        self.conn
            .query_row(
                "SELECT family FROM entity_types WHERE kind = ?1 AND name = ?2",
                params![kind.as_str(), type_name],
                |row| row.get(0),
            )
            .optional()
            .unwrap_or_else(|e| {
                tracing::warn!(%kind, type_name, "failed to look up type: {e}");
                None
            })
    }

    fn begin_transaction(&mut self, name: &str) -> std::result::Result<(), DocumentError> {
        if let Some(open) = &self.transaction {
            return Err(DocumentError::Transaction(format!(
                "cannot start '{name}' while '{open}' is open"
            )));
        }
        self.conn
            .execute_batch(&format!("SAVEPOINT {SAVEPOINT}"))
            .map_err(to_store)?;
        self.transaction = Some(name.to_string());
        self.pending = ChangeSet::default();
        Ok(())
    }

    fn commit_transaction(&mut self) -> std::result::Result<(), DocumentError> {
        if self.transaction.is_none() {
            return Err(DocumentError::Transaction(
                "no open transaction to commit".to_string(),
            ));
        }
        let changes = std::mem::take(&mut self.pending);
        self.write_change_log(&changes)?;
        self.conn
            .execute_batch(&format!("RELEASE SAVEPOINT {SAVEPOINT}"))
            .map_err(to_store)?;
        self.transaction = None;
        Ok(())
    }

    fn rollback_transaction(&mut self) -> std::result::Result<(), DocumentError> {
        if self.transaction.take().is_none() {
            return Err(DocumentError::Transaction(
                "no open transaction to roll back".to_string(),
            ));
        }
        self.pending = ChangeSet::default();
        self.conn
            .execute_batch(&format!(
                "ROLLBACK TO SAVEPOINT {SAVEPOINT}; RELEASE SAVEPOINT {SAVEPOINT}"
            ))
            .map_err(to_store)?;
        Ok(())
    }

    fn take_changes(&mut self) -> Option<ChangeSet> {
        match self.drain_change_log() {
            Ok(changes) if !changes.is_empty() => Some(changes),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("failed to read change log: {e}");
                None
            }
        }
    }
}
