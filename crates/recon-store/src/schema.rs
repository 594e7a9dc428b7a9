use recon_core::{DocumentId, EntityKind};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::error::{Result, StoreError};

pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;

    // Errors are non-fatal: in-memory DBs and fresh files legitimately fail this.
    if conn
        .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
        .is_ok()
    {
        tracing::debug!("startup WAL checkpoint complete");
    }

    // AUTOINCREMENT keeps ids of deleted entities from ever coming back.
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS entity_types (
            kind   TEXT NOT NULL,
            name   TEXT NOT NULL,
            family TEXT NOT NULL,
            PRIMARY KEY (kind, name)
        );

        CREATE TABLE IF NOT EXISTS entities (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            kind      TEXT NOT NULL,
            category  TEXT NOT NULL,
            name      TEXT NOT NULL,
            type_name TEXT NOT NULL,
            family    TEXT NOT NULL,
            geometry  TEXT NOT NULL,
            pinned    INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS attributes (
            entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            name      TEXT NOT NULL,
            value     TEXT NOT NULL,
            PRIMARY KEY (entity_id, name)
        );

        CREATE TABLE IF NOT EXISTS dependents (
            host_id      INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            dependent_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
            PRIMARY KEY (host_id, dependent_id)
        );

        CREATE TABLE IF NOT EXISTS change_log (
            seq       INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_id INTEGER NOT NULL,
            change    TEXT NOT NULL CHECK (change IN ('added', 'modified', 'deleted')),
            source    TEXT NOT NULL DEFAULT '',
            consumed  INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS tracked_slots (
            node      TEXT NOT NULL,
            slot      TEXT NOT NULL,
            document  TEXT NOT NULL,
            entity_id INTEGER NOT NULL,
            PRIMARY KEY (node, slot, document)
        );

        CREATE INDEX IF NOT EXISTS idx_entities_scope ON entities(kind, category);
        CREATE INDEX IF NOT EXISTS idx_change_log_pending ON change_log(consumed);
        ",
    )?;

    seed_types(conn)?;

    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}

/// Built-in type catalog. Existing rows are left alone.
fn seed_types(conn: &Connection) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO entity_types (kind, name, family) VALUES (?1, ?2, ?3)")?;
    for kind in EntityKind::ALL {
        for (name, family) in kind.default_types() {
            stmt.execute(params![kind.as_str(), name, family])?;
        }
    }
    Ok(())
}

/// Stable id of the document stored in this file, created on first use.
pub fn document_id(conn: &Connection) -> Result<DocumentId> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = 'document_id'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(value) => Uuid::parse_str(&value)
            .map(DocumentId)
            .map_err(|e| StoreError::InvalidData(format!("bad document_id '{value}': {e}"))),
        None => {
            let id = DocumentId::new();
            conn.execute(
                "INSERT INTO metadata (key, value) VALUES ('document_id', ?1)",
                [id.to_string()],
            )?;
            tracing::info!(document = %id, "initialised new document");
            Ok(id)
        }
    }
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i64>> {
    let mut stmt = conn.prepare("SELECT value FROM metadata WHERE key = 'schema_version'")?;
    let version = stmt
        .query_row([], |row| {
            let v: String = row.get(0)?;
            Ok(v.parse::<i64>().unwrap_or(0))
        })
        .optional()?;
    Ok(version)
}
