// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite schema store backend
//!
//! One row per schema. The row holds a self-describing record (see
//! [`crate::wire`]) so a schema is restored from its own row alone.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::StoreError;
use crate::schema::{Schema, SchemaId};
use crate::store::{scan_record, SchemaIndex, SchemaStore, StorageHandle};
use crate::wire;

/// SQLite schema store
///
/// Thread-safe via internal Mutex (SQLite Connection is not Sync).
///
/// All access goes through that one connection. Persists of different schema
/// IDs therefore run one after another, and a cache read that falls back to
/// [`SchemaStore::lookup_bytes`] waits behind a persist in flight.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE schema_records (
///     handle INTEGER PRIMARY KEY AUTOINCREMENT,
///     record BLOB NOT NULL
/// );
/// ```
pub struct SqliteSchemaStore {
    conn: Mutex<Connection>,
    index: SchemaIndex,
}

impl SqliteSchemaStore {
    /// Open (or create) a file-based store.
    ///
    /// The index starts empty; call [`SchemaStore::reload`] before use.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let store = Self {
            conn: Mutex::new(conn),
            index: SchemaIndex::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            index: SchemaIndex::new(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_records (
                handle INTEGER PRIMARY KEY AUTOINCREMENT,
                record BLOB NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Total size of all persisted records, in bytes.
    pub fn total_bytes(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "SELECT COALESCE(SUM(length(record)), 0) FROM schema_records",
            [],
            |row| row.get(0),
        )?;
        Ok(total.max(0) as u64)
    }
}

impl SchemaStore for SqliteSchemaStore {
    fn persist(&self, schema: &Schema) -> Result<StorageHandle, StoreError> {
        let mut conn = self.conn.lock();
        if let Some(existing) = self.index.get(schema.id()) {
            return Ok(existing);
        }

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO schema_records (record) VALUES (?1)",
            params![wire::encode_record(schema)],
        )?;
        let handle = StorageHandle(tx.last_insert_rowid());

        self.index.insert(schema.id(), handle);
        if let Err(e) = tx.commit() {
            self.index.remove(schema.id());
            return Err(StoreError::CommitFailed(e.to_string()));
        }

        tracing::debug!("Persisted schema {} as record {}", schema.id(), handle);
        Ok(handle)
    }

    fn reload(&self) -> Result<Vec<(SchemaId, StorageHandle)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT handle, record FROM schema_records ORDER BY handle")?;

        let mut scanned = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let handle = StorageHandle(row.get(0)?);
            let Ok(record) = row.get_ref(1)?.as_blob() else {
                tracing::warn!("Skipping non-blob record {} during schema reload", handle);
                continue;
            };
            if let Some(id) = scan_record(handle, record) {
                scanned.push((id, handle));
            }
        }

        self.index.rebuild(&scanned);
        tracing::info!("Reloaded {} schema(s) from SQLite store", self.index.len());
        Ok(scanned)
    }

    fn lookup_bytes(&self, id: SchemaId) -> Result<Vec<u8>, StoreError> {
        let handle = self.index.get(id).ok_or(StoreError::NotFound(id))?;

        let conn = self.conn.lock();
        let record: Option<Vec<u8>> = conn
            .query_row(
                "SELECT record FROM schema_records WHERE handle = ?1",
                [handle.0],
                |row| row.get(0),
            )
            .optional()?;
        let record = record.ok_or(StoreError::NotFound(id))?;

        let schema = wire::decode_record(&record)
            .filter(|schema| schema.id() == id)
            .ok_or_else(|| StoreError::Corrupt(format!("record {} for schema {}", handle, id)))?;
        Ok(schema.bytes().to_vec())
    }

    fn remove(&self, id: SchemaId) -> Result<(), StoreError> {
        let Some(handle) = self.index.get(id) else {
            return Ok(());
        };

        let conn = self.conn.lock();
        conn.execute("DELETE FROM schema_records WHERE handle = ?1", [handle.0])?;
        self.index.remove(id);
        Ok(())
    }

    fn count(&self) -> usize {
        self.index.len()
    }
}
