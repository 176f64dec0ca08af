// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Durable schema store abstraction
//!
//! Defines the trait for schema storage backends and the in-memory index
//! they all keep (exact match, schema ID -> storage handle).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock};

use crate::error::StoreError;
use crate::schema::{Schema, SchemaId};
use crate::wire;

/// Opaque store-assigned handle of a persisted schema record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageHandle(pub i64);

impl fmt::Display for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Schema store trait
///
/// Backend-agnostic interface for persisting schema definitions.
///
/// # Implementations
///
/// - `SqliteSchemaStore` -- Durable, file-backed
/// - `MemorySchemaStore` -- Process-lifetime only (tests, tooling)
pub trait SchemaStore: Send + Sync {
    /// Durably write a schema and index it.
    ///
    /// On error nothing is indexed and the schema must not be treated as known.
    fn persist(&self, schema: &Schema) -> Result<StorageHandle, StoreError>;

    /// Rebuild the index from persisted records.
    ///
    /// Records that are not schema records are logged and skipped.
    fn reload(&self) -> Result<Vec<(SchemaId, StorageHandle)>, StoreError>;

    /// Read back a persisted schema definition.
    fn lookup_bytes(&self, id: SchemaId) -> Result<Vec<u8>, StoreError>;

    /// Compensating removal of a persisted schema.
    fn remove(&self, id: SchemaId) -> Result<(), StoreError>;

    /// Number of indexed schemas.
    fn count(&self) -> usize;
}

// ---------------------------------------------------------------------------
// SchemaIndex
// ---------------------------------------------------------------------------

/// In-memory exact-match index shared by the store backends.
#[derive(Debug, Default)]
pub struct SchemaIndex {
    entries: RwLock<HashMap<SchemaId, StorageHandle>>,
}

impl SchemaIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SchemaId) -> Option<StorageHandle> {
        self.entries.read().get(&id).copied()
    }

    pub fn insert(&self, id: SchemaId, handle: StorageHandle) {
        self.entries.write().insert(id, handle);
    }

    pub fn remove(&self, id: SchemaId) -> Option<StorageHandle> {
        self.entries.write().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole index with a scan result.
    pub fn rebuild(&self, scanned: &[(SchemaId, StorageHandle)]) {
        let mut entries = self.entries.write();
        entries.clear();
        entries.extend(scanned.iter().copied());
    }
}

/// Decode a scanned record, logging and skipping anything unrecognised.
pub(crate) fn scan_record(handle: StorageHandle, record: &[u8]) -> Option<SchemaId> {
    match wire::decode_record(record) {
        Some(schema) => Some(schema.id()),
        None => {
            tracing::warn!(
                "Skipping unrecognised record {} ({} bytes) during schema reload",
                handle,
                record.len()
            );
            None
        }
    }
}

// ---------------------------------------------------------------------------
// MemorySchemaStore
// ---------------------------------------------------------------------------

/// Schema store kept in process memory.
///
/// Survives a rebuild of the cache (not of the process), which is enough to
/// exercise reload and index-recovery paths.
#[derive(Debug, Default)]
pub struct MemorySchemaStore {
    records: Mutex<BTreeMap<StorageHandle, Vec<u8>>>,
    next_handle: AtomicUsize,
    index: SchemaIndex,
    persist_calls: AtomicUsize,
    fail_persist: AtomicBool,
}

impl MemorySchemaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `persist` fail as if the commit was refused.
    pub fn fail_persists(&self, fail: bool) {
        self.fail_persist.store(fail, Ordering::SeqCst);
    }

    /// Number of successful durable writes since creation.
    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    /// Store a raw record that bypasses the schema encoding.
    pub fn insert_raw(&self, record: Vec<u8>) -> StorageHandle {
        let handle = self.allocate_handle();
        self.records.lock().insert(handle, record);
        handle
    }

    fn allocate_handle(&self) -> StorageHandle {
        StorageHandle(self.next_handle.fetch_add(1, Ordering::SeqCst) as i64 + 1)
    }
}

impl SchemaStore for MemorySchemaStore {
    fn persist(&self, schema: &Schema) -> Result<StorageHandle, StoreError> {
        let mut records = self.records.lock();
        if let Some(existing) = self.index.get(schema.id()) {
            return Ok(existing);
        }
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(StoreError::CommitFailed(format!(
                "commit refused for schema {}",
                schema.id()
            )));
        }

        let handle = self.allocate_handle();
        records.insert(handle, wire::encode_record(schema));
        self.index.insert(schema.id(), handle);
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(handle)
    }

    fn reload(&self) -> Result<Vec<(SchemaId, StorageHandle)>, StoreError> {
        let scanned: Vec<(SchemaId, StorageHandle)> = self
            .records
            .lock()
            .iter()
            .filter_map(|(handle, record)| scan_record(*handle, record).map(|id| (id, *handle)))
            .collect();
        self.index.rebuild(&scanned);
        Ok(scanned)
    }

    fn lookup_bytes(&self, id: SchemaId) -> Result<Vec<u8>, StoreError> {
        let handle = self.index.get(id).ok_or(StoreError::NotFound(id))?;
        let records = self.records.lock();
        let record = records.get(&handle).ok_or(StoreError::NotFound(id))?;
        let schema = wire::decode_record(record)
            .ok_or_else(|| StoreError::Corrupt(format!("record {} for schema {}", handle, id)))?;
        Ok(schema.bytes().to_vec())
    }

    fn remove(&self, id: SchemaId) -> Result<(), StoreError> {
        if let Some(handle) = self.index.remove(id) {
            self.records.lock().remove(&handle);
        }
        Ok(())
    }

    fn count(&self) -> usize {
        self.index.len()
    }
}
