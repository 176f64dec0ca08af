// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide schema registry backed by a durable store.
//!
//! The cache holds every schema known to this process. At open it replays
//! the store index, so reloaded schemas start as store references and are
//! read back on first use. Registration is deduplicated per schema ID:
//! concurrent registrations of the same ID serialise on a per-ID gate and
//! result in a single durable write, while different IDs proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{HandshakeError, StoreError};
use crate::schema::{Schema, SchemaId};
use crate::store::{SchemaStore, StorageHandle};
use crate::wire;

/// Cache lookup statistics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// `get` served from memory.
    pub hits: u64,
    /// `get` for an ID absent from the cache.
    pub misses: u64,
    /// `get` that had to read the definition back from the store.
    pub store_fallbacks: u64,
    /// Successful durable registrations.
    pub persisted: u64,
}

#[derive(Debug, Clone)]
enum Slot {
    /// Definition held in memory.
    Resident(Schema),
    /// Known from the store index; bytes not loaded yet.
    Stored(StorageHandle),
}

/// Registry of all schemas known locally.
pub struct SchemaCache {
    store: Arc<dyn SchemaStore>,
    detached: AtomicBool,
    entries: RwLock<HashMap<SchemaId, Slot>>,
    gates: DashMap<SchemaId, Arc<Mutex<()>>>,
    stats: RwLock<CacheStats>,
}

impl SchemaCache {
    /// Open the cache over `store`, replaying its persisted records.
    ///
    /// The replay completes before this returns, so a coordinator built on the
    /// returned cache never sees a half-loaded index.
    pub fn open(store: Arc<dyn SchemaStore>) -> Result<Self, HandshakeError> {
        let scanned = store.reload()?;
        let entries: HashMap<SchemaId, Slot> = scanned
            .into_iter()
            .map(|(id, handle)| (id, Slot::Stored(handle)))
            .collect();

        tracing::info!("Schema cache opened with {} persisted schema(s)", entries.len());

        Ok(Self {
            store,
            detached: AtomicBool::new(false),
            entries: RwLock::new(entries),
            gates: DashMap::new(),
            stats: RwLock::new(CacheStats::default()),
        })
    }

    /// True if the schema is known locally.
    #[must_use]
    pub fn has(&self, id: SchemaId) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// Fetch a known schema.
    ///
    /// Reloaded schemas are read back from the store on first access and kept
    /// in memory afterwards.
    pub fn get(&self, id: SchemaId) -> Result<Schema, HandshakeError> {
        let handle = match self.entries.read().get(&id) {
            Some(Slot::Resident(schema)) => {
                self.record(|s| s.hits = s.hits.saturating_add(1));
                return Ok(schema.clone());
            }
            Some(Slot::Stored(handle)) => *handle,
            None => {
                self.record(|s| s.misses = s.misses.saturating_add(1));
                return Err(HandshakeError::UnknownSchema(id));
            }
        };

        let bytes = self.store.lookup_bytes(id)?;
        let schema = Schema::new(id, bytes);
        tracing::debug!("Schema {} loaded from store record {}", id, handle);

        let mut entries = self.entries.write();
        let slot = entries
            .entry(id)
            .or_insert_with(|| Slot::Resident(schema.clone()));
        if let Slot::Stored(_) = slot {
            *slot = Slot::Resident(schema.clone());
        }
        drop(entries);

        self.record(|s| s.store_fallbacks = s.store_fallbacks.saturating_add(1));
        Ok(schema)
    }

    /// Register a schema, persisting it first if it is new.
    ///
    /// Returns `Ok(true)` if this call made the schema known and `Ok(false)`
    /// if it was already known. On error the schema is not known.
    pub fn register(&self, schema: Schema) -> Result<bool, HandshakeError> {
        let id = schema.id();
        if self.has(id) {
            self.check_duplicate(&schema);
            return Ok(false);
        }

        let gate = Arc::clone(self.gates.entry(id).or_default().value());
        let result = {
            let _guard = gate.lock();
            self.register_gated(schema)
        };
        self.gates.remove_if(&id, |_, current| Arc::ptr_eq(current, &gate));
        result
    }

    fn register_gated(&self, schema: Schema) -> Result<bool, HandshakeError> {
        let id = schema.id();
        if self.has(id) {
            self.check_duplicate(&schema);
            return Ok(false);
        }
        if self.detached.load(Ordering::SeqCst) {
            return Err(StoreError::Detached.into());
        }

        let handle = self.store.persist(&schema).map_err(|e| {
            tracing::warn!("Failed to persist schema {}: {}", id, e);
            HandshakeError::from(e)
        })?;

        self.entries.write().insert(id, Slot::Resident(schema));
        self.record(|s| s.persisted = s.persisted.saturating_add(1));
        tracing::debug!("Registered schema {} (record {})", id, handle);
        Ok(true)
    }

    fn check_duplicate(&self, schema: &Schema) {
        if let Some(Slot::Resident(existing)) = self.entries.read().get(&schema.id()) {
            if existing.bytes() != schema.bytes() {
                tracing::warn!(
                    "Schema {} re-registered with a different definition; keeping the first",
                    schema.id()
                );
            }
        }
    }

    /// All locally known IDs, ascending.
    #[must_use]
    pub fn known_ids(&self) -> Vec<SchemaId> {
        let mut ids: Vec<SchemaId> = self.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// IDs from `ids` that are not known locally, first occurrence order.
    #[must_use]
    pub fn missing(&self, ids: &[SchemaId]) -> Vec<SchemaId> {
        let entries = self.entries.read();
        let mut seen = HashSet::new();
        ids.iter()
            .copied()
            .filter(|id| !entries.contains_key(id) && seen.insert(*id))
            .collect()
    }

    /// Known schemas among `ids`, in request order. Unknown and repeated IDs
    /// are skipped.
    pub fn schemas_for(&self, ids: &[SchemaId]) -> Result<Vec<Schema>, HandshakeError> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();
        for &id in ids {
            if !seen.insert(id) {
                continue;
            }
            match self.get(id) {
                Ok(schema) => found.push(schema),
                Err(HandshakeError::UnknownSchema(_)) => {
                    tracing::debug!("Omitting unknown schema {} from response", id);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    /// Build a schema bundle for every known ID in `ids`.
    pub fn encode_by_ids(&self, ids: &[SchemaId]) -> Result<Vec<u8>, HandshakeError> {
        wire::encode_bundle(&self.schemas_for(ids)?)
    }

    /// Decode a peer's ID list.
    pub fn decode_ids(&self, payload: &[u8]) -> Result<Vec<SchemaId>, HandshakeError> {
        wire::decode_ids(payload)
    }

    /// Number of known schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop durable writes because the owning store is shutting down.
    ///
    /// Known schemas stay readable; new registrations fail.
    pub fn detach_store(&self) {
        if !self.detached.swap(true, Ordering::SeqCst) {
            tracing::info!("Schema store detached; registrations disabled");
        }
    }

    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        update(&mut *self.stats.write());
    }
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("len", &self.len())
            .field("detached", &self.is_detached())
            .field("stats", &self.stats())
            .finish()
    }
}
