// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-wide handshake context.
//!
//! Built once at bootstrap. The construction outcome is kept as-is: a failed
//! construction is handed back to every caller until the process restarts.
//! Every construction failure, an invalid configuration included, is reported
//! as [`HandshakeError::HandshakeFailed`].

use std::sync::Arc;

use crate::binding::ComponentHandshake;
use crate::cache::SchemaCache;
use crate::config::HandshakeConfig;
use crate::coordinator::HandshakeCoordinator;
use crate::error::HandshakeError;

/// Owner of the single cache / coordinator pair of a process.
pub struct SchemaContext {
    config: HandshakeConfig,
    outcome: Result<Arc<ComponentHandshake>, HandshakeError>,
}

impl SchemaContext {
    /// Build the store, cache, coordinator and binding described by `config`.
    ///
    /// Never fails itself; see [`SchemaContext::handshake`].
    pub fn initialize(config: HandshakeConfig) -> Self {
        let outcome = Self::build(&config);
        match &outcome {
            Ok(binding) => tracing::info!(
                "Schema handshake ready ({} known schema(s), store {:?})",
                binding.coordinator().cache().len(),
                config.store
            ),
            Err(e) => tracing::error!("Schema handshake construction failed: {}", e),
        }
        Self { config, outcome }
    }

    fn build(config: &HandshakeConfig) -> Result<Arc<ComponentHandshake>, HandshakeError> {
        config.validate().map_err(|e| {
            HandshakeError::HandshakeFailed(format!("invalid configuration: {}", e))
        })?;
        let store = config.store.open()?;
        let cache = SchemaCache::open(store).map_err(|e| match e {
            HandshakeError::HandshakeFailed(_) => e,
            other => HandshakeError::HandshakeFailed(format!("schema reload failed: {}", other)),
        })?;
        let coordinator = HandshakeCoordinator::new(Arc::new(cache), config);
        Ok(Arc::new(ComponentHandshake::new(Arc::new(coordinator))))
    }

    /// The transport binding, or the error recorded at construction.
    pub fn handshake(&self) -> Result<Arc<ComponentHandshake>, HandshakeError> {
        self.outcome.clone()
    }

    pub fn coordinator(&self) -> Result<Arc<HandshakeCoordinator>, HandshakeError> {
        self.handshake().map(|b| Arc::clone(b.coordinator()))
    }

    pub fn cache(&self) -> Result<Arc<SchemaCache>, HandshakeError> {
        self.coordinator().map(|c| Arc::clone(c.cache()))
    }

    pub fn config(&self) -> &HandshakeConfig {
        &self.config
    }

    /// The owning durable store is stopping: refuse further registrations.
    pub fn store_stopping(&self) {
        if let Ok(cache) = self.cache() {
            cache.detach_store();
        }
    }
}
