// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema handshake configuration

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::HandshakeError;
use crate::schema::SchemaId;
use crate::sqlite::SqliteSchemaStore;
use crate::store::{MemorySchemaStore, SchemaStore};

/// Default upper bound for a single handshake payload (4 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4 * 1024 * 1024;

/// Durable store backing the schema cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process memory only; schemas are lost on exit.
    Memory,
    /// SQLite database file.
    Sqlite { path: PathBuf },
}

impl StoreBackend {
    /// Open the selected backend.
    pub fn open(&self) -> Result<Arc<dyn SchemaStore>, HandshakeError> {
        match self {
            StoreBackend::Memory => Ok(Arc::new(MemorySchemaStore::new())),
            StoreBackend::Sqlite { path } => {
                let store = SqliteSchemaStore::new(path).map_err(|e| {
                    HandshakeError::HandshakeFailed(format!(
                        "cannot open schema store {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Ok(Arc::new(store))
            }
        }
    }
}

/// Schema handshake configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Durable store backend
    pub store: StoreBackend,

    /// Lowest peer product version accepted at handshake open
    pub min_product_version: u32,

    /// Largest handshake payload accepted from a peer
    pub max_payload_bytes: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Memory,
            min_product_version: 1,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

impl HandshakeConfig {
    /// Create a new config builder
    pub fn builder() -> HandshakeConfigBuilder {
        HandshakeConfigBuilder::default()
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let config: Self =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_product_version == 0 {
            return Err(ConfigError::InvalidValue(
                "min_product_version cannot be 0".into(),
            ));
        }
        if self.max_payload_bytes < SchemaId::ENCODED_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "max_payload_bytes must be at least {}",
                SchemaId::ENCODED_LEN
            )));
        }
        if let StoreBackend::Sqlite { path } = &self.store {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "sqlite store path cannot be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Config builder for fluent API
#[derive(Debug, Default)]
pub struct HandshakeConfigBuilder {
    store: Option<StoreBackend>,
    min_product_version: Option<u32>,
    max_payload_bytes: Option<usize>,
}

impl HandshakeConfigBuilder {
    /// Keep schemas in process memory
    pub fn memory_store(mut self) -> Self {
        self.store = Some(StoreBackend::Memory);
        self
    }

    /// Persist schemas to a SQLite file
    pub fn sqlite_store(mut self, path: impl Into<PathBuf>) -> Self {
        self.store = Some(StoreBackend::Sqlite { path: path.into() });
        self
    }

    /// Set lowest accepted peer product version
    pub fn min_product_version(mut self, version: u32) -> Self {
        self.min_product_version = Some(version);
        self
    }

    /// Set largest accepted payload in bytes
    pub fn max_payload_bytes(mut self, bytes: usize) -> Self {
        self.max_payload_bytes = Some(bytes);
        self
    }

    /// Build the configuration
    pub fn build(self) -> HandshakeConfig {
        let defaults = HandshakeConfig::default();

        HandshakeConfig {
            store: self.store.unwrap_or(defaults.store),
            min_product_version: self
                .min_product_version
                .unwrap_or(defaults.min_product_version),
            max_payload_bytes: self
                .max_payload_bytes
                .unwrap_or(defaults.max_payload_bytes),
        }
    }
}

/// Configuration error types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
}

impl From<ConfigError> for HandshakeError {
    fn from(e: ConfigError) -> Self {
        HandshakeError::Config(e.to_string())
    }
}
