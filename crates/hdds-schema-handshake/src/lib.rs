// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema handshake and distribution cache for HDDS wire connections.
//!
//! Every wire message is encoded against a schema identified by a 64-bit ID.
//! This crate lets two peers agree on which schemas each side already holds,
//! transfers a schema's definition at most once per connection, and persists
//! definitions so a restart does not lose schemas still referenced by stored
//! messages.
//!
//! # Features
//!
//! - **Schema cache**: process-wide registry with per-ID deduplicated registration
//! - **Durable store**: SQLite or in-memory backend with a reload-time index rebuild
//! - **Handshake**: known-ID exchange at open, fetch-by-ID requests, schema push
//! - **Transport binding**: error-free entry points for the connection layer
//!
//! # Architecture
//!
//! ```text
//! Transport (SchemaConnection)
//!        |
//!        v
//!   ComponentHandshake (on_open / on_data / on_request / on_close)
//!        |
//!        v
//!   HandshakeCoordinator ---- ConnectionTrackers (per connection)
//!        |
//!        v
//!   SchemaCache (in-memory)
//!        |
//!        v
//!   SchemaStore (SQLite / memory)
//! ```
//!
//! # Example
//!
//! ```
//! use hdds_schema_handshake::{HandshakeConfig, MockConnection, Schema, SchemaContext};
//!
//! let ctx = SchemaContext::initialize(HandshakeConfig::default());
//! let handshake = ctx.handshake().unwrap();
//! handshake
//!     .coordinator()
//!     .cache()
//!     .register(Schema::from_definition(&b"struct Point { long x; long y; };"[..]))
//!     .unwrap();
//!
//! let conn = MockConnection::new(1, 1);
//! assert!(handshake.on_open(&conn));
//! ```

pub mod binding;
pub mod cache;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod list;
pub mod schema;
pub mod sqlite;
pub mod store;
pub mod tracker;
pub mod transport;
pub mod wire;

pub use binding::ComponentHandshake;
pub use cache::{CacheStats, SchemaCache};
pub use config::{ConfigError, HandshakeConfig, HandshakeConfigBuilder, StoreBackend};
pub use context::SchemaContext;
pub use coordinator::HandshakeCoordinator;
pub use error::{HandshakeError, StoreError};
pub use list::LazyList;
pub use schema::{fingerprint, Schema, SchemaId};
pub use sqlite::SqliteSchemaStore;
pub use store::{MemorySchemaStore, SchemaStore, StorageHandle};
pub use tracker::{ConnectionSchemaTracker, ConnectionTrackers, HandshakeState};
pub use transport::{
    ConnectionId, FrameKind, MockConnection, PeerContext, SchemaConnection, TransportError,
};
