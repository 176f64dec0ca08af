// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the schema store and the handshake protocol.

use thiserror::Error;

use crate::schema::SchemaId;
use crate::transport::ConnectionId;

/// Errors raised by a durable schema store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No persisted record carries this identity.
    #[error("schema {0} not found in store")]
    NotFound(SchemaId),

    /// The underlying SQLite transaction failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The durable transaction could not commit.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// A persisted record could not be decoded.
    #[error("corrupt schema record: {0}")]
    Corrupt(String),

    /// The store was detached because its owning durable store is stopping.
    #[error("schema store detached")]
    Detached,
}

/// Errors surfaced by the schema cache and the handshake coordinator.
///
/// `Clone` so that a construction failure can be remembered and handed back
/// to every later caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// A durable write could not complete; the schema is not known.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// The schema is absent from both the cache and the store.
    #[error("unknown schema {0}")]
    UnknownSchema(SchemaId),

    /// A request arrived with a command code other than the schema fetch.
    #[error("invalid handshake command 0x{0:04x}")]
    InvalidHandshakeCommand(u16),

    /// Construction or the opening list exchange failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// A payload could not be decoded.
    #[error("malformed payload: {0}")]
    Decode(String),

    /// An event arrived for a connection whose handshake is not open.
    #[error("connection {0} has no open handshake")]
    NotOpen(ConnectionId),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<StoreError> for HandshakeError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => HandshakeError::UnknownSchema(id),
            other => HandshakeError::PersistenceFailure(other.to_string()),
        }
    }
}
