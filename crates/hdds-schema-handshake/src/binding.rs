// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport-facing entry points.
//!
//! The connection layer calls these on connect, data, request, schema
//! delivery, outgoing sends and close. Errors never cross this boundary: they
//! are logged and turned into `false` / `None`, and the transport decides the
//! connection's fate.

use std::sync::Arc;

use crate::coordinator::HandshakeCoordinator;
use crate::error::HandshakeError;
use crate::schema::SchemaId;
use crate::transport::{PeerContext, SchemaConnection};

/// Dispatch from transport events to the [`HandshakeCoordinator`].
#[derive(Clone)]
pub struct ComponentHandshake {
    coordinator: Arc<HandshakeCoordinator>,
}

impl ComponentHandshake {
    pub fn new(coordinator: Arc<HandshakeCoordinator>) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &Arc<HandshakeCoordinator> {
        &self.coordinator
    }

    /// Connection established. `false` means the handshake could not start.
    pub fn on_open(&self, conn: &dyn SchemaConnection) -> bool {
        let peer = conn.peer();
        report(peer, "open", self.coordinator.start(conn)).is_some()
    }

    /// Peer's known-ID list arrived.
    pub fn on_data(&self, peer: PeerContext, payload: &[u8]) -> bool {
        report(peer, "data", self.coordinator.comp_data(peer, payload)).is_some()
    }

    /// Request arrived. `None` rejects this request only; the connection stays
    /// usable.
    pub fn on_request(&self, peer: PeerContext, command: u16, payload: &[u8]) -> Option<Vec<u8>> {
        report(
            peer,
            "request",
            self.coordinator.comp_request(peer, command, payload),
        )
    }

    /// Symmetric list exchange. `None` when no reply is owed or on error.
    pub fn on_handshake_data(&self, peer: PeerContext, payload: &[u8]) -> Option<Vec<u8>> {
        report(
            peer,
            "handshake data",
            self.coordinator.comp_handshake_data(peer, payload),
        )
        .flatten()
    }

    /// Schema bundle arrived from the peer.
    pub fn on_schemas(&self, peer: PeerContext, bundle: &[u8]) -> bool {
        report(peer, "schemas", self.coordinator.receive_schemas(peer, bundle)).is_some()
    }

    /// About to send a message that depends on `ids`: push the schemas the
    /// peer lacks. `false` when the push could not be sent.
    pub fn on_send(&self, conn: &dyn SchemaConnection, ids: &[SchemaId]) -> bool {
        let peer = conn.peer();
        report(peer, "push", self.coordinator.schemas_for_send(conn, ids)).is_some()
    }

    /// Connection closed. Safe to call any number of times.
    pub fn on_close(&self, peer: PeerContext) {
        self.coordinator.comp_close(peer);
    }
}

fn report<T>(peer: PeerContext, event: &str, result: Result<T, HandshakeError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Schema handshake {} on {} failed: {}", event, peer.connection, e);
            None
        }
    }
}
