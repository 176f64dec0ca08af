// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport collaborator interface.
//!
//! The handshake never touches sockets. The connection-management layer
//! implements [`SchemaConnection`] for each open connection and calls the
//! binding entry points; outgoing frames are handed back through `send`.

use std::fmt;

use parking_lot::Mutex;
use thiserror::Error;

/// Opaque identity of one transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Kind of frame the handshake asks the transport to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Opening list of locally known schema IDs.
    KnownIds,
    /// Schema bundle pushed ahead of a message that references it.
    Schemas,
}

/// Error reported by the transport when a frame cannot be sent.
#[derive(Debug, Clone, Error)]
#[error("transport send failed: {0}")]
pub struct TransportError(pub String);

/// Per-event peer information, passed explicitly to every handshake call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerContext {
    /// Connection the event belongs to.
    pub connection: ConnectionId,
    /// Major product version negotiated by the transport for this peer.
    pub product_version: u32,
}

impl PeerContext {
    pub fn new(connection: ConnectionId, product_version: u32) -> Self {
        Self {
            connection,
            product_version,
        }
    }
}

/// A connection as seen by the schema handshake.
pub trait SchemaConnection: Send + Sync {
    /// Stable identity of the connection.
    fn connection_id(&self) -> ConnectionId;

    /// Product version agreed with the peer during transport setup.
    fn product_version(&self) -> u32;

    /// Hand a frame to the transport. Must not block on the peer's reply.
    fn send(&self, kind: FrameKind, payload: &[u8]) -> Result<(), TransportError>;

    /// Explicit peer context for this connection.
    fn peer(&self) -> PeerContext {
        PeerContext::new(self.connection_id(), self.product_version())
    }
}

/// In-memory connection that records sent frames (for tests and tooling).
pub struct MockConnection {
    id: ConnectionId,
    product_version: u32,
    fail_sends: Mutex<bool>,
    sent: Mutex<Vec<(FrameKind, Vec<u8>)>>,
}

impl MockConnection {
    /// Create a mock connection.
    pub fn new(id: u64, product_version: u32) -> Self {
        Self {
            id: ConnectionId(id),
            product_version,
            fail_sends: Mutex::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Make every later `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<(FrameKind, Vec<u8>)> {
        self.sent.lock().clone()
    }

    /// Payload of the most recent frame of `kind`.
    pub fn last_sent(&self, kind: FrameKind) -> Option<Vec<u8>> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|(k, _)| *k == kind)
            .map(|(_, payload)| payload.clone())
    }
}

impl SchemaConnection for MockConnection {
    fn connection_id(&self) -> ConnectionId {
        self.id
    }

    fn product_version(&self) -> u32 {
        self.product_version
    }

    fn send(&self, kind: FrameKind, payload: &[u8]) -> Result<(), TransportError> {
        if *self.fail_sends.lock() {
            return Err(TransportError(format!("{} is not writable", self.id)));
        }
        self.sent.lock().push((kind, payload.to_vec()));
        Ok(())
    }
}
