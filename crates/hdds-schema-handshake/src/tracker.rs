// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-connection record of the schemas a remote peer already has.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::error::HandshakeError;
use crate::schema::SchemaId;
use crate::transport::ConnectionId;

/// Handshake lifecycle of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// No tracker exists for the connection.
    Unopened,
    /// Tracker allocated, opening list not yet accepted by the transport.
    Opening,
    /// Opening list sent; exchanges allowed.
    Open,
    /// Connection torn down.
    ///
    /// Only the tracker handed back by [`ConnectionTrackers::close_for`]
    /// carries this state. The registry drops the tracker, so a lookup by
    /// connection ID afterwards reports `Unopened` and a later open may reuse
    /// the ID with an empty tracker.
    Closed,
}

/// Schema IDs confirmed known to the remote end of one connection.
///
/// Holds IDs only, never schema bytes.
#[derive(Debug, Clone)]
pub struct ConnectionSchemaTracker {
    connection: ConnectionId,
    state: HandshakeState,
    remote_known: HashSet<SchemaId>,
}

impl ConnectionSchemaTracker {
    pub fn new(connection: ConnectionId) -> Self {
        Self {
            connection,
            state: HandshakeState::Opening,
            remote_known: HashSet::new(),
        }
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Record IDs as held by the remote. Returns how many were new.
    pub fn mark_known_by_remote<I>(&mut self, ids: I) -> usize
    where
        I: IntoIterator<Item = SchemaId>,
    {
        ids.into_iter()
            .filter(|id| self.remote_known.insert(*id))
            .count()
    }

    pub fn remote_knows(&self, id: SchemaId) -> bool {
        self.remote_known.contains(&id)
    }

    pub fn remote_known_count(&self) -> usize {
        self.remote_known.len()
    }

    /// Remote-known IDs, ascending.
    pub fn remote_known_ids(&self) -> Vec<SchemaId> {
        let mut ids: Vec<SchemaId> = self.remote_known.iter().copied().collect();
        ids.sort_unstable();
        ids
    }
}

// ---------------------------------------------------------------------------
// ConnectionTrackers
// ---------------------------------------------------------------------------

/// Trackers of all open connections.
///
/// Each connection only touches its own entry, so events on different
/// connections contend on map shards at most.
#[derive(Debug, Default)]
pub struct ConnectionTrackers {
    trackers: DashMap<ConnectionId, ConnectionSchemaTracker>,
}

impl ConnectionTrackers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty tracker in the `Opening` state.
    ///
    /// A tracker left behind by an earlier use of the same connection ID is
    /// replaced.
    pub fn open_for(&self, connection: ConnectionId) {
        if self
            .trackers
            .insert(connection, ConnectionSchemaTracker::new(connection))
            .is_some()
        {
            tracing::warn!("Replacing stale schema tracker for {}", connection);
        }
    }

    /// Discard the tracker and return it marked `Closed`. Closing an unknown
    /// connection is a no-op.
    ///
    /// Nothing of the closed connection is remembered: the ID may be opened
    /// again and starts with no remote-known schemas.
    pub fn close_for(&self, connection: ConnectionId) -> Option<ConnectionSchemaTracker> {
        self.trackers.remove(&connection).map(|(_, mut tracker)| {
            tracker.state = HandshakeState::Closed;
            tracker
        })
    }

    /// Current state; `Unopened` when no tracker exists (never opened or
    /// already closed).
    pub fn state(&self, connection: ConnectionId) -> HandshakeState {
        self.trackers
            .get(&connection)
            .map_or(HandshakeState::Unopened, |t| t.state)
    }

    pub fn set_state(
        &self,
        connection: ConnectionId,
        state: HandshakeState,
    ) -> Result<(), HandshakeError> {
        let mut tracker = self
            .trackers
            .get_mut(&connection)
            .ok_or(HandshakeError::NotOpen(connection))?;
        tracker.state = state;
        Ok(())
    }

    /// Record IDs as held by the remote end of `connection`.
    pub fn mark_known_by_remote<I>(
        &self,
        connection: ConnectionId,
        ids: I,
    ) -> Result<usize, HandshakeError>
    where
        I: IntoIterator<Item = SchemaId>,
    {
        let mut tracker = self
            .trackers
            .get_mut(&connection)
            .ok_or(HandshakeError::NotOpen(connection))?;
        Ok(tracker.mark_known_by_remote(ids))
    }

    /// False for unknown connections.
    pub fn remote_knows(&self, connection: ConnectionId, id: SchemaId) -> bool {
        self.trackers
            .get(&connection)
            .is_some_and(|t| t.remote_knows(id))
    }

    /// IDs from `ids` the remote is not known to hold, order preserved.
    pub fn unknown_to_remote(
        &self,
        connection: ConnectionId,
        ids: &[SchemaId],
    ) -> Result<Vec<SchemaId>, HandshakeError> {
        let tracker = self
            .trackers
            .get(&connection)
            .ok_or(HandshakeError::NotOpen(connection))?;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| !tracker.remote_knows(*id))
            .collect())
    }

    /// Snapshot of one tracker.
    pub fn snapshot(&self, connection: ConnectionId) -> Option<ConnectionSchemaTracker> {
        self.trackers.get(&connection).map(|t| t.value().clone())
    }

    /// Connections with a tracker in the `Open` state.
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        let mut open: Vec<ConnectionId> = self
            .trackers
            .iter()
            .filter(|t| t.state == HandshakeState::Open)
            .map(|t| *t.key())
            .collect();
        open.sort_unstable();
        open
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }
}
