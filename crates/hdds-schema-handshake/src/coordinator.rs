// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema handshake protocol
//!
//! Drives the per-connection exchange on top of the shared [`SchemaCache`]:
//!
//! - open: send the list of locally known IDs (`UNOPENED -> OPENING -> OPEN`)
//! - known-ID list from the peer: record as remote-known
//! - fetch request ([`wire::REQUEST_SCHEMA`]): answer with a schema bundle
//! - symmetric list exchange: answer with local IDs the peer lacks
//! - close: drop the tracker (`-> CLOSED`), idempotent
//!
//! A schema is handed to the transport at most once per connection: every
//! outgoing bundle is filtered against the tracker. Pushed schemas are marked
//! remote-known after the transport accepts the frame; a fetch response is
//! marked when its bytes are returned for the transport to send.

use std::sync::Arc;

use crate::cache::SchemaCache;
use crate::config::HandshakeConfig;
use crate::error::HandshakeError;
use crate::list::LazyList;
use crate::schema::{Schema, SchemaId};
use crate::tracker::{ConnectionTrackers, HandshakeState};
use crate::transport::{ConnectionId, FrameKind, PeerContext, SchemaConnection};
use crate::wire;

/// Per-process handshake coordinator.
pub struct HandshakeCoordinator {
    cache: Arc<SchemaCache>,
    trackers: ConnectionTrackers,
    min_product_version: u32,
    max_payload_bytes: usize,
}

impl HandshakeCoordinator {
    pub fn new(cache: Arc<SchemaCache>, config: &HandshakeConfig) -> Self {
        Self {
            cache,
            trackers: ConnectionTrackers::new(),
            min_product_version: config.min_product_version,
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    pub fn trackers(&self) -> &ConnectionTrackers {
        &self.trackers
    }

    pub fn state(&self, connection: ConnectionId) -> HandshakeState {
        self.trackers.state(connection)
    }

    pub fn open_connections(&self) -> Vec<ConnectionId> {
        self.trackers.open_connections()
    }

    // -----------------------------------------------------------------------
    // Connection open
    // -----------------------------------------------------------------------

    /// Open the handshake: send every locally known ID to the peer.
    ///
    /// On a rejected peer version or a failed send no tracker is left behind
    /// and the transport decides what happens to the connection.
    pub fn start(&self, conn: &dyn SchemaConnection) -> Result<(), HandshakeError> {
        let peer = conn.peer();
        if peer.product_version < self.min_product_version {
            return Err(HandshakeError::HandshakeFailed(format!(
                "{} product version {} below minimum {}",
                peer.connection, peer.product_version, self.min_product_version
            )));
        }

        self.trackers.open_for(peer.connection);
        let known = self.cache.known_ids();
        let payload = wire::encode_ids(&known);

        if let Err(e) = conn.send(FrameKind::KnownIds, &payload) {
            self.trackers.close_for(peer.connection);
            return Err(HandshakeError::HandshakeFailed(e.to_string()));
        }

        self.trackers.set_state(peer.connection, HandshakeState::Open)?;
        tracing::info!(
            "Schema handshake open on {} (product version {}, {} local schema(s) advertised)",
            peer.connection,
            peer.product_version,
            known.len()
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Incoming exchanges
    // -----------------------------------------------------------------------

    /// Peer's known-ID list. Returns how many IDs were new for this connection.
    pub fn comp_data(&self, peer: PeerContext, payload: &[u8]) -> Result<usize, HandshakeError> {
        self.require_open(peer)?;
        let ids = self.decode_ids(payload)?;
        let added = self.trackers.mark_known_by_remote(peer.connection, ids)?;
        tracing::debug!("{} advertised {} new schema ID(s)", peer.connection, added);
        Ok(added)
    }

    /// Fetch-by-ID request. Returns the schema bundle to send back.
    ///
    /// Only [`wire::REQUEST_SCHEMA`] is accepted; any other command is
    /// rejected without touching cache or tracker. Unknown IDs and IDs the
    /// peer already holds are left out, so the bundle may be empty.
    pub fn comp_request(
        &self,
        peer: PeerContext,
        command: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>, HandshakeError> {
        if command != wire::REQUEST_SCHEMA {
            return Err(HandshakeError::InvalidHandshakeCommand(command));
        }
        self.require_open(peer)?;

        let wanted = self.decode_ids(payload)?;
        let unsent = self.trackers.unknown_to_remote(peer.connection, &wanted)?;
        let schemas = self.cache.schemas_for(&unsent)?;
        let bundle = self.hand_off(peer.connection, &schemas)?;

        tracing::debug!(
            "{} requested {} schema(s), sending {}",
            peer.connection,
            wanted.len(),
            schemas.len()
        );
        Ok(bundle)
    }

    /// Symmetric list exchange. Returns the local IDs the peer is not known to
    /// hold, or `None` when no reply is owed.
    pub fn comp_handshake_data(
        &self,
        peer: PeerContext,
        payload: &[u8],
    ) -> Result<Option<Vec<u8>>, HandshakeError> {
        self.require_open(peer)?;
        let ids = self.decode_ids(payload)?;
        self.trackers.mark_known_by_remote(peer.connection, ids)?;

        let mut known = self.cache.known_ids();
        let mut reply = LazyList::view(&mut known);
        reply.retain(|id| !self.trackers.remote_knows(peer.connection, *id));

        if reply.is_empty() {
            return Ok(None);
        }
        Ok(Some(wire::encode_ids(reply.iter())))
    }

    /// Schemas sent by the peer, in answer to our request or pushed ahead of
    /// a message. Registers each one; returns how many were new locally.
    pub fn receive_schemas(
        &self,
        peer: PeerContext,
        bundle: &[u8],
    ) -> Result<usize, HandshakeError> {
        self.require_open(peer)?;
        self.check_payload(bundle)?;
        let schemas = wire::decode_bundle(bundle)?;

        let mut added = 0;
        for schema in schemas {
            let id = schema.id();
            if self.cache.register(schema)? {
                added += 1;
            }
            self.trackers.mark_known_by_remote(peer.connection, [id])?;
        }

        tracing::debug!("{} delivered {} new schema(s)", peer.connection, added);
        Ok(added)
    }

    // -----------------------------------------------------------------------
    // Outgoing exchanges
    // -----------------------------------------------------------------------

    /// Build a fetch request for the IDs in `ids` that are not known locally.
    ///
    /// `None` when every ID is already known.
    pub fn build_request(
        &self,
        peer: PeerContext,
        ids: &[SchemaId],
    ) -> Result<Option<Vec<u8>>, HandshakeError> {
        self.require_open(peer)?;
        let missing = self.cache.missing(ids);
        if missing.is_empty() {
            return Ok(None);
        }
        tracing::debug!("Requesting {} schema(s) from {}", missing.len(), peer.connection);
        Ok(Some(wire::encode_ids(&missing)))
    }

    /// Push the schemas a message about to be sent depends on, skipping
    /// those the peer already holds. Returns how many schemas were sent.
    ///
    /// The pushed IDs are marked remote-known only once the transport accepts
    /// the frame; a failed send marks nothing, so a later fetch still gets
    /// them. A locally unknown ID is an error: nothing can be sent against it.
    pub fn schemas_for_send(
        &self,
        conn: &dyn SchemaConnection,
        ids: &[SchemaId],
    ) -> Result<usize, HandshakeError> {
        let peer = conn.peer();
        self.require_open(peer)?;
        let mut unsent = self.trackers.unknown_to_remote(peer.connection, ids)?;
        unsent.sort_unstable();
        unsent.dedup();
        if unsent.is_empty() {
            return Ok(0);
        }

        let schemas = unsent
            .iter()
            .map(|id| self.cache.get(*id))
            .collect::<Result<Vec<Schema>, HandshakeError>>()?;
        let bundle = wire::encode_bundle(&schemas)?;

        conn.send(FrameKind::Schemas, &bundle).map_err(|e| {
            HandshakeError::HandshakeFailed(format!(
                "schema push on {} failed: {}",
                peer.connection, e
            ))
        })?;
        self.trackers
            .mark_known_by_remote(peer.connection, unsent.iter().copied())?;

        tracing::debug!("Pushed {} schema(s) to {}", schemas.len(), peer.connection);
        Ok(schemas.len())
    }

    // -----------------------------------------------------------------------
    // Close
    // -----------------------------------------------------------------------

    /// Tear down the connection's tracker. Returns whether one existed.
    pub fn comp_close(&self, peer: PeerContext) -> bool {
        match self.trackers.close_for(peer.connection) {
            Some(tracker) => {
                tracing::debug!(
                    "Schema handshake closed on {} ({} remote-known schema(s))",
                    peer.connection,
                    tracker.remote_known_count()
                );
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn require_open(&self, peer: PeerContext) -> Result<(), HandshakeError> {
        match self.trackers.state(peer.connection) {
            HandshakeState::Open => Ok(()),
            _ => Err(HandshakeError::NotOpen(peer.connection)),
        }
    }

    fn check_payload(&self, payload: &[u8]) -> Result<(), HandshakeError> {
        if payload.len() > self.max_payload_bytes {
            return Err(HandshakeError::Decode(format!(
                "payload of {} bytes exceeds limit of {}",
                payload.len(),
                self.max_payload_bytes
            )));
        }
        Ok(())
    }

    fn decode_ids(&self, payload: &[u8]) -> Result<Vec<SchemaId>, HandshakeError> {
        self.check_payload(payload)?;
        self.cache.decode_ids(payload)
    }

    /// Encode `schemas` and mark them remote-known.
    fn hand_off(
        &self,
        connection: ConnectionId,
        schemas: &[Schema],
    ) -> Result<Vec<u8>, HandshakeError> {
        let bundle = wire::encode_bundle(schemas)?;
        self.trackers
            .mark_known_by_remote(connection, schemas.iter().map(Schema::id))?;
        Ok(bundle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySchemaStore;
    use crate::transport::MockConnection;

    fn coordinator() -> HandshakeCoordinator {
        let cache = SchemaCache::open(Arc::new(MemorySchemaStore::new())).unwrap();
        HandshakeCoordinator::new(Arc::new(cache), &HandshakeConfig::default())
    }

    fn schema(id: u64, body: &str) -> Schema {
        Schema::new(SchemaId(id), body.as_bytes())
    }

    #[test]
    fn start_sends_known_ids_and_opens() {
        let coord = coordinator();
        coord.cache().register(schema(2, "two")).unwrap();
        coord.cache().register(schema(1, "one")).unwrap();

        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let sent = conn.last_sent(FrameKind::KnownIds).unwrap();
        assert_eq!(
            wire::decode_ids(&sent).unwrap(),
            vec![SchemaId(1), SchemaId(2)]
        );
        assert_eq!(coord.state(ConnectionId(1)), HandshakeState::Open);
        assert_eq!(coord.open_connections(), vec![ConnectionId(1)]);
    }

    #[test]
    fn start_send_failure_is_handshake_failed() {
        let coord = coordinator();
        let conn = MockConnection::new(1, 1);
        conn.fail_sends(true);

        assert!(matches!(
            coord.start(&conn),
            Err(HandshakeError::HandshakeFailed(_))
        ));
        assert_eq!(coord.state(ConnectionId(1)), HandshakeState::Unopened);
    }

    #[test]
    fn start_rejects_old_peer() {
        let cache = SchemaCache::open(Arc::new(MemorySchemaStore::new())).unwrap();
        let config = HandshakeConfig::builder().min_product_version(3).build();
        let coord = HandshakeCoordinator::new(Arc::new(cache), &config);
        let conn = MockConnection::new(1, 2);

        assert!(matches!(
            coord.start(&conn),
            Err(HandshakeError::HandshakeFailed(_))
        ));
        assert!(conn.sent().is_empty());
    }

    #[test]
    fn events_before_open_are_rejected() {
        let coord = coordinator();
        let peer = PeerContext::new(ConnectionId(4), 1);
        assert_eq!(
            coord.comp_data(peer, &[]),
            Err(HandshakeError::NotOpen(ConnectionId(4)))
        );
        assert!(coord.build_request(peer, &[SchemaId(1)]).is_err());
    }

    #[test]
    fn comp_data_records_remote_ids() {
        let coord = coordinator();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let payload = wire::encode_ids(&[SchemaId(5), SchemaId(6)]);
        assert_eq!(coord.comp_data(conn.peer(), &payload).unwrap(), 2);
        assert!(coord.trackers().remote_knows(ConnectionId(1), SchemaId(6)));
    }

    #[test]
    fn comp_request_skips_schemas_the_peer_holds() {
        let coord = coordinator();
        coord.cache().register(schema(1, "one")).unwrap();
        coord.cache().register(schema(2, "two")).unwrap();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();
        coord
            .comp_data(conn.peer(), &wire::encode_ids(&[SchemaId(2)]))
            .unwrap();

        let request = wire::encode_ids(&[SchemaId(1), SchemaId(2)]);
        let reply = coord
            .comp_request(conn.peer(), wire::REQUEST_SCHEMA, &request)
            .unwrap();
        let got = wire::decode_bundle(&reply).unwrap();
        assert_eq!(got, vec![schema(1, "one")]);
    }

    #[test]
    fn oversized_payload_is_decode_error() {
        let cache = SchemaCache::open(Arc::new(MemorySchemaStore::new())).unwrap();
        let config = HandshakeConfig::builder().max_payload_bytes(16).build();
        let coord = HandshakeCoordinator::new(Arc::new(cache), &config);
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let ids: Vec<SchemaId> = (0..3).map(SchemaId).collect();
        assert!(matches!(
            coord.comp_data(conn.peer(), &wire::encode_ids(&ids)),
            Err(HandshakeError::Decode(_))
        ));
    }

    #[test]
    fn handshake_data_replies_with_ids_peer_lacks() {
        let coord = coordinator();
        coord.cache().register(schema(1, "one")).unwrap();
        coord.cache().register(schema(2, "two")).unwrap();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let reply = coord
            .comp_handshake_data(conn.peer(), &wire::encode_ids(&[SchemaId(1)]))
            .unwrap()
            .unwrap();
        assert_eq!(wire::decode_ids(&reply).unwrap(), vec![SchemaId(2)]);

        let none = coord
            .comp_handshake_data(conn.peer(), &wire::encode_ids(&[SchemaId(2)]))
            .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn receive_schemas_registers_and_marks() {
        let coord = coordinator();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let bundle = wire::encode_bundle(&[schema(8, "eight"), schema(9, "nine")]).unwrap();
        assert_eq!(coord.receive_schemas(conn.peer(), &bundle).unwrap(), 2);
        assert_eq!(coord.receive_schemas(conn.peer(), &bundle).unwrap(), 0);

        assert_eq!(coord.cache().get(SchemaId(9)).unwrap().bytes(), b"nine");
        assert!(coord.trackers().remote_knows(ConnectionId(1), SchemaId(8)));
    }

    #[test]
    fn build_request_lists_only_missing() {
        let coord = coordinator();
        coord.cache().register(schema(1, "one")).unwrap();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        let request = coord
            .build_request(conn.peer(), &[SchemaId(1), SchemaId(3)])
            .unwrap()
            .unwrap();
        assert_eq!(wire::decode_ids(&request).unwrap(), vec![SchemaId(3)]);
        assert!(coord
            .build_request(conn.peer(), &[SchemaId(1)])
            .unwrap()
            .is_none());
    }

    #[test]
    fn schemas_for_send_once_per_connection() {
        let coord = coordinator();
        coord.cache().register(schema(1, "one")).unwrap();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        assert_eq!(
            coord
                .schemas_for_send(&conn, &[SchemaId(1), SchemaId(1)])
                .unwrap(),
            1
        );
        let pushed = conn.last_sent(FrameKind::Schemas).unwrap();
        assert_eq!(wire::decode_bundle(&pushed).unwrap(), vec![schema(1, "one")]);

        assert_eq!(coord.schemas_for_send(&conn, &[SchemaId(1)]).unwrap(), 0);
        assert_eq!(conn.sent().len(), 2, "opening list plus one push");

        assert_eq!(
            coord.schemas_for_send(&conn, &[SchemaId(77)]),
            Err(HandshakeError::UnknownSchema(SchemaId(77)))
        );
    }

    #[test]
    fn failed_push_marks_nothing() {
        let coord = coordinator();
        coord.cache().register(schema(42, "answer")).unwrap();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        conn.fail_sends(true);
        assert!(matches!(
            coord.schemas_for_send(&conn, &[SchemaId(42)]),
            Err(HandshakeError::HandshakeFailed(_))
        ));
        assert!(!coord.trackers().remote_knows(ConnectionId(1), SchemaId(42)));

        let request = wire::encode_ids(&[SchemaId(42)]);
        let reply = coord
            .comp_request(conn.peer(), wire::REQUEST_SCHEMA, &request)
            .unwrap();
        assert_eq!(wire::decode_bundle(&reply).unwrap(), vec![schema(42, "answer")]);

        conn.fail_sends(false);
        assert_eq!(coord.schemas_for_send(&conn, &[SchemaId(42)]).unwrap(), 0);
    }

    #[test]
    fn close_reports_whether_tracker_existed() {
        let coord = coordinator();
        let conn = MockConnection::new(1, 1);
        coord.start(&conn).unwrap();

        assert!(coord.comp_close(conn.peer()));
        assert!(!coord.comp_close(conn.peer()));
        assert!(coord.open_connections().is_empty());
    }
}
