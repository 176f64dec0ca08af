// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! End-to-end handshake behaviour between two in-process peers.

use std::sync::{Arc, Barrier};
use std::thread;

use hdds_schema_handshake::wire::{self, REQUEST_SCHEMA};
use hdds_schema_handshake::{
    ComponentHandshake, ConnectionId, FrameKind, HandshakeConfig, HandshakeCoordinator,
    MemorySchemaStore, MockConnection, Schema, SchemaCache, SchemaConnection, SchemaId,
};

struct Peer {
    store: Arc<MemorySchemaStore>,
    binding: ComponentHandshake,
}

impl Peer {
    fn new() -> Self {
        let store = Arc::new(MemorySchemaStore::new());
        let cache = SchemaCache::open(store.clone()).unwrap();
        let coordinator = HandshakeCoordinator::new(Arc::new(cache), &HandshakeConfig::default());
        Self {
            store,
            binding: ComponentHandshake::new(Arc::new(coordinator)),
        }
    }

    fn cache(&self) -> &Arc<SchemaCache> {
        self.binding.coordinator().cache()
    }
}

fn schema(id: u64, body: &str) -> Schema {
    Schema::new(SchemaId(id), body.as_bytes())
}

#[test]
fn test_two_peers_exchange_missing_schemas() {
    let a = Peer::new();
    let b = Peer::new();
    a.cache().register(schema(1, "struct One {};")).unwrap();
    a.cache().register(schema(2, "struct Two {};")).unwrap();
    b.cache().register(schema(2, "struct Two {};")).unwrap();

    // Each side sees its own end of the same link.
    let a_side = MockConnection::new(10, 1);
    let b_side = MockConnection::new(20, 1);
    assert!(a.binding.on_open(&a_side));
    assert!(b.binding.on_open(&b_side));

    let a_list = a_side.last_sent(FrameKind::KnownIds).unwrap();
    let b_list = b_side.last_sent(FrameKind::KnownIds).unwrap();
    assert!(b.binding.on_data(b_side.peer(), &a_list));
    assert!(a.binding.on_data(a_side.peer(), &b_list));

    // B meets a message referencing schema 1 and asks A for it.
    let request = b
        .binding
        .coordinator()
        .build_request(b_side.peer(), &[SchemaId(1), SchemaId(2)])
        .unwrap()
        .unwrap();
    let reply = a
        .binding
        .on_request(a_side.peer(), REQUEST_SCHEMA, &request)
        .unwrap();
    assert!(b.binding.on_schemas(b_side.peer(), &reply));

    assert_eq!(b.cache().get(SchemaId(1)).unwrap().bytes(), b"struct One {};");
    assert_eq!(b.store.persist_calls(), 2);
    assert!(a
        .binding
        .coordinator()
        .trackers()
        .remote_knows(ConnectionId(10), SchemaId(1)));
}

#[test]
fn test_request_same_id_twice_transfers_once() {
    let peer = Peer::new();
    peer.cache().register(schema(42, "struct Answer {};")).unwrap();
    let conn = MockConnection::new(1, 1);
    assert!(peer.binding.on_open(&conn));

    let request = wire::encode_ids(&[SchemaId(42)]);
    let first = peer
        .binding
        .on_request(conn.peer(), REQUEST_SCHEMA, &request)
        .unwrap();
    assert_eq!(wire::decode_bundle(&first).unwrap().len(), 1);
    assert!(peer
        .binding
        .coordinator()
        .trackers()
        .remote_knows(ConnectionId(1), SchemaId(42)));

    let second = peer
        .binding
        .on_request(conn.peer(), REQUEST_SCHEMA, &request)
        .unwrap();
    assert!(wire::decode_bundle(&second).unwrap().is_empty());
    assert_eq!(peer.store.persist_calls(), 1);
}

#[test]
fn test_unknown_ids_are_omitted() {
    let peer = Peer::new();
    peer.cache().register(schema(1, "one")).unwrap();
    peer.cache().register(schema(2, "two")).unwrap();

    let bundle = peer
        .cache()
        .encode_by_ids(&[SchemaId(1), SchemaId(2), SchemaId(999)])
        .unwrap();
    let schemas = wire::decode_bundle(&bundle).unwrap();
    assert_eq!(schemas, vec![schema(1, "one"), schema(2, "two")]);

    let conn = MockConnection::new(1, 1);
    assert!(peer.binding.on_open(&conn));
    let reply = peer
        .binding
        .on_request(conn.peer(), REQUEST_SCHEMA, &wire::encode_ids(&[SchemaId(999)]))
        .unwrap();
    assert!(reply.is_empty());
}

#[test]
fn test_invalid_command_leaves_state_unchanged() {
    let peer = Peer::new();
    peer.cache().register(schema(1, "one")).unwrap();
    let conn = MockConnection::new(1, 1);
    assert!(peer.binding.on_open(&conn));

    let before = peer
        .binding
        .coordinator()
        .trackers()
        .snapshot(ConnectionId(1))
        .unwrap();
    let stats_before = peer.cache().stats();

    let reply = peer
        .binding
        .on_request(conn.peer(), 0xFFFF, &wire::encode_ids(&[SchemaId(1)]));
    assert!(reply.is_none());

    let after = peer
        .binding
        .coordinator()
        .trackers()
        .snapshot(ConnectionId(1))
        .unwrap();
    assert_eq!(before.remote_known_ids(), after.remote_known_ids());
    assert_eq!(before.state(), after.state());
    assert_eq!(peer.cache().stats(), stats_before);
    assert_eq!(peer.cache().len(), 1);
}

#[test]
fn test_close_is_idempotent() {
    let peer = Peer::new();
    peer.cache().register(schema(1, "one")).unwrap();

    let never_opened = MockConnection::new(5, 1);
    peer.binding.on_close(never_opened.peer());

    let conn = MockConnection::new(6, 1);
    assert!(peer.binding.on_open(&conn));
    peer.binding.on_close(conn.peer());
    peer.binding.on_close(conn.peer());

    assert!(peer.cache().has(SchemaId(1)));
    assert_eq!(peer.cache().len(), 1);
    assert!(peer.binding.coordinator().open_connections().is_empty());
}

#[test]
fn test_concurrent_registration_of_same_id() {
    const THREADS: usize = 8;

    let peer = Peer::new();
    let cache = Arc::clone(peer.cache());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.register(schema(7, "struct Shared {};")).unwrap()
            })
        })
        .collect();

    let new_count = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|is_new| *is_new)
        .count();

    assert_eq!(new_count, 1);
    assert_eq!(peer.store.persist_calls(), 1);
    assert!(cache.has(SchemaId(7)));
}

#[test]
fn test_concurrent_registration_of_different_ids() {
    const THREADS: u64 = 8;

    let peer = Peer::new();
    let cache = Arc::clone(peer.cache());
    let barrier = Arc::new(Barrier::new(THREADS as usize));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.register(schema(i, "struct Distinct {};")).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(cache.len(), THREADS as usize);
    assert_eq!(peer.store.persist_calls(), THREADS as usize);
}

#[test]
fn test_connections_progress_independently() {
    let peer = Peer::new();
    peer.cache().register(schema(3, "three")).unwrap();

    let handles: Vec<_> = (1..=4u64)
        .map(|id| {
            let binding = peer.binding.clone();
            thread::spawn(move || {
                let conn = MockConnection::new(id, 1);
                assert!(binding.on_open(&conn));
                let request = wire::encode_ids(&[SchemaId(3)]);
                let reply = binding
                    .on_request(conn.peer(), REQUEST_SCHEMA, &request)
                    .unwrap();
                binding.on_close(conn.peer());
                wire::decode_bundle(&reply).unwrap().len()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1, "each connection gets its own copy");
    }
    assert!(peer.binding.coordinator().open_connections().is_empty());
}

#[test]
fn test_push_before_send() {
    let sender = Peer::new();
    let receiver = Peer::new();
    let definition = Schema::from_definition(&b"struct Pushed { double v; };"[..]);
    let id = definition.id();
    sender.cache().register(definition).unwrap();

    let tx = MockConnection::new(1, 1);
    let rx = MockConnection::new(2, 1);
    assert!(sender.binding.on_open(&tx));
    assert!(receiver.binding.on_open(&rx));

    assert!(sender.binding.on_send(&tx, &[id]));
    let pushed = tx.last_sent(FrameKind::Schemas).unwrap();
    assert!(receiver.binding.on_schemas(rx.peer(), &pushed));
    assert!(receiver.cache().has(id));

    assert_eq!(
        sender
            .binding
            .coordinator()
            .schemas_for_send(&tx, &[id])
            .unwrap(),
        0
    );
    let pushes = tx
        .sent()
        .iter()
        .filter(|(kind, _)| *kind == FrameKind::Schemas)
        .count();
    assert_eq!(pushes, 1);
}

#[test]
fn test_lost_push_can_still_be_fetched() {
    let peer = Peer::new();
    peer.cache().register(schema(42, "struct Answer {};")).unwrap();
    let conn = MockConnection::new(1, 1);
    assert!(peer.binding.on_open(&conn));

    conn.fail_sends(true);
    assert!(!peer.binding.on_send(&conn, &[SchemaId(42)]));
    assert!(!peer
        .binding
        .coordinator()
        .trackers()
        .remote_knows(ConnectionId(1), SchemaId(42)));

    let reply = peer
        .binding
        .on_request(conn.peer(), REQUEST_SCHEMA, &wire::encode_ids(&[SchemaId(42)]))
        .unwrap();
    let schemas = wire::decode_bundle(&reply).unwrap();
    assert_eq!(schemas, vec![schema(42, "struct Answer {};")]);
}
