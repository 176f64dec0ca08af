// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Schema identity and value types.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// SchemaId
// ---------------------------------------------------------------------------

/// 64-bit schema identity. Globally unique, never reassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaId(pub u64);

impl SchemaId {
    /// Size of an encoded identity on the wire.
    pub const ENCODED_LEN: usize = 8;

    /// Raw 64-bit value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Parse a hex identity as printed by `Display` (an optional `0x` prefix is accepted).
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        u64::from_str_radix(digits, 16).ok().map(SchemaId)
    }
}

impl From<u64> for SchemaId {
    fn from(raw: u64) -> Self {
        SchemaId(raw)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// An identified binary definition of a message's wire layout.
///
/// Immutable once built; clones share the same definition bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct Schema {
    id: SchemaId,
    bytes: Arc<[u8]>,
}

impl Schema {
    /// Wrap a definition under an explicit identity.
    pub fn new(id: SchemaId, bytes: impl Into<Arc<[u8]>>) -> Self {
        Schema {
            id,
            bytes: bytes.into(),
        }
    }

    /// Build a locally synthesised schema whose identity is its fingerprint.
    pub fn from_definition(bytes: impl Into<Arc<[u8]>>) -> Self {
        let bytes = bytes.into();
        Schema {
            id: fingerprint(&bytes),
            bytes,
        }
    }

    /// Schema identity.
    pub fn id(&self) -> SchemaId {
        self.id
    }

    /// Opaque encoded definition.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Length of the encoded definition.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True if the definition is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Derive a schema identity from its definition.
///
/// MD5 of the definition, truncated to its first 8 bytes (big-endian). Stable
/// across processes and releases, which is required for persisted identities.
pub fn fingerprint(definition: &[u8]) -> SchemaId {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(definition);
    let digest = hasher.finalize();

    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    SchemaId(u64::from_be_bytes(head))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
