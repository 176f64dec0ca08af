// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire and record encodings used by the schema handshake.
//!
//! All integers are big-endian.
//!
//! ID list (handshake lists and fetch requests):
//! ```text
//! +-----------+-----------+-----+
//! | id (8B)   | id (8B)   | ... |
//! +-----------+-----------+-----+
//! ```
//!
//! Schema bundle (fetch responses and pushed schemas):
//! ```text
//! +-----------+------------+----------------+-----+
//! | id (8B)   | len (4B)   | bytes (len)    | ... |
//! +-----------+------------+----------------+-----+
//! ```
//!
//! Persisted record (one per schema in the durable store):
//! ```text
//! +---------------+-------------+-----------+----------------+
//! | "HSCH" (4B)   | version (1) | id (8B)   | bytes (rest)   |
//! +---------------+-------------+-----------+----------------+
//! ```

use crate::error::HandshakeError;
use crate::schema::{Schema, SchemaId};

/// The only command accepted on the request path: fetch schemas by ID.
pub const REQUEST_SCHEMA: u16 = 0x006E;

/// Magic prefix of a persisted schema record.
pub const RECORD_MAGIC: [u8; 4] = *b"HSCH";

/// Current persisted record version.
pub const RECORD_VERSION: u8 = 1;

const RECORD_HEADER_LEN: usize = 4 + 1 + SchemaId::ENCODED_LEN;
const BUNDLE_HEADER_LEN: usize = SchemaId::ENCODED_LEN + 4;

// ---------------------------------------------------------------------------
// ID lists
// ---------------------------------------------------------------------------

/// Encode an ordered list of schema IDs.
pub fn encode_ids<'a, I>(ids: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a SchemaId>,
{
    let iter = ids.into_iter();
    let mut buf = Vec::with_capacity(iter.size_hint().0 * SchemaId::ENCODED_LEN);
    for id in iter {
        buf.extend_from_slice(&id.get().to_be_bytes());
    }
    buf
}

/// Decode an ordered list of schema IDs.
pub fn decode_ids(payload: &[u8]) -> Result<Vec<SchemaId>, HandshakeError> {
    if payload.len() % SchemaId::ENCODED_LEN != 0 {
        return Err(HandshakeError::Decode(format!(
            "id list length {} is not a multiple of {}",
            payload.len(),
            SchemaId::ENCODED_LEN
        )));
    }

    Ok(payload
        .chunks_exact(SchemaId::ENCODED_LEN)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            SchemaId(u64::from_be_bytes(raw))
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Schema bundles
// ---------------------------------------------------------------------------

/// Append one schema to a bundle.
pub fn push_bundle_entry(buf: &mut Vec<u8>, schema: &Schema) -> Result<(), HandshakeError> {
    let len = u32::try_from(schema.len()).map_err(|_| {
        HandshakeError::Decode(format!(
            "schema {} too large for a bundle ({} bytes)",
            schema.id(),
            schema.len()
        ))
    })?;
    buf.reserve(BUNDLE_HEADER_LEN + schema.len());
    buf.extend_from_slice(&schema.id().get().to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(schema.bytes());
    Ok(())
}

/// Encode a sequence of schemas as a bundle.
pub fn encode_bundle<'a, I>(schemas: I) -> Result<Vec<u8>, HandshakeError>
where
    I: IntoIterator<Item = &'a Schema>,
{
    let mut buf = Vec::new();
    for schema in schemas {
        push_bundle_entry(&mut buf, schema)?;
    }
    Ok(buf)
}

/// Decode a bundle into schemas, in payload order.
pub fn decode_bundle(payload: &[u8]) -> Result<Vec<Schema>, HandshakeError> {
    let mut schemas = Vec::new();
    let mut offset = 0;

    while offset < payload.len() {
        if payload.len() < offset + BUNDLE_HEADER_LEN {
            return Err(HandshakeError::Decode(format!(
                "truncated bundle header at offset {}",
                offset
            )));
        }

        let mut raw_id = [0u8; 8];
        raw_id.copy_from_slice(&payload[offset..offset + 8]);
        offset += 8;

        let mut raw_len = [0u8; 4];
        raw_len.copy_from_slice(&payload[offset..offset + 4]);
        offset += 4;
        let len = u32::from_be_bytes(raw_len) as usize;

        if payload.len() < offset + len {
            return Err(HandshakeError::Decode(format!(
                "truncated schema {:016x}: need {} bytes, have {}",
                u64::from_be_bytes(raw_id),
                len,
                payload.len() - offset
            )));
        }

        schemas.push(Schema::new(
            SchemaId(u64::from_be_bytes(raw_id)),
            &payload[offset..offset + len],
        ));
        offset += len;
    }

    Ok(schemas)
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Encode a schema as a self-describing persisted record.
pub fn encode_record(schema: &Schema) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + schema.len());
    buf.extend_from_slice(&RECORD_MAGIC);
    buf.push(RECORD_VERSION);
    buf.extend_from_slice(&schema.id().get().to_be_bytes());
    buf.extend_from_slice(schema.bytes());
    buf
}

/// Decode a persisted record.
///
/// Returns `None` for records that are not schema records (wrong magic,
/// unknown version, short header). The caller decides whether to skip them.
pub fn decode_record(record: &[u8]) -> Option<Schema> {
    if record.len() < RECORD_HEADER_LEN {
        return None;
    }
    if record[0..4] != RECORD_MAGIC || record[4] != RECORD_VERSION {
        return None;
    }

    let mut raw_id = [0u8; 8];
    raw_id.copy_from_slice(&record[5..RECORD_HEADER_LEN]);
    Some(Schema::new(
        SchemaId(u64::from_be_bytes(raw_id)),
        &record[RECORD_HEADER_LEN..],
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_list_layout_is_big_endian() {
        let buf = encode_ids(&[SchemaId(1), SchemaId(0x0102_0304_0506_0708)]);
        assert_eq!(buf.len(), 16);
        assert_eq!(&buf[0..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&buf[8..16], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(
            decode_ids(&buf).unwrap(),
            vec![SchemaId(1), SchemaId(0x0102_0304_0506_0708)]
        );
    }

    #[test]
    fn id_list_rejects_partial_id() {
        let err = decode_ids(&[0u8; 12]).unwrap_err();
        assert!(matches!(err, HandshakeError::Decode(_)));
    }

    #[test]
    fn empty_id_list() {
        assert!(encode_ids(&[] as &[SchemaId]).is_empty());
        assert!(decode_ids(&[]).unwrap().is_empty());
    }

    #[test]
    fn bundle_preserves_order_and_bytes() {
        let a = Schema::new(SchemaId(1), b"alpha".to_vec());
        let b = Schema::new(SchemaId(2), Vec::<u8>::new());
        let buf = encode_bundle([&a, &b]).unwrap();
        assert_eq!(buf.len(), (12 + 5) + 12);

        let decoded = decode_bundle(&buf).unwrap();
        assert_eq!(decoded, vec![a, b]);
    }

    #[test]
    fn bundle_truncated_body_is_error() {
        let a = Schema::new(SchemaId(1), b"alpha".to_vec());
        let buf = encode_bundle([&a]).unwrap();
        assert!(decode_bundle(&buf[..buf.len() - 1]).is_err());
        assert!(decode_bundle(&buf[..7]).is_err());
    }

    #[test]
    fn record_roundtrip_and_rejection() {
        let schema = Schema::new(SchemaId(42), b"def".to_vec());
        let record = encode_record(&schema);
        assert_eq!(&record[0..4], b"HSCH");
        assert_eq!(decode_record(&record), Some(schema));

        let mut wrong_version = record.clone();
        wrong_version[4] = 99;
        assert_eq!(decode_record(&wrong_version), None);
        assert_eq!(decode_record(b"JUNK-RECORD-DATA"), None);
        assert_eq!(decode_record(b"HSCH"), None);
    }
}
