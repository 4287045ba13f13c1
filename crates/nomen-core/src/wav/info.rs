//! LIST-INFO chunk codec
//!
//! A `LIST` chunk whose first four payload bytes are `INFO` carries legacy
//! RIFF metadata as a sequence of sub-chunks with NUL-terminated string
//! payloads. Update policy is fill-gaps-only: existing values are never
//! overwritten, and untouched sub-chunks are copied byte-for-byte.

use std::collections::BTreeMap;

use crate::types::InfoSnapshot;

/// One parsed INFO sub-chunk, with its raw bytes for faithful re-emission
#[derive(Debug, Clone)]
struct InfoSubChunk {
    id: [u8; 4],
    /// Full raw bytes: header + payload + pad
    raw: Vec<u8>,
    value: String,
}

/// True when a LIST payload is an INFO form
pub fn is_info_form(payload: &[u8]) -> bool {
    payload.len() >= 4 && &payload[0..4] == b"INFO"
}

fn parse_subchunks(payload: &[u8]) -> Vec<InfoSubChunk> {
    let mut subchunks = Vec::new();
    let mut offset = 4; // past the INFO form tag

    while offset + 8 <= payload.len() {
        let id = [
            payload[offset],
            payload[offset + 1],
            payload[offset + 2],
            payload[offset + 3],
        ];
        let size = u32::from_le_bytes([
            payload[offset + 4],
            payload[offset + 5],
            payload[offset + 6],
            payload[offset + 7],
        ]) as usize;

        let value_start = offset + 8;
        let value_end = value_start + size;
        if value_end > payload.len() {
            // Truncated sub-chunk from a sloppy writer; stop here and let
            // the remainder ride along untouched.
            break;
        }

        let pad = if size % 2 == 1 && value_end < payload.len() {
            1
        } else {
            0
        };
        let raw = payload[offset..value_end + pad].to_vec();

        let value_bytes = &payload[value_start..value_end];
        let terminated = value_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(value_bytes.len());
        let value = String::from_utf8_lossy(&value_bytes[..terminated]).into_owned();

        subchunks.push(InfoSubChunk { id, raw, value });
        offset = value_end + pad;
    }

    subchunks
}

/// Parse a LIST-INFO payload into id → value; `None` for non-INFO forms
pub fn parse(payload: &[u8]) -> Option<InfoSnapshot> {
    if !is_info_form(payload) {
        return None;
    }
    let mut snapshot = InfoSnapshot::new();
    for sub in parse_subchunks(payload) {
        snapshot.insert(String::from_utf8_lossy(&sub.id).into_owned(), sub.value);
    }
    Some(snapshot)
}

fn encode_subchunk(id: &[u8; 4], value: &str) -> Vec<u8> {
    let mut bytes = value.as_bytes().to_vec();
    bytes.push(0); // NUL terminator, counted in the size field
    let mut out = Vec::with_capacity(8 + bytes.len() + 1);
    out.extend_from_slice(id);
    out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&bytes);
    if bytes.len() % 2 == 1 {
        out.push(0);
    }
    out
}

/// Apply fill-gaps-only additions to a LIST-INFO payload.
///
/// Sub-chunks that already hold a value are re-emitted from their raw
/// bytes. A mapped field is written only when its sub-chunk is absent or
/// its current value is empty.
pub fn merge(payload: &[u8], additions: &BTreeMap<String, String>) -> Vec<u8> {
    if additions.is_empty() {
        return payload.to_vec();
    }

    let existing = parse_subchunks(payload);
    let mut out = Vec::with_capacity(payload.len());
    out.extend_from_slice(b"INFO");

    let mut remaining = additions.clone();

    for sub in &existing {
        let id_str = String::from_utf8_lossy(&sub.id).into_owned();
        match remaining.remove(&id_str) {
            Some(value) if sub.value.is_empty() => {
                out.extend_from_slice(&encode_subchunk(&sub.id, &value));
            }
            _ => {
                // Present with a value (or not being filled): verbatim copy
                out.extend_from_slice(&sub.raw);
            }
        }
    }

    for (id_str, value) in &remaining {
        let id_bytes = id_str.as_bytes();
        if id_bytes.len() != 4 {
            log::warn!("Skipping INFO id with bad length: {id_str:?}");
            continue;
        }
        let id = [id_bytes[0], id_bytes[1], id_bytes[2], id_bytes[3]];
        out.extend_from_slice(&encode_subchunk(&id, value));
    }

    out
}

/// Build a fresh LIST-INFO payload from additions alone
pub fn build(additions: &BTreeMap<String, String>) -> Vec<u8> {
    merge(b"INFO", additions)
}
