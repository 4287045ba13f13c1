//! Broadcast Audio Extension (bext) chunk codec
//!
//! EBU Tech 3285 fixed binary layout. Reads unpack by offset with strings
//! trimmed at the first NUL; updates patch individual fields and leave
//! every other byte of the source payload verbatim.

use crate::types::BextSnapshot;

/// Payload length of a Version 1 bext with empty coding history
pub const BEXT_FIXED_LEN: usize = 602;

const DESCRIPTION_OFFSET: usize = 0;
const DESCRIPTION_LEN: usize = 256;
const ORIGINATOR_OFFSET: usize = 256;
const ORIGINATOR_LEN: usize = 32;
const ORIGINATOR_REF_OFFSET: usize = 288;
const ORIGINATOR_REF_LEN: usize = 32;
const ORIGINATION_DATE_OFFSET: usize = 320;
const ORIGINATION_DATE_LEN: usize = 10;
const ORIGINATION_TIME_OFFSET: usize = 330;
const ORIGINATION_TIME_LEN: usize = 8;
const TIME_REFERENCE_OFFSET: usize = 338;
const VERSION_OFFSET: usize = 346;
const CODING_HISTORY_OFFSET: usize = 602;

/// Fields a write may patch into an existing bext payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BextUpdates {
    pub description: Option<String>,
    pub originator: Option<String>,
}

impl BextUpdates {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.originator.is_none()
    }
}

/// Read a fixed-length NUL-padded ASCII string field
fn read_string(payload: &[u8], offset: usize, len: usize) -> String {
    let end = (offset + len).min(payload.len());
    if offset >= end {
        return String::new();
    }
    let slice = &payload[offset..end];
    let terminated = slice.iter().position(|&b| b == 0).unwrap_or(slice.len());
    String::from_utf8_lossy(&slice[..terminated]).into_owned()
}

/// Write a string into a fixed-length field, NUL-padded, non-ASCII mapped
/// to `?` per the chunk's ASCII encoding
fn write_string(payload: &mut [u8], offset: usize, len: usize, value: &str) {
    let field = &mut payload[offset..offset + len];
    field.fill(0);
    for (slot, c) in field.iter_mut().zip(value.chars()) {
        *slot = if c.is_ascii() && !c.is_ascii_control() {
            c as u8
        } else {
            b'?'
        };
    }
}

/// Parse a bext payload into its string/scalar fields.
///
/// Tolerant of short payloads from sloppy writers: missing trailing fields
/// read as empty/zero.
pub fn parse(payload: &[u8]) -> BextSnapshot {
    let time_reference = if payload.len() >= TIME_REFERENCE_OFFSET + 8 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&payload[TIME_REFERENCE_OFFSET..TIME_REFERENCE_OFFSET + 8]);
        u64::from_le_bytes(bytes)
    } else {
        0
    };
    let version = if payload.len() >= VERSION_OFFSET + 2 {
        u16::from_le_bytes([payload[VERSION_OFFSET], payload[VERSION_OFFSET + 1]])
    } else {
        0
    };
    let coding_history = if payload.len() > CODING_HISTORY_OFFSET {
        String::from_utf8_lossy(&payload[CODING_HISTORY_OFFSET..])
            .trim_end_matches('\0')
            .to_string()
    } else {
        String::new()
    };

    BextSnapshot {
        description: read_string(payload, DESCRIPTION_OFFSET, DESCRIPTION_LEN),
        originator: read_string(payload, ORIGINATOR_OFFSET, ORIGINATOR_LEN),
        originator_reference: read_string(payload, ORIGINATOR_REF_OFFSET, ORIGINATOR_REF_LEN),
        origination_date: read_string(payload, ORIGINATION_DATE_OFFSET, ORIGINATION_DATE_LEN),
        origination_time: read_string(payload, ORIGINATION_TIME_OFFSET, ORIGINATION_TIME_LEN),
        time_reference,
        version,
        coding_history,
    }
}

/// Patch specific fields into an existing payload; all other bytes are
/// retained verbatim. Short payloads are zero-extended to the fixed layout
/// first so every field offset exists.
pub fn patch(payload: &[u8], updates: &BextUpdates) -> Vec<u8> {
    let mut out = payload.to_vec();
    if out.len() < BEXT_FIXED_LEN {
        out.resize(BEXT_FIXED_LEN, 0);
    }

    if let Some(description) = &updates.description {
        write_string(&mut out, DESCRIPTION_OFFSET, DESCRIPTION_LEN, description);
    }
    if let Some(originator) = &updates.originator {
        write_string(&mut out, ORIGINATOR_OFFSET, ORIGINATOR_LEN, originator);
    }
    out
}

/// Synthesize a fresh Version=1 bext payload with zeroed UMID, loudness
/// and reserved regions, stamped with the current origination date/time.
pub fn synthesize(updates: &BextUpdates) -> Vec<u8> {
    let mut out = vec![0u8; BEXT_FIXED_LEN];
    out[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&1u16.to_le_bytes());

    let now = chrono::Local::now();
    write_string(
        &mut out,
        ORIGINATION_DATE_OFFSET,
        ORIGINATION_DATE_LEN,
        &now.format("%Y-%m-%d").to_string(),
    );
    write_string(
        &mut out,
        ORIGINATION_TIME_OFFSET,
        ORIGINATION_TIME_LEN,
        &now.format("%H:%M:%S").to_string(),
    );

    patch(&out, updates)
}
