//! Chunk-preserving WAV metadata I/O
//!
//! Reads parse the RIFF chunk table and decode the three metadata chunks
//! the core owns (`bext`, `iXML`, `LIST-INFO`); writes rebuild the file
//! through a same-directory temp file, stream-copying every chunk the core
//! does not own byte-for-byte. The audio `data` payload is never loaded
//! into memory on either path.

pub mod bext;
pub mod fields;
pub mod info;
pub mod ixml;
pub mod riff;
mod writer;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{CoreError, CoreResult};
use crate::types::{BextSnapshot, InfoSnapshot, MetadataFields, TechnicalInfo};

pub use riff::{walk_chunks, ChunkDesc};
pub use writer::{write_metadata, WriteOutcome, WriteRequest};

/// FourCCs of the chunks the writer owns
pub const BEXT_ID: &[u8; 4] = b"bext";
pub const IXML_ID: &[u8; 4] = b"iXML";
pub const LIST_ID: &[u8; 4] = b"LIST";
pub const FMT_ID: &[u8; 4] = b"fmt ";
pub const DATA_ID: &[u8; 4] = b"data";

/// Everything read from one WAV file
#[derive(Debug, Clone, Default)]
pub struct WavMetadata {
    pub technical: TechnicalInfo,
    pub fields: MetadataFields,
    pub custom_fields: BTreeMap<String, String>,
    pub bext: Option<BextSnapshot>,
    pub info: InfoSnapshot,
}

fn parse_fmt(payload: &[u8], path: &Path) -> CoreResult<(u16, u16, u32, u16, u16)> {
    if payload.len() < 16 {
        return Err(CoreError::InvalidWav {
            path: path.to_path_buf(),
            reason: format!("fmt chunk too small: {} bytes", payload.len()),
        });
    }
    let format_tag = u16::from_le_bytes([payload[0], payload[1]]);
    let channels = u16::from_le_bytes([payload[2], payload[3]]);
    let sample_rate = u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]);
    let block_align = u16::from_le_bytes([payload[12], payload[13]]);
    let bits_per_sample = u16::from_le_bytes([payload[14], payload[15]]);
    Ok((format_tag, channels, sample_rate, block_align, bits_per_sample))
}

/// Read technical info and the merged metadata working set from a WAV file
pub fn read_metadata(path: &Path) -> CoreResult<WavMetadata> {
    let file = File::open(path).map_err(|e| CoreError::from_io(path, e))?;
    let byte_size = file
        .metadata()
        .map_err(|e| CoreError::from_io(path, e))?
        .len();
    let mut reader = BufReader::new(file);

    let chunks = riff::walk_chunks(&mut reader, path)?;

    let mut out = WavMetadata::default();
    out.technical.byte_size = byte_size;

    let mut fmt_seen = false;
    let mut block_align: u16 = 0;
    let mut data_size: u64 = 0;

    for desc in &chunks {
        if desc.is(FMT_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            let (format_tag, channels, sample_rate, align, bits) = parse_fmt(&payload, path)?;
            out.technical.format_tag = format_tag;
            out.technical.channels = channels;
            out.technical.sample_rate = sample_rate;
            out.technical.bit_depth = bits;
            block_align = align;
            fmt_seen = true;
        } else if desc.is(DATA_ID) {
            data_size = desc.size as u64;
        } else if desc.is(BEXT_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            out.bext = Some(bext::parse(&payload));
        } else if desc.is(IXML_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            match ixml::parse_document(&payload) {
                Ok(root) => {
                    let (metadata, custom_fields) = ixml::read_fields(&root);
                    out.fields = metadata;
                    out.custom_fields = custom_fields;
                }
                Err(e) => {
                    log::warn!("Unparseable iXML chunk in {:?}: {}", path, e);
                }
            }
        } else if desc.is(LIST_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            if let Some(snapshot) = info::parse(&payload) {
                out.info = snapshot;
            }
        }
    }

    if !fmt_seen {
        return Err(CoreError::InvalidWav {
            path: path.to_path_buf(),
            reason: "no fmt chunk".to_string(),
        });
    }

    if block_align > 0 {
        out.technical.frame_count = data_size / block_align as u64;
    }
    if out.technical.sample_rate > 0 {
        out.technical.duration_seconds =
            out.technical.frame_count as f64 / out.technical.sample_rate as f64;
    }

    apply_read_fallbacks(&mut out);
    Ok(out)
}

/// Read-side fallback merge: an empty iXML field takes the mapped bext or
/// INFO value, bext winning over INFO.
fn apply_read_fallbacks(metadata: &mut WavMetadata) {
    for mapping in fields::FIELD_MAPPINGS {
        if metadata.fields.get(mapping.field).is_some() {
            continue;
        }

        let from_bext = mapping.bext.and_then(|which| {
            metadata.bext.as_ref().map(|snapshot| match which {
                fields::BextField::Description => snapshot.description.clone(),
                fields::BextField::Originator => snapshot.originator.clone(),
            })
        });
        let from_info = mapping
            .info_id
            .and_then(|id| metadata.info.get(id).cloned());

        let fallback = [from_bext, from_info]
            .into_iter()
            .flatten()
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty());

        if let Some(value) = fallback {
            metadata.fields.set(mapping.field, Some(value));
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::write_test_wav;
    use super::*;

    #[test]
    fn test_read_technical() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_test_wav(dir.path(), "bare.wav", &[]);
        let metadata = read_metadata(&path).unwrap();

        assert_eq!(metadata.technical.sample_rate, 48_000);
        assert_eq!(metadata.technical.channels, 1);
        assert_eq!(metadata.technical.bit_depth, 16);
        assert_eq!(metadata.technical.format_tag, 1);
        assert_eq!(metadata.technical.frame_count, 9_600);
        assert!((metadata.technical.duration_seconds - 0.2).abs() < 1e-9);
        assert!(metadata.fields.present_fields().is_empty());
    }

    #[test]
    fn test_read_ixml_fields() {
        let dir = tempfile::tempdir().unwrap();
        let ixml = b"<BWFXML><USER><CATEGORY>DOORS</CATEGORY><FXNAME>Slam</FXNAME></USER></BWFXML>";
        let path = write_test_wav(dir.path(), "tagged.wav", &[(b"iXML", ixml)]);
        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata.fields.category.as_deref(), Some("DOORS"));
        assert_eq!(metadata.fields.fx_name.as_deref(), Some("Slam"));
    }

    #[test]
    fn test_read_fallback_bext_over_info() {
        let dir = tempfile::tempdir().unwrap();

        let bext_payload = bext::patch(
            &[],
            &bext::BextUpdates {
                description: Some("From bext".into()),
                originator: Some("Bext Studio".into()),
            },
        );
        let mut info_payload = b"INFO".to_vec();
        info_payload.extend_from_slice(b"IART");
        info_payload.extend_from_slice(&12u32.to_le_bytes());
        info_payload.extend_from_slice(b"Info Studio\0");

        let path = write_test_wav(
            dir.path(),
            "fallback.wav",
            &[(b"bext", &bext_payload), (b"LIST", &info_payload)],
        );
        let metadata = read_metadata(&path).unwrap();

        // designer maps to bext Originator first, INFO IART second
        assert_eq!(metadata.fields.designer.as_deref(), Some("Bext Studio"));
        assert_eq!(metadata.fields.description.as_deref(), Some("From bext"));
        assert_eq!(metadata.info.get("IART").map(String::as_str), Some("Info Studio"));
    }

    #[test]
    fn test_read_info_fallback_when_no_bext() {
        let dir = tempfile::tempdir().unwrap();
        let mut info_payload = b"INFO".to_vec();
        info_payload.extend_from_slice(b"INAM");
        info_payload.extend_from_slice(&10u32.to_le_bytes());
        info_payload.extend_from_slice(b"Door Slam\0");

        let path = write_test_wav(dir.path(), "info.wav", &[(b"LIST", &info_payload)]);
        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata.fields.fx_name.as_deref(), Some("Door Slam"));
    }

    #[test]
    fn test_ixml_wins_over_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        let ixml = b"<BWFXML><USER><DESIGNER>IxmlName</DESIGNER></USER></BWFXML>";
        let bext_payload = bext::patch(
            &[],
            &bext::BextUpdates {
                description: None,
                originator: Some("BextName".into()),
            },
        );
        let path = write_test_wav(
            dir.path(),
            "both.wav",
            &[(b"bext", &bext_payload), (b"iXML", ixml)],
        );
        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata.fields.designer.as_deref(), Some("IxmlName"));
    }

    #[test]
    fn test_missing_fmt_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let bytes = super::riff::test_support::build_wav(&[(b"data", &[0u8; 4])]);
        let path = dir.path().join("nofmt.wav");
        std::fs::write(&path, bytes).unwrap();
        let err = read_metadata(&path).unwrap_err();
        assert_eq!(err.code(), "INVALID_WAV");
    }

    #[test]
    fn test_roundtrip_with_hound() {
        // Cross-check against an independent WAV writer: read what hound
        // writes, save metadata into it, and make sure hound can still
        // decode the result.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hound.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0i16..4410 {
            writer.write_sample(i).unwrap();
            writer.write_sample(-i).unwrap();
        }
        writer.finalize().unwrap();

        let metadata = read_metadata(&path).unwrap();
        assert_eq!(metadata.technical.channels, 2);
        assert_eq!(metadata.technical.sample_rate, 44_100);
        assert_eq!(metadata.technical.frame_count, 4410);

        let mut fields = crate::types::MetadataFields::default();
        fields.fx_name = Some("Sweep".into());
        let custom = std::collections::BTreeMap::new();
        write_metadata(
            &path,
            &WriteRequest {
                expected_hash: None,
                rename_to: None,
                fields: &fields,
                custom_fields: &custom,
            },
        )
        .unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.duration(), 4410);
        let first: i16 = reader.samples::<i16>().next().unwrap().unwrap();
        assert_eq!(first, 0);
    }

    #[test]
    fn test_not_a_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not.wav");
        std::fs::write(&path, b"plain text, definitely not RIFF").unwrap();
        let err = read_metadata(&path).unwrap_err();
        assert_eq!(err.code(), "INVALID_WAV");
    }
}
