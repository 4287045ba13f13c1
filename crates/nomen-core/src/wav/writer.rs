//! Atomic WAV rewrite
//!
//! The whole file is rebuilt into a temp file in the same directory as the
//! source, then renamed over it. Owned metadata chunks (`bext`, `iXML`,
//! `LIST-INFO`) are re-encoded from the merged record; every other chunk
//! (`fmt `, `data`, cue/sampler/vendor blocks) is stream-copied in bounded
//! buffers. On any failure before the final rename the temp file is
//! removed and the source is untouched.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, CoreResult};
use crate::hash::file_hash;
use crate::types::MetadataFields;

use super::fields::{BextField, FIELD_MAPPINGS};
use super::riff::ChunkDesc;
use super::{bext, info, ixml, riff, BEXT_ID, IXML_ID, LIST_ID};

/// Stream-copy buffer bound
const COPY_BUF_LEN: usize = 1024 * 1024;

/// A save request against one source file
#[derive(Debug, Clone)]
pub struct WriteRequest<'a> {
    /// Fingerprint the source must still match; `None` skips the check
    pub expected_hash: Option<&'a str>,
    /// Rename target applied after the content commit
    pub rename_to: Option<&'a Path>,
    pub fields: &'a MetadataFields,
    pub custom_fields: &'a BTreeMap<String, String>,
}

/// Result of a committed save
#[derive(Debug)]
pub struct WriteOutcome {
    /// Where the saved content lives now
    pub final_path: PathBuf,
    /// A post-commit rename failure; the content itself is saved
    pub rename_error: Option<CoreError>,
}

/// Rewrite a WAV file with merged metadata, atomically.
pub fn write_metadata(path: &Path, request: &WriteRequest<'_>) -> CoreResult<WriteOutcome> {
    // Reject bad custom tags before any disk work
    for tag in request.custom_fields.keys() {
        ixml::validate_custom_tag(tag)?;
    }

    // External-modification check
    if let Some(expected) = request.expected_hash {
        let current = file_hash(path)?;
        if current != expected {
            return Err(CoreError::FileChanged(path.to_path_buf()));
        }
    }

    // Rename-conflict check up front; re-checked at the actual rename
    if let Some(target) = request.rename_to {
        if target != path && target.exists() {
            return Err(CoreError::RenameConflict(target.to_path_buf()));
        }
    }

    let source = File::open(path).map_err(|e| CoreError::from_io(path, e))?;
    let mut reader = BufReader::new(source);
    let chunks = riff::walk_chunks(&mut reader, path)?;

    // Source-side snapshots drive the fill-only fallback rules
    let source_bext = chunks
        .iter()
        .find(|c| c.is(BEXT_ID))
        .map(|c| riff::read_payload(&mut reader, c, path))
        .transpose()?;
    let source_info = chunks
        .iter()
        .filter(|c| c.is(LIST_ID))
        .map(|c| riff::read_payload(&mut reader, c, path))
        .collect::<CoreResult<Vec<_>>>()?
        .into_iter()
        .find(|payload| info::is_info_form(payload));

    let bext_updates = plan_bext_updates(request.fields, source_bext.as_deref());
    let info_additions = plan_info_additions(request.fields, source_info.as_deref());

    let has_metadata = !request.fields.present_fields().is_empty();
    let has_ixml_content = has_metadata || !request.custom_fields.is_empty();

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".nomen-save-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| CoreError::from_io(dir, e))?;

    let mut out = temp.as_file();

    // Outer header; payload size patched once the chunk walk is done
    out.write_all(b"RIFF\0\0\0\0WAVE")
        .map_err(|e| CoreError::from_io(path, e))?;

    let mut bext_written = false;
    let mut ixml_written = false;
    let mut info_written = false;

    for desc in &chunks {
        if desc.is(BEXT_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            write_chunk(&mut out, BEXT_ID, &bext::patch(&payload, &bext_updates), path)?;
            bext_written = true;
        } else if desc.is(IXML_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            let mut root = match ixml::parse_document(&payload) {
                Ok(root) => root,
                Err(e) => {
                    log::warn!(
                        "Rebuilding unparseable iXML chunk in {:?} from record state: {}",
                        path,
                        e
                    );
                    ixml::new_document()
                }
            };
            ixml::merge(&mut root, request.fields, request.custom_fields)?;
            write_chunk(&mut out, IXML_ID, &ixml::serialize(&root), path)?;
            ixml_written = true;
        } else if desc.is(LIST_ID) {
            let payload = riff::read_payload(&mut reader, desc, path)?;
            if info::is_info_form(&payload) {
                write_chunk(&mut out, LIST_ID, &info::merge(&payload, &info_additions), path)?;
                info_written = true;
            } else {
                // Non-INFO LIST forms (adtl etc.) are not ours
                stream_copy_chunk(&mut reader, &mut out, desc, path)?;
            }
        } else {
            stream_copy_chunk(&mut reader, &mut out, desc, path)?;
        }
    }

    // Owned chunks the source lacked, appended after the last chunk
    if !bext_written && has_metadata {
        write_chunk(&mut out, BEXT_ID, &bext::synthesize(&bext_updates), path)?;
    }
    if !ixml_written && has_ixml_content {
        let mut root = ixml::new_document();
        ixml::merge(&mut root, request.fields, request.custom_fields)?;
        write_chunk(&mut out, IXML_ID, &ixml::serialize(&root), path)?;
    }
    if !info_written && !info_additions.is_empty() {
        write_chunk(&mut out, LIST_ID, &info::build(&info_additions), path)?;
    }

    // Patch the outer size: total length minus the 8-byte outer header
    let total_len = out
        .seek(SeekFrom::End(0))
        .map_err(|e| CoreError::from_io(path, e))?;
    out.seek(SeekFrom::Start(4))
        .map_err(|e| CoreError::from_io(path, e))?;
    out.write_all(&((total_len - 8) as u32).to_le_bytes())
        .map_err(|e| CoreError::from_io(path, e))?;

    out.sync_all()
        .map_err(|e| CoreError::WriteFailed(format!("fsync failed: {e}")))?;
    drop(reader);

    // Commit: atomic on-filesystem rename over the source
    temp.persist(path)
        .map_err(|e| CoreError::from_io(path, e.error))?;

    // Optional post-commit rename; the content is already saved, so a
    // failure here is reported alongside the committed path.
    let mut final_path = path.to_path_buf();
    let mut rename_error = None;
    if let Some(target) = request.rename_to {
        if target != path {
            if target.exists() {
                rename_error = Some(CoreError::RenameConflict(target.to_path_buf()));
            } else {
                match std::fs::rename(path, target) {
                    Ok(()) => final_path = target.to_path_buf(),
                    Err(e) => rename_error = Some(CoreError::from_io(target, e)),
                }
            }
        }
    }

    verify_written(&final_path, request)?;

    Ok(WriteOutcome {
        final_path,
        rename_error,
    })
}

/// Fill-only bext updates: a field is patched only when the source bext
/// does not already carry a value for it.
fn plan_bext_updates(fields: &MetadataFields, source_bext: Option<&[u8]>) -> bext::BextUpdates {
    let snapshot = source_bext.map(bext::parse).unwrap_or_default();
    let mut updates = bext::BextUpdates::default();

    for mapping in FIELD_MAPPINGS {
        let (Some(which), Some(value)) = (mapping.bext, fields.get(mapping.field)) else {
            continue;
        };
        match which {
            BextField::Description if snapshot.description.is_empty() => {
                updates.description = Some(value.to_string());
            }
            BextField::Originator if snapshot.originator.is_empty() => {
                updates.originator = Some(value.to_string());
            }
            _ => {}
        }
    }
    updates
}

/// Fill-only INFO additions for mapped fields absent or empty in the source
fn plan_info_additions(
    fields: &MetadataFields,
    source_info: Option<&[u8]>,
) -> BTreeMap<String, String> {
    let snapshot = source_info.and_then(info::parse).unwrap_or_default();
    let mut additions = BTreeMap::new();

    for mapping in FIELD_MAPPINGS {
        let (Some(id), Some(value)) = (mapping.info_id, fields.get(mapping.field)) else {
            continue;
        };
        let existing = snapshot.get(id).map(String::as_str).unwrap_or("");
        if existing.is_empty() {
            additions.insert(id.to_string(), value.to_string());
        }
    }
    additions
}

fn write_chunk(out: &mut &File, fourcc: &[u8; 4], payload: &[u8], path: &Path) -> CoreResult<()> {
    out.write_all(fourcc)
        .map_err(|e| CoreError::from_io(path, e))?;
    out.write_all(&(payload.len() as u32).to_le_bytes())
        .map_err(|e| CoreError::from_io(path, e))?;
    out.write_all(payload)
        .map_err(|e| CoreError::from_io(path, e))?;
    if payload.len() % 2 == 1 {
        out.write_all(&[0]).map_err(|e| CoreError::from_io(path, e))?;
    }
    Ok(())
}

/// Copy a chunk verbatim (header, payload and pad) in bounded buffers.
/// A final odd-sized chunk missing its pad byte on disk gets one written,
/// re-aligning the output without touching the declared size.
fn stream_copy_chunk<R: Read + Seek>(
    reader: &mut R,
    out: &mut &File,
    desc: &ChunkDesc,
    path: &Path,
) -> CoreResult<()> {
    reader
        .seek(SeekFrom::Start(desc.offset))
        .map_err(|e| CoreError::from_io(path, e))?;

    let mut remaining = desc.total_len();
    let mut buf = vec![0u8; COPY_BUF_LEN];
    while remaining > 0 {
        let want = remaining.min(COPY_BUF_LEN as u64) as usize;
        reader
            .read_exact(&mut buf[..want])
            .map_err(|e| CoreError::from_io(path, e))?;
        out.write_all(&buf[..want])
            .map_err(|e| CoreError::from_io(path, e))?;
        remaining -= want as u64;
    }

    if desc.size % 2 == 1 && !desc.has_pad {
        out.write_all(&[0]).map_err(|e| CoreError::from_io(path, e))?;
    }
    Ok(())
}

/// Post-write verification: re-read the saved file and compare every field
/// the request carried. A mismatch means the writer itself is broken.
fn verify_written(path: &Path, request: &WriteRequest<'_>) -> CoreResult<()> {
    let read_back = super::read_metadata(path)?;

    for field in request.fields.present_fields() {
        let wrote = request.fields.get(field).unwrap_or("").trim();
        let read = read_back.fields.get(field).unwrap_or("");
        if wrote != read {
            return Err(CoreError::WriteFailed(format!(
                "field {field:?} read back as {read:?}, expected {wrote:?}"
            )));
        }
    }
    for (tag, value) in request.custom_fields {
        let read = read_back
            .custom_fields
            .get(tag)
            .map(String::as_str)
            .unwrap_or("");
        if value.trim() != read {
            return Err(CoreError::WriteFailed(format!(
                "custom field {tag:?} read back as {read:?}, expected {value:?}"
            )));
        }
    }
    Ok(())
}
