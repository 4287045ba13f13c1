//! Low-level RIFF container walking
//!
//! A WAV file is a `RIFF` container: a 12-byte outer header followed by a
//! sequence of `{id[4], size[4 LE], payload, pad}` chunks. The walker
//! yields descriptors without loading payloads; callers decide which
//! payloads to read.

use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{CoreError, CoreResult};

/// Length of the outer `RIFF....WAVE` header
pub const RIFF_HEADER_LEN: u64 = 12;

/// Length of a chunk header (fourcc + size)
pub const CHUNK_HEADER_LEN: u64 = 8;

/// Descriptor for one chunk inside the container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDesc {
    pub fourcc: [u8; 4],
    /// Offset of the chunk header from the start of the file
    pub offset: u64,
    /// Declared payload size (pad byte not included)
    pub size: u32,
    /// Whether a pad byte physically follows the payload
    pub has_pad: bool,
}

impl ChunkDesc {
    /// Offset of the payload bytes
    pub fn payload_offset(&self) -> u64 {
        self.offset + CHUNK_HEADER_LEN
    }

    /// Payload size including the alignment pad byte
    pub fn padded_size(&self) -> u64 {
        self.size as u64 + (self.size % 2) as u64
    }

    /// Total on-disk length of the chunk (header + payload + pad)
    pub fn total_len(&self) -> u64 {
        CHUNK_HEADER_LEN + self.size as u64 + if self.has_pad { 1 } else { 0 }
    }

    /// FourCC as a lossy string, for logs and errors
    pub fn fourcc_str(&self) -> String {
        String::from_utf8_lossy(&self.fourcc).into_owned()
    }

    pub fn is(&self, fourcc: &[u8; 4]) -> bool {
        &self.fourcc == fourcc
    }
}

fn invalid(path: &Path, reason: impl Into<String>) -> CoreError {
    CoreError::InvalidWav {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Walk the chunk table of an opened WAV file.
///
/// Validates the outer header and enforces one rule: the declared RIFF
/// payload plus the 8-byte outer header must fit in the physical file.
/// Unknown chunk ids are tolerated; a chunk whose payload overruns the end
/// of the file is rejected because it cannot be copied faithfully.
pub fn walk_chunks<R: Read + Seek>(reader: &mut R, path: &Path) -> CoreResult<Vec<ChunkDesc>> {
    let file_len = reader
        .seek(SeekFrom::End(0))
        .map_err(|e| CoreError::from_io(path, e))?;
    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| CoreError::from_io(path, e))?;

    let mut header = [0u8; 12];
    reader
        .read_exact(&mut header)
        .map_err(|_| invalid(path, "file too small for a RIFF header"))?;

    if &header[0..4] != b"RIFF" {
        return Err(invalid(path, "missing RIFF magic"));
    }
    if &header[8..12] != b"WAVE" {
        return Err(invalid(path, "not a WAVE form"));
    }

    let riff_size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;
    if riff_size + CHUNK_HEADER_LEN > file_len {
        return Err(invalid(
            path,
            format!(
                "declared RIFF size {} exceeds physical file size {}",
                riff_size + CHUNK_HEADER_LEN,
                file_len
            ),
        ));
    }

    let mut chunks = Vec::new();
    let mut offset = RIFF_HEADER_LEN;

    while offset + CHUNK_HEADER_LEN <= file_len {
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| CoreError::from_io(path, e))?;

        let mut chunk_header = [0u8; 8];
        if reader.read_exact(&mut chunk_header).is_err() {
            break;
        }

        let fourcc = [
            chunk_header[0],
            chunk_header[1],
            chunk_header[2],
            chunk_header[3],
        ];
        let size = u32::from_le_bytes([
            chunk_header[4],
            chunk_header[5],
            chunk_header[6],
            chunk_header[7],
        ]);

        let payload_end = offset + CHUNK_HEADER_LEN + size as u64;
        if payload_end > file_len {
            return Err(invalid(
                path,
                format!(
                    "chunk {} at offset {} overruns end of file",
                    String::from_utf8_lossy(&fourcc),
                    offset
                ),
            ));
        }

        // A pad byte is present when the size is odd and the file actually
        // carries it (a final odd chunk may legally omit it).
        let has_pad = size % 2 == 1 && payload_end < file_len;

        chunks.push(ChunkDesc {
            fourcc,
            offset,
            size,
            has_pad,
        });

        offset = payload_end + if has_pad { 1 } else { 0 };
    }

    Ok(chunks)
}

/// Read one chunk's payload into memory (metadata chunks only; the audio
/// `data` chunk is always stream-copied, never loaded).
pub fn read_payload<R: Read + Seek>(
    reader: &mut R,
    desc: &ChunkDesc,
    path: &Path,
) -> CoreResult<Vec<u8>> {
    reader
        .seek(SeekFrom::Start(desc.payload_offset()))
        .map_err(|e| CoreError::from_io(path, e))?;
    let mut payload = vec![0u8; desc.size as usize];
    reader
        .read_exact(&mut payload)
        .map_err(|e| CoreError::from_io(path, e))?;
    Ok(payload)
}

#[cfg(test)]
pub(crate) mod test_support {
    /// Build a minimal WAV byte vector from (fourcc, payload) chunks,
    /// inserting pad bytes and patching the outer size.
    pub fn build_wav(chunks: &[(&[u8; 4], &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&[0, 0, 0, 0]);
        out.extend_from_slice(b"WAVE");
        for (fourcc, payload) in chunks {
            out.extend_from_slice(*fourcc);
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(payload);
            if payload.len() % 2 == 1 {
                out.push(0);
            }
        }
        let riff_size = (out.len() - 8) as u32;
        out[4..8].copy_from_slice(&riff_size.to_le_bytes());
        out
    }

    /// Canonical 16-byte PCM fmt payload: mono 48 kHz 16-bit
    pub fn fmt_payload() -> Vec<u8> {
        let mut fmt = Vec::new();
        fmt.extend_from_slice(&1u16.to_le_bytes()); // PCM
        fmt.extend_from_slice(&1u16.to_le_bytes()); // channels
        fmt.extend_from_slice(&48_000u32.to_le_bytes());
        fmt.extend_from_slice(&96_000u32.to_le_bytes()); // byte rate
        fmt.extend_from_slice(&2u16.to_le_bytes()); // block align
        fmt.extend_from_slice(&16u16.to_le_bytes()); // bits
        fmt
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{build_wav, fmt_payload};
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_walk_minimal_wav() {
        let bytes = build_wav(&[(b"fmt ", &fmt_payload()), (b"data", &[0u8; 16])]);
        let mut cursor = Cursor::new(bytes);
        let chunks = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(&chunks[0].fourcc, b"fmt ");
        assert_eq!(chunks[0].size, 16);
        assert_eq!(&chunks[1].fourcc, b"data");
        assert_eq!(chunks[1].offset, 12 + 8 + 16);
    }

    #[test]
    fn test_odd_chunk_has_pad() {
        let bytes = build_wav(&[
            (b"fmt ", &fmt_payload()),
            (b"SMED", &[1u8; 17]),
            (b"data", &[0u8; 4]),
        ]);
        let mut cursor = Cursor::new(bytes);
        let chunks = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap();
        let smed = &chunks[1];
        assert_eq!(smed.size, 17);
        assert!(smed.has_pad);
        assert_eq!(smed.total_len(), 8 + 17 + 1);
        // data starts after the pad byte
        assert_eq!(chunks[2].offset, smed.offset + smed.total_len());
    }

    #[test]
    fn test_declared_size_exceeding_file_is_invalid() {
        let mut bytes = build_wav(&[(b"fmt ", &fmt_payload())]);
        bytes[4..8].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut cursor = Cursor::new(bytes);
        let err = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap_err();
        assert_eq!(err.code(), "INVALID_WAV");
    }

    #[test]
    fn test_non_riff_rejected() {
        let mut cursor = Cursor::new(b"NOTRIFFDATA!".to_vec());
        let err = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap_err();
        assert_eq!(err.code(), "INVALID_WAV");
    }

    #[test]
    fn test_truncated_chunk_rejected() {
        let mut bytes = build_wav(&[(b"fmt ", &fmt_payload())]);
        // Declare a data chunk larger than what follows
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&100u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 10]);
        let riff_size = (bytes.len() - 8) as u32;
        bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());

        let mut cursor = Cursor::new(bytes);
        let err = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap_err();
        assert_eq!(err.code(), "INVALID_WAV");
    }

    #[test]
    fn test_read_payload() {
        let bytes = build_wav(&[(b"fmt ", &fmt_payload()), (b"SMED", b"soundminer-data12")]);
        let mut cursor = Cursor::new(bytes);
        let chunks = walk_chunks(&mut cursor, Path::new("test.wav")).unwrap();
        let payload = read_payload(&mut cursor, &chunks[1], Path::new("test.wav")).unwrap();
        assert_eq!(payload, b"soundminer-data12");
    }
}
