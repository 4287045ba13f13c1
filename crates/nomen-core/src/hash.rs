//! Cheap stable file fingerprint
//!
//! Change-detection key, not a cryptographic digest of the whole file:
//! SHA-256 over the first 4 KiB of content, the byte size, and the mtime.
//! Reading 4 KiB keeps import O(1) per file regardless of WAV size; the
//! size and mtime components catch appends and in-place rewrites beyond
//! the sampled prefix.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

/// Number of leading content bytes that feed the fingerprint
const HASH_PREFIX_LEN: usize = 4096;

/// Compute the stable fingerprint of a file, as lowercase hex
pub fn file_hash(path: &Path) -> CoreResult<String> {
    let meta = std::fs::metadata(path).map_err(|e| CoreError::from_io(path, e))?;
    let size = meta.len();
    let mtime = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut file = File::open(path).map_err(|e| CoreError::from_io(path, e))?;
    let mut prefix = vec![0u8; HASH_PREFIX_LEN];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = file
            .read(&mut prefix[filled..])
            .map_err(|e| CoreError::from_io(path, e))?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    prefix.truncate(filled);

    let mut hasher = Sha256::new();
    hasher.update(&prefix);
    hasher.update(size.to_le_bytes());
    hasher.update(mtime.to_le_bytes());

    use std::fmt::Write as _;
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}
