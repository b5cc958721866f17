//! Utility functions shared across the chunkvault library
//!
//! Hashing helpers, atomic file writing, path normalization and
//! human-readable formatting. All functions here are small, synchronous
//! and thread-safe.

use crate::error::Result;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Suffix appended to files while they are being written
pub const TMP_SUFFIX: &str = ".tmp";

/// Length of the raw per-archive data key in bytes (hex-encoded to 64 chars)
pub const DATA_KEY_LEN: usize = 32;

/// Hash arbitrary data using SHA-256
///
/// Returns the hash as a 64-character hexadecimal string. This is the
/// content-addressing digest: changing it invalidates deduplication
/// against chunk stores written with a different algorithm.
pub fn hash_data(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Generate a fresh per-archive data key
///
/// Returns [`DATA_KEY_LEN`] random bytes, hex-encoded. The key is created
/// once per archive and never changes; it is wrapped under the user's
/// password before persisting.
pub fn new_data_key() -> String {
    let mut raw = [0u8; DATA_KEY_LEN];
    rand::rng().fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Atomic file write (write to temp sibling then rename)
///
/// The temporary file lives next to the target with a [`TMP_SUFFIX`]
/// appended, so the rename stays on the same filesystem and the target is
/// never visible in a partially written state.
///
/// # Errors
///
/// - [`crate::VaultError::Io`] if writing or renaming fails
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let temp_path = tmp_sibling(path);
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Temporary sibling path for `path`
///
/// Appends [`TMP_SUFFIX`] to the full file name rather than replacing the
/// extension, so `index.json.gz` becomes `index.json.gz.tmp`.
pub fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(TMP_SUFFIX);
    std::path::PathBuf::from(name)
}

/// Replace all backslashes with forward slashes
///
/// Index keys are slash-normalized relative paths regardless of the
/// platform the archive was written on.
pub fn fix_slashes(input: &str) -> String {
    input.replace('\\', "/")
}

/// Format bytes in human-readable form
///
/// Uses binary units (1024-based): `format_bytes(1536)` is `"1.50 KiB"`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}
