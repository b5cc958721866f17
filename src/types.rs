//! Core data types used throughout the chunkvault library
//!
//! This module contains the archive data model shared across components:
//!
//! - **Index records**: [`Chunk`] and [`FileRecord`], what the versioned
//!   index stores per file
//! - **Configuration**: [`VaultConfig`], explicit toggles passed into the
//!   walker, persistence and restorer (never read from ambient state)
//!
//! Index records serialize with compact single-letter JSON keys to keep
//! the index artifact small; optional fields are omitted when they hold
//! their default value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Modification-time comparison tolerance for change detection
///
/// Filesystem timestamp round-trips can lose sub-microsecond precision,
/// so two timestamps within one microsecond of each other are considered
/// equal. Anything beyond that triggers re-chunking.
pub const MTIME_TOLERANCE_MICROS: i64 = 1;

/// A fixed-size slice of a file's bytes, identified by its content hash
///
/// Identity is the hash: two chunks with equal `name` are assumed
/// byte-identical (collision risk accepted as negligible under SHA-256).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// Content hash of the chunk bytes, hex-encoded
    #[serde(rename = "n")]
    pub name: String,
    /// Chunk size in bytes
    #[serde(rename = "s")]
    pub size: u64,
}

/// One version of a filesystem entry in the index
///
/// For directories `chunks` is empty and `size` is irrelevant. The order
/// of `chunks` is the byte order for reconstruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    /// Last modification time observed when the version was recorded
    #[serde(rename = "m")]
    pub modified: DateTime<Utc>,
    /// When the path first entered the archive (carried across versions)
    #[serde(rename = "a")]
    pub added_at: DateTime<Utc>,
    /// Tombstone timestamp; present only on superseded/removed versions
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// File size in bytes
    #[serde(rename = "s", default, skip_serializing_if = "is_zero")]
    pub size: u64,
    /// Whether this entry is a directory
    #[serde(rename = "i", default, skip_serializing_if = "is_false")]
    pub is_directory: bool,
    /// Ordered chunk list; concatenating them reconstructs the file
    #[serde(rename = "c", default, skip_serializing_if = "Vec::is_empty")]
    pub chunks: Vec<Chunk>,
}

impl FileRecord {
    /// Create a directory record (no chunks, no meaningful size)
    pub fn directory(modified: DateTime<Utc>, added_at: DateTime<Utc>) -> Self {
        Self {
            modified,
            added_at,
            deleted_at: None,
            size: 0,
            is_directory: true,
            chunks: Vec::new(),
        }
    }

    /// Sum of the recorded chunk sizes
    ///
    /// For a healthy non-directory record this equals `size`.
    pub fn chunk_total(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Check whether the on-disk state matches this record
    ///
    /// A file is unchanged when its size is identical and its modification
    /// time is within [`MTIME_TOLERANCE_MICROS`] of the recorded one. Any
    /// size difference, or a larger mtime difference, means changed.
    pub fn matches_disk(&self, size: u64, modified: DateTime<Utc>) -> bool {
        if self.size != size {
            return false;
        }

        let diff = self
            .modified
            .signed_duration_since(modified)
            .num_microseconds();

        match diff {
            Some(micros) => micros.abs() <= MTIME_TOLERANCE_MICROS,
            // Overflow means the timestamps are eons apart.
            None => false,
        }
    }
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !(*b)
}

/// Configuration for one archive location
///
/// All password/compression/encryption/symlink toggles live here and are
/// passed explicitly into the components that need them.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Password protecting the wrapped data key and (optionally) the index
    pub password: String,
    /// Gzip-compress the index artifact (`.gz` suffix)
    pub compress_index: bool,
    /// Encrypt the index artifact with the password (`.bin` suffix)
    pub encrypt_index: bool,
    /// Follow symbolic links during the walk
    pub follow_symlinks: bool,
    /// Interval between mid-walk index checkpoints (zero disables them)
    pub checkpoint_interval: Duration,
    /// External cipher program invoked for bulk encryption/decryption
    pub cipher_program: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            compress_index: true,
            encrypt_index: true,
            follow_symlinks: false,
            checkpoint_interval: Duration::from_secs(600),
            cipher_program: "openssl".to_string(),
        }
    }
}
