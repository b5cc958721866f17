//! Content-addressed chunk store
//!
//! Stores opaque encrypted chunk blobs keyed by their plaintext content
//! hash. Blobs are sharded into a two-level directory prefix scheme to
//! bound directory fan-out:
//!
//! ```text
//! store_root/
//! ├── index.json[.gz][.bin]   # versioned index (managed by index.rs)
//! └── <hash[0:2]>/
//!     └── <hash[0:4]>/
//!         └── <hash>.bin      # one encrypted chunk blob
//! ```
//!
//! Writes go to a temporary sibling and are renamed into place, so a
//! crash never leaves a half-written blob visible at its final path.
//! Because chunks are encrypted with the single per-archive data key,
//! an existing blob for a hash is always a valid ciphertext of the same
//! plaintext, which is what makes `exists` a safe dedup check.

use crate::error::{Result, VaultError};
use crate::utils::atomic_write;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Suffix for all encrypted chunk blobs
pub const CHUNK_SUFFIX: &str = ".bin";

/// Content-addressed storage for encrypted chunk blobs
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Create a store rooted at `root`
    ///
    /// The root directory itself is created lazily on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Storage path for a chunk hash
    ///
    /// The first 2 hex characters form the outer directory, the first 4
    /// the inner directory, and the full hash plus [`CHUNK_SUFFIX`] the
    /// file name.
    pub fn chunk_path(&self, hash: &str) -> PathBuf {
        debug_assert!(hash.len() >= 4, "chunk hash too short: {hash}");
        self.root
            .join(&hash[..2])
            .join(&hash[..4])
            .join(format!("{hash}{CHUNK_SUFFIX}"))
    }

    /// Check whether a blob for `hash` is already stored
    pub fn exists(&self, hash: &str) -> bool {
        self.chunk_path(hash).exists()
    }

    /// Write an encrypted chunk blob
    ///
    /// Creates the shard directories if absent, writes to a temporary
    /// sibling, then atomically renames into place.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Io`] if directory creation, the write or the
    ///   rename fails; chunk-store write failures are always fatal
    pub fn write(&self, hash: &str, ciphertext: &[u8]) -> Result<()> {
        let path = self.chunk_path(hash);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        atomic_write(&path, ciphertext)?;
        trace!("stored chunk {} ({} bytes)", &hash[..8], ciphertext.len());
        Ok(())
    }

    /// Read an encrypted chunk blob
    ///
    /// # Errors
    ///
    /// - [`VaultError::ChunkNotFound`] if no blob exists for `hash`;
    ///   a referenced-but-missing chunk is a corruption condition
    /// - [`VaultError::Io`] on read failure
    pub fn read(&self, hash: &str) -> Result<Vec<u8>> {
        let path = self.chunk_path(hash);

        if !path.exists() {
            return Err(VaultError::ChunkNotFound(hash.to_string()));
        }

        Ok(fs::read(path)?)
    }
}
