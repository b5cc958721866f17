//! Error types for the chunkvault library
//!
//! This module defines all error types that can occur during archive
//! operations. The propagation policy is deliberate: errors touching the
//! structural integrity of the index or the chunk store are fatal, while
//! per-file errors during a walk are logged at the call site and the walk
//! continues.

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the chunkvault library
pub type Result<T> = std::result::Result<T, VaultError>;

/// Main error type for all chunkvault operations
#[derive(Debug, Error)]
pub enum VaultError {
    /// I/O errors during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Walk directory error from walkdir crate
    #[error("Walk directory error: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// Hex decoding error (wrapped data key, chunk names)
    #[error("Hex error: {0}")]
    Hex(#[from] hex::FromHexError),

    /// External cipher failure: non-zero exit, stderr output or empty output
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// Index save self-check mismatch
    #[error("Index validation failed: {0}")]
    Validation(String),

    /// Chunk blob missing from the store
    #[error("Chunk not found in store: {0}")]
    ChunkNotFound(String),

    /// The data key has not been unwrapped yet
    #[error("Archive data key is locked; unwrap it with the password first")]
    KeyLocked,

    /// Invalid configuration (malformed glob, malformed retention duration, ...)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A path could not be made relative to the scan root
    #[error("Path {path:?} is not under scan root {root:?}")]
    PathOutsideRoot {
        /// Path that failed to relativize
        path: PathBuf,
        /// Scan root it was compared against
        root: PathBuf,
    },

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Create a cipher error with a custom message
    pub fn cipher(msg: impl Into<String>) -> Self {
        VaultError::Cipher(msg.into())
    }

    /// Create a validation error with a custom message
    pub fn validation(msg: impl Into<String>) -> Self {
        VaultError::Validation(msg.into())
    }

    /// Create a configuration error with a custom message
    pub fn config(msg: impl Into<String>) -> Self {
        VaultError::Config(msg.into())
    }

    /// Create an internal error with a custom message
    pub fn internal(msg: impl Into<String>) -> Self {
        VaultError::Internal(msg.into())
    }

    /// Check if this error indicates archive corruption
    ///
    /// Corruption errors must never be papered over: the previous index
    /// artifact is kept and the run aborts.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VaultError::Validation(_) | VaultError::ChunkNotFound(_)
        )
    }
}
