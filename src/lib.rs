//! # chunkvault - Deduplicating, content-addressed, encrypted backups
//!
//! chunkvault scans a source directory tree, splits file contents into
//! fixed-size chunks, stores each distinct chunk exactly once under a
//! hash-derived path, and maintains an encrypted, versioned index
//! describing how files map to chunks.
//!
//! ## Overview
//!
//! An archive run is incremental: unchanged files (same size,
//! modification time within tolerance) cost no I/O. Changed and deleted
//! files are never lost: their previous versions are tombstoned into a
//! deletion history that can later be pruned by age. Orphaned chunks are
//! found by the garbage collector but never deleted automatically, and
//! restores are generated as a reviewable step-by-step script.
//!
//! ## Architecture
//!
//! - **Content-Addressed Chunk Store**: encrypted chunk blobs keyed by
//!   SHA-256 content hash, sharded two levels deep to bound directory
//!   fan-out, written atomically
//! - **Versioned Index**: a single [`Document`] holding live files,
//!   deletion history and the wrapped per-archive data key; persisted
//!   with optional gzip compression and password encryption, and a
//!   validate-before-replace atomic save
//! - **Archive Walker**: one sequential scan thread driving chunking,
//!   change detection, tombstoning and periodic index checkpoints, with
//!   a background task reporting progress
//! - **Cipher boundary**: bulk encryption is delegated to an external
//!   program behind the [`Cipher`] trait; the engine never implements
//!   its own cipher
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chunkvault::{
//!     ArchiveWalker, ChunkStore, CommandCipher, ExcludeList, IndexStore, VaultConfig,
//! };
//! use std::sync::Arc;
//!
//! # fn main() -> chunkvault::Result<()> {
//! let config = VaultConfig {
//!     password: "correct horse".to_string(),
//!     ..VaultConfig::default()
//! };
//! let cipher = Arc::new(CommandCipher::new(&config.cipher_program));
//!
//! let store = ChunkStore::new("/backups/photos");
//! let index = IndexStore::new("/backups/photos", &config, cipher.clone());
//! let mut doc = index.load()?;
//!
//! let mut walker = ArchiveWalker::new(
//!     "/home/user/photos",
//!     store,
//!     index,
//!     cipher,
//!     &config,
//!     ExcludeList::empty(),
//! );
//! let summary = walker.run(&mut doc)?;
//! println!("archived {} files", summary.files_processed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`types`]: index records and configuration
//! - [`document`]: the versioned index model, tombstoning and pruning
//! - [`chunker`]: fixed-size chunking with content hashing
//! - [`store`]: the sharded chunk blob store
//! - [`index`]: index persistence (compression, encryption, atomic save)
//! - [`walker`]: the incremental archive walk
//! - [`cipher`]: the external bulk-cipher boundary
//! - [`exclude`]: exclusion glob lists
//! - [`gc`]: orphaned-chunk detection
//! - [`restore`]: reconstruction plan and script generation
//! - [`progress`]: walk counters and the background reporter
//! - [`error`]: error types and handling

pub mod chunker;
pub mod cipher;
pub mod document;
pub mod error;
pub mod exclude;
pub mod gc;
pub mod index;
pub mod progress;
pub mod restore;
pub mod store;
pub mod types;
pub mod walker;

mod utils;

// Re-export main types for convenience
pub use cipher::{Cipher, CommandCipher};
pub use document::Document;
pub use error::{Result, VaultError};
pub use exclude::ExcludeList;
pub use gc::{find_unused_chunks, write_removal_script, GcReport};
pub use index::IndexStore;
pub use progress::{ProgressCounters, ProgressReporter};
pub use restore::{RestorePlan, Restorer};
pub use store::ChunkStore;
pub use types::{Chunk, FileRecord, VaultConfig};
pub use utils::format_bytes;
pub use walker::{ArchiveWalker, WalkSummary};
