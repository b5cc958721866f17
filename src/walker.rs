//! Incremental archive walker
//!
//! Performs one scan of a source tree against a loaded [`Document`],
//! producing an updated document plus chunk-store side effects. The walk
//! is sequential: one thread drives all chunking, hashing and chunk I/O.
//!
//! Per-path behavior:
//!
//! 1. Compute the slash-normalized path relative to the scan root; the
//!    archive location itself is never descended into when nested under
//!    the source.
//! 2. Entries matching an exclusion glob are skipped (whole subtree for
//!    directories), as are symbolic links unless link-following is on.
//! 3. Directories are always metadata-only upserts.
//! 4. Regular files are chunked when new or changed; unchanged files
//!    (same size, modification time within tolerance) cost no I/O.
//!    A changed file's previous version is tombstoned first, carrying the
//!    original `added_at` forward to the replacement record.
//! 5. Paths present in the index but never revisited are tombstoned as
//!    deleted after the walk.
//!
//! Per-file I/O errors are logged and skipped: one unreadable file must
//! not block backing up the rest of the tree. Errors touching the chunk
//! store, the cipher or index persistence are fatal.
//!
//! The index is checkpointed mid-walk on a configurable interval so a
//! crash loses at most one interval of work, and saved once more as the
//! authoritative end-of-run state.

use crate::chunker::Chunker;
use crate::cipher::Cipher;
use crate::document::Document;
use crate::error::Result;
use crate::exclude::ExcludeList;
use crate::index::IndexStore;
use crate::progress::ProgressCounters;
use crate::store::ChunkStore;
use crate::types::{Chunk, FileRecord, VaultConfig};
use crate::utils::fix_slashes;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};
use walkdir::WalkDir;

/// Statistics from one archive run
#[derive(Debug, Clone, Default)]
pub struct WalkSummary {
    /// Files whose contents were chunked
    pub files_processed: u64,
    /// Files skipped as unchanged
    pub files_skipped: u64,
    /// Bytes chunked
    pub bytes_processed: u64,
    /// Bytes in skipped files
    pub bytes_skipped: u64,
    /// Paths tombstoned because they vanished from the source
    pub files_deleted: u64,
    /// New chunk blobs written to the store
    pub chunks_written: u64,
}

/// Interval timer for mid-walk index checkpoints
#[derive(Debug)]
struct CheckpointTimer {
    interval: Duration,
    last: Instant,
}

impl CheckpointTimer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Non-blocking check; arms the next interval when it fires
    fn due(&mut self) -> bool {
        if self.interval.is_zero() {
            return false;
        }

        if self.last.elapsed() >= self.interval {
            self.last = Instant::now();
            true
        } else {
            false
        }
    }
}

/// Drives one incremental scan of a source tree
///
/// Construct with absolute source and archive-location paths; the walker
/// takes its toggles from an explicit [`VaultConfig`], never from global
/// state.
pub struct ArchiveWalker {
    source: PathBuf,
    store: ChunkStore,
    index: IndexStore,
    cipher: Arc<dyn Cipher>,
    follow_symlinks: bool,
    excludes: ExcludeList,
    counters: Arc<ProgressCounters>,
    checkpoint: CheckpointTimer,
}

impl std::fmt::Debug for ArchiveWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveWalker")
            .field("source", &self.source)
            .field("store", &self.store)
            .finish()
    }
}

impl ArchiveWalker {
    /// Create a walker scanning `source` into `store`
    pub fn new(
        source: impl Into<PathBuf>,
        store: ChunkStore,
        index: IndexStore,
        cipher: Arc<dyn Cipher>,
        config: &VaultConfig,
        excludes: ExcludeList,
    ) -> Self {
        Self {
            source: source.into(),
            store,
            index,
            cipher,
            follow_symlinks: config.follow_symlinks,
            excludes,
            counters: Arc::new(ProgressCounters::new()),
            checkpoint: CheckpointTimer::new(config.checkpoint_interval),
        }
    }

    /// Shared counters for a progress reporter
    pub fn counters(&self) -> Arc<ProgressCounters> {
        self.counters.clone()
    }

    /// Run one incremental scan, mutating `doc` in place
    ///
    /// Persists the document as a checkpoint whenever the interval timer
    /// fires and once more after tombstoning deleted paths at the end.
    ///
    /// # Errors
    ///
    /// Chunk-store writes, cipher invocations and index saves are fatal;
    /// per-file read errors are logged and the walk continues.
    pub fn run(&mut self, doc: &mut Document) -> Result<WalkSummary> {
        let data_key = doc.data_key()?.to_owned();
        let mut summary = WalkSummary::default();

        // Everything indexed but not revisited below was deleted from the
        // source tree.
        let mut pending: std::collections::BTreeSet<String> =
            doc.files.keys().cloned().collect();

        debug!("scanning {:?} ({} indexed paths)", self.source, pending.len());

        let mut iter = WalkDir::new(&self.source)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter();

        while let Some(entry) = iter.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("error while walking: {e}");
                    continue;
                }
            };

            // Never archive the archive itself.
            if entry.file_type().is_dir() && entry.path().starts_with(self.store.root()) {
                trace!("skipping archive location {:?}", entry.path());
                iter.skip_current_dir();
                continue;
            }

            let short = self.short_path(entry.path());

            if self.excludes.matches(&short) {
                trace!("{short} excluded");
                if entry.file_type().is_dir() {
                    iter.skip_current_dir();
                }
                continue;
            }

            if entry.path_is_symlink() && !self.follow_symlinks {
                trace!("skipping symlink {short}");
                continue;
            }

            pending.remove(&short);

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!("failed reading metadata of {short}: {e}");
                    continue;
                }
            };
            let modified: DateTime<Utc> = match metadata.modified() {
                Ok(t) => t.into(),
                Err(e) => {
                    warn!("failed reading mtime of {short}: {e}");
                    continue;
                }
            };

            if metadata.is_dir() {
                // Fast path: directories are metadata-only, no chunk I/O.
                let added_at = doc
                    .files
                    .get(&short)
                    .map(|r| r.added_at)
                    .unwrap_or_else(Utc::now);
                doc.files
                    .insert(short.clone(), FileRecord::directory(modified, added_at));
            } else {
                self.visit_file(doc, &short, entry.path(), metadata.len(), modified, &data_key, &mut summary)?;
            }

            self.counters.set_current_path(&short);

            if self.checkpoint.due() {
                info!("checkpointing index mid-walk");
                self.index.save(doc)?;
            }
        }

        for path in pending {
            debug!("{path} was deleted from source");
            doc.tombstone(&path, Utc::now());
            summary.files_deleted += 1;
        }

        self.index.save(doc)?;
        info!(
            "walk finished: {} processed, {} skipped, {} deleted, {} chunks written",
            summary.files_processed,
            summary.files_skipped,
            summary.files_deleted,
            summary.chunks_written
        );
        Ok(summary)
    }

    /// Handle one regular file: skip, or tombstone-and-rechunk
    #[allow(clippy::too_many_arguments)]
    fn visit_file(
        &mut self,
        doc: &mut Document,
        short: &str,
        path: &Path,
        disk_size: u64,
        modified: DateTime<Utc>,
        data_key: &str,
        summary: &mut WalkSummary,
    ) -> Result<()> {
        let previous = doc
            .files
            .get(short)
            .map(|r| (r.matches_disk(disk_size, modified), r.added_at));

        let added_at = match previous {
            Some((true, _)) => {
                self.counters.add_skipped(disk_size);
                summary.files_skipped += 1;
                summary.bytes_skipped += disk_size;
                return Ok(());
            }
            Some((false, added_at)) => {
                debug!("{short} has changed, updating");
                doc.tombstone(short, Utc::now());
                added_at
            }
            None => Utc::now(),
        };

        let Some(chunks) = self.chunk_file(path, data_key, summary)? else {
            // Read failure already logged; leave the path to be picked up
            // by the next run.
            return Ok(());
        };

        let record = FileRecord {
            modified,
            added_at,
            deleted_at: None,
            // The chunk sum is authoritative: it reflects the bytes that
            // were actually stored, even if the file moved under us.
            size: chunks.iter().map(|c| c.size).sum(),
            is_directory: false,
            chunks,
        };

        self.counters.add_processed(record.size);
        summary.files_processed += 1;
        summary.bytes_processed += record.size;
        doc.files.insert(short.to_string(), record);
        Ok(())
    }

    /// Chunk one file into the store, deduplicating by content hash
    ///
    /// Returns `Ok(None)` when the file cannot be read (per-file
    /// tolerance); propagates cipher and store errors as fatal.
    fn chunk_file(
        &mut self,
        path: &Path,
        data_key: &str,
        summary: &mut WalkSummary,
    ) -> Result<Option<Vec<Chunk>>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("failed opening {path:?}: {e}");
                return Ok(None);
            }
        };

        let mut chunks = Vec::new();

        for item in Chunker::new(file) {
            let chunk = match item {
                Ok(c) => c,
                Err(e) => {
                    warn!("failed reading {path:?}: {e}");
                    return Ok(None);
                }
            };

            if !self.store.exists(&chunk.hash) {
                let ciphertext = self.cipher.encrypt(&chunk.data, data_key)?;
                self.store.write(&chunk.hash, &ciphertext)?;
                summary.chunks_written += 1;
            }

            chunks.push(Chunk {
                name: chunk.hash,
                size: chunk.size,
            });
        }

        Ok(Some(chunks))
    }

    /// Slash-normalized path relative to the scan root
    ///
    /// The scan root itself (or anything shorter than it) maps to the
    /// empty string.
    fn short_path(&self, path: &Path) -> String {
        match path.strip_prefix(&self.source) {
            Ok(rel) => fix_slashes(&rel.to_string_lossy()),
            Err(_) => String::new(),
        }
    }
}
