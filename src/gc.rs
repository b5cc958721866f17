//! Garbage collection of orphaned chunk blobs
//!
//! Builds the set of chunk hashes referenced by any current or historical
//! file record, walks the chunk store, and reports blobs outside that
//! set. Nothing is ever deleted automatically: chunk removal is
//! irreversible, so the collector only writes a removal script proposal
//! for the operator to review and run by hand.

use crate::document::Document;
use crate::error::Result;
use crate::index::INDEX_FILENAME;
use crate::store::{ChunkStore, CHUNK_SUFFIX};
use crate::utils::fix_slashes;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the generated removal proposal script
pub const REMOVAL_SCRIPT: &str = "remove-unused-chunks.sh";

/// Result of a garbage-collection scan
#[derive(Debug, Clone, Default)]
pub struct GcReport {
    /// Store-relative paths of blobs no record references, sorted
    pub unused: Vec<String>,
    /// Total blobs examined
    pub examined: usize,
}

/// Scan the chunk store for blobs unreferenced by `doc`
///
/// Index artifacts and in-flight temporary files are ignored; only
/// `.bin` chunk blobs count. The report's paths are relative to the
/// store root and sorted for deterministic output.
///
/// # Errors
///
/// - [`crate::VaultError::Io`] / [`crate::VaultError::WalkDir`] when the
///   store tree cannot be read (structural, hence fatal)
pub fn find_unused_chunks(doc: &Document, store: &ChunkStore) -> Result<GcReport> {
    let referenced = doc.referenced_chunks();
    let mut report = GcReport::default();

    for entry in WalkDir::new(store.root()) {
        let entry = entry?;

        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();

        // The encrypted index artifact shares the blob suffix.
        if !name.ends_with(CHUNK_SUFFIX) || name.starts_with(INDEX_FILENAME) {
            continue;
        }

        report.examined += 1;
        let chunk_name = &name[..name.len() - CHUNK_SUFFIX.len()];

        if referenced.contains(chunk_name) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(store.root())
            .unwrap_or(entry.path());
        report.unused.push(fix_slashes(&relative.to_string_lossy()));
    }

    report.unused.sort();
    debug!(
        "gc scan: {} blobs examined, {} unused",
        report.examined,
        report.unused.len()
    );
    Ok(report)
}

/// Write the removal proposal script into the store root
///
/// Returns the script path, or `None` when there is nothing to remove.
/// The script deletes each unused blob and finally itself.
pub fn write_removal_script(store: &ChunkStore, report: &GcReport) -> Result<Option<PathBuf>> {
    if report.unused.is_empty() {
        return Ok(None);
    }

    let script_path = store.root().join(REMOVAL_SCRIPT);

    let mut lines = vec!["#!/bin/sh".to_string(), String::new()];
    for path in &report.unused {
        lines.push(format!("rm -- '{}'", path.replace('\'', r"'\''")));
    }
    lines.push(String::new());
    lines.push(format!("rm -- '{REMOVAL_SCRIPT}'"));
    lines.push(String::new());

    fs::write(&script_path, lines.join("\n"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&script_path, fs::Permissions::from_mode(0o700))?;
    }

    info!(
        "found {} unused chunks, removal proposal at {:?}",
        report.unused.len(),
        script_path
    );
    Ok(Some(script_path))
}
