//! End-to-end tests for the chunkvault archive engine
//!
//! Exercises the full archive → mutate → re-archive → restore lifecycle
//! against real temporary directories. The external cipher is replaced by
//! an in-memory reversible transform so the engine's own behavior is
//! what's under test.

use chunkvault::chunker::CHUNK_SIZE;
use chunkvault::restore::RestoreStep;
use chunkvault::{
    find_unused_chunks, ArchiveWalker, ChunkStore, Cipher, Document, ExcludeList, IndexStore,
    Restorer, Result as VaultResult, VaultConfig, VaultError, WalkSummary,
};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Reversible in-memory transform standing in for the external cipher
struct MemCipher;

impl Cipher for MemCipher {
    fn encrypt(&self, plaintext: &[u8], secret: &str) -> VaultResult<Vec<u8>> {
        let mut out = secret.as_bytes().to_vec();
        out.push(0);
        out.extend(plaintext.iter().map(|b| b ^ 0xa5));
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8], secret: &str) -> VaultResult<Vec<u8>> {
        let sep = ciphertext
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| VaultError::cipher("malformed test ciphertext"))?;
        if &ciphertext[..sep] != secret.as_bytes() {
            return Err(VaultError::cipher("wrong secret"));
        }
        Ok(ciphertext[sep + 1..].iter().map(|b| b ^ 0xa5).collect())
    }
}

/// Test harness bundling a source tree and an archive location
struct VaultHarness {
    source: TempDir,
    archive: TempDir,
    config: VaultConfig,
    cipher: Arc<dyn Cipher>,
}

impl VaultHarness {
    fn new() -> Self {
        let config = VaultConfig {
            password: "test-password".to_string(),
            checkpoint_interval: std::time::Duration::ZERO,
            ..VaultConfig::default()
        };

        Self {
            source: TempDir::new().unwrap(),
            archive: TempDir::new().unwrap(),
            config,
            cipher: Arc::new(MemCipher),
        }
    }

    fn write_file(&self, rel: &str, contents: &[u8]) {
        let path = self.source.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn set_mtime(&self, rel: &str, secs: i64, nanos: u32) {
        let path = self.source.path().join(rel);
        filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, nanos)).unwrap();
    }

    fn index(&self) -> IndexStore {
        IndexStore::new(self.archive.path(), &self.config, self.cipher.clone())
    }

    fn store(&self) -> ChunkStore {
        ChunkStore::new(self.archive.path())
    }

    /// Run one incremental archive scan against the on-disk index
    fn archive(&self) -> (Document, WalkSummary) {
        self.archive_with_excludes(ExcludeList::empty())
    }

    fn archive_with_excludes(&self, excludes: ExcludeList) -> (Document, WalkSummary) {
        let index = self.index();
        let mut doc = index.load().unwrap();

        let mut walker = ArchiveWalker::new(
            self.source.path(),
            self.store(),
            index,
            self.cipher.clone(),
            &self.config,
            excludes,
        );
        let summary = walker.run(&mut doc).unwrap();
        (doc, summary)
    }

    /// Count chunk blobs in the store (index artifacts excluded)
    fn blob_count(&self) -> usize {
        WalkDir::new(self.archive.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                e.file_type().is_file()
                    && name.ends_with(".bin")
                    && !name.starts_with("index.json")
            })
            .count()
    }

    /// Execute a restore plan in-process, as the generated script would
    fn apply_restore(&self, destination: &Path, pattern: Option<&str>) -> usize {
        let doc = self.index().load().unwrap();
        let key = doc.data_key().unwrap().to_owned();
        let store = self.store();

        let mut restorer = Restorer::new(store.clone(), destination, &self.config);
        if let Some(pattern) = pattern {
            restorer = restorer.with_pattern(pattern).unwrap();
        }
        let plan = restorer.plan(&doc);

        for step in &plan.steps {
            match step {
                RestoreStep::CreateDir { path } => fs::create_dir_all(path).unwrap(),
                RestoreStep::CreateEmpty { path } => fs::write(path, b"").unwrap(),
                RestoreStep::DecryptChunk { chunk, dest } => {
                    let ciphertext = store.read(chunk).unwrap();
                    let plaintext = self.cipher.decrypt(&ciphertext, &key).unwrap();
                    fs::write(dest, plaintext).unwrap();
                }
                RestoreStep::Concat { parts, dest } => {
                    let mut out = Vec::new();
                    for part in parts {
                        out.extend(fs::read(part).unwrap());
                    }
                    fs::write(dest, out).unwrap();
                }
                RestoreStep::Remove { path } => fs::remove_file(path).unwrap(),
                RestoreStep::SetModified { path, modified } => {
                    let ft = FileTime::from_system_time((*modified).into());
                    filetime::set_file_mtime(path, ft).unwrap();
                }
            }
        }

        plan.files_selected
    }
}

/// Chunk-accounting invariant: every record's size equals its chunk sum
fn assert_chunk_accounting(doc: &Document) {
    for (path, record) in &doc.files {
        if !record.is_directory {
            assert_eq!(record.size, record.chunk_total(), "live {path}");
        }
    }
    for (path, versions) in &doc.deleted_files {
        for record in versions {
            if !record.is_directory {
                assert_eq!(record.size, record.chunk_total(), "deleted {path}");
            }
        }
    }
}

#[test]
fn test_archive_restore_roundtrip() {
    let harness = VaultHarness::new();
    harness.write_file("docs/readme.txt", b"hello chunkvault");
    harness.write_file("docs/nested/deep.txt", b"deeper content");
    harness.write_file("empty.dat", b"");

    // A file spanning three chunks.
    let big: Vec<u8> = (0..CHUNK_SIZE * 2 + 512).map(|i| (i % 251) as u8).collect();
    harness.write_file("big.bin", &big);

    let (doc, summary) = harness.archive();
    assert_eq!(summary.files_processed, 4);
    assert_chunk_accounting(&doc);

    let restore_dir = TempDir::new().unwrap();
    let restored = harness.apply_restore(restore_dir.path(), None);
    assert_eq!(restored, doc.files.len());

    assert_eq!(
        fs::read(restore_dir.path().join("docs/readme.txt")).unwrap(),
        b"hello chunkvault"
    );
    assert_eq!(
        fs::read(restore_dir.path().join("docs/nested/deep.txt")).unwrap(),
        b"deeper content"
    );
    assert_eq!(fs::read(restore_dir.path().join("empty.dat")).unwrap(), b"");
    assert_eq!(fs::read(restore_dir.path().join("big.bin")).unwrap(), big);

    // Modification times survive the round-trip within the tolerance.
    let src_mtime = fs::metadata(harness.source.path().join("big.bin"))
        .unwrap()
        .modified()
        .unwrap();
    let dst_mtime = fs::metadata(restore_dir.path().join("big.bin"))
        .unwrap()
        .modified()
        .unwrap();
    let diff = src_mtime
        .duration_since(dst_mtime)
        .unwrap_or_else(|e| e.duration());
    assert!(diff <= std::time::Duration::from_micros(1), "mtime drift {diff:?}");
}

#[test]
fn test_concrete_chunking_scenario() {
    // 2.5 MiB -> exactly three chunks: 1 MiB + 1 MiB + 0.5 MiB.
    let harness = VaultHarness::new();
    let data: Vec<u8> = (0..2_621_440usize).map(|i| (i / 7 % 256) as u8).collect();
    harness.write_file("media.raw", &data);

    let (doc, _) = harness.archive();

    let record = &doc.files["media.raw"];
    assert_eq!(record.size, 2_621_440);
    assert_eq!(record.chunks.len(), 3);
    assert_eq!(record.chunks[0].size, 1024 * 1024);
    assert_eq!(record.chunks[1].size, 1024 * 1024);
    assert_eq!(record.chunks[2].size, 512 * 1024);

    // Each blob sits at its hash-derived sharded path.
    let store = harness.store();
    for chunk in &record.chunks {
        let path = store.chunk_path(&chunk.name);
        assert!(path.exists(), "missing blob {path:?}");
        assert!(path.starts_with(
            harness
                .archive
                .path()
                .join(&chunk.name[..2])
                .join(&chunk.name[..4])
        ));
    }
}

#[test]
fn test_dedup_identical_content_across_paths() {
    let harness = VaultHarness::new();
    harness.write_file("one.txt", b"identical payload");
    harness.write_file("two/copy.txt", b"identical payload");

    let (doc, summary) = harness.archive();

    // Two records, one blob.
    assert_eq!(doc.files["one.txt"].chunks[0].name, doc.files["two/copy.txt"].chunks[0].name);
    assert_eq!(summary.chunks_written, 1);
    assert_eq!(harness.blob_count(), 1);
}

#[test]
fn test_rerun_without_changes_is_free() {
    let harness = VaultHarness::new();
    harness.write_file("a.txt", b"alpha");
    harness.write_file("b.txt", b"beta");

    let (doc1, first) = harness.archive();
    assert_eq!(first.files_processed, 2);

    let (doc2, second) = harness.archive();
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_skipped, 2);
    assert_eq!(second.chunks_written, 0);
    assert!(doc2.deleted_files.is_empty());
    assert_eq!(doc1.files["a.txt"], doc2.files["a.txt"]);
    assert_eq!(doc1.files["b.txt"], doc2.files["b.txt"]);
}

#[test]
fn test_change_detection_mtime_boundary() {
    let harness = VaultHarness::new();
    harness.write_file("clock.txt", b"steady content");
    harness.set_mtime("clock.txt", 1_600_000_000, 123_000);
    harness.archive();

    // Drift of exactly one microsecond: still unchanged.
    harness.set_mtime("clock.txt", 1_600_000_000, 124_000);
    let (_, summary) = harness.archive();
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_processed, 0);

    // Two microseconds: re-chunked.
    harness.set_mtime("clock.txt", 1_600_000_000, 125_000);
    let (doc, summary) = harness.archive();
    assert_eq!(summary.files_processed, 1);
    assert_eq!(doc.deleted_files["clock.txt"].len(), 1);
}

#[test]
fn test_size_change_triggers_rechunk_with_same_mtime() {
    let harness = VaultHarness::new();
    harness.write_file("grow.txt", b"1234");
    harness.set_mtime("grow.txt", 1_600_000_000, 0);
    harness.archive();

    harness.write_file("grow.txt", b"12345");
    harness.set_mtime("grow.txt", 1_600_000_000, 0);

    let (doc, summary) = harness.archive();
    assert_eq!(summary.files_processed, 1);
    assert_eq!(doc.files["grow.txt"].size, 5);
    assert_chunk_accounting(&doc);
}

#[test]
fn test_changed_file_is_tombstoned_and_keeps_added_at() {
    let harness = VaultHarness::new();
    harness.write_file("notes.txt", b"first draft");

    let (doc1, _) = harness.archive();
    let original_added = doc1.files["notes.txt"].added_at;

    harness.write_file("notes.txt", b"second draft, longer");
    let before = chrono::Utc::now();
    let (doc2, _) = harness.archive();
    let after = chrono::Utc::now();

    // Old version moved to history with a bounded tombstone timestamp.
    let versions = &doc2.deleted_files["notes.txt"];
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].size, 11);
    let deleted_at = versions[0].deleted_at.unwrap();
    assert!(deleted_at >= before && deleted_at <= after);

    // The replacement carries the original added_at forward.
    assert_eq!(doc2.files["notes.txt"].added_at, original_added);
    assert_eq!(doc2.files["notes.txt"].size, 20);
}

#[test]
fn test_deleted_file_is_tombstoned() {
    let harness = VaultHarness::new();
    harness.write_file("keep.txt", b"keep me");
    harness.write_file("gone.txt", b"remove me");
    harness.archive();

    fs::remove_file(harness.source.path().join("gone.txt")).unwrap();

    let before = chrono::Utc::now();
    let (doc, summary) = harness.archive();
    let after = chrono::Utc::now();

    assert_eq!(summary.files_deleted, 1);
    assert!(!doc.files.contains_key("gone.txt"));
    assert!(doc.files.contains_key("keep.txt"));

    let deleted_at = doc.deleted_files["gone.txt"][0].deleted_at.unwrap();
    assert!(deleted_at >= before && deleted_at <= after);
}

#[test]
fn test_gc_respects_history_and_shared_content() {
    let harness = VaultHarness::new();
    harness.write_file("a.txt", b"exclusive to a");
    harness.write_file("b.txt", b"shared payload");
    harness.write_file("c.txt", b"shared payload");
    harness.archive();

    // Delete a.txt and c.txt; their chunks stay referenced by history.
    fs::remove_file(harness.source.path().join("a.txt")).unwrap();
    fs::remove_file(harness.source.path().join("c.txt")).unwrap();
    let (doc, _) = harness.archive();

    let report = find_unused_chunks(&doc, &harness.store()).unwrap();
    assert!(report.unused.is_empty());

    // Prune all history: a's exclusive chunk becomes unused, the shared
    // chunk survives through b.txt.
    let index = harness.index();
    let mut doc = index.load().unwrap();
    doc.prune_deleted(chrono::Duration::zero(), chrono::Utc::now() + chrono::Duration::seconds(5));
    index.save(&mut doc).unwrap();

    let report = find_unused_chunks(&doc, &harness.store()).unwrap();
    assert_eq!(report.unused.len(), 1);

    let shared_hash = &doc.files["b.txt"].chunks[0].name;
    assert!(!report.unused[0].contains(shared_hash));
}

#[test]
fn test_exclusions_skip_subtrees() {
    let harness = VaultHarness::new();
    harness.write_file("src/main.rs", b"fn main() {}");
    harness.write_file("target/debug/app", b"\x7fELF junk");
    harness.write_file("scratch.tmp", b"scratch");

    let excludes = ExcludeList::from_patterns(["target", "target/*", "*.tmp"]).unwrap();
    let (doc, _) = harness.archive_with_excludes(excludes);

    assert!(doc.files.contains_key("src/main.rs"));
    assert!(!doc.files.contains_key("scratch.tmp"));
    assert!(!doc.files.keys().any(|k| k.starts_with("target")));
}

#[test]
fn test_archive_location_nested_in_source_is_skipped() {
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("data.txt"), b"real data").unwrap();
    let location = source.path().join("backup");
    fs::create_dir_all(&location).unwrap();

    let config = VaultConfig {
        password: "pw".to_string(),
        checkpoint_interval: std::time::Duration::ZERO,
        ..VaultConfig::default()
    };
    let cipher: Arc<dyn Cipher> = Arc::new(MemCipher);
    let index = IndexStore::new(&location, &config, cipher.clone());
    let mut doc = index.load().unwrap();

    let mut walker = ArchiveWalker::new(
        source.path(),
        ChunkStore::new(&location),
        index,
        cipher,
        &config,
        ExcludeList::empty(),
    );
    walker.run(&mut doc).unwrap();

    assert!(doc.files.contains_key("data.txt"));
    assert!(!doc.files.keys().any(|k| k.starts_with("backup")));
}

#[test]
fn test_index_persists_between_runs() {
    let harness = VaultHarness::new();
    harness.write_file("a.txt", b"persistent");
    harness.archive();

    // A fresh load sees the saved state, key included.
    let doc = harness.index().load().unwrap();
    assert_eq!(doc.file_count(), 2); // root dir + a.txt
    assert_eq!(doc.data_key().unwrap().len(), 64);
    assert!(doc.files.contains_key("a.txt"));
    assert!(doc.files.contains_key(""));
    assert!(doc.files[""].is_directory);
}

#[test]
fn test_selective_restore_pattern() {
    let harness = VaultHarness::new();
    harness.write_file("photos/cat.jpg", b"cat bytes");
    harness.write_file("docs/tax.pdf", b"tax bytes");
    harness.archive();

    let restore_dir = TempDir::new().unwrap();
    let restored = harness.apply_restore(restore_dir.path(), Some("photos/*"));

    assert_eq!(restored, 1);
    assert!(restore_dir.path().join("photos/cat.jpg").exists());
    assert!(!restore_dir.path().join("docs/tax.pdf").exists());
}

#[test]
fn test_restore_script_and_sidecar_written() {
    let harness = VaultHarness::new();
    harness.write_file("hello.txt", b"hi");
    harness.archive();

    let doc = harness.index().load().unwrap();
    let restore_dir = TempDir::new().unwrap();
    let restorer = Restorer::new(harness.store(), restore_dir.path(), &harness.config);
    let plan = restorer.plan(&doc);
    let script = restorer.write_script(&doc, &plan).unwrap();

    let body = fs::read_to_string(&script).unwrap();
    assert!(body.starts_with("#!/bin/sh"));
    assert!(body.contains("hello.txt"));

    let key = fs::read_to_string(restore_dir.path().join("archive.key")).unwrap();
    assert_eq!(key, doc.data_key().unwrap());
}

#[cfg(unix)]
#[test]
fn test_symlinks_are_skipped_by_default() {
    let harness = VaultHarness::new();
    harness.write_file("real.txt", b"actual file");
    std::os::unix::fs::symlink(
        harness.source.path().join("real.txt"),
        harness.source.path().join("link.txt"),
    )
    .unwrap();

    let (doc, _) = harness.archive();
    assert!(doc.files.contains_key("real.txt"));
    assert!(!doc.files.contains_key("link.txt"));
}
