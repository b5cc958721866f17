//! The archive index document
//!
//! The [`Document`] is the single unit of durable state for an archive
//! location: every known file, its chunk list, and the deletion history,
//! plus the wrapped per-archive data key. It is loaded fully into memory,
//! mutated in place during a walk, and written back wholesale; there is
//! no partial or streaming persistence.
//!
//! Path keys are relative, slash-normalized paths; the empty string
//! denotes the root of the archived tree. A path is never a *current*
//! entry in both `files` and `deleted_files`: the latter holds only
//! superseded or removed versions, oldest first.

use crate::cipher::Cipher;
use crate::error::{Result, VaultError};
use crate::types::FileRecord;
use crate::utils::new_data_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// The versioned archive index
///
/// Created once per archive location (with a freshly generated data key
/// when no existing index is found) and persisted through
/// [`crate::index::IndexStore`].
#[derive(Debug, Serialize, Deserialize)]
pub struct Document {
    /// Per-archive data key, encrypted under the user password, hex-encoded
    #[serde(rename = "data_key")]
    pub data_key_wrapped: String,

    /// Unwrapped data key; exists in memory only and is never persisted
    #[serde(skip)]
    data_key_plain: Option<String>,

    /// Current live state: path -> newest version
    #[serde(default)]
    pub files: BTreeMap<String, FileRecord>,

    /// Deletion history: path -> superseded versions, oldest first
    #[serde(default)]
    pub deleted_files: BTreeMap<String, Vec<FileRecord>>,
}

impl Document {
    /// Create a fresh document with a newly generated data key
    pub fn new() -> Self {
        Self {
            data_key_wrapped: String::new(),
            data_key_plain: Some(new_data_key()),
            files: BTreeMap::new(),
            deleted_files: BTreeMap::new(),
        }
    }

    /// The unwrapped data key
    ///
    /// # Errors
    ///
    /// - [`VaultError::KeyLocked`] if the key has not been unwrapped yet
    pub fn data_key(&self) -> Result<&str> {
        self.data_key_plain
            .as_deref()
            .ok_or(VaultError::KeyLocked)
    }

    /// Encrypt the in-memory data key under `password`
    ///
    /// Stores the result hex-encoded in `data_key_wrapped`, ready for
    /// serialization. The plaintext key stays in memory untouched.
    pub fn wrap_key(&mut self, cipher: &dyn Cipher, password: &str) -> Result<()> {
        let plain = self.data_key()?.to_owned();
        let wrapped = cipher.encrypt(plain.as_bytes(), password)?;
        self.data_key_wrapped = hex::encode(wrapped);
        Ok(())
    }

    /// Decrypt `data_key_wrapped` with `password` into memory
    pub fn unwrap_key(&mut self, cipher: &dyn Cipher, password: &str) -> Result<()> {
        let raw = hex::decode(&self.data_key_wrapped)?;
        let plain = cipher.decrypt(&raw, password)?;
        let key = String::from_utf8(plain)
            .map_err(|_| VaultError::cipher("unwrapped data key is not valid UTF-8"))?;
        self.data_key_plain = Some(key);
        Ok(())
    }

    /// Move the live entry at `path` into the deletion history
    ///
    /// The record receives `deleted_at = now` and is appended to the
    /// path's version list, preserving supersession order. A missing live
    /// entry is logged and ignored.
    pub fn tombstone(&mut self, path: &str, now: DateTime<Utc>) {
        let Some(mut record) = self.files.remove(path) else {
            warn!("tombstone: {path} has no live index entry");
            return;
        };

        record.deleted_at = Some(now);
        self.deleted_files
            .entry(path.to_string())
            .or_default()
            .push(record);
    }

    /// Collect every chunk hash referenced by any current or historical record
    pub fn referenced_chunks(&self) -> HashSet<String> {
        let mut set = HashSet::new();

        for record in self.files.values() {
            for chunk in &record.chunks {
                set.insert(chunk.name.clone());
            }
        }

        for versions in self.deleted_files.values() {
            for record in versions {
                for chunk in &record.chunks {
                    set.insert(chunk.name.clone());
                }
            }
        }

        set
    }

    /// Drop tombstoned versions older than the retention threshold
    ///
    /// Keeps versions whose `deleted_at` is at or after `now - retention`
    /// (a half-open interval: exactly-at-threshold is retained). Paths
    /// left without versions are removed entirely. Live entries are never
    /// pruned. A version missing its deletion timestamp is repaired in
    /// place with the current time and kept for this round.
    ///
    /// Returns the number of versions removed.
    pub fn prune_deleted(&mut self, retention: chrono::Duration, now: DateTime<Utc>) -> usize {
        let threshold = now - retention;
        let mut removed = 0;

        self.deleted_files.retain(|path, versions| {
            versions.retain_mut(|record| {
                let deleted_at = match record.deleted_at {
                    Some(t) => t,
                    None => {
                        warn!("{path}: tombstoned version missing deletion time, repairing");
                        record.deleted_at = Some(now);
                        now
                    }
                };

                if deleted_at >= threshold {
                    true
                } else {
                    removed += 1;
                    false
                }
            });

            !versions.is_empty()
        });

        if removed > 0 {
            debug!("pruned {removed} tombstoned versions");
        }

        removed
    }

    /// Number of live entries
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Number of paths with deletion history
    pub fn deleted_count(&self) -> usize {
        self.deleted_files.len()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}
