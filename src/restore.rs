//! Restore plan generation
//!
//! The restorer consumes a loaded [`Document`] and emits an ordered
//! reconstruction procedure: a typed list of [`RestoreStep`]s, rendered
//! into a POSIX shell script that decrypts chunks, concatenates
//! multi-chunk files in byte order and restores modification times.
//!
//! Decryption itself is performed by the external cipher program, so the
//! unwrapped data key is persisted to a sidecar file next to the script;
//! the generated commands read the key from there.

use crate::cipher::decrypt_command;
use crate::document::Document;
use crate::error::{Result, VaultError};
use crate::store::ChunkStore;
use crate::types::VaultConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use globset::{Glob, GlobMatcher};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the generated reconstruction script
pub const RESTORE_SCRIPT: &str = "restore.sh";

/// Name of the sidecar file holding the unwrapped data key
pub const KEY_SIDECAR: &str = "archive.key";

/// One step of the reconstruction procedure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStep {
    /// Create a directory (and its parents)
    CreateDir {
        /// Directory to create
        path: PathBuf,
    },
    /// Create an empty file (a zero-length source has no chunks)
    CreateEmpty {
        /// File to create
        path: PathBuf,
    },
    /// Decrypt one stored chunk blob to `dest`
    DecryptChunk {
        /// Content hash of the chunk to decrypt
        chunk: String,
        /// Output path for the plaintext
        dest: PathBuf,
    },
    /// Concatenate `parts` into `dest`, in order
    Concat {
        /// Chunk part files, in byte order
        parts: Vec<PathBuf>,
        /// Final file path
        dest: PathBuf,
    },
    /// Delete a temporary part file
    Remove {
        /// Path to delete
        path: PathBuf,
    },
    /// Restore the recorded modification time
    SetModified {
        /// Path to touch
        path: PathBuf,
        /// Recorded modification time
        modified: DateTime<Utc>,
    },
}

/// An ordered reconstruction procedure plus selection statistics
#[derive(Debug, Clone, Default)]
pub struct RestorePlan {
    /// Steps in execution order
    pub steps: Vec<RestoreStep>,
    /// Files the plan reconstructs
    pub files_selected: usize,
    /// Live files in the index
    pub files_total: usize,
}

/// Generates restore plans and scripts for one archive
pub struct Restorer {
    store: ChunkStore,
    destination: PathBuf,
    pattern: Option<GlobMatcher>,
    cipher_program: String,
}

impl Restorer {
    /// Create a restorer reading from `store` and targeting `destination`
    pub fn new(store: ChunkStore, destination: impl Into<PathBuf>, config: &VaultConfig) -> Self {
        Self {
            store,
            destination: destination.into(),
            pattern: None,
            cipher_program: config.cipher_program.clone(),
        }
    }

    /// Restrict the plan to paths matching a glob pattern
    ///
    /// # Errors
    ///
    /// - [`VaultError::Config`] on a malformed pattern
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self> {
        let glob = Glob::new(pattern)
            .map_err(|e| VaultError::config(format!("bad restore pattern {pattern:?}: {e}")))?;
        self.pattern = Some(glob.compile_matcher());
        Ok(self)
    }

    /// Build the reconstruction procedure for `doc`
    ///
    /// Iterates live files in deterministic lexicographic path order.
    /// Single-chunk files decrypt straight to their final path;
    /// multi-chunk files decrypt to index-suffixed temporaries, are
    /// concatenated in chunk order and the temporaries removed.
    pub fn plan(&self, doc: &Document) -> RestorePlan {
        let mut plan = RestorePlan {
            files_total: doc.files.len(),
            ..RestorePlan::default()
        };

        for (short, record) in &doc.files {
            if let Some(pattern) = &self.pattern {
                if !pattern.is_match(short.as_str()) {
                    continue;
                }
            }

            plan.files_selected += 1;
            let dest = self.destination.join(short);

            if record.is_directory {
                plan.steps.push(RestoreStep::CreateDir { path: dest.clone() });
                plan.steps.push(RestoreStep::SetModified {
                    path: dest,
                    modified: record.modified,
                });
                continue;
            }

            if let Some(parent) = dest.parent() {
                plan.steps.push(RestoreStep::CreateDir {
                    path: parent.to_path_buf(),
                });
            }

            match record.chunks.len() {
                0 => plan.steps.push(RestoreStep::CreateEmpty { path: dest.clone() }),
                1 => plan.steps.push(RestoreStep::DecryptChunk {
                    chunk: record.chunks[0].name.clone(),
                    dest: dest.clone(),
                }),
                _ => {
                    let mut parts = Vec::with_capacity(record.chunks.len());

                    for (no, chunk) in record.chunks.iter().enumerate() {
                        let part = part_path(&dest, no + 1);
                        plan.steps.push(RestoreStep::DecryptChunk {
                            chunk: chunk.name.clone(),
                            dest: part.clone(),
                        });
                        parts.push(part);
                    }

                    plan.steps.push(RestoreStep::Concat {
                        parts: parts.clone(),
                        dest: dest.clone(),
                    });

                    for part in parts {
                        plan.steps.push(RestoreStep::Remove { path: part });
                    }
                }
            }

            plan.steps.push(RestoreStep::SetModified {
                path: dest,
                modified: record.modified,
            });
        }

        debug!(
            "restore plan: {} of {} files, {} steps",
            plan.files_selected,
            plan.files_total,
            plan.steps.len()
        );
        plan
    }

    /// Write the rendered script and the data-key sidecar
    ///
    /// Both land in the destination directory; returns the script path.
    ///
    /// # Errors
    ///
    /// - [`VaultError::KeyLocked`] if the data key was never unwrapped
    /// - [`VaultError::Io`] on write failures
    pub fn write_script(&self, doc: &Document, plan: &RestorePlan) -> Result<PathBuf> {
        let key = doc.data_key()?;

        fs::create_dir_all(&self.destination)?;

        let key_path = self.destination.join(KEY_SIDECAR);
        fs::write(&key_path, key)?;

        let script_path = self.destination.join(RESTORE_SCRIPT);
        fs::write(&script_path, self.render(plan, &key_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
            fs::set_permissions(&script_path, fs::Permissions::from_mode(0o700))?;
        }

        info!(
            "wrote restore script for {} files to {:?}",
            plan.files_selected, script_path
        );
        Ok(script_path)
    }

    /// Render the plan as a POSIX shell script
    fn render(&self, plan: &RestorePlan, key_path: &Path) -> String {
        let mut lines = vec!["#!/bin/sh".to_string(), "set -e".to_string(), String::new()];

        for step in &plan.steps {
            let line = match step {
                RestoreStep::CreateDir { path } => format!("mkdir -p {}", sh_quote(path)),
                RestoreStep::CreateEmpty { path } => format!(": > {}", sh_quote(path)),
                RestoreStep::DecryptChunk { chunk, dest } => decrypt_command(
                    &self.cipher_program,
                    &self.store.chunk_path(chunk),
                    dest,
                    key_path,
                ),
                RestoreStep::Concat { parts, dest } => {
                    let quoted: Vec<String> = parts.iter().map(|p| sh_quote(p)).collect();
                    format!("cat {} > {}", quoted.join(" "), sh_quote(dest))
                }
                RestoreStep::Remove { path } => format!("rm -- {}", sh_quote(path)),
                RestoreStep::SetModified { path, modified } => format!(
                    "touch -d '{}' {}",
                    modified.to_rfc3339_opts(SecondsFormat::Micros, true),
                    sh_quote(path)
                ),
            };
            lines.push(line);
        }

        lines.push(String::new());
        lines.join("\n")
    }
}

/// Temporary part path for chunk number `no` (1-based)
fn part_path(dest: &Path, no: usize) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(format!(".{no}"));
    PathBuf::from(name)
}

/// Single-quote a path for /bin/sh
fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}
