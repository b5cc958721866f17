//! Index persistence
//!
//! Serializes the [`Document`] to pretty-printed JSON and layers optional
//! gzip compression and password encryption on top, in that order. The
//! artifact name reflects the transform stack:
//!
//! ```text
//! <location>/index.json            # plain
//! <location>/index.json.gz        # compressed
//! <location>/index.json.bin      # encrypted
//! <location>/index.json.gz.bin  # compressed then encrypted
//! ```
//!
//! Saves are atomic and self-validating: the artifact is written to a
//! temporary sibling, loaded back, checked against the in-memory document
//! (file and deletion-history counts must match exactly), and only then
//! renamed over the live index. A failed validation aborts the save and
//! leaves the previous good index untouched.
//!
//! Loading probes the four suffix combinations in a fixed order so mixed
//! configurations and format migrations keep working.

use crate::cipher::Cipher;
use crate::document::Document;
use crate::error::{Result, VaultError};
use crate::types::VaultConfig;
use crate::utils::{tmp_sibling, TMP_SUFFIX};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Base name of the index artifact
pub const INDEX_FILENAME: &str = "index.json";

/// Suffix for gzip-compressed artifacts
pub const GZ_SUFFIX: &str = ".gz";

/// Suffix for password-encrypted artifacts
pub const ENC_SUFFIX: &str = ".bin";

/// Loads and saves the archive index at one location
///
/// Holds the configuration toggles and the injected cipher; nothing here
/// reads ambient global state.
pub struct IndexStore {
    location: PathBuf,
    compress: bool,
    encrypt: bool,
    password: String,
    cipher: Arc<dyn Cipher>,
}

impl std::fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexStore")
            .field("location", &self.location)
            .field("compress", &self.compress)
            .field("encrypt", &self.encrypt)
            .finish()
    }
}

impl IndexStore {
    /// Create an index store for `location`
    pub fn new(location: impl Into<PathBuf>, config: &VaultConfig, cipher: Arc<dyn Cipher>) -> Self {
        Self {
            location: location.into(),
            compress: config.compress_index,
            encrypt: config.encrypt_index,
            password: config.password.clone(),
            cipher,
        }
    }

    /// Path the index will be saved to under the current configuration
    pub fn index_path(&self) -> PathBuf {
        let mut name = String::from(INDEX_FILENAME);

        if self.compress {
            name.push_str(GZ_SUFFIX);
        }
        if self.encrypt {
            name.push_str(ENC_SUFFIX);
        }

        self.location.join(name)
    }

    /// Locate an existing index artifact, regardless of configuration
    ///
    /// Probes uncompressed+unencrypted, compressed-only, encrypted-only,
    /// then compressed+encrypted.
    pub fn existing_index_path(&self) -> Option<PathBuf> {
        let base = self.location.join(INDEX_FILENAME);

        let candidates = [
            base.clone(),
            PathBuf::from(format!("{}{}", base.display(), GZ_SUFFIX)),
            PathBuf::from(format!("{}{}", base.display(), ENC_SUFFIX)),
            PathBuf::from(format!("{}{}{}", base.display(), GZ_SUFFIX, ENC_SUFFIX)),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Load the index, or initialize a fresh document
    ///
    /// When no artifact exists at any probed path, a new [`Document`]
    /// with a freshly generated data key is returned. Otherwise the
    /// transform stack is reversed according to the artifact's suffixes
    /// and the data key is unwrapped with the password.
    ///
    /// # Errors
    ///
    /// - [`VaultError::Io`] / [`VaultError::Json`] on unreadable or
    ///   unparsable artifacts
    /// - [`VaultError::Cipher`] when decryption fails (wrong password,
    ///   cipher failure)
    pub fn load(&self) -> Result<Document> {
        let Some(path) = self.existing_index_path() else {
            info!(
                "no index found at {:?}, starting a new archive",
                self.index_path()
            );
            return Ok(Document::new());
        };

        self.load_from(&path)
    }

    /// Save the index atomically, validating before replacing
    ///
    /// # Errors
    ///
    /// - [`VaultError::Validation`] when the reloaded temporary artifact
    ///   does not match the in-memory document; the previous index is
    ///   left untouched
    /// - [`VaultError::Cipher`] / [`VaultError::Io`] on transform or
    ///   write failures, all fatal
    pub fn save(&self, doc: &mut Document) -> Result<()> {
        doc.wrap_key(self.cipher.as_ref(), &self.password)?;

        let mut data = serde_json::to_vec_pretty(doc)?;

        if self.compress {
            data = compress(&data)?;
        }
        if self.encrypt {
            data = self.cipher.encrypt(&data, &self.password)?;
        }

        let path = self.index_path();
        fs::create_dir_all(&self.location)?;

        let temp_path = tmp_sibling(&path);
        fs::write(&temp_path, &data)?;

        trace!("validating index at {temp_path:?}");
        if let Err(e) = self.validate(&temp_path, doc) {
            fs::remove_file(&temp_path).ok();
            return Err(e);
        }

        fs::rename(&temp_path, &path)?;
        debug!(
            "saved index: {} files, {} deleted paths",
            doc.file_count(),
            doc.deleted_count()
        );
        Ok(())
    }

    /// Structural sanity check of a freshly written artifact
    ///
    /// Reloads the temporary file and compares entry counts against the
    /// document being saved. Not a full equality check; it exists to
    /// catch transform-stack corruption before the previous index is
    /// replaced.
    fn validate(&self, temp_path: &Path, doc: &Document) -> Result<()> {
        let reloaded = self.load_from(temp_path)?;

        if reloaded.file_count() != doc.file_count() {
            return Err(VaultError::validation(format!(
                "file count mismatch: reloaded {} != in-memory {}",
                reloaded.file_count(),
                doc.file_count()
            )));
        }

        if reloaded.deleted_count() != doc.deleted_count() {
            return Err(VaultError::validation(format!(
                "deleted count mismatch: reloaded {} != in-memory {}",
                reloaded.deleted_count(),
                doc.deleted_count()
            )));
        }

        Ok(())
    }

    /// Read and decode one artifact, reversing transforms by suffix
    fn load_from(&self, path: &Path) -> Result<Document> {
        let mut data = fs::read(path)?;

        // A temporary artifact decodes exactly like its final name.
        let mut name = path.to_string_lossy().into_owned();
        if let Some(stripped) = name.strip_suffix(TMP_SUFFIX) {
            name = stripped.to_string();
        }

        if let Some(stripped) = name.strip_suffix(ENC_SUFFIX) {
            data = self.cipher.decrypt(&data, &self.password)?;
            name = stripped.to_string();
        }

        if name.ends_with(GZ_SUFFIX) {
            data = decompress(&data)?;
        }

        let mut doc: Document = serde_json::from_slice(&data)?;
        doc.unwrap_key(self.cipher.as_ref(), &self.password)?;

        debug!(
            "loaded index from {:?}: {} files, {} deleted paths",
            path,
            doc.file_count(),
            doc.deleted_count()
        );
        Ok(doc)
    }
}

/// Gzip-compress bytes at best compression
fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Reverse [`compress`]
fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
