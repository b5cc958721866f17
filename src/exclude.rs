//! Exclusion glob lists
//!
//! An exclude file holds one glob pattern per line; blank lines and lines
//! starting with `#` are ignored. Patterns are matched against the
//! slash-normalized short path of each walked entry. Wildcards cross
//! path separators, so `target/*` excludes a whole subtree.
//!
//! Malformed patterns are a configuration error and fail at startup,
//! before any archive mutation occurs.

use crate::error::{Result, VaultError};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A compiled set of exclusion globs
#[derive(Debug, Clone)]
pub struct ExcludeList {
    set: GlobSet,
    len: usize,
}

impl ExcludeList {
    /// An exclusion list matching nothing
    pub fn empty() -> Self {
        Self {
            set: GlobSet::empty(),
            len: 0,
        }
    }

    /// Compile patterns into an exclusion list
    ///
    /// # Errors
    ///
    /// - [`VaultError::Config`] on a malformed glob pattern
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut len = 0;

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern)
                .map_err(|e| VaultError::config(format!("bad exclude glob {pattern:?}: {e}")))?;
            builder.add(glob);
            len += 1;
        }

        let set = builder
            .build()
            .map_err(|e| VaultError::config(format!("failed compiling exclude globs: {e}")))?;

        Ok(Self { set, len })
    }

    /// Read an exclude file and compile its patterns
    ///
    /// # Errors
    ///
    /// - [`VaultError::Io`] if the file cannot be read
    /// - [`VaultError::Config`] on a malformed glob pattern
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;

        let patterns: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();

        let list = Self::from_patterns(&patterns)?;
        debug!("loaded {} exclude patterns from {:?}", list.len, path);
        Ok(list)
    }

    /// Number of compiled patterns
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no patterns are loaded
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check whether `path` matches any exclusion pattern
    ///
    /// The empty path (the scan root itself) never matches.
    pub fn matches(&self, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }

        self.set.is_match(path)
    }
}
