//! Persistent page cache keyed by URL.
//!
//! One file per URL under the cache directory; the file holds the raw
//! response body with no wrapping metadata. Entries are created on the first
//! successful fetch and live until someone deletes them.
//!
//! # Key derivation
//!
//! Bytes outside `[A-Za-z0-9~-]` are percent-escaped, `/` becomes `_` (the
//! escape set includes `_` itself, so the mapping stays unambiguous), and the
//! result is cut down to its trailing characters when it exceeds the filename
//! budget left over after the cache directory path. Two long URLs that share a
//! suffix past that cut map to the same key.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, instrument};

use super::constants::{MAX_FILE_NAME_LENGTH, PATH_SEPARATOR_REPLACEMENT};

/// Errors from cache file operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created.
    #[error("failed to create cache directory {path}: {source}")]
    CreateDir {
        /// Cache directory path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A cache entry could not be read.
    #[error("failed to read cache entry {path}: {source}")]
    Read {
        /// Cache entry path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A cache entry could not be written.
    #[error("failed to write cache entry {path}: {source}")]
    Write {
        /// Cache entry path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// URL-to-body store on the local filesystem.
///
/// A store built with [`CacheStore::disabled`] never reports a hit and
/// silently drops writes.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: Option<PathBuf>,
}

impl CacheStore {
    /// Opens a cache rooted at `dir`, creating the directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::CreateDir`] if the directory cannot be created.
    #[instrument(level = "debug", fields(dir = %dir.display()))]
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(|source| CacheError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;
        debug!("cache directory ready");
        Ok(Self {
            dir: Some(dir.to_path_buf()),
        })
    }

    /// Creates a store that caches nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Returns whether caching is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.dir.is_some()
    }

    /// Returns the file path backing `url`, if caching is enabled.
    #[must_use]
    pub fn entry_path(&self, url: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(cache_key(url, dir)))
    }

    /// Returns true if an entry exists for `url`. Always false when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] if the entry's existence cannot be
    /// determined (unreadable directory, a file where the directory should be).
    pub async fn has(&self, url: &str) -> Result<bool, CacheError> {
        let Some(path) = self.entry_path(url) else {
            return Ok(false);
        };
        tokio::fs::try_exists(&path)
            .await
            .map_err(|source| CacheError::Read { path, source })
    }

    /// Reads the cached body for `url`.
    ///
    /// Callers check [`has`](Self::has) first; a missing entry here is unexpected.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Read`] if the entry is missing, unreadable, or
    /// caching is disabled.
    pub async fn get(&self, url: &str) -> Result<String, CacheError> {
        let Some(path) = self.entry_path(url) else {
            return Err(CacheError::Read {
                path: PathBuf::new(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "cache is disabled"),
            });
        };
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| CacheError::Read { path, source })
    }

    /// Writes (or overwrites) the cached body for `url`. No-op when disabled.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Write`] if the file cannot be written.
    pub async fn put(&self, url: &str, body: &str) -> Result<(), CacheError> {
        let Some(path) = self.entry_path(url) else {
            return Ok(());
        };
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| CacheError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(url, path = %path.display(), bytes = body.len(), "cached page");
        Ok(())
    }
}

/// Derives the filesystem-safe cache key for `url` under `cache_dir`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use crawler_core::download::cache_key;
///
/// assert_eq!(
///     cache_key("https://example.com/a/b", Path::new("cache")),
///     "https%3A__example%2Ecom_a_b"
/// );
/// ```
#[must_use]
pub fn cache_key(url: &str, cache_dir: &Path) -> String {
    let escaped = escape_url(url);
    let max_len = MAX_FILE_NAME_LENGTH
        .saturating_sub(cache_dir.as_os_str().len())
        .max(1);

    if escaped.len() <= max_len {
        return escaped;
    }

    // Escaped keys are pure ASCII, so byte slicing stays on char boundaries.
    escaped[escaped.len() - max_len..].to_string()
}

fn escape_url(url: &str) -> String {
    let mut key = String::with_capacity(url.len());
    for byte in url.bytes() {
        match byte {
            b'/' => key.push(PATH_SEPARATOR_REPLACEMENT),
            b if b.is_ascii_alphanumeric() || b == b'-' || b == b'~' => key.push(char::from(b)),
            b => {
                let _ = write!(key, "%{b:02X}");
            }
        }
    }
    key
}
