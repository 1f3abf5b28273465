//! Single-value on-disk cache for the last obtained session token.
//!
//! The file holds the token as plain text. A missing file means "no cached session".
//! Writes go to a sibling temp file first and are then renamed into place, so readers never
//! observe a half-written token.

use crate::error::{HttpToolsError, Result};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct TokenCache {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TokenCache {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached token, if any.
    ///
    /// Unreadable or blank files are treated as "no cached session".
    #[must_use]
    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => {
                let token = s.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to read token cache"
                );
                None
            }
        }
    }

    /// Persist `token`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written or renamed into place.
    pub fn store(&self, token: &str) -> Result<()> {
        let _guard = self.write_lock.lock();

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.tmp_path();
        std::fs::write(&tmp, token.as_bytes())?;
        std::fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            HttpToolsError::Io(e)
        })?;
        Ok(())
    }

    /// Remove the cache file. Removing a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.remove_file()
    }

    /// Remove the cache file only when it still holds `token`.
    ///
    /// Returns `true` when the file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear_if_matches(&self, token: &str) -> Result<bool> {
        // Compare and remove under one guard so a concurrent `store` cannot slip in between.
        let _guard = self.write_lock.lock();
        if self.load().as_deref() != Some(token) {
            return Ok(false);
        }
        self.remove_file()?;
        Ok(true)
    }

    /// Caller must hold `write_lock`.
    fn remove_file(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
