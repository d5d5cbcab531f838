//! Local filesystem mirror.
//!
//! Blobs are stored as flat files under a root directory, using the
//! storage key directly as a relative path.  All writes follow the
//! temp-fsync-rename pattern so a crash never leaves a half-written
//! file at a final path.

use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::contract::Listing;
use crate::errors::{Result, StorageError};

/// Stores mirrored blobs on the local filesystem.
pub struct LocalStore {
    /// Root directory for all mirrored files.
    root: PathBuf,
}

impl LocalStore {
    /// Create a `LocalStore` rooted at `root`.
    ///
    /// The directory (and the `.tmp` staging directory) are created if
    /// they do not exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        std::fs::create_dir_all(root.join(".tmp"))?;
        Ok(Self { root })
    }

    /// The mirror's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage key to an absolute file path.
    ///
    /// Rejects keys whose components would escape the root directory.
    fn resolve(&self, key: &str) -> Result<PathBuf> {
        for component in Path::new(key).components() {
            if let std::path::Component::ParentDir = component {
                return Err(StorageError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("path traversal in storage key: {}", key),
                )));
            }
        }
        Ok(self.root.join(key))
    }

    /// Generate a temp file path under `.tmp/` for atomic writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.root.join(".tmp").join(format!("tmp-{}", id))
    }

    /// Write `data` under `key`, replacing any existing file.
    ///
    /// Parent directories are created as needed; the write goes to a
    /// temp file, is fsynced, and then renamed into place.
    pub fn save(&self, key: &str, data: &[u8]) -> Result<()> {
        let final_path = self.resolve(key)?;

        if let Some(parent) = final_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = self.temp_path();
        if let Some(parent) = tmp_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;

        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    /// Read the full file at `key`.
    pub fn open(&self, key: &str) -> Result<Bytes> {
        let path = self.resolve(key)?;
        if !path.is_file() {
            return Err(StorageError::not_found(key));
        }
        Ok(Bytes::from(std::fs::read(&path)?))
    }

    /// Delete the file at `key`.  Idempotent: a missing file is fine.
    pub fn delete(&self, key: &str) -> Result<()> {
        let path = self.resolve(key)?;
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Check whether a mirrored file exists at `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// List the directory at `path` within the mirror.
    ///
    /// A missing directory yields an empty listing; files come back
    /// sorted.  The `.tmp` staging directory is hidden at the root.
    pub fn listdir(&self, path: &str) -> Result<Listing> {
        let dir = self.resolve(path)?;
        let mut listing = Listing::default();
        if !dir.is_dir() {
            return Ok(listing);
        }

        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_empty() && name == ".tmp" {
                continue;
            }
            if entry.file_type()?.is_dir() {
                listing.dirs.insert(name);
            } else {
                listing.files.push(name);
            }
        }
        listing.files.sort();
        Ok(listing)
    }
}

// -- Tests -------------------------------------------------------------------
