//! File storage seam.
//!
//! The pipeline reads source bytes and writes derived bytes through the
//! [`FileStore`] trait so tests can substitute a recording mock and
//! deployments can point at whatever filesystem layout they use. Paths are
//! store-relative strings (the same strings persisted on
//! [`ImageRecord::file_path`](crate::record::ImageRecord::file_path)).
//!
//! Collision freedom comes from the records, not the store: every record
//! gets a unique storage name, so concurrent writes under different records
//! never touch the same path.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Trait for binary artifact storage backends.
pub trait FileStore: Sync {
    /// Write `bytes` at `path`, creating parent directories as needed.
    /// Overwrites are idempotent.
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Read the full contents at `path`.
    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Remove the file at `path`. Removing a missing file is an error.
    fn remove(&self, path: &str) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> Result<bool, StorageError>;
}

/// [`FileStore`] rooted at a local directory.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl FileStore for LocalFileStore {
    fn write(&self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(full, bytes)?;
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.resolve(path))?)
    }

    fn remove(&self, path: &str) -> Result<(), StorageError> {
        fs::remove_file(self.resolve(path))?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.resolve(path).exists())
    }
}
