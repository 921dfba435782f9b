//! Persistent storage for the security database
//!
//! The platform never interprets the file; it only opens, reads, writes and
//! removes it on request.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const DEFAULT_DB_PATH: &str = "./oic_svr_db_server.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    /// Create or truncate
    Write,
}

#[derive(Debug, thiserror::Error)]
#[error("storage {path}: {source}")]
pub struct StorageError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Clone)]
pub struct PersistentStorage {
    path: PathBuf,
}

impl Default for PersistentStorage {
    fn default() -> Self {
        Self::new(DEFAULT_DB_PATH)
    }
}

impl PersistentStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn open(&self, mode: OpenMode) -> Result<File, StorageError> {
        let mut options = OpenOptions::new();
        match mode {
            OpenMode::Read => options.read(true),
            OpenMode::Write => options.write(true).create(true).truncate(true),
        };
        options.open(&self.path).map_err(|e| self.error(e))
    }

    pub fn read(&self) -> Result<Vec<u8>, StorageError> {
        let mut data = Vec::new();
        self.open(OpenMode::Read)?
            .read_to_end(&mut data)
            .map_err(|e| self.error(e))?;
        Ok(data)
    }

    pub fn write(&self, data: &[u8]) -> Result<(), StorageError> {
        let mut file = self.open(OpenMode::Write)?;
        file.write_all(data).map_err(|e| self.error(e))?;
        file.sync_all().map_err(|e| self.error(e))
    }

    pub fn unlink(&self) -> Result<(), StorageError> {
        std::fs::remove_file(&self.path).map_err(|e| self.error(e))
    }

    fn error(&self, source: std::io::Error) -> StorageError {
        StorageError {
            path: self.path.clone(),
            source,
        }
    }
}
