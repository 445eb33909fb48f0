use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use super::{StorageAdapter, StorageFuture};
use crate::error::{StorageError, StorageResult};

/// Synchronous backend keeping one file per key under a directory.
///
/// This is the backend a persistent store falls back to when none is given.
/// The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    /// Store entries under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory entries live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> StorageResult<PathBuf> {
        Self::validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Reject keys that would escape the directory.
    fn validate_key(key: &str) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("key cannot be empty".to_string()));
        }
        if key.contains('/') || key.contains('\\') || key.contains("..") || key.contains('\0') {
            return Err(StorageError::InvalidKey(format!(
                "key contains invalid characters: {key:?}"
            )));
        }
        if key.chars().any(|c| c.is_control()) {
            return Err(StorageError::InvalidKey(format!(
                "key contains control characters: {key:?}"
            )));
        }
        Ok(())
    }

    fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.dir)?;

        // Write to a sibling temp file then rename, so readers never see a
        // half-written entry.
        let tmp = path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(value.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl StorageAdapter for FileStorage {
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
        StorageFuture::ready(self.read(key))
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        StorageFuture::ready(self.write(key, &value))
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        StorageFuture::ready(self.delete(key))
    }
}
