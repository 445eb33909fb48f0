use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{StorageAdapter, StorageFuture};
use crate::store::lock;

/// In-memory, synchronous backend.
///
/// Clones share the same map, so two persistent stores built over clones of
/// one `MemoryStorage` see each other's entries. Every call resolves
/// immediately.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    items: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read an entry directly, bypassing the future-returning interface.
    pub fn peek(&self, key: &str) -> Option<String> {
        lock::read(&self.items).get(key).cloned()
    }

    /// Write an entry directly.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        lock::write(&self.items).insert(key.into(), value.into());
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        lock::read(&self.items).contains_key(key)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        lock::read(&self.items).len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        lock::read(&self.items).is_empty()
    }
}

impl StorageAdapter for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
        StorageFuture::ready(Ok(self.peek(key)))
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        self.insert(key, value);
        StorageFuture::ready(Ok(()))
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        lock::write(&self.items).remove(key);
        StorageFuture::ready(Ok(()))
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("entries", &self.len())
            .finish()
    }
}
