use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::Codec;
use crate::config::Config;
use crate::error::CodecResult;
use crate::storage::{StorageAdapter, StorageSource};
use crate::task::Spawner;

/// The key a store named `name` persists under.
pub fn storage_key(namespace: &str, name: &str) -> String {
    format!("{namespace}-{name}")
}

/// Settings for building a [`PersistentStore`](super::PersistentStore).
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stowage::{MemoryStorage, PersistOptions, PersistentStore};
///
/// let storage = MemoryStorage::new();
/// let store = PersistentStore::new(
///     json!({"v": 0}),
///     PersistOptions::new("x").storage(storage.clone()),
/// );
/// store.set(json!({"v": 1}));
/// assert_eq!(storage.peek("stowage-x").as_deref(), Some(r#"{"v":1}"#));
/// ```
pub struct PersistOptions<T> {
    pub(crate) name: String,
    pub(crate) config: Config,
    pub(crate) storage: Option<StorageSource>,
    pub(crate) codec: Codec<T>,
    pub(crate) spawner: Spawner,
}

impl<T: Serialize + DeserializeOwned> PersistOptions<T> {
    /// Options for a store called `name`, persisted as JSON.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_codec(name, Codec::json())
    }
}

impl<T> PersistOptions<T> {
    /// Options with an explicit codec, for states that are not serde types.
    pub fn with_codec(name: impl Into<String>, codec: Codec<T>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            storage: None,
            codec,
            spawner: Spawner::default(),
        }
    }

    /// Replace the namespace and fallback directory settings.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Persist to this backend.
    pub fn storage(mut self, storage: impl StorageAdapter + 'static) -> Self {
        self.storage = Some(StorageSource::instance(Arc::new(storage)));
        self
    }

    /// Persist to a backend built when the store is constructed.
    pub fn storage_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Arc<dyn StorageAdapter> + Send + Sync + 'static,
    {
        self.storage = Some(StorageSource::provider(provider));
        self
    }

    /// Replace both halves of the codec.
    pub fn codec(mut self, codec: Codec<T>) -> Self {
        self.codec = codec;
        self
    }

    /// Replace the serializer only.
    pub fn serializer<S>(mut self, serialize: S) -> Self
    where
        S: Fn(&T) -> CodecResult<String> + Send + Sync + 'static,
    {
        self.codec = self.codec.with_serializer(serialize);
        self
    }

    /// Replace the deserializer only.
    pub fn deserializer<D>(mut self, deserialize: D) -> Self
    where
        D: Fn(&str) -> CodecResult<T> + Send + Sync + 'static,
    {
        self.codec = self.codec.with_deserializer(deserialize);
        self
    }

    /// Run pending storage work on this spawner.
    pub fn spawner(mut self, spawner: Spawner) -> Self {
        self.spawner = spawner;
        self
    }
}

impl<T> fmt::Debug for PersistOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
