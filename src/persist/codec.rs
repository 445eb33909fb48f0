use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecResult;

type SerializeFn<T> = Arc<dyn Fn(&T) -> CodecResult<String> + Send + Sync>;
type DeserializeFn<T> = Arc<dyn Fn(&str) -> CodecResult<T> + Send + Sync>;

/// The serializer/deserializer pair a persistent store uses.
pub struct Codec<T> {
    serialize: SerializeFn<T>,
    deserialize: DeserializeFn<T>,
}

impl<T> Codec<T> {
    /// Build a codec from two functions.
    pub fn new<S, D>(serialize: S, deserialize: D) -> Self
    where
        S: Fn(&T) -> CodecResult<String> + Send + Sync + 'static,
        D: Fn(&str) -> CodecResult<T> + Send + Sync + 'static,
    {
        Self {
            serialize: Arc::new(serialize),
            deserialize: Arc::new(deserialize),
        }
    }

    /// Turn a state into its persisted form.
    pub fn serialize(&self, state: &T) -> CodecResult<String> {
        (self.serialize)(state)
    }

    /// Turn a persisted string back into a state.
    pub fn deserialize(&self, raw: &str) -> CodecResult<T> {
        (self.deserialize)(raw)
    }

    pub(crate) fn with_serializer<S>(mut self, serialize: S) -> Self
    where
        S: Fn(&T) -> CodecResult<String> + Send + Sync + 'static,
    {
        self.serialize = Arc::new(serialize);
        self
    }

    pub(crate) fn with_deserializer<D>(mut self, deserialize: D) -> Self
    where
        D: Fn(&str) -> CodecResult<T> + Send + Sync + 'static,
    {
        self.deserialize = Arc::new(deserialize);
        self
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> {
    /// Plain JSON.
    pub fn json() -> Self {
        Self::new(
            |state| Ok(serde_json::to_string(state)?),
            |raw| Ok(serde_json::from_str(raw)?),
        )
    }
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self {
            serialize: Arc::clone(&self.serialize),
            deserialize: Arc::clone(&self.deserialize),
        }
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").finish_non_exhaustive()
    }
}
