//! Persistence settings.

use std::env;
use std::path::PathBuf;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "stowage";

/// Environment variable overriding [`Config::namespace`].
pub const NAMESPACE_ENV: &str = "STOWAGE_NAMESPACE";

/// Environment variable overriding [`Config::storage_dir`].
pub const STORAGE_DIR_ENV: &str = "STOWAGE_DIR";

/// Where and under which prefix persistent stores keep their entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Prefix of every storage key, joined to the store name with `-`.
    pub namespace: String,
    /// Directory of the fallback [`FileStorage`](crate::FileStorage) backend.
    pub storage_dir: PathBuf,
}

impl Config {
    /// Defaults overridden by `STOWAGE_NAMESPACE` and `STOWAGE_DIR`.
    ///
    /// Empty variables count as unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(namespace) = env::var(NAMESPACE_ENV).ok().filter(|v| !v.is_empty()) {
            config.namespace = namespace;
        }
        if let Some(dir) = env::var_os(STORAGE_DIR_ENV).filter(|v| !v.is_empty()) {
            config.storage_dir = PathBuf::from(dir);
        }
        config
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set the fallback storage directory.
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            storage_dir: env::temp_dir().join(DEFAULT_NAMESPACE),
        }
    }
}
