//! # Stowage
//!
//! Minimal external state stores for reactive user interfaces.
//!
//! Stowage keeps application state outside any rendering tree and tells
//! subscribers when it changes. It has two layers:
//!
//! ## Store (state engine)
//!
//! - `Store<T>` - one current state value plus an ordered listener set
//! - Commits that change nothing are dropped without notifying anyone
//! - Plain records (JSON objects, string-keyed maps) are shallow-merged on
//!   commit unless the caller asks for a replace
//! - `select`/`watch` give UI adapters a read/write pair and a
//!   changed-slice signal to re-render on
//!
//! ## PersistentStore (write-through persistence)
//!
//! - `PersistentStore<T>` - a store that loads its last snapshot from a
//!   `StorageAdapter` and writes every commit back
//! - Works with backends that answer immediately and backends that answer
//!   later; a local write made before a slow load finishes wins
//! - Corrupt snapshots and storage failures are logged and the store keeps
//!   working in memory

pub mod config;
pub mod error;
pub mod persist;
pub mod state;
pub mod storage;
pub mod store;
pub mod task;

// Re-export main types for convenience
pub use config::Config;
pub use error::{CodecError, CodecResult, StorageError, StorageResult};
pub use persist::{storage_key, Codec, PersistOptions, PersistentStore, Phase};
pub use state::{is_plain_record, resolve_commit, shallow_merge, shape_of, Shape, StateValue};
pub use storage::{FileStorage, MemoryStorage, StorageAdapter, StorageFuture, StorageSource};
pub use store::{Listener, Setter, Store, Unsubscribe, Update};
pub use task::Spawner;
