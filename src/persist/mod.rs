//! Stores that write through to a [`StorageAdapter`](crate::StorageAdapter).
//!
//! A [`PersistentStore`] loads its previous snapshot when it is built and
//! persists every commit after that. Storage is advisory: the in-memory
//! state is always the source of truth, and storage or codec failures are
//! logged, never raised.

mod codec;
mod options;
mod persist;

pub use codec::Codec;
pub use options::{storage_key, PersistOptions};
pub use persist::{Phase, PersistentStore};
