//! The key-value boundary persistent stores write through to.
//!
//! Every operation returns a [`StorageFuture`]. Synchronous backends hand
//! back an already-resolved one with [`StorageFuture::ready`], so callers
//! only ever deal with one shape.

mod file;
mod memory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::error::StorageResult;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// The result of a storage call, possibly still pending.
#[must_use = "storage futures do nothing unless polled"]
pub struct StorageFuture<T> {
    inner: BoxFuture<'static, StorageResult<T>>,
}

impl<T: Send + 'static> StorageFuture<T> {
    /// A future that is already complete.
    pub fn ready(result: StorageResult<T>) -> Self {
        Self {
            inner: futures::future::ready(result).boxed(),
        }
    }

    /// Wrap a pending operation.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = StorageResult<T>> + Send + 'static,
    {
        Self {
            inner: future.boxed(),
        }
    }
}

impl<T> Future for StorageFuture<T> {
    type Output = StorageResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<T> fmt::Debug for StorageFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageFuture").finish_non_exhaustive()
    }
}

/// A string key-value backend.
///
/// Implementations may complete immediately or later; both are fine.
pub trait StorageAdapter: Send + Sync {
    /// Read the value under `key`. `Ok(None)` when absent.
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>>;

    /// Store `value` under `key`, overwriting.
    fn set_item(&self, key: &str, value: String) -> StorageFuture<()>;

    /// Delete `key`. Deleting a missing key succeeds.
    fn remove_item(&self, key: &str) -> StorageFuture<()>;
}

impl<S: StorageAdapter + ?Sized> StorageAdapter for Arc<S> {
    fn get_item(&self, key: &str) -> StorageFuture<Option<String>> {
        (**self).get_item(key)
    }

    fn set_item(&self, key: &str, value: String) -> StorageFuture<()> {
        (**self).set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageFuture<()> {
        (**self).remove_item(key)
    }
}

type Provider = Box<dyn Fn() -> Arc<dyn StorageAdapter> + Send + Sync>;

/// A backend, either ready or produced on first use.
pub enum StorageSource {
    /// A ready backend.
    Instance(Arc<dyn StorageAdapter>),
    /// A zero-argument provider, invoked once on first [`resolve`](StorageSource::resolve).
    Provider {
        make: Provider,
        backend: OnceLock<Arc<dyn StorageAdapter>>,
    },
}

impl StorageSource {
    /// Use this backend.
    pub fn instance(backend: Arc<dyn StorageAdapter>) -> Self {
        StorageSource::Instance(backend)
    }

    /// Build the backend on first use.
    pub fn provider<F>(make: F) -> Self
    where
        F: Fn() -> Arc<dyn StorageAdapter> + Send + Sync + 'static,
    {
        StorageSource::Provider {
            make: Box::new(make),
            backend: OnceLock::new(),
        }
    }

    /// The backend, invoking the provider if this is the first call.
    pub fn resolve(&self) -> Arc<dyn StorageAdapter> {
        match self {
            StorageSource::Instance(backend) => Arc::clone(backend),
            StorageSource::Provider { make, backend } => Arc::clone(backend.get_or_init(|| make())),
        }
    }
}

impl fmt::Debug for StorageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageSource::Instance(_) => f.write_str("StorageSource::Instance"),
            StorageSource::Provider { backend, .. } => f
                .debug_struct("StorageSource::Provider")
                .field("resolved", &backend.get().is_some())
                .finish(),
        }
    }
}
