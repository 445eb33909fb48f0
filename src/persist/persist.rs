use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::codec::Codec;
use super::options::{storage_key, PersistOptions};
use crate::error::StorageResult;
use crate::state::StateValue;
use crate::storage::{FileStorage, StorageAdapter, StorageFuture, StorageSource};
use crate::store::{lock, Store, Unsubscribe, Update};
use crate::task::{self, OrderedQueue, Spawner};

/// Where a persistent store is in its load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The initial read has not finished.
    Loading,
    /// The initial read finished, whatever its outcome.
    Ready,
}

/// A [`Store`] whose every commit is written through to storage.
///
/// Construction never waits on storage. A backend that answers immediately
/// seeds the store before `new` returns; a backend that answers later leaves
/// the store on its initial state and applies the loaded snapshot when it
/// arrives, unless the store was committed to in the meantime. A local write
/// always beats a late load.
///
/// Derefs to [`Store`], so all store operations are available directly.
pub struct PersistentStore<T> {
    store: Store<T>,
    shared: Arc<Shared<T>>,
}

struct Shared<T> {
    name: String,
    storage_key: String,
    storage: Arc<dyn StorageAdapter>,
    codec: Codec<T>,
    spawner: Spawner,
    writes: OrderedQueue,
    // Held from reading the state to queueing its write.
    write_order: Mutex<()>,
    phase: watch::Sender<Phase>,
}

impl<T: StateValue> PersistentStore<T> {
    /// Build a store named by `options`, starting from `initial` unless
    /// storage holds a usable snapshot.
    pub fn new(initial: T, options: PersistOptions<T>) -> Self {
        let PersistOptions {
            name,
            config,
            storage,
            codec,
            spawner,
        } = options;

        let storage = storage
            .unwrap_or_else(|| {
                StorageSource::instance(Arc::new(FileStorage::new(&config.storage_dir)))
            })
            .resolve();
        let (phase, _) = watch::channel(Phase::Loading);

        let shared = Arc::new(Shared {
            storage_key: storage_key(&config.namespace, &name),
            name,
            storage,
            codec,
            spawner,
            writes: OrderedQueue::new(),
            write_order: Mutex::new(()),
            phase,
        });

        let load = shared.storage.get_item(&shared.storage_key);
        let store = match task::poll_now(load) {
            Ok(loaded) => {
                debug!(
                    name = %shared.name,
                    key = %shared.storage_key,
                    "loaded snapshot synchronously"
                );
                let store = Store::new(shared.decode(loaded).unwrap_or(initial));
                // Written once even when the snapshot came from storage.
                shared.write_through(|| store.snapshot());
                shared.attach_write_through(&store);
                shared.phase.send_replace(Phase::Ready);
                store
            }
            Err(pending) => {
                debug!(name = %shared.name, key = %shared.storage_key, "snapshot load pending");
                let store = Store::new(initial);
                let changed = ChangedFlag::arm(&store);
                shared.attach_write_through(&store);
                shared.spawn_hydration(store.clone(), pending, changed);
                store
            }
        };

        Self { store, shared }
    }

    /// The underlying store.
    pub fn store(&self) -> &Store<T> {
        &self.store
    }

    /// The logical store name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// The key the state is persisted under.
    pub fn storage_key(&self) -> &str {
        &self.shared.storage_key
    }

    /// The resolved storage backend.
    pub fn storage(&self) -> Arc<dyn StorageAdapter> {
        Arc::clone(&self.shared.storage)
    }

    /// The serializer/deserializer in use.
    pub fn codec(&self) -> &Codec<T> {
        &self.shared.codec
    }

    /// Delete the persisted entry. In-memory state is left alone.
    ///
    /// The next commit writes the entry again.
    pub fn remove_storage(&self) -> StorageFuture<()> {
        self.shared.storage.remove_item(&self.shared.storage_key)
    }

    /// Current load phase.
    pub fn phase(&self) -> Phase {
        *self.shared.phase.borrow()
    }

    /// Resolves once the initial load has finished.
    pub async fn hydrated(&self) {
        let mut phase = self.shared.phase.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = phase.wait_for(|phase| *phase == Phase::Ready).await;
    }
}

impl<T: StateValue> Shared<T> {
    /// Decode a load result, cleaning up after corrupt payloads.
    fn decode(&self, loaded: StorageResult<Option<String>>) -> Option<T> {
        match loaded {
            Ok(None) => None,
            Ok(Some(raw)) => match self.codec.deserialize(&raw) {
                Ok(state) => Some(state),
                Err(err) => {
                    warn!(
                        name = %self.name,
                        key = %self.storage_key,
                        error = %err,
                        "discarding unreadable snapshot"
                    );
                    self.remove_entry();
                    None
                }
            },
            Err(err) => {
                warn!(
                    name = %self.name,
                    key = %self.storage_key,
                    error = %err,
                    "failed to load snapshot, starting from initial state"
                );
                None
            }
        }
    }

    fn remove_entry(&self) {
        let _order = lock::lock(&self.write_order);
        let key = self.storage_key.clone();
        let removal = self.storage.remove_item(&self.storage_key);
        self.writes.submit(removal, &self.spawner, move |result| {
            if let Err(err) = result {
                warn!(key = %key, error = %err, "failed to remove unreadable snapshot");
            }
        });
    }

    /// Persist the state returned by `latest`. Failures are logged and
    /// otherwise ignored.
    ///
    /// Listeners of concurrent commits may run in any order, so each write
    /// reads the newest state under `write_order` instead of persisting the
    /// value it was notified with.
    fn write_through<L>(&self, latest: L)
    where
        L: FnOnce() -> Arc<T>,
    {
        let _order = lock::lock(&self.write_order);
        let state = latest();
        let raw = match self.codec.serialize(&state) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key = %self.storage_key, error = %err, "failed to serialize state");
                return;
            }
        };

        let key = self.storage_key.clone();
        let write = self.storage.set_item(&self.storage_key, raw);
        self.writes.submit(write, &self.spawner, move |result| {
            if let Err(err) = result {
                warn!(key = %key, error = %err, "write-through failed");
            }
        });
    }

    fn attach_write_through(self: &Arc<Self>, store: &Store<T>) -> Unsubscribe {
        let shared = Arc::clone(self);
        let state = store.downgrade_state();
        store.subscribe(move |next, _prev| {
            shared.write_through(|| match state.upgrade() {
                Some(state) => Arc::clone(&lock::read(&state)),
                None => Arc::new(next.clone()),
            })
        })
    }

    fn spawn_hydration(
        self: &Arc<Self>,
        store: Store<T>,
        pending: StorageFuture<Option<String>>,
        changed: ChangedFlag,
    ) {
        let guard = HydrationGuard {
            shared: Arc::clone(self),
            changed,
        };
        self.spawner.spawn(
            async move {
                let loaded = pending.await;
                guard.shared.hydrate(&store, loaded, &guard.changed);
            }
            .boxed(),
        );
    }

    fn hydrate(
        &self,
        store: &Store<T>,
        loaded: StorageResult<Option<String>>,
        changed: &ChangedFlag,
    ) {
        if changed.is_set() {
            debug!(name = %self.name, "store changed before load finished, dropping snapshot");
            return;
        }

        let Some(state) = self.decode(loaded) else {
            return;
        };

        let armed_at = changed.armed_at;
        if store.commit_if(Update::Value(state), false, |version| version == armed_at) {
            debug!(name = %self.name, "applied loaded snapshot");
        }
    }
}

/// Finishes a hydration even if it unwinds: detaches the changed flag and
/// moves the phase to `Ready`.
struct HydrationGuard<T: StateValue> {
    shared: Arc<Shared<T>>,
    changed: ChangedFlag,
}

impl<T: StateValue> Drop for HydrationGuard<T> {
    fn drop(&mut self) {
        self.changed.disarm();
        self.shared.phase.send_replace(Phase::Ready);
    }
}

/// One-shot guard recording whether a store has been committed to.
///
/// Its listener flips the flag on the first commit and removes itself. The
/// flag is a cheap early exit; the exact test is the store version compared
/// with `armed_at` under the commit lock.
struct ChangedFlag {
    changed: Arc<AtomicBool>,
    armed_at: u64,
    subscription: Unsubscribe,
}

impl ChangedFlag {
    fn arm<T: StateValue>(store: &Store<T>) -> Self {
        let armed_at = store.version();
        let changed = Arc::new(AtomicBool::new(false));
        let handle: Arc<OnceLock<Unsubscribe>> = Arc::new(OnceLock::new());

        let subscription = store.subscribe({
            let changed = Arc::clone(&changed);
            let handle = Arc::clone(&handle);
            move |_next, _prev| {
                changed.store(true, Ordering::SeqCst);
                if let Some(handle) = handle.get() {
                    handle.unsubscribe();
                }
            }
        });
        let _ = handle.set(subscription.clone());

        Self {
            changed,
            armed_at,
            subscription,
        }
    }

    fn is_set(&self) -> bool {
        self.changed.load(Ordering::SeqCst)
    }

    fn disarm(&self) {
        self.subscription.unsubscribe();
    }
}

impl<T> Deref for PersistentStore<T> {
    type Target = Store<T>;

    fn deref(&self) -> &Store<T> {
        &self.store
    }
}

impl<T> Clone for PersistentStore<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: StateValue + fmt::Debug> fmt::Debug for PersistentStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStore")
            .field("name", &self.shared.name)
            .field("storage_key", &self.shared.storage_key)
            .field("phase", &*self.shared.phase.borrow())
            .field("store", &self.store)
            .finish()
    }
}
