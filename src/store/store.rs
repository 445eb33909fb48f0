use std::fmt;
use std::sync::{Arc, Mutex, RwLock, Weak};

use super::listener::{Listener, ListenerSet, Unsubscribe};
use super::lock;
use crate::state::{resolve_commit, StateValue};

type Updater<T> = Box<dyn FnOnce(&T) -> T + Send>;

/// The input to a commit: a ready value or a function of the current state.
pub enum Update<T> {
    /// Use this value as the candidate.
    Value(T),
    /// Compute the candidate from the current state.
    With(Updater<T>),
}

impl<T> Update<T> {
    /// Build an updater from a closure.
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        Update::With(Box::new(f))
    }

    fn into_candidate(self, current: &T) -> T {
        match self {
            Update::Value(value) => value,
            Update::With(f) => f(current),
        }
    }
}

impl<T> From<T> for Update<T> {
    fn from(value: T) -> Self {
        Update::Value(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Update<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Update::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Update::With(_) => f.write_str("With(..)"),
        }
    }
}

/// A thread-safe state container with listener fan-out.
///
/// Clones share the same state and listeners.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use stowage::Store;
///
/// let store = Store::new(json!({"a": 1, "b": 2}));
/// store.set(json!({"b": 3}));
/// assert_eq!(store.get(), json!({"a": 1, "b": 3}));
/// ```
pub struct Store<T> {
    state: Arc<RwLock<Arc<T>>>,
    listeners: Arc<RwLock<ListenerSet<T>>>,
    // Serializes resolve-and-swap so two commits never read the same base.
    // Holds the number of commits so far.
    commit: Arc<Mutex<u64>>,
}

impl<T: StateValue> Store<T> {
    /// Create a new store with the given initial state.
    pub fn new(initial: T) -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(initial))),
            listeners: Arc::new(RwLock::new(ListenerSet::new())),
            commit: Arc::new(Mutex::new(0)),
        }
    }

    /// Get a clone of the current state.
    pub fn get(&self) -> T {
        (**lock::read(&self.state)).clone()
    }

    /// Get a shared handle to the current state without cloning it.
    ///
    /// The handle stays valid after later commits; it just stops being current.
    pub fn snapshot(&self) -> Arc<T> {
        Arc::clone(&lock::read(&self.state))
    }

    /// Read state through a selector.
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> R,
    {
        let state = self.snapshot();
        f(&state)
    }

    /// Commit a new state.
    ///
    /// The candidate is `update` itself or, for [`Update::With`], the result of
    /// calling it on the current state. A candidate equal to the current state
    /// is dropped and no listener runs. When both the current state and the
    /// candidate are plain records and `replace` is `false`, the candidate is
    /// shallow-merged into the current state; otherwise it replaces it.
    ///
    /// Listeners run synchronously, after the state is swapped and outside all
    /// locks, so they may read, commit or unsubscribe freely. An updater must
    /// not commit to the store it is updating.
    pub fn set_state(&self, update: impl Into<Update<T>>, replace: bool) {
        self.commit_if(update.into(), replace, |_| true);
    }

    /// Merge-aware set. Same as `set_state(value, false)`.
    pub fn set(&self, value: T) {
        self.set_state(value, false);
    }

    /// Replace the state outright. Same as `set_state(value, true)`.
    pub fn replace(&self, value: T) {
        self.set_state(value, true);
    }

    /// Commit the result of a function of the current state.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.set_state(Update::with(f), false);
    }

    /// A weak handle on the state slot, for reading the latest state from
    /// code the store itself owns.
    pub(crate) fn downgrade_state(&self) -> Weak<RwLock<Arc<T>>> {
        Arc::downgrade(&self.state)
    }

    /// Number of commits since the store was created.
    pub fn version(&self) -> u64 {
        *lock::lock(&self.commit)
    }

    /// Commit only if `guard` accepts the commit count, read while holding
    /// the commit lock.
    ///
    /// Returns `true` if a new state was committed.
    pub(crate) fn commit_if<G>(&self, update: Update<T>, replace: bool, guard: G) -> bool
    where
        G: FnOnce(u64) -> bool,
    {
        let (next, prev) = {
            let mut version = lock::lock(&self.commit);
            if !guard(*version) {
                return false;
            }

            let prev = self.snapshot();
            let candidate = update.into_candidate(&prev);
            let Some(next) = resolve_commit(&*prev, candidate, replace) else {
                return false;
            };

            let next = Arc::new(next);
            *lock::write(&self.state) = Arc::clone(&next);
            *version += 1;
            (next, prev)
        };

        self.notify(&next, &prev);
        true
    }

    /// Subscribe to state changes.
    ///
    /// The callback receives `(next, prev)` on every commit from now on.
    pub fn subscribe<F>(&self, callback: F) -> Unsubscribe
    where
        F: Fn(&T, &T) + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(callback))
    }

    /// Subscribe a shared listener.
    ///
    /// Registering a listener that is already registered (same allocation)
    /// does not add a second subscription.
    pub fn subscribe_shared(&self, listener: Listener<T>) -> Unsubscribe {
        let entry = lock::write(&self.listeners).insert(listener);
        let listeners = Arc::downgrade(&self.listeners);

        Unsubscribe::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                lock::write(&listeners).remove(&entry);
            }
        })
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        lock::read(&self.listeners).len()
    }

    /// Notify all subscribers of a commit.
    fn notify(&self, next: &T, prev: &T) {
        let entries = lock::read(&self.listeners).snapshot();
        for entry in entries {
            if entry.is_active() {
                entry.call(next, prev);
            }
        }
    }
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            listeners: Arc::clone(&self.listeners),
            commit: Arc::clone(&self.commit),
        }
    }
}

impl<T: StateValue + fmt::Debug> fmt::Debug for Store<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.snapshot())
            .field("listeners", &self.listener_count())
            .finish()
    }
}
