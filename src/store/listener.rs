use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::lock;

/// A shared listener, called with `(next, prev)` on every commit.
///
/// Identity is the allocation: subscribing the same `Listener` twice keeps a
/// single registration.
pub type Listener<T> = Arc<dyn Fn(&T, &T) + Send + Sync>;

pub(crate) struct Entry<T> {
    listener: Listener<T>,
    active: AtomicBool,
}

impl<T> Entry<T> {
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn call(&self, next: &T, prev: &T) {
        (self.listener)(next, prev)
    }
}

/// Ordered listener collection with identity-based deduplication.
pub(crate) struct ListenerSet<T> {
    entries: Vec<Arc<Entry<T>>>,
}

impl<T> ListenerSet<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub(crate) fn insert(&mut self, listener: Listener<T>) -> Arc<Entry<T>> {
        if let Some(existing) = self
            .entries
            .iter()
            .find(|entry| Arc::ptr_eq(&entry.listener, &listener))
        {
            return Arc::clone(existing);
        }

        let entry = Arc::new(Entry {
            listener,
            active: AtomicBool::new(true),
        });
        self.entries.push(Arc::clone(&entry));
        entry
    }

    pub(crate) fn remove(&mut self, entry: &Arc<Entry<T>>) {
        entry.active.store(false, Ordering::Release);
        self.entries.retain(|e| !Arc::ptr_eq(e, entry));
    }

    /// Copy of the current entries, in subscription order.
    ///
    /// Notification walks this copy, so listeners added mid-notification wait
    /// for the next commit. Removed ones are skipped through their `active`
    /// flag.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Entry<T>>> {
        self.entries.clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

type UnsubscribeFn = Box<dyn FnOnce() + Send>;

/// Handle returned by [`Store::subscribe`](crate::Store::subscribe).
///
/// Calling [`unsubscribe`](Unsubscribe::unsubscribe) removes the listener.
/// Further calls do nothing. Dropping the handle does *not* unsubscribe.
#[derive(Clone)]
pub struct Unsubscribe {
    action: Arc<Mutex<Option<UnsubscribeFn>>>,
}

impl Unsubscribe {
    pub(crate) fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// Remove the listener. Idempotent.
    pub fn unsubscribe(&self) {
        let action = lock::lock(&self.action).take();
        if let Some(action) = action {
            action();
        }
    }

    /// Whether this handle has already been used.
    pub fn is_unsubscribed(&self) -> bool {
        lock::lock(&self.action).is_none()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("unsubscribed", &self.is_unsubscribed())
            .finish()
    }
}
