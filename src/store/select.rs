//! The read/write pair a rendering layer binds to.
//!
//! Nothing here renders. A UI adapter calls [`Store::select`] while
//! rendering and [`Store::watch`] to learn when to render again.

use std::fmt;
use std::sync::{Arc, Mutex};

use super::listener::Unsubscribe;
use super::lock;
use super::store::{Store, Update};
use crate::state::StateValue;

/// A store's `set_state`, detached from the store value.
pub struct Setter<T> {
    store: Store<T>,
}

impl<T: StateValue> Setter<T> {
    /// See [`Store::set_state`].
    pub fn set_state(&self, update: impl Into<Update<T>>, replace: bool) {
        self.store.set_state(update, replace);
    }

    /// See [`Store::set`].
    pub fn set(&self, value: T) {
        self.store.set(value);
    }

    /// See [`Store::update`].
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T + Send + 'static,
    {
        self.store.update(f);
    }
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<T> fmt::Debug for Setter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Setter").finish_non_exhaustive()
    }
}

impl<T: StateValue> Store<T> {
    /// A setter bound to this store.
    pub fn setter(&self) -> Setter<T> {
        Setter {
            store: self.clone(),
        }
    }

    /// Current whole state plus a setter.
    pub fn accessor(&self) -> (T, Setter<T>) {
        (self.get(), self.setter())
    }

    /// Current selected value plus a setter.
    pub fn select<R, S>(&self, selector: S) -> (R, Setter<T>)
    where
        S: FnOnce(&T) -> R,
    {
        (self.read(selector), self.setter())
    }

    /// Watch a slice of the state.
    ///
    /// `on_change` fires after a commit only when the selected value differs
    /// from the one it last saw. The starting point is the value selected at
    /// registration time.
    pub fn watch<R, S, F>(&self, selector: S, on_change: F) -> Unsubscribe
    where
        R: Clone + PartialEq + Send + 'static,
        S: Fn(&T) -> R + Send + Sync + 'static,
        F: Fn(&R) + Send + Sync + 'static,
    {
        let last = Arc::new(Mutex::new(self.read(&selector)));

        self.subscribe(move |next, _prev| {
            let selected = selector(next);
            {
                let mut last = lock::lock(&last);
                if *last == selected {
                    return;
                }
                *last = selected.clone();
            }
            on_change(&selected);
        })
    }
}
