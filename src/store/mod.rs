//! The store engine.
//!
//! A [`Store`] owns exactly one current state value and an ordered set of
//! listeners. Every commit produces a whole new state, and every registered
//! listener sees it synchronously, in subscription order.

pub(crate) mod lock;
mod listener;
mod select;
mod store;

pub use listener::{Listener, Unsubscribe};
pub use select::Setter;
pub use store::{Store, Update};
