//! Structural classification of state values and the merge policy.
//!
//! A store never asks the caller what kind of state it holds. Every commit
//! inspects both the previous value and the candidate and decides between a
//! shallow merge and a wholesale replacement.

mod merge;
mod shape;

pub use merge::{resolve_commit, shallow_merge};
pub use shape::{is_plain_record, shape_of, Shape, StateValue};
