use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde_json::Value;

/// The structural kind of a state value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// A mapping from string keys to values, eligible for shallow merge.
    Record,
    /// Anything else: scalars, strings, sequences, opaque structs.
    Atomic,
}

/// A value that can live inside a [`Store`](crate::Store).
///
/// Equality is the store's identity test: a commit whose candidate equals the
/// current state is dropped without notifying anyone.
///
/// Types default to [`Shape::Atomic`], so an application struct only needs an
/// empty impl:
///
/// ```
/// use stowage::StateValue;
///
/// #[derive(Clone, PartialEq)]
/// struct Counter(u32);
///
/// impl StateValue for Counter {}
/// ```
pub trait StateValue: Clone + PartialEq + Send + Sync + 'static {
    /// Report whether this particular value is a plain record.
    ///
    /// Evaluated per value, not per type: a `serde_json::Value` is a record
    /// when it holds an object and atomic otherwise.
    fn shape(&self) -> Shape {
        Shape::Atomic
    }

    /// Combine `self` with `next`, keys of `next` winning, one level deep.
    ///
    /// Only called when both values report [`Shape::Record`].
    fn merge_record(&self, next: &Self) -> Self {
        next.clone()
    }
}

/// Classify a value.
pub fn shape_of<T: StateValue>(value: &T) -> Shape {
    value.shape()
}

/// Returns `true` if the value is a plain record.
pub fn is_plain_record<T: StateValue>(value: &T) -> bool {
    shape_of(value) == Shape::Record
}

impl StateValue for Value {
    fn shape(&self) -> Shape {
        match self {
            Value::Object(_) => Shape::Record,
            _ => Shape::Atomic,
        }
    }

    fn merge_record(&self, next: &Self) -> Self {
        match (self, next) {
            (Value::Object(prev), Value::Object(next)) => {
                let mut merged = prev.clone();
                for (key, value) in next {
                    merged.insert(key.clone(), value.clone());
                }
                Value::Object(merged)
            }
            _ => next.clone(),
        }
    }
}

impl<V, S> StateValue for HashMap<String, V, S>
where
    V: Clone + PartialEq + Send + Sync + 'static,
    S: BuildHasher + Clone + Send + Sync + 'static,
{
    fn shape(&self) -> Shape {
        Shape::Record
    }

    fn merge_record(&self, next: &Self) -> Self {
        let mut merged = self.clone();
        merged.extend(next.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

impl<V> StateValue for BTreeMap<String, V>
where
    V: Clone + PartialEq + Send + Sync + 'static,
{
    fn shape(&self) -> Shape {
        Shape::Record
    }

    fn merge_record(&self, next: &Self) -> Self {
        let mut merged = self.clone();
        merged.extend(next.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

macro_rules! atomic_state {
    ($($ty:ty),* $(,)?) => {
        $(impl StateValue for $ty {})*
    };
}

atomic_state!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
);

impl<V: Clone + PartialEq + Send + Sync + 'static> StateValue for Vec<V> {}

impl<V: Clone + PartialEq + Send + Sync + 'static> StateValue for Option<V> {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_objects_are_records() {
        assert_eq!(shape_of(&json!({"a": 1})), Shape::Record);
        assert!(is_plain_record(&json!({})));
    }

    #[test]
    fn json_non_objects_are_atomic() {
        assert_eq!(shape_of(&json!([1, 2])), Shape::Atomic);
        assert_eq!(shape_of(&json!(5)), Shape::Atomic);
        assert_eq!(shape_of(&json!("s")), Shape::Atomic);
        assert_eq!(shape_of(&Value::Null), Shape::Atomic);
    }

    #[test]
    fn maps_are_records_and_scalars_atomic() {
        let map: BTreeMap<String, i32> = BTreeMap::new();
        assert!(is_plain_record(&map));
        let map: HashMap<String, i32> = HashMap::new();
        assert!(is_plain_record(&map));
        assert!(!is_plain_record(&5_i32));
        assert!(!is_plain_record(&vec![1, 2, 3]));
        assert!(!is_plain_record(&Some("x".to_string())));
    }

    #[test]
    fn json_merge_is_one_level_deep() {
        let prev = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let next = json!({"nested": {"x": 9}});
        let merged = prev.merge_record(&next);
        assert_eq!(merged, json!({"a": 1, "nested": {"x": 9}}));
    }

    #[test]
    fn default_merge_takes_next() {
        #[derive(Clone, PartialEq, Debug)]
        struct Opaque(u8);
        impl StateValue for Opaque {}

        assert_eq!(Opaque(1).merge_record(&Opaque(2)), Opaque(2));
        assert_eq!(shape_of(&Opaque(1)), Shape::Atomic);
    }
}
