use super::shape::{is_plain_record, StateValue};

/// Shallow-merge two records into a new one.
///
/// Every key of `prev` is kept unless `next` carries it. Neither input is
/// modified.
pub fn shallow_merge<T: StateValue>(prev: &T, next: &T) -> T {
    prev.merge_record(next)
}

/// Decide what a commit produces.
///
/// Returns `None` when the candidate equals the current state, meaning the
/// commit is a no-op. Otherwise returns the next state: a shallow merge when
/// both sides are plain records and `replace` is off, the candidate itself in
/// every other case.
pub fn resolve_commit<T: StateValue>(prev: &T, candidate: T, replace: bool) -> Option<T> {
    if *prev == candidate {
        return None;
    }

    if !replace && is_plain_record(prev) && is_plain_record(&candidate) {
        Some(shallow_merge(prev, &candidate))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn merges_records() {
        let prev = json!({"a": 1, "b": 2});
        let next = resolve_commit(&prev, json!({"b": 3}), false).unwrap();
        assert_eq!(next, json!({"a": 1, "b": 3}));
        assert_eq!(prev, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn replace_skips_merge() {
        let prev = json!({"a": 1});
        let next = resolve_commit(&prev, json!({"b": 2}), true).unwrap();
        assert_eq!(next, json!({"b": 2}));
    }

    #[test]
    fn equal_candidate_is_noop() {
        assert_eq!(resolve_commit(&5, 5, false), None);
        assert_eq!(resolve_commit(&json!({"a": 1}), json!({"a": 1}), true), None);
    }

    #[test]
    fn mixed_shapes_replace() {
        let prev = json!({"a": 1});
        assert_eq!(resolve_commit(&prev, json!([1]), false), Some(json!([1])));

        let prev = json!(3);
        assert_eq!(
            resolve_commit(&prev, json!({"a": 1}), false),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn btreemap_merge() {
        let prev: BTreeMap<String, i32> = [("a".into(), 1), ("b".into(), 2)].into();
        let next: BTreeMap<String, i32> = [("b".into(), 5), ("c".into(), 6)].into();
        let merged = shallow_merge(&prev, &next);
        let expected: BTreeMap<String, i32> =
            [("a".into(), 1), ("b".into(), 5), ("c".into(), 6)].into();
        assert_eq!(merged, expected);
    }
}
