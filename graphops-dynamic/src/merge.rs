use crate::Value;

/// Reconcile a server-observed value with a declared one.
///
/// The result has the shape of `target` (what the user declared) and the
/// values of `source` (what the server returned):
///
/// - map target: only keys of `target` that `source` also has are kept, each
///   merged recursively. A declared key the server did not return is dropped,
///   since its value cannot be confirmed. A non-map `source` wins outright.
/// - list target: elements are merged pairwise for indices both lists have;
///   elements only `source` has are appended verbatim. A non-list `source`
///   leaves `target` unchanged.
/// - scalar target: the server's value at that position.
///
/// If either side is null at the top level, `target` is returned unchanged.
/// The operation is not symmetric.
pub fn merge(source: &Value, target: &Value) -> Value {
    if source.is_null() || target.is_null() {
        return target.clone();
    }
    merge_node(source, target)
}

fn merge_node(source: &Value, target: &Value) -> Value {
    match (target, source) {
        (Value::Map(target), Value::Map(source)) => Value::Map(
            target
                .iter()
                .filter_map(|(key, t)| source.get(key).map(|s| (key.clone(), merge_node(s, t))))
                .collect(),
        ),
        (Value::Map(_), source) => source.clone(),
        (Value::List(target), Value::List(source)) => {
            let mut result: Vec<Value> = target
                .iter()
                .zip(source)
                .map(|(t, s)| merge_node(s, t))
                .collect();
            result.extend(source.iter().skip(target.len()).cloned());
            Value::List(result)
        }
        (Value::List(_), _) => target.clone(),
        (_, source) => source.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn empty_map_target_yields_empty_map() {
        for source in [json!({"a": 1}), json!({}), json!([1]), json!("s")] {
            let source = v(source);
            let result = merge(&source, &v(json!({})));
            match (&source, result) {
                (Value::Map(_), Value::Map(m)) => assert!(m.is_empty()),
                // non-map source wins outright
                (_, result) => assert_eq!(result, source),
            }
        }
        assert_eq!(merge(&v(json!({"a": 1})), &v(json!({}))), v(json!({})));
    }

    #[test]
    fn drops_keys_only_in_target() {
        assert_eq!(
            merge(&v(json!({"a": 1})), &v(json!({"a": 2, "b": 3}))),
            v(json!({"a": 1}))
        );
    }

    #[test]
    fn server_only_keys_do_not_leak() {
        assert_eq!(
            merge(
                &v(json!({"displayName": "g1", "extra": "server-only"})),
                &v(json!({"displayName": "g1", "missing": "x"}))
            ),
            v(json!({"displayName": "g1"}))
        );
    }

    #[test]
    fn list_elements_are_remapped_pairwise() {
        assert_eq!(merge(&v(json!([1, 2, 3])), &v(json!([9, 9]))), v(json!([1, 2, 3])));
    }

    #[test]
    fn list_extends_with_server_elements() {
        assert_eq!(merge(&v(json!([1, 2])), &v(json!([9]))), v(json!([1, 2])));
    }

    #[test]
    fn list_truncates_to_server_length() {
        assert_eq!(merge(&v(json!([1])), &v(json!([9, 9, 9]))), v(json!([1])));
    }

    #[test]
    fn trailing_server_elements_are_not_merged() {
        let source = v(json!([{"a": 1, "x": 0}, {"b": 2, "y": 0}]));
        let target = v(json!([{"a": 9}]));
        assert_eq!(
            merge(&source, &target),
            v(json!([{"a": 1}, {"b": 2, "y": 0}]))
        );
    }

    #[test]
    fn nested_maps_are_reconciled() {
        let source = v(json!({
            "displayName": "g1",
            "settings": {"visibility": "Private", "odata": "ignored"},
            "owners": ["u1", "u2"]
        }));
        let target = v(json!({
            "settings": {"visibility": "Public"},
            "owners": ["u1"]
        }));
        assert_eq!(
            merge(&source, &target),
            v(json!({
                "settings": {"visibility": "Private"},
                "owners": ["u1", "u2"]
            }))
        );
    }

    #[test]
    fn type_mismatch() {
        // map target, scalar source: server value wins
        assert_eq!(merge(&v(json!("flat")), &v(json!({"a": 1}))), v(json!("flat")));
        // list target, map source: target kept
        assert_eq!(merge(&v(json!({"a": 1})), &v(json!([1]))), v(json!([1])));
        // nested: map target, null source
        assert_eq!(
            merge(&v(json!({"a": null})), &v(json!({"a": {"b": 1}}))),
            v(json!({"a": null}))
        );
    }

    #[test]
    fn null_at_top_level_returns_target() {
        let target = v(json!({"a": 1}));
        assert_eq!(merge(&Value::Null, &target), target);
        assert_eq!(merge(&target, &Value::Null), Value::Null);
        assert_eq!(merge(&Value::Null, &Value::Null), Value::Null);
    }

    #[test]
    fn not_symmetric() {
        let a = v(json!({"a": 1, "b": 2}));
        let b = v(json!({"a": 3}));
        assert_eq!(merge(&a, &b), v(json!({"a": 1})));
        assert_eq!(merge(&b, &a), v(json!({"a": 3})));
    }

    /// A declared field the server never echoes back (for example a
    /// write-only password) disappears from the reconciled value. This pins
    /// down the current behavior; changing it would make such fields stop
    /// showing up as drift.
    #[test]
    fn write_only_fields_are_dropped() {
        let observed = v(json!({"userPrincipalName": "a@b.c"}));
        let declared = v(json!({
            "userPrincipalName": "a@b.c",
            "passwordProfile": {"password": "secret"}
        }));
        assert_eq!(
            merge(&observed, &declared),
            v(json!({"userPrincipalName": "a@b.c"}))
        );
    }
}
