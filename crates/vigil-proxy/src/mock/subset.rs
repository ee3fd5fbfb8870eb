//! Structural subset comparison over JSON values.
//!
//! Mock selectors are partial templates: a selector matches when everything
//! it names is present in the observed value, and anything extra in the
//! observed value is ignored.

use serde_json::Value;

/// Returns true when `sub` is structurally contained in `full`.
///
/// - Objects: every key in `sub` must exist in `full` with a value that is
///   itself a subset of the corresponding value. Extra keys in `full` are
///   allowed.
/// - Arrays: every element of `sub` must be a subset of at least one element
///   of `full`. Order is not significant.
/// - Scalars (string, number, boolean, null): equality.
/// - Mismatched types never match.
pub fn is_subset(sub: &Value, full: &Value) -> bool {
    match (sub, full) {
        (Value::Object(sub_map), Value::Object(full_map)) => {
            sub_map.iter().all(|(key, sub_value)| {
                full_map
                    .get(key)
                    .is_some_and(|full_value| is_subset(sub_value, full_value))
            })
        }
        (Value::Array(sub_items), Value::Array(full_items)) => sub_items
            .iter()
            .all(|sub_item| full_items.iter().any(|full_item| is_subset(sub_item, full_item))),
        (Value::Object(_), _) | (Value::Array(_), _) => false,
        (_, Value::Object(_)) | (_, Value::Array(_)) => false,
        (a, b) => a == b,
    }
}

/// ASCII case-insensitive string equality, used for host and path selectors.
pub fn string_compare(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
