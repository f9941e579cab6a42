//! Helpers for the dynamically typed values the wire admits.
//!
//! Usernames, room names, and payloads may arrive as strings, integers,
//! floats, or booleans. Type checks happen only where a command requires a
//! specific shape; everywhere else values pass through opaquely as
//! [`serde_json::Value`].

use serde_json::Value;

/// Whether a value is one of the scalar types usable as a username or room
/// name: string, integer, float, or boolean.
pub fn is_scalar(v: &Value) -> bool {
    matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Canonical string form of a value, used as a map key and for equality
/// checks across differently typed spellings of the same name.
///
/// Strings canonicalize to themselves (no surrounding quotes); other values
/// use their JSON rendering.
pub fn canonical(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expand a value into a list of elements: a lone scalar becomes a
/// single-element list, an array yields its elements.
///
/// Returns `None` for shapes that are neither (objects, null), which
/// callers report as a syntax error. Element types are not validated here.
pub fn scalar_or_list(v: &Value) -> Option<Vec<Value>> {
    match v {
        Value::Array(items) => Some(items.clone()),
        scalar if is_scalar(scalar) => Some(vec![scalar.clone()]),
        _ => None,
    }
}

/// Whether a value is the CL3 v0.1.7 `direct` type declaration:
/// an object carrying `cmd: "type"`.
pub fn is_type_declaration(v: &Value) -> bool {
    v.as_object()
        .and_then(|map| map.get("cmd"))
        .and_then(Value::as_str)
        .is_some_and(|cmd| cmd == "type")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalar_check_admits_the_four_wire_types() {
        assert!(is_scalar(&json!("alice")));
        assert!(is_scalar(&json!(42)));
        assert!(is_scalar(&json!(13.5)));
        assert!(is_scalar(&json!(true)));
        assert!(!is_scalar(&json!(null)));
        assert!(!is_scalar(&json!([1, 2])));
        assert!(!is_scalar(&json!({"a": 1})));
    }

    #[test]
    fn canonical_strings_are_unquoted() {
        assert_eq!(canonical(&json!("alice")), "alice");
        assert_eq!(canonical(&json!(5)), "5");
        assert_eq!(canonical(&json!(true)), "true");
    }

    #[test]
    fn scalar_or_list_expansion() {
        assert_eq!(scalar_or_list(&json!("room")).unwrap(), vec![json!("room")]);
        assert_eq!(
            scalar_or_list(&json!(["a", 2])).unwrap(),
            vec![json!("a"), json!(2)]
        );
        assert!(scalar_or_list(&json!({"cmd": "x"})).is_none());
        assert!(scalar_or_list(&json!(null)).is_none());
    }

    #[test]
    fn type_declaration_shape() {
        assert!(is_type_declaration(&json!({"cmd": "type", "val": "py"})));
        assert!(!is_type_declaration(&json!({"cmd": "vers"})));
        assert!(!is_type_declaration(&json!("type")));
    }
}
