//! Recursive, order-insensitive equality for `serde_json::Value`.
//!
//! Objects compare by key/value regardless of insertion order; every
//! other variant delegates to `serde_json`'s own `PartialEq`, which
//! already treats differently-typed numbers (e.g. `0` vs `0.0`) as
//! unequal.

use serde_json::Value;

pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(oa), Value::Object(ob)) => {
            oa.len() == ob.len() && oa.iter().all(|(k, va)| ob.get(k).is_some_and(|vb| deep_equal(va, vb)))
        }
        (Value::Array(aa), Value::Array(ab)) => {
            aa.len() == ab.len() && aa.iter().zip(ab).all(|(x, y)| deep_equal(x, y))
        }
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn objects_compare_regardless_of_key_order() {
        assert!(deep_equal(&json!({"a": 1, "b": 2}), &json!({"b": 2, "a": 1})));
    }

    #[test]
    fn nested_array_mismatch_is_caught() {
        assert!(!deep_equal(&json!({"a": [1, 2]}), &json!({"a": [1, 3]})));
    }

    #[test]
    fn different_number_representations_are_not_equal() {
        assert!(!deep_equal(&json!(0), &json!(0.0)));
    }
}
