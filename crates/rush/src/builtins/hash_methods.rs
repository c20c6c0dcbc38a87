//! Method table for HASH receivers.
//!
//! All hash operations are functional: `set`, `delete` and `merge` return a
//! new hash and never mutate the receiver. Key enumeration follows first
//! insertion order.

use indexmap::IndexMap;

use crate::{
    error::{RunError, RunResult},
    value::{HashKey, Value},
};

use super::expect_arity;

pub const METHODS: &[&str] = &["keys", "values", "has_key", "get", "set", "delete", "merge", "length"];

pub fn call(map: &crate::value::HashRef, name: &str, args: &[Value]) -> RunResult<Value> {
    match name {
        "keys" => {
            expect_arity(args, 0)?;
            Ok(keys(&map.borrow()))
        }
        "values" => {
            expect_arity(args, 0)?;
            Ok(values(&map.borrow()))
        }
        "has_key" => {
            expect_arity(args, 1)?;
            has_key(&map.borrow(), &args[0])
        }
        "get" => {
            expect_arity(args, 1)?;
            let key = hashable(&args[0])?;
            Ok(map.borrow().get(&key).cloned().unwrap_or(Value::Null))
        }
        "set" => {
            expect_arity(args, 2)?;
            let key = hashable(&args[0])?;
            let mut out = map.borrow().clone();
            out.insert(key, args[1].clone());
            Ok(Value::hash(out))
        }
        "delete" => {
            expect_arity(args, 1)?;
            delete(&map.borrow(), &args[0])
        }
        "merge" => {
            expect_arity(args, 1)?;
            let Value::Hash(other) = &args[0] else {
                return Err(RunError::type_error(format!(
                    "merge argument must be HASH, got {}",
                    args[0].type_name()
                )));
            };
            Ok(merge(&map.borrow(), &other.borrow()))
        }
        "length" => {
            expect_arity(args, 0)?;
            Ok(Value::Integer(map.borrow().len() as i64))
        }
        other => Err(RunError::fatal(format!("undefined method {other} for HASH"))),
    }
}

/// Derives a hash key or raises the canonical unhashable-key TypeError.
pub fn hashable(value: &Value) -> RunResult<HashKey> {
    HashKey::from_value(value)
        .ok_or_else(|| RunError::type_error(format!("unusable as hash key: {}", value.type_name())))
}

#[must_use]
pub fn keys(map: &IndexMap<HashKey, Value>) -> Value {
    Value::array(map.keys().map(HashKey::to_value).collect())
}

#[must_use]
pub fn values(map: &IndexMap<HashKey, Value>) -> Value {
    Value::array(map.values().cloned().collect())
}

pub fn has_key(map: &IndexMap<HashKey, Value>, key: &Value) -> RunResult<Value> {
    let key = hashable(key)?;
    Ok(Value::Boolean(map.contains_key(&key)))
}

pub fn delete(map: &IndexMap<HashKey, Value>, key: &Value) -> RunResult<Value> {
    let key = hashable(key)?;
    let mut out = map.clone();
    // shift_remove keeps the relative order of the remaining keys.
    out.shift_remove(&key);
    Ok(Value::hash(out))
}

/// Right-hand entries win; keys new to the left hash append in the right
/// hash's order.
#[must_use]
pub fn merge(left: &IndexMap<HashKey, Value>, right: &IndexMap<HashKey, Value>) -> Value {
    let mut out = left.clone();
    for (key, value) in right {
        out.insert(key.clone(), value.clone());
    }
    Value::hash(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> IndexMap<HashKey, Value> {
        let mut map = IndexMap::new();
        map.insert(HashKey::Str("a".into()), Value::Integer(1));
        map.insert(HashKey::Str("b".into()), Value::Integer(2));
        map
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let mut map = sample();
        // Reassigning an existing key must not reorder it.
        map.insert(HashKey::Str("a".into()), Value::Integer(9));
        assert_eq!(keys(&map).inspect(), "[a, b]");
    }

    #[test]
    fn set_and_delete_are_functional() {
        let map = sample();
        let original = Value::hash(map.clone());
        let deleted = delete(&map, &Value::string("a")).unwrap();
        assert_eq!(deleted.inspect(), "{b: 2}");
        assert_eq!(original.inspect(), "{a: 1, b: 2}");
    }

    #[test]
    fn merge_right_wins_and_appends() {
        let left = sample();
        let mut right = IndexMap::new();
        right.insert(HashKey::Str("b".into()), Value::Integer(20));
        right.insert(HashKey::Str("c".into()), Value::Integer(3));
        assert_eq!(merge(&left, &right).inspect(), "{a: 1, b: 20, c: 3}");
    }

    #[test]
    fn unhashable_key_is_type_error() {
        let map = sample();
        match has_key(&map, &Value::array(vec![])).unwrap_err() {
            RunError::Exc(e) => assert_eq!(e.message, "unusable as hash key: ARRAY"),
            other => panic!("expected exception, got {other:?}"),
        }
    }
}
