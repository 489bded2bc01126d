//! Dynamic values stored in reactive state.
//!
//! Objects and arrays are reference types: cloning a [`Value::Object`] hands
//! out another handle to the same [`ReactiveObject`], exactly like sharing a
//! reference. Converting from `serde_json::Value` builds the reactive graph
//! eagerly, so every nested object and array carries its observer from the
//! moment it exists.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use super::array::ReactiveArray;
use super::observer::{Observer, ReactiveObject};

/// A dynamically typed reactive value.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    Object(ReactiveObject),
    Array(ReactiveArray),
}

impl Value {
    /// Change detection used by reactive setters and watchers.
    ///
    /// Primitives compare by value with `NaN` equal to itself; objects and
    /// arrays compare by identity.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// The observer of an object or array value.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Object(obj) => obj.observer().cloned(),
            Value::Array(arr) => arr.observer().cloned(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Objects and arrays.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(*n as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ReactiveObject> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ReactiveArray> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Truthiness as templates see it: `null`, `false`, `0`, `NaN` and the
    /// empty string are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            Value::Object(_) | Value::Array(_) => true,
        }
    }

    /// Reactive read of `key` on an object value. `Null` for anything else.
    pub fn get(&self, key: &str) -> Value {
        match self {
            Value::Object(obj) => obj.get(key),
            _ => Value::Null,
        }
    }

    /// Short type name used in prop validation warnings.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Number(_) => "Number",
            Value::Str(_) => "String",
            Value::Object(_) => "Object",
            Value::Array(_) => "Array",
        }
    }

    /// Untracked deep snapshot. Cycles are cut off as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut seen = HashSet::new();
        self.to_json_inner(&mut seen)
    }

    fn to_json_inner(&self, seen: &mut HashSet<usize>) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = self.as_i64() {
                    serde_json::Value::from(i)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::Object(obj) => {
                if !seen.insert(obj.addr()) {
                    return serde_json::Value::Null;
                }
                let map = obj
                    .entries_untracked()
                    .into_iter()
                    .map(|(k, v)| (k, v.to_json_inner(seen)))
                    .collect();
                seen.remove(&obj.addr());
                serde_json::Value::Object(map)
            }
            Value::Array(arr) => {
                if !seen.insert(arr.addr()) {
                    return serde_json::Value::Null;
                }
                let items = arr.to_vec().iter().map(|v| v.to_json_inner(seen)).collect();
                seen.remove(&arr.addr());
                serde_json::Value::Array(items)
            }
        }
    }
}

impl PartialEq for Value {
    /// Structural equality over an untracked snapshot.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) if a.ptr_eq(b) => true,
            (Value::Array(a), Value::Array(b)) if a.ptr_eq(b) => true,
            (Value::Object(_), Value::Object(_)) | (Value::Array(_), Value::Array(_)) => {
                self.to_json() == other.to_json()
            }
            (Value::Number(a), Value::Number(b)) => a == b,
            _ => self.same(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Object(_) => write!(f, "Object({})", self.to_json()),
            Value::Array(_) => write!(f, "Array({})", self.to_json()),
        }
    }
}

impl fmt::Display for Value {
    /// Text interpolation form: `null` renders empty, integral numbers
    /// without a fraction, containers as pretty JSON.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => write!(f, "NaN"),
            Value::Number(n) => match self.as_i64() {
                Some(i) if n.abs() < 1e15 => write!(f, "{i}"),
                _ => write!(f, "{n}"),
            },
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(_) | Value::Array(_) => {
                let text = serde_json::to_string_pretty(&self.to_json()).map_err(|_| fmt::Error)?;
                write!(f, "{text}")
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::Str(s.into()),
            serde_json::Value::Array(items) => {
                Value::Array(ReactiveArray::new(items.into_iter().map(Value::from)))
            }
            serde_json::Value::Object(map) => {
                Value::Object(ReactiveObject::from_entries(map.into_iter().map(|(k, v)| (k, Value::from(v)))))
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        value.to_json()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<ReactiveObject> for Value {
    fn from(obj: ReactiveObject) -> Self {
        Value::Object(obj)
    }
}

impl From<ReactiveArray> for Value {
    fn from(arr: ReactiveArray) -> Self {
        Value::Array(arr)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(ReactiveArray::new(items))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}
