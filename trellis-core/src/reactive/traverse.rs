//! Deep traversal for `deep` watchers.
//!
//! Reading every nested property inside a watcher's evaluation subscribes
//! the watcher to the whole graph below its value.

use std::collections::HashSet;

use super::dep::DepId;
use super::value::Value;

/// Touch every reactive property reachable from `value`.
///
/// Each container is visited once, keyed by its shape dep, so cyclic graphs
/// terminate. Frozen containers are not descended into.
pub fn traverse(value: &Value) {
    let mut seen = HashSet::new();
    walk(value, &mut seen);
}

fn walk(value: &Value, seen: &mut HashSet<DepId>) {
    let Some(ob) = value.observer() else {
        return;
    };
    if !seen.insert(ob.dep().id()) {
        return;
    }

    match value {
        Value::Object(obj) => {
            for key in obj.keys() {
                walk(&obj.get(&key), seen);
            }
        }
        Value::Array(arr) => {
            for item in arr.to_vec() {
                walk(&item, seen);
            }
        }
        _ => {}
    }
}
