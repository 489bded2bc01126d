//! Reactive arrays.
//!
//! Element reads are not intercepted. Readers depend on the array through
//! the property that holds it (see [`ReactiveObject::get`]), and the seven
//! mutating methods notify the array's shape dep afterwards.
//!
//! Writing an index directly or shrinking the length bypasses
//! notification. [`ReactiveArray::set_index_untracked`] and
//! [`ReactiveArray::truncate_untracked`] exist for that case; use
//! [`set`](super::set) or [`ReactiveArray::splice`] when readers must
//! re-run.
//!
//! [`ReactiveObject::get`]: super::ReactiveObject::get

use std::cmp::Ordering as CmpOrdering;
use std::sync::Arc;

use parking_lot::RwLock;

use super::observer::Observer;
use super::value::Value;

struct ArrayInner {
    observer: Option<Observer>,
    items: RwLock<Vec<Value>>,
}

/// A shared, observed list of values.
#[derive(Clone)]
pub struct ReactiveArray {
    inner: Arc<ArrayInner>,
}

impl ReactiveArray {
    /// An observed array holding `items`.
    pub fn new(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                observer: Some(Observer::new()),
                items: RwLock::new(items.into_iter().collect()),
            }),
        }
    }

    /// A frozen array: never tracked, mutators still work but notify nobody.
    pub fn frozen(items: impl IntoIterator<Item = Value>) -> Self {
        Self {
            inner: Arc::new(ArrayInner {
                observer: None,
                items: RwLock::new(items.into_iter().collect()),
            }),
        }
    }

    pub fn observer(&self) -> Option<&Observer> {
        self.inner.observer.as_ref()
    }

    pub fn ptr_eq(&self, other: &ReactiveArray) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Depend on this array's shape directly.
    ///
    /// Only needed when the array is not reached through a reactive property.
    pub fn depend(&self) {
        if let Some(ob) = &self.inner.observer {
            ob.dep().depend();
        }
    }

    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.inner.items.read().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.inner.items.read().clone()
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Value>) -> R) -> R {
        let result = f(&mut self.inner.items.write());
        if let Some(ob) = &self.inner.observer {
            ob.dep().notify();
        }
        result
    }

    /// Append a value; returns the new length.
    pub fn push(&self, value: impl Into<Value>) -> usize {
        let value = value.into();
        self.mutate(|items| {
            items.push(value);
            items.len()
        })
    }

    pub fn pop(&self) -> Option<Value> {
        self.mutate(|items| items.pop())
    }

    pub fn shift(&self) -> Option<Value> {
        self.mutate(|items| if items.is_empty() { None } else { Some(items.remove(0)) })
    }

    /// Prepend values; returns the new length.
    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> usize {
        let values: Vec<Value> = values.into_iter().collect();
        self.mutate(|items| {
            items.splice(0..0, values);
            items.len()
        })
    }

    /// Remove `delete_count` items at `start` and insert `insert` there.
    ///
    /// `start` and `delete_count` are clamped to the array bounds. Returns the
    /// removed items.
    pub fn splice(&self, start: usize, delete_count: usize, insert: Vec<Value>) -> Vec<Value> {
        self.mutate(|items| {
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, insert).collect()
        })
    }

    /// Sort in place. The comparator runs with no lock held, so it may read
    /// this array.
    pub fn sort_by(&self, compare: impl FnMut(&Value, &Value) -> CmpOrdering) {
        let mut sorted = self.to_vec();
        sorted.sort_by(compare);
        self.mutate(|items| *items = sorted);
    }

    pub fn reverse(&self) {
        self.mutate(|items| items.reverse());
    }

    /// Overwrite an index without notifying.
    pub fn set_index_untracked(&self, index: usize, value: Value) {
        let mut items = self.inner.items.write();
        if index < items.len() {
            items[index] = value;
        } else {
            items.resize(index, Value::Null);
            items.push(value);
        }
    }

    /// Shrink the array without notifying.
    pub fn truncate_untracked(&self, len: usize) {
        self.inner.items.write().truncate(len);
    }

    /// Grow with `Null` up to `len` without notifying.
    pub(crate) fn pad_to(&self, len: usize) {
        let mut items = self.inner.items.write();
        if items.len() < len {
            items.resize(len, Value::Null);
        }
    }
}

impl std::fmt::Debug for ReactiveArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveArray(len = {})", self.len())
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{ReactiveObject, Watcher};
    use crate::runtime::Runtime;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn watched_list(items: serde_json::Value) -> (ReactiveArray, Arc<AtomicI32>, Watcher) {
        Runtime::configure(|config| config.async_batching = false);
        let list = Value::from(items);
        let holder = ReactiveObject::from_entries([("list", list.clone())]);
        let runs = Arc::new(AtomicI32::new(0));
        let counter = runs.clone();
        let watcher = Watcher::builder(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(holder.get("list"))
        })
        .build();
        let arr = list.as_array().cloned().expect("array");
        (arr, runs, watcher)
    }

    #[test]
    fn mutators_notify() {
        let (arr, runs, _watcher) = watched_list(json!([3, 1, 2]));

        assert_eq!(arr.push(Value::from(4)), 4);
        assert_eq!(arr.pop(), Some(Value::from(4)));
        assert_eq!(arr.shift(), Some(Value::from(3)));
        assert_eq!(arr.unshift([Value::from(0)]), 3);
        arr.sort_by(|a, b| a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(CmpOrdering::Equal));
        arr.reverse();
        let removed = arr.splice(0, 1, vec![Value::from(9)]);

        assert_eq!(removed, vec![Value::from(2)]);
        assert_eq!(Value::Array(arr.clone()).to_json(), json!([9, 1, 0]));
        assert_eq!(runs.load(Ordering::SeqCst), 8);
        Runtime::reset();
    }

    #[test]
    fn untracked_writes_do_not_notify() {
        let (arr, runs, _watcher) = watched_list(json!([1, 2, 3]));

        arr.set_index_untracked(0, Value::from(10));
        arr.truncate_untracked(2);

        assert_eq!(Value::Array(arr.clone()).to_json(), json!([10, 2]));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Runtime::reset();
    }

    #[test]
    fn splice_clamps_bounds() {
        let arr = ReactiveArray::new([Value::from(1), Value::from(2)]);
        let removed = arr.splice(5, 10, vec![Value::from(3)]);
        assert!(removed.is_empty());
        assert_eq!(arr.len(), 3);
        assert_eq!(arr.get(2), Some(Value::from(3)));
    }

    #[test]
    fn comparator_may_read_the_array() {
        let arr = ReactiveArray::new([Value::from(3), Value::from(1), Value::from(2)]);
        let (done, finished) = std::sync::mpsc::channel();
        let worker = arr.clone();
        std::thread::spawn(move || {
            let seen = worker.clone();
            worker.sort_by(|a, b| {
                assert_eq!(seen.len(), 3);
                a.as_f64().partial_cmp(&b.as_f64()).unwrap_or(CmpOrdering::Equal)
            });
            let _ = done.send(());
        });

        finished
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("sort finished");
        assert_eq!(arr.to_vec(), vec![Value::from(1), Value::from(2), Value::from(3)]);
    }

    #[test]
    fn inserted_objects_are_observed() {
        let arr = ReactiveArray::new([]);
        arr.push(Value::from(json!({ "a": 1 })));
        assert!(arr.get(0).and_then(|v| v.observer()).is_some());
    }
}
