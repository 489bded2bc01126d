//! Reactive Object Graph
//!
//! Every object and array is built with its tracking in place: an
//! [`Observer`] holding the "shape" dep, and for objects one [`Dep`] per
//! reactive property. There is no later conversion pass, so observing a
//! value is just looking its observer up.
//!
//! # How Tracking Works
//!
//! 1. [`ReactiveObject::get`] depends on the property's dep. If the property
//!    holds an object or array, it also depends on that value's shape dep,
//!    and for arrays on the shape dep of every nested element.
//!
//! 2. [`ReactiveObject::assign`] notifies the property's dep when the value
//!    actually changed.
//!
//! 3. [`set`] and [`del`] add or remove keys and notify the shape dep.
//!    Plain assignment to a missing key adds an untracked property: only
//!    `set` makes a new key reactive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use super::array::ReactiveArray;
use super::context::ReactiveContext;
use super::dep::Dep;
use super::value::Value;
use crate::runtime::warn;

/// Hook run before a reactive property is overwritten.
///
/// Used for the prop-mutation and injection-mutation warnings.
pub type SetterHook = Arc<dyn Fn(&str) + Send + Sync>;

struct ObserverInner {
    dep: Dep,
    vm_count: AtomicUsize,
}

/// Per-container tracking state.
#[derive(Clone)]
pub struct Observer {
    inner: Arc<ObserverInner>,
}

impl Observer {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(ObserverInner {
                dep: Dep::new(),
                vm_count: AtomicUsize::new(0),
            }),
        }
    }

    /// The shape dep, notified on key add/remove and array mutation.
    pub fn dep(&self) -> &Dep {
        &self.inner.dep
    }

    /// How many component instances use this object as root data.
    pub fn vm_count(&self) -> usize {
        self.inner.vm_count.load(Ordering::Acquire)
    }

    pub(crate) fn retain_root(&self) {
        self.inner.vm_count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn release_root(&self) {
        let _ = self
            .inner
            .vm_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Look up the observer of a value.
///
/// Primitives and frozen containers have none. Repeated calls return the
/// same observer.
pub fn observe(value: &Value) -> Option<Observer> {
    value.observer()
}

struct Property {
    value: Value,
    /// `None` for plain properties (frozen objects, keys added by plain
    /// assignment).
    dep: Option<Dep>,
    setter_hook: Option<SetterHook>,
}

impl Property {
    fn plain(value: Value) -> Self {
        Self {
            value,
            dep: None,
            setter_hook: None,
        }
    }
}

struct ObjectInner {
    /// `None` means frozen.
    observer: Option<Observer>,
    props: RwLock<IndexMap<String, Property>>,
}

/// An insertion-ordered object whose properties track reads and writes.
#[derive(Clone)]
pub struct ReactiveObject {
    inner: Arc<ObjectInner>,
}

impl ReactiveObject {
    /// An empty, observed object.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                observer: Some(Observer::new()),
                props: RwLock::new(IndexMap::new()),
            }),
        }
    }

    /// An observed object with every entry defined reactively.
    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let obj = Self::new();
        for (key, value) in entries {
            define_reactive(&obj, key, value, None);
        }
        obj
    }

    /// A frozen object: no observer, no property deps, writes refused.
    pub fn frozen<K: Into<String>>(entries: impl IntoIterator<Item = (K, Value)>) -> Self {
        let props = entries
            .into_iter()
            .map(|(k, v)| (k.into(), Property::plain(v)))
            .collect();
        Self {
            inner: Arc::new(ObjectInner {
                observer: None,
                props: RwLock::new(props),
            }),
        }
    }

    pub fn observer(&self) -> Option<&Observer> {
        self.inner.observer.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.observer.is_none()
    }

    pub fn ptr_eq(&self, other: &ReactiveObject) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.inner) as *const () as usize
    }

    /// Reactive read. Missing keys read as `Null` and are not tracked.
    pub fn get(&self, key: &str) -> Value {
        let (value, dep) = {
            let props = self.inner.props.read();
            match props.get(key) {
                Some(prop) => (prop.value.clone(), prop.dep.clone()),
                None => return Value::Null,
            }
        };

        if let Some(dep) = dep {
            if ReactiveContext::is_active() {
                dep.depend();
                if let Some(child) = value.observer() {
                    child.dep().depend();
                    if let Value::Array(arr) = &value {
                        depend_array(arr);
                    }
                }
            }
        }
        value
    }

    /// Read without registering any dependency.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .props
            .read()
            .get(key)
            .map(|prop| prop.value.clone())
            .unwrap_or_default()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.props.read().contains_key(key)
    }

    /// Whether `key` exists and is backed by a dep.
    pub fn is_reactive_key(&self, key: &str) -> bool {
        self.inner
            .props
            .read()
            .get(key)
            .is_some_and(|prop| prop.dep.is_some())
    }

    /// Keys in insertion order. Does not track.
    pub fn keys(&self) -> Vec<String> {
        self.inner.props.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.props.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.props.read().is_empty()
    }

    /// Snapshot of all entries. Does not track.
    pub fn entries_untracked(&self) -> Vec<(String, Value)> {
        self.inner
            .props
            .read()
            .iter()
            .map(|(k, prop)| (k.clone(), prop.value.clone()))
            .collect()
    }

    /// Reactive write.
    ///
    /// Unchanged values (see [`Value::same`]) are ignored. A missing key is
    /// added as a plain, untracked property; use [`set`] to add a reactive
    /// one.
    pub fn assign(&self, key: &str, value: Value) {
        let existing = {
            let props = self.inner.props.read();
            props.get(key).map(|prop| {
                (
                    prop.value.same(&value),
                    prop.dep.clone(),
                    prop.setter_hook.clone(),
                )
            })
        };

        match existing {
            None => {
                if self.is_frozen() {
                    warn(format!("Cannot add property \"{key}\" to a frozen object"), None);
                    return;
                }
                self.inner
                    .props
                    .write()
                    .insert(key.to_string(), Property::plain(value));
            }
            Some((true, _, _)) => {}
            Some((false, dep, hook)) => {
                if self.is_frozen() {
                    warn(format!("Cannot assign to read only property \"{key}\""), None);
                    return;
                }
                if let Some(hook) = hook {
                    hook(key);
                }
                if let Some(prop) = self.inner.props.write().get_mut(key) {
                    prop.value = value;
                }
                if let Some(dep) = dep {
                    dep.notify();
                }
            }
        }
    }

    pub(crate) fn insert_property(&self, key: String, value: Value, setter_hook: Option<SetterHook>) {
        let dep = self.inner.observer.as_ref().map(|_| Dep::new());
        self.inner.props.write().insert(
            key,
            Property {
                value,
                dep,
                setter_hook,
            },
        );
    }

    fn remove_property(&self, key: &str) -> bool {
        self.inner.props.write().shift_remove(key).is_some()
    }
}

impl Default for ReactiveObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReactiveObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReactiveObject({:?})", self.keys())
    }
}

/// Define (or redefine) a reactive property on `obj`.
///
/// On a frozen object the property is stored plain.
pub fn define_reactive(
    obj: &ReactiveObject,
    key: impl Into<String>,
    value: Value,
    setter_hook: Option<SetterHook>,
) {
    obj.insert_property(key.into(), value, setter_hook);
}

/// Depend on the shape dep of every object or array nested in `arr`.
///
/// Element reads are not intercepted, so a reader of an array must depend on
/// nested containers up front.
pub fn depend_array(arr: &ReactiveArray) {
    for item in arr.to_vec() {
        if let Some(ob) = item.observer() {
            ob.dep().depend();
        }
        if let Value::Array(nested) = &item {
            depend_array(nested);
        }
    }
}

/// A key accepted by [`set`] and [`del`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropKey {
    Index(usize),
    Name(String),
}

impl PropKey {
    fn as_index(&self) -> Option<usize> {
        match self {
            PropKey::Index(i) => Some(*i),
            PropKey::Name(name) => name.parse().ok(),
        }
    }
}

impl std::fmt::Display for PropKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropKey::Index(i) => write!(f, "{i}"),
            PropKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<usize> for PropKey {
    fn from(i: usize) -> Self {
        PropKey::Index(i)
    }
}

impl From<&str> for PropKey {
    fn from(name: &str) -> Self {
        PropKey::Name(name.to_string())
    }
}

impl From<String> for PropKey {
    fn from(name: String) -> Self {
        PropKey::Name(name)
    }
}

/// Add or overwrite a property and make sure readers see it.
///
/// Arrays accept valid indexes and are written through `splice`. Objects
/// get a new reactive property and their shape dep notifies. Refused (with a
/// warning) on primitives, frozen objects and instance root data.
pub fn set(target: &Value, key: impl Into<PropKey>, value: Value) -> Value {
    let key = key.into();
    match target {
        Value::Array(arr) => match key.as_index() {
            Some(index) => {
                if index >= arr.len() {
                    arr.pad_to(index);
                }
                arr.splice(index, 1, vec![value.clone()]);
                value
            }
            None => {
                warn(format!("Cannot set non-index key \"{key}\" on an array"), None);
                value
            }
        },
        Value::Object(obj) => {
            let name = key.to_string();
            if obj.contains_key(&name) {
                obj.assign(&name, value.clone());
                return value;
            }
            let Some(ob) = obj.observer() else {
                warn(format!("Cannot add property \"{name}\" to a frozen object"), None);
                return value;
            };
            if ob.vm_count() > 0 {
                warn(
                    "Avoid adding reactive properties to a component instance or its root data \
                     at runtime; declare it upfront in the data option.",
                    None,
                );
                return value;
            }
            define_reactive(obj, name, value.clone(), None);
            ob.dep().notify();
            value
        }
        _ => {
            warn(
                format!("Cannot set reactive property on undefined, null, or primitive value: {target:?}"),
                None,
            );
            value
        }
    }
}

/// Remove a property and notify readers of the container's shape.
pub fn del(target: &Value, key: impl Into<PropKey>) {
    let key = key.into();
    match target {
        Value::Array(arr) => {
            if let Some(index) = key.as_index() {
                if index < arr.len() {
                    arr.splice(index, 1, Vec::new());
                }
            }
        }
        Value::Object(obj) => {
            let Some(ob) = obj.observer() else {
                warn(format!("Cannot delete property \"{key}\" of a frozen object"), None);
                return;
            };
            if ob.vm_count() > 0 {
                warn(
                    "Avoid deleting properties on a component instance or its root data; set it to null instead.",
                    None,
                );
                return;
            }
            if obj.remove_property(&key.to_string()) {
                ob.dep().notify();
            }
        }
        _ => warn(
            format!("Cannot delete reactive property on undefined, null, or primitive value: {target:?}"),
            None,
        ),
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Watcher;
    use crate::runtime::Runtime;
    use serde_json::json;
    use std::sync::atomic::AtomicI32;

    fn sync_runtime() {
        Runtime::configure(|config| config.async_batching = false);
    }

    fn counting_watcher(getter: impl Fn() -> Value + Send + Sync + 'static) -> (Watcher, Arc<AtomicI32>) {
        let runs = Arc::new(AtomicI32::new(0));
        let counter = runs.clone();
        let watcher = Watcher::builder(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(getter())
        })
        .build();
        (watcher, runs)
    }

    #[test]
    fn observe_is_memoized() {
        let value = Value::from(json!({ "a": 1 }));
        let first = observe(&value).expect("observer");
        let second = observe(&value).expect("observer");
        assert!(first.ptr_eq(&second));
        assert!(observe(&Value::from(1)).is_none());
    }

    #[test]
    fn frozen_objects_are_not_observed() {
        let obj = ReactiveObject::frozen([("a", Value::from(1))]);
        assert!(obj.is_frozen());
        assert!(observe(&Value::Object(obj.clone())).is_none());

        obj.assign("a", Value::from(2));
        assert_eq!(obj.get_untracked("a"), Value::from(1));
    }

    #[test]
    fn assign_notifies_readers() {
        sync_runtime();
        let state = ReactiveObject::from_entries([("count", Value::from(1))]);
        let reader = state.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("count"));

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        state.assign("count", Value::from(2));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Same value: no notification.
        state.assign("count", Value::from(2));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        Runtime::reset();
    }

    #[test]
    fn nan_assignment_does_not_notify() {
        sync_runtime();
        let state = ReactiveObject::from_entries([("n", Value::Number(f64::NAN))]);
        let reader = state.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("n"));

        state.assign("n", Value::Number(f64::NAN));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        Runtime::reset();
    }

    #[test]
    fn plain_assignment_of_new_key_is_not_reactive() {
        sync_runtime();
        let state = Value::from(json!({ "user": {} }));
        let reader = state.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("user").get("name"));

        let user = state.as_object().expect("object").get_untracked("user");
        user.as_object().expect("object").assign("name", Value::from("ada"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // `set` on another key notifies through the shape dep.
        set(&user, "email", Value::from("ada@example.com"));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(user.as_object().expect("object").is_reactive_key("email"));
        Runtime::reset();
    }

    #[test]
    fn set_and_del_on_arrays() {
        sync_runtime();
        let list = Value::from(json!([1, 2, 3]));
        let holder = ReactiveObject::from_entries([("list", list.clone())]);
        let reader = holder.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("list"));

        set(&list, 1usize, Value::from(20));
        assert_eq!(list.to_json(), json!([1, 20, 3]));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        del(&list, 0usize);
        assert_eq!(list.to_json(), json!([20, 3]));
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        set(&list, 4usize, Value::from(5));
        assert_eq!(list.to_json(), json!([20, 3, null, null, 5]));
        Runtime::reset();
    }

    #[test]
    fn set_refuses_root_data() {
        let warnings = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let sink = warnings.clone();
        Runtime::configure(|config| {
            config.warn_handler = Some(Arc::new(move |msg: &str, _: &str| sink.lock().push(msg.to_string())));
        });

        let data = Value::from(json!({ "a": 1 }));
        data.observer().expect("observer").retain_root();
        set(&data, "b", Value::from(2));
        del(&data, "a");

        assert!(!data.as_object().expect("object").contains_key("b"));
        assert!(data.as_object().expect("object").contains_key("a"));
        assert_eq!(warnings.lock().len(), 2);
        Runtime::reset();
    }

    #[test]
    fn del_notifies_shape_readers() {
        sync_runtime();
        let state = Value::from(json!({ "obj": { "a": 1 } }));
        let reader = state.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("obj"));

        let obj = state.as_object().expect("object").get_untracked("obj");
        del(&obj, "a");
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        // Deleting a missing key is silent.
        del(&obj, "a");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        Runtime::reset();
    }

    #[test]
    fn nested_array_elements_are_depended() {
        sync_runtime();
        let state = Value::from(json!({ "rows": [[1], [2]] }));
        let reader = state.clone();
        let (_watcher, runs) = counting_watcher(move || reader.get("rows"));

        let rows = state.as_object().expect("object").get_untracked("rows");
        let inner = rows.as_array().expect("array").to_vec()[0].clone();
        inner.as_array().expect("array").push(Value::from(9));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        Runtime::reset();
    }
}
