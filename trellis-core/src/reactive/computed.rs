//! Computed Implementation
//!
//! A computed property is a lazy watcher plus a read path that re-exposes
//! the watcher's deps to whoever reads it.
//!
//! # How Computed Properties Work
//!
//! 1. Reading a dirty computed evaluates its watcher and caches the value.
//!
//! 2. Reading a clean computed returns the cached value without running the
//!    getter.
//!
//! 3. When any dep notifies, the lazy watcher only marks itself dirty. The
//!    outer reader (usually a render watcher) was made to depend on the same
//!    deps, so it re-runs and the next read recomputes.
//!
//! Uncached computed properties skip the watcher entirely and run the getter
//! inline on every read, inside the reader's own tracking context.

use std::sync::Arc;

use super::context::ReactiveContext;
use super::value::Value;
use super::watcher::{Getter, Watcher};
use crate::error::{handle_error, BoxError, Error};
use crate::instance::ComponentId;

/// Setter for a writable computed property.
pub type ComputedSetter = Arc<dyn Fn(Value) -> Result<(), BoxError> + Send + Sync>;

/// A derived value with dependency-driven caching.
#[derive(Clone)]
pub struct Computed {
    key: String,
    owner: Option<ComponentId>,
    getter: Getter,
    watcher: Option<Watcher>,
    setter: Option<ComputedSetter>,
}

impl Computed {
    /// A cached computed property.
    pub fn new<F>(key: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::build(key.into(), None, Arc::new(getter), true)
    }

    /// A computed property that re-runs its getter on every read.
    pub fn uncached<F>(key: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        Self::build(key.into(), None, Arc::new(getter), false)
    }

    pub(crate) fn build(key: String, owner: Option<ComponentId>, getter: Getter, cache: bool) -> Self {
        let watcher = cache.then(|| {
            let inner = getter.clone();
            let mut builder = Watcher::builder(move || inner())
                .lazy()
                .expression(key.clone());
            if let Some(owner) = owner {
                builder = builder.owner(owner);
            }
            builder.build()
        });
        Self {
            key,
            owner,
            getter,
            watcher,
            setter: None,
        }
    }

    /// Attach a setter.
    pub fn with_setter(mut self, setter: ComputedSetter) -> Self {
        self.setter = Some(setter);
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The backing lazy watcher, absent for uncached properties.
    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_ref()
    }

    pub fn is_cached(&self) -> bool {
        self.watcher.is_some()
    }

    /// Read the value, evaluating only if dirty.
    pub fn get(&self) -> Value {
        let Some(watcher) = &self.watcher else {
            return match (self.getter)() {
                Ok(value) => value,
                Err(source) => {
                    let info = format!("computed property \"{}\"", self.key);
                    handle_error(&Error::user(info, source), self.owner);
                    Value::Null
                }
            };
        };

        if watcher.is_dirty() {
            watcher.evaluate();
        }
        if ReactiveContext::is_active() {
            watcher.depend();
        }
        watcher.value()
    }

    /// Write through the setter. Returns `false` when there is none.
    pub fn set(&self, value: Value) -> bool {
        let Some(setter) = &self.setter else {
            return false;
        };
        if let Err(source) = setter(value) {
            let info = format!("setter of computed property \"{}\"", self.key);
            handle_error(&Error::user(info, source), self.owner);
        }
        true
    }
}

impl std::fmt::Debug for Computed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("key", &self.key)
            .field("cached", &self.is_cached())
            .field("dirty", &self.watcher.as_ref().map(Watcher::is_dirty))
            .finish()
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveObject;
    use crate::runtime::Runtime;
    use serde_json::json;
    use std::sync::atomic::{AtomicI32, Ordering};

    fn counter_state() -> ReactiveObject {
        Value::from(json!({ "count": 2 })).as_object().cloned().expect("object")
    }

    #[test]
    fn computed_evaluates_on_first_access() {
        let data = counter_state();
        let reader = data.clone();
        let computes = Arc::new(AtomicI32::new(0));
        let counter = computes.clone();
        let doubled = Computed::new("doubled", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(reader.get("count").as_f64().unwrap_or(0.0) * 2.0))
        });

        assert_eq!(computes.load(Ordering::SeqCst), 0);
        assert_eq!(doubled.get(), Value::from(4));
        assert_eq!(computes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn computed_caches_until_dependency_changes() {
        let data = counter_state();
        let reader = data.clone();
        let computes = Arc::new(AtomicI32::new(0));
        let counter = computes.clone();
        let doubled = Computed::new("doubled", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Value::from(reader.get("count").as_f64().unwrap_or(0.0) * 2.0))
        });

        doubled.get();
        doubled.get();
        doubled.get();
        assert_eq!(computes.load(Ordering::SeqCst), 1);

        data.assign("count", Value::from(5));
        assert!(doubled.watcher().is_some_and(Watcher::is_dirty));
        assert_eq!(doubled.get(), Value::from(10));
        assert_eq!(computes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn outer_watcher_depends_through_computed() {
        Runtime::configure(|config| config.async_batching = false);
        let data = counter_state();
        let reader = data.clone();
        let doubled = Computed::new("doubled", move || {
            Ok(Value::from(reader.get("count").as_f64().unwrap_or(0.0) * 2.0))
        });
        let source = doubled.clone();
        let outer = Watcher::builder(move || Ok(source.get())).build();
        assert_eq!(outer.value(), Value::from(4));

        data.assign("count", Value::from(4));
        assert_eq!(outer.value(), Value::from(8));
        Runtime::reset();
    }

    #[test]
    fn uncached_computed_runs_every_read() {
        let computes = Arc::new(AtomicI32::new(0));
        let counter = computes.clone();
        let stamp = Computed::uncached("stamp", move || {
            Ok(Value::from(counter.fetch_add(1, Ordering::SeqCst)))
        });

        stamp.get();
        stamp.get();
        assert_eq!(computes.load(Ordering::SeqCst), 2);
        assert!(!stamp.is_cached());
    }

    #[test]
    fn setter_is_optional() {
        let data = counter_state();
        let writer = data.clone();
        let plain = Computed::new("plain", || Ok(Value::Null));
        assert!(!plain.set(Value::from(1)));

        let writable = Computed::new("writable", || Ok(Value::Null)).with_setter(Arc::new(move |v| {
            writer.assign("count", v);
            Ok(())
        }));
        assert!(writable.set(Value::from(9)));
        assert_eq!(data.get_untracked("count"), Value::from(9));
    }
}
