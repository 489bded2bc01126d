//! Instance state: props, methods, data, computed and watchers.

use std::sync::Arc;

use indexmap::IndexMap;

use super::options::{ComputedDef, WatchDef, WatchHandler};
use super::{arena, props, ComponentId, Vm};
use crate::error::{handle_error, invoke_with_error_handling, BoxError, Error};
use crate::reactive::{self, Computed, ReactiveContext, ReactiveObject, Value, Watcher};
use crate::runtime::warn;

pub(crate) fn init_state(vm: &Vm) {
    if !vm.def().options().props.is_empty() {
        props::init_props(vm);
    }
    init_methods(vm);
    init_data(vm);
    init_computed(vm);
    init_watch(vm);
}

fn init_methods(vm: &Vm) {
    let options = vm.def().options();
    for key in options.methods.keys() {
        if options.props.contains_key(key) {
            warn(format!("Method \"{key}\" has already been defined as a prop."), Some(vm.id()));
        }
    }
}

fn init_data(vm: &Vm) {
    let factories = vm.def().options().data.clone();
    if factories.is_empty() {
        return;
    }

    // Later factories (the component's own) win over earlier ones (mixins).
    let mut data: Option<ReactiveObject> = None;
    for factory in factories.iter().rev() {
        let object = get_data(vm, factory);
        data = Some(match data {
            None => object,
            Some(into) => {
                merge_data(&into, &object);
                into
            }
        });
    }
    let Some(data) = data else {
        return;
    };

    let options = vm.def().options();
    for key in data.keys() {
        if options.methods.contains_key(&key) {
            warn(
                format!("Method \"{key}\" has already been defined as a data property."),
                Some(vm.id()),
            );
        }
        if options.props.contains_key(&key) {
            warn(
                format!("The data property \"{key}\" is already declared as a prop. Use prop default value instead."),
                Some(vm.id()),
            );
        }
    }

    if let Some(observer) = data.observer() {
        observer.retain_root();
    }
    *vm.inner.data.write() = data;
}

/// Evaluate one data factory without collecting dependencies.
fn get_data(vm: &Vm, factory: &super::DataFn) -> ReactiveObject {
    let _ctx = ReactiveContext::suspend();
    match factory(vm) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            warn("data functions should return an object", Some(vm.id()));
            ReactiveObject::new()
        }
        Err(source) => {
            handle_error(&Error::user("data()", source), Some(vm.id()));
            ReactiveObject::new()
        }
    }
}

/// Copy keys of `from` missing in `into`, recursing into nested objects.
fn merge_data(into: &ReactiveObject, from: &ReactiveObject) {
    for (key, from_value) in from.entries_untracked() {
        if !into.contains_key(&key) {
            reactive::set(&Value::Object(into.clone()), key.as_str(), from_value);
            continue;
        }
        let into_value = into.get_untracked(&key);
        if let (Value::Object(a), Value::Object(b)) = (&into_value, &from_value) {
            if !a.ptr_eq(b) {
                merge_data(a, b);
            }
        }
    }
}

fn init_computed(vm: &Vm) {
    let id = vm.id();
    let defs = vm.def().options().computed.clone();
    let mut computed = IndexMap::new();

    for (key, def) in defs {
        if vm.data().contains_key(&key) {
            warn(format!("The computed property \"{key}\" is already defined in data."), Some(id));
            continue;
        }
        if vm.def().has_prop(&key) {
            warn(format!("The computed property \"{key}\" is already defined as a prop."), Some(id));
            continue;
        }
        if vm.def().options().methods.contains_key(&key) {
            warn(format!("The computed property \"{key}\" is already defined as a method."), Some(id));
            continue;
        }

        let entry = build_computed(id, &key, &def);
        if let Some(watcher) = entry.watcher() {
            vm.add_watcher(watcher.clone());
        }
        computed.insert(key, entry);
    }

    *vm.inner.computed.write() = computed;
}

fn build_computed(id: ComponentId, key: &str, def: &ComputedDef) -> Computed {
    let get = def.getter().clone();
    let getter = Arc::new(move || match arena::get(id) {
        Some(vm) => get(&vm),
        None => Ok(Value::Null),
    });
    let computed = Computed::build(key.to_string(), Some(id), getter, def.is_cached());

    match def.setter().cloned() {
        Some(set) => computed.with_setter(Arc::new(move |value: Value| match arena::get(id) {
            Some(vm) => set(&vm, value),
            None => Ok(()),
        })),
        None => computed,
    }
}

fn init_watch(vm: &Vm) {
    let watch = vm.def().options().watch.clone();
    for (path, defs) in watch {
        for def in defs {
            // Handles live in the instance's watcher list.
            let _ = vm.watch(path.as_str(), def);
        }
    }
}

/// A getter used as a watch source.
pub type SourceFn = Arc<dyn Fn(&Vm) -> Result<Value, BoxError> + Send + Sync>;

/// What a watcher observes.
#[derive(Clone)]
pub enum WatchSource {
    /// Dot-delimited path into instance state, like `user.name`.
    Path(String),
    Getter(SourceFn),
}

impl WatchSource {
    pub fn getter<F>(f: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        WatchSource::Getter(Arc::new(f))
    }
}

impl From<&str> for WatchSource {
    fn from(path: &str) -> Self {
        WatchSource::Path(path.to_string())
    }
}

impl From<String> for WatchSource {
    fn from(path: String) -> Self {
        WatchSource::Path(path)
    }
}

/// Handle returned by [`Vm::watch`].
#[must_use = "dropping an Unwatch keeps the watcher running; call unwatch() to stop it"]
pub struct Unwatch {
    watcher: Option<Watcher>,
}

impl Unwatch {
    /// Stop watching.
    pub fn unwatch(self) {
        if let Some(watcher) = self.watcher {
            watcher.teardown();
        }
    }

    pub fn watcher(&self) -> Option<&Watcher> {
        self.watcher.as_ref()
    }
}

fn is_simple_path(path: &str) -> bool {
    !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
}

/// Resolve a dot path, reading reactively at every step.
fn read_path(vm: &Vm, path: &str) -> Value {
    let mut segments = path.split('.');
    let Some(first) = segments.next() else {
        return Value::Null;
    };
    let mut value = vm.get(first);
    for segment in segments {
        value = match &value {
            Value::Object(_) => value.get(segment),
            Value::Array(items) => {
                items.depend();
                segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|i| items.get(i))
                    .unwrap_or_default()
            }
            _ => return Value::Null,
        };
    }
    value
}

impl Vm {
    /// Watch `source` and call `def`'s handler with `(new, old)` on change.
    pub fn watch(&self, source: impl Into<WatchSource>, def: WatchDef) -> Unwatch {
        let id = self.id();
        let source = source.into();

        let (expression, getter): (String, SourceFn) = match source {
            WatchSource::Path(path) => {
                if !is_simple_path(&path) {
                    warn(
                        format!(
                            "Failed watching path: \"{path}\" Watcher only accepts simple dot-delimited paths. For full control, use a function instead."
                        ),
                        Some(id),
                    );
                    return Unwatch { watcher: None };
                }
                let read = path.clone();
                let getter: SourceFn = Arc::new(move |vm: &Vm| -> Result<Value, BoxError> { Ok(read_path(vm, &read)) });
                (path, getter)
            }
            WatchSource::Getter(getter) => (String::new(), getter),
        };

        let callback: super::WatchFn = match &def.handler {
            WatchHandler::Callback(f) => f.clone(),
            WatchHandler::Method(name) => {
                if !self.def().options().methods.contains_key(name) {
                    warn(
                        format!("Unknown method \"{name}\" used as handler for watcher \"{expression}\""),
                        Some(id),
                    );
                    return Unwatch { watcher: None };
                }
                let name = name.clone();
                Arc::new(move |vm: &Vm, new: &Value, old: &Value| {
                    vm.call(&name, &[new.clone(), old.clone()])
                        .map(|_| ())
                        .map_err(|e| -> BoxError { Box::new(e) })
                })
            }
        };

        let run = callback.clone();
        let mut builder = Watcher::builder(move || match arena::get(id) {
            Some(vm) => getter(&vm),
            None => Ok(Value::Null),
        })
        .owner(id)
        .expression(expression.clone())
        .user()
        .callback(move |new, old| match arena::get(id) {
            Some(vm) => run(&vm, new, old),
            None => Ok(()),
        });
        if def.deep {
            builder = builder.deep();
        }
        if def.sync {
            builder = builder.sync();
        }
        let watcher = builder.build();
        self.add_watcher(watcher.clone());

        if def.immediate {
            let _ctx = ReactiveContext::suspend();
            let value = watcher.value();
            invoke_with_error_handling(
                || callback(self, &value, &Value::Null),
                Some(id),
                format_args!("callback for immediate watcher \"{expression}\""),
            );
        }

        Unwatch {
            watcher: Some(watcher),
        }
    }
}
