//! Instance events.
//!
//! Each instance has an event table: name → ordered listeners. Listeners a
//! parent attaches on a component placeholder are registered here too and
//! re-synchronized whenever the parent re-renders.
//!
//! Names starting with `hook:` are emitted by [`call_hook`] for every
//! lifecycle hook, so a parent can follow a child's lifecycle.
//!
//! [`call_hook`]: super::lifecycle::call_hook

use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use super::Vm;
use crate::error::invoke_with_error_handling;
use crate::reactive::Value;
use crate::vdom::Handler;

/// Prefix marking a parent listener as once-only.
const ONCE_PREFIX: char = '~';

pub(crate) struct Listener {
    handler: Handler,
    once: bool,
}

/// One event name or several.
#[derive(Debug, Clone)]
pub struct EventNames(SmallVec<[String; 2]>);

impl EventNames {
    fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl From<&str> for EventNames {
    fn from(name: &str) -> Self {
        Self(smallvec::smallvec![name.to_string()])
    }
}

impl From<String> for EventNames {
    fn from(name: String) -> Self {
        Self(smallvec::smallvec![name])
    }
}

impl From<&[&str]> for EventNames {
    fn from(names: &[&str]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EventNames {
    fn from(names: [&str; N]) -> Self {
        Self(names.iter().map(|n| n.to_string()).collect())
    }
}

impl From<Vec<String>> for EventNames {
    fn from(names: Vec<String>) -> Self {
        Self(names.into_iter().collect())
    }
}

pub(crate) fn init_events(vm: &Vm) {
    let listeners = vm
        .placeholder()
        .and_then(|p| p.component_options().map(|c| c.listeners.clone()))
        .unwrap_or_default();
    if !listeners.is_empty() {
        update_component_listeners(vm, &listeners, &IndexMap::new());
        *vm.inner.parent_listeners.lock() = listeners;
    }
}

/// Sync parent listeners. A handler replaced under the same event is
/// swapped in place; removed events are unregistered.
pub(crate) fn update_component_listeners(
    vm: &Vm,
    listeners: &IndexMap<String, Handler>,
    old: &IndexMap<String, Handler>,
) {
    for (raw, handler) in listeners {
        let (name, once) = parse_name(raw);
        match old.get(raw) {
            Some(previous) if Arc::ptr_eq(previous, handler) => {}
            Some(previous) => {
                let mut events = vm.inner.events.lock();
                if let Some(entry) = events
                    .get_mut(name)
                    .and_then(|list| list.iter_mut().find(|l| Arc::ptr_eq(&l.handler, previous)))
                {
                    entry.handler = handler.clone();
                }
            }
            None => vm.add_listener(name, handler.clone(), once),
        }
    }
    for (raw, handler) in old {
        if !listeners.contains_key(raw) {
            let (name, _) = parse_name(raw);
            vm.off(name, Some(handler));
        }
    }
}

fn parse_name(raw: &str) -> (&str, bool) {
    match raw.strip_prefix(ONCE_PREFIX) {
        Some(name) => (name, true),
        None => (raw, false),
    }
}

impl Vm {
    /// Listen for one or more events.
    pub fn on(&self, events: impl Into<EventNames>, handler: Handler) -> &Self {
        for name in events.into().iter() {
            self.add_listener(name, handler.clone(), false);
        }
        self
    }

    /// Listen for the first occurrence of an event only.
    pub fn once(&self, event: &str, handler: Handler) -> &Self {
        self.add_listener(event, handler, true);
        self
    }

    /// Remove listeners: all of an event's when `handler` is `None`,
    /// otherwise only that handler.
    pub fn off(&self, events: impl Into<EventNames>, handler: Option<&Handler>) -> &Self {
        let mut table = self.inner.events.lock();
        for name in events.into().iter() {
            match handler {
                None => {
                    table.shift_remove(name);
                }
                Some(handler) => {
                    if let Some(list) = table.get_mut(name) {
                        // Newest registration first.
                        if let Some(i) = list.iter().rposition(|l| Arc::ptr_eq(&l.handler, handler)) {
                            list.remove(i);
                        }
                    }
                }
            }
        }
        self
    }

    /// Remove every listener.
    pub fn off_all(&self) -> &Self {
        self.inner.events.lock().clear();
        self
    }

    /// Invoke the listeners of `event` in registration order.
    pub fn emit(&self, event: impl AsRef<str>, args: &[Value]) -> &Self {
        let event = event.as_ref();
        let handlers: Vec<Handler> = {
            let mut table = self.inner.events.lock();
            let Some(list) = table.get_mut(event) else {
                return self;
            };
            let handlers = list.iter().map(|l| l.handler.clone()).collect();
            list.retain(|l| !l.once);
            handlers
        };

        for handler in handlers {
            invoke_with_error_handling(|| handler(args), Some(self.id()), format_args!("event handler for \"{event}\""));
        }
        self
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.events.lock().get(event).map(Vec::len).unwrap_or(0)
    }

    fn add_listener(&self, name: &str, handler: Handler, once: bool) {
        self.inner
            .events
            .lock()
            .entry(name.to_string())
            .or_default()
            .push(Listener { handler, once });
        if name.starts_with("hook:") {
            self.inner.flags.lock().has_hook_event = true;
        }
    }
}
