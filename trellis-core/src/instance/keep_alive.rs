//! Keep-alive: an abstract component that caches the instances it renders.
//!
//! # How Caching Works
//!
//! Keep-alive renders the first component placeholder of its default slot
//! and marks it `keep_alive`. The patch engine then deactivates such
//! instances instead of destroying them, and reuses the cached instance when
//! the same placeholder comes back.
//!
//! Entries are keyed by the placeholder key, or by definition and tag. The
//! cache is an LRU in touch order: a hit moves the entry to the end, and
//! when `max` is exceeded the first entry is evicted and destroyed. The
//! instance currently on screen is never destroyed by pruning.
//!
//! `include` and `exclude` restrict caching by component name. Both accept a
//! comma-separated string or an array of names; changing either prunes
//! entries that no longer qualify. Clearing `include` matches no name, so
//! every named entry except the one on screen is pruned.

use std::sync::OnceLock;

use indexmap::IndexMap;

use super::{
    arena, ComponentDef, ComponentId, ComponentOptions, CreateElement, LifecycleHook, PropDef, PropType, Vm, WatchDef,
};
use crate::error::BoxError;
use crate::reactive::Value;
use crate::vdom::{Rendered, VNode};

struct CacheEntry {
    name: Option<String>,
    tag: Option<String>,
    instance: ComponentId,
}

struct PendingEntry {
    key: String,
    name: Option<String>,
    tag: Option<String>,
}

/// Per-instance cache state.
#[derive(Default)]
pub(crate) struct Cache {
    entries: IndexMap<String, CacheEntry>,
    /// Rendered on a miss; cached once the patch has created the instance.
    pending: Option<PendingEntry>,
}

/// The keep-alive component definition.
pub fn keep_alive() -> ComponentDef {
    static DEF: OnceLock<ComponentDef> = OnceLock::new();
    DEF.get_or_init(|| {
        ComponentOptions::new()
            .name("keep-alive")
            .abstract_component()
            .prop("include", PropDef::of(PropType::String).or(PropType::Array))
            .prop("exclude", PropDef::of(PropType::String).or(PropType::Array))
            .prop("max", PropDef::of(PropType::Number).or(PropType::String))
            .hook(LifecycleHook::Mounted, mounted)
            .hook(LifecycleHook::Updated, |vm| {
                cache_vnode(vm);
                Ok(())
            })
            .hook(LifecycleHook::Destroyed, |vm| {
                let keys: Vec<String> = vm.inner.keep_alive.lock().entries.keys().cloned().collect();
                for key in keys {
                    prune_cache_entry(vm, &key);
                }
                Ok(())
            })
            .render(render)
            .build()
    })
    .clone()
}

/// Number of cached instances held by a keep-alive instance.
pub fn cached_len(vm: &Vm) -> usize {
    vm.inner.keep_alive.lock().entries.len()
}

/// Cached instances, least recently used first.
pub fn cached_instances(vm: &Vm) -> Vec<ComponentId> {
    vm.inner
        .keep_alive
        .lock()
        .entries
        .values()
        .map(|entry| entry.instance)
        .collect()
}

fn mounted(vm: &Vm) -> Result<(), BoxError> {
    cache_vnode(vm);
    let _ = vm.watch(
        "include",
        WatchDef::new(|vm, include, _| {
            prune_cache(vm, |name| matches(include, name));
            Ok(())
        }),
    );
    let _ = vm.watch(
        "exclude",
        WatchDef::new(|vm, exclude, _| {
            prune_cache(vm, |name| !matches(exclude, name));
            Ok(())
        }),
    );
    Ok(())
}

fn render(vm: &Vm, h: &CreateElement) -> Result<Rendered, BoxError> {
    let slot = h.slot("default");
    let Some(index) = slot.iter().position(|node| node.component.is_some()) else {
        return Ok(slot.into_iter().next().into());
    };
    let Some(mut vnode) = slot.into_iter().nth(index) else {
        return Ok(Rendered::Nothing);
    };
    let Some(component) = vnode.component_options() else {
        return Ok(vnode.into());
    };

    let tag = component.tag.clone();
    let name = component
        .def
        .name()
        .map(str::to_string)
        .or_else(|| tag.clone());
    let cid = component.def.cid();

    let include = vm.get("include");
    let exclude = vm.get("exclude");
    let excluded = match &name {
        Some(name) => {
            (include.is_truthy() && !matches(&include, name)) || (exclude.is_truthy() && matches(&exclude, name))
        }
        None => include.is_truthy(),
    };
    if excluded {
        return Ok(vnode.into());
    }

    let key = match vnode.key() {
        Some(key) => key.to_string(),
        None => match &tag {
            Some(tag) => format!("{cid}::{tag}"),
            None => cid.to_string(),
        },
    };

    {
        let mut cache = vm.inner.keep_alive.lock();
        match cache.entries.shift_remove(&key) {
            Some(entry) => {
                vnode.component_instance = Some(entry.instance);
                cache.entries.insert(key, entry);
            }
            None => cache.pending = Some(PendingEntry { key, name, tag }),
        }
    }

    mark_kept_alive(&mut vnode);
    Ok(vnode.into())
}

fn mark_kept_alive(vnode: &mut VNode) {
    if let Some(data) = vnode.data.as_mut() {
        data.keep_alive = true;
    }
}

/// Store the instance rendered on the last miss.
fn cache_vnode(vm: &Vm) {
    let pending = vm.inner.keep_alive.lock().pending.take();
    let Some(pending) = pending else {
        return;
    };
    let Some(instance) = vm.root_shape().and_then(|(_, instance)| instance) else {
        return;
    };
    let max = max_entries(&vm.get("max"));

    let evict = {
        let mut cache = vm.inner.keep_alive.lock();
        cache.entries.insert(
            pending.key,
            CacheEntry {
                name: pending.name,
                tag: pending.tag,
                instance,
            },
        );
        match max {
            Some(max) if cache.entries.len() > max => cache.entries.first().map(|(key, _)| key.clone()),
            _ => None,
        }
    };
    if let Some(key) = evict {
        prune_cache_entry(vm, &key);
    }
}

fn max_entries(max: &Value) -> Option<usize> {
    match max {
        Value::Number(n) if *n >= 1.0 => Some(*n as usize),
        Value::Str(s) => s.trim().parse().ok().filter(|n| *n > 0),
        _ => None,
    }
}

fn prune_cache(vm: &Vm, keep: impl Fn(&str) -> bool) {
    let stale: Vec<String> = vm
        .inner
        .keep_alive
        .lock()
        .entries
        .iter()
        .filter(|(_, entry)| entry.name.as_deref().is_some_and(|name| !keep(name)))
        .map(|(key, _)| key.clone())
        .collect();
    for key in stale {
        prune_cache_entry(vm, &key);
    }
}

fn prune_cache_entry(vm: &Vm, key: &str) {
    let entry = vm.inner.keep_alive.lock().entries.shift_remove(key);
    let Some(entry) = entry else {
        return;
    };
    let current = vm.root_shape().and_then(|(_, instance)| instance);
    if current == Some(entry.instance) {
        return;
    }
    tracing::debug!(
        component = %vm.id(),
        key,
        name = ?entry.name,
        tag = ?entry.tag,
        "pruning cached component"
    );
    if let Some(instance) = arena::get(entry.instance) {
        instance.destroy();
    }
}

/// Whether `name` is listed by a pattern: a comma-separated string or an
/// array of names.
fn matches(pattern: &Value, name: &str) -> bool {
    match pattern {
        Value::Str(list) => list.split(',').any(|item| item.trim() == name),
        Value::Array(items) => items.to_vec().iter().any(|item| item.as_str() == Some(name)),
        _ => false,
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::ReactiveArray;

    #[test]
    fn string_patterns_are_comma_separated() {
        let pattern = Value::from("a, b,c");
        assert!(matches(&pattern, "a"));
        assert!(matches(&pattern, "b"));
        assert!(matches(&pattern, "c"));
        assert!(!matches(&pattern, "d"));
    }

    #[test]
    fn array_patterns_list_names() {
        let pattern = Value::Array(ReactiveArray::new(vec![Value::from("a"), Value::from("b")]));
        assert!(matches(&pattern, "b"));
        assert!(!matches(&pattern, "c"));
        assert!(!matches(&Value::Null, "a"));
    }

    #[test]
    fn max_accepts_numbers_and_strings() {
        assert_eq!(max_entries(&Value::from(2)), Some(2));
        assert_eq!(max_entries(&Value::from("3")), Some(3));
        assert_eq!(max_entries(&Value::from("0")), None);
        assert_eq!(max_entries(&Value::Null), None);
    }
}
