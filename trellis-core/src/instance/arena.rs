//! Instance arena.
//!
//! Live component instances are registered here under their
//! [`ComponentId`]. Everything else (vnodes, watchers, parents) refers to an
//! instance by id and resolves it on demand, so no ownership cycles form
//! between a parent, its children and the trees they render.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use dashmap::DashMap;

use super::Vm;

/// Unique identifier for a component instance.
///
/// Ids increase monotonically, so a parent always has a smaller id than the
/// children it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Generate a new unique component ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for ComponentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

fn instances() -> &'static DashMap<ComponentId, Vm> {
    static INSTANCES: OnceLock<DashMap<ComponentId, Vm>> = OnceLock::new();
    INSTANCES.get_or_init(DashMap::new)
}

/// Resolve a live instance.
pub fn get(id: ComponentId) -> Option<Vm> {
    // Clone out so no shard lock outlives this call.
    instances().get(&id).map(|entry| entry.value().clone())
}

/// Whether `id` refers to a live instance.
pub fn contains(id: ComponentId) -> bool {
    instances().contains_key(&id)
}

/// Number of live instances across all threads.
pub fn len() -> usize {
    instances().len()
}

pub(crate) fn register(vm: &Vm) {
    instances().insert(vm.id(), vm.clone());
}

pub(crate) fn release(id: ComponentId) {
    instances().remove(&id);
}
