//! Dependency Implementation
//!
//! A `Dep` is the publish/subscribe point attached to every reactive
//! property and to every observed object or array (the "shape" dep).
//!
//! # How Deps Work
//!
//! 1. When a reactive property is read while a watcher is evaluating, the
//!    property's dep calls [`Watcher::add_dep`](super::Watcher::add_dep) on
//!    the current target. The watcher decides whether to subscribe.
//!
//! 2. When the property is written, the dep snapshots its subscriber list
//!    and calls `update` on each entry.
//!
//! # Memory Layout
//!
//! Subscribers are stored as `Weak` references so a dep never keeps a
//! torn-down watcher alive. Dead entries are dropped during the next notify.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::subscriber::{Subscriber, WatcherId};
use crate::runtime::Runtime;

/// Unique identifier for a dep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DepId(u64);

impl DepId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

struct SubEntry {
    id: WatcherId,
    sub: Weak<dyn Subscriber>,
}

struct DepInner {
    id: DepId,
    subs: Mutex<Vec<SubEntry>>,
}

/// A notification point with an ordered, duplicate-free subscriber list.
///
/// Cloning a `Dep` creates another handle to the same subscriber list.
#[derive(Clone)]
pub struct Dep {
    inner: Arc<DepInner>,
}

impl Dep {
    /// Create a dep with no subscribers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DepInner {
                id: DepId::next(),
                subs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Get the dep's unique ID.
    pub fn id(&self) -> DepId {
        self.inner.id
    }

    /// Append a subscriber unless it is already present.
    pub fn add_sub(&self, sub: &Arc<dyn Subscriber>) {
        let id = sub.id();
        let mut subs = self.inner.subs.lock();
        if subs.iter().any(|entry| entry.id == id) {
            return;
        }
        subs.push(SubEntry {
            id,
            sub: Arc::downgrade(sub),
        });
    }

    /// Remove a subscriber by id. Missing ids are ignored.
    pub fn remove_sub(&self, id: WatcherId) {
        self.inner.subs.lock().retain(|entry| entry.id != id);
    }

    /// Register the current evaluation target, if any, as a dependent.
    ///
    /// The watcher side performs the de-duplication, see
    /// [`Watcher::add_dep`](super::Watcher::add_dep).
    pub fn depend(&self) {
        if let Some(target) = ReactiveContext::current_target() {
            target.add_dep(self);
        }
    }

    /// Notify every live subscriber.
    ///
    /// Works on a snapshot: subscribers added or removed while notifying do
    /// not affect the current round. With async batching disabled the
    /// snapshot is sorted by watcher id so synchronous runs keep creation
    /// order.
    pub fn notify(&self) {
        let mut live: Vec<Arc<dyn Subscriber>> = {
            let mut subs = self.inner.subs.lock();
            subs.retain(|entry| entry.sub.strong_count() > 0);
            subs.iter().filter_map(|entry| entry.sub.upgrade()).collect()
        };

        if !Runtime::async_batching() {
            live.sort_by_key(|sub| sub.id());
        }

        tracing::trace!(dep = self.id().raw(), subscribers = live.len(), "notify");

        for sub in live {
            sub.update();
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subs
            .lock()
            .iter()
            .filter(|entry| entry.sub.strong_count() > 0)
            .count()
    }

    /// Check whether the given watcher is subscribed.
    pub fn has_subscriber(&self, id: WatcherId) -> bool {
        self.inner.subs.lock().iter().any(|entry| entry.id == id)
    }

    /// Check if two handles point to the same dep.
    pub fn ptr_eq(&self, other: &Dep) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Default for Dep {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dep")
            .field("id", &self.inner.id)
            .field("subscribers", &self.inner.subs.lock().len())
            .finish()
    }
}

// ---- Tests ----
