//! Subscriber types for the reactive system.
//!
//! A subscriber is anything a [`Dep`](super::Dep) can notify. In practice
//! this is always a [`Watcher`](super::Watcher), but the dependency layer only
//! sees the trait so it can be tested in isolation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a watcher.
///
/// Ids are handed out from a monotonic counter. The scheduler relies on this:
/// a component's render watcher is created before any of its children's, so
/// sorting a flush by id runs parents before children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can be notified when a dependency changes.
pub trait Subscriber: Send + Sync {
    /// Stable identity used for ordering and de-duplication.
    fn id(&self) -> WatcherId;

    /// Called by [`Dep::notify`](super::Dep::notify).
    fn update(self: Arc<Self>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watcher_ids_are_unique() {
        let id1 = WatcherId::new();
        let id2 = WatcherId::new();
        let id3 = WatcherId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn watcher_ids_increase_in_creation_order() {
        let first = WatcherId::new();
        let second = WatcherId::new();
        assert!(first < second);
        assert!(first.raw() < second.raw());
    }
}
