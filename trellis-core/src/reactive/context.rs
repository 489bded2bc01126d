//! Reactive Context
//!
//! The reactive context tracks which watcher is currently evaluating.
//! This enables automatic dependency tracking: when a reactive property is
//! read, the property's [`Dep`](super::Dep) registers the current watcher as
//! a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of evaluation targets. Entering a context
//! pushes a target (or `None`, which suspends tracking) and the returned
//! guard pops it again on drop, so the stack stays balanced even when a
//! getter panics.
//!
//! Nesting is the normal case: a render watcher reads a computed property,
//! whose lazy watcher pushes itself on top, evaluates, and pops back to the
//! render watcher.

use std::cell::RefCell;

use super::{Watcher, WatcherId};

thread_local! {
    static TARGET_STACK: RefCell<Vec<Option<Watcher>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the evaluation target when dropped.
pub struct ReactiveContext {
    target: Option<WatcherId>,
}

impl ReactiveContext {
    /// Make `target` the current evaluation target until the guard drops.
    pub fn enter(target: Option<Watcher>) -> Self {
        let id = target.as_ref().map(Watcher::id);
        TARGET_STACK.with(|stack| stack.borrow_mut().push(target));
        Self { target: id }
    }

    /// Push an empty target: nothing read until the guard drops is tracked.
    ///
    /// Used around lifecycle hooks, data factories and immediate watcher
    /// callbacks.
    pub fn suspend() -> Self {
        Self::enter(None)
    }

    /// The watcher currently collecting dependencies, if any.
    pub fn current_target() -> Option<Watcher> {
        TARGET_STACK.with(|stack| stack.borrow().last().cloned().flatten())
    }

    /// Check if reads are currently being tracked.
    pub fn is_active() -> bool {
        TARGET_STACK.with(|stack| matches!(stack.borrow().last(), Some(Some(_))))
    }

    /// Number of entries on the stack, tracked or suspended.
    pub fn depth() -> usize {
        TARGET_STACK.with(|stack| stack.borrow().len())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        TARGET_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                let popped_id = entry.as_ref().map(Watcher::id);
                debug_assert_eq!(
                    popped_id, self.target,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    self.target, popped_id
                );
            }
        });
    }
}

/// Run `f` with dependency tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::suspend();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Value;

    fn idle_watcher() -> Watcher {
        Watcher::builder(|| Ok(Value::Null)).lazy().build()
    }

    #[test]
    fn context_tracks_target() {
        let watcher = idle_watcher();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_target().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(watcher.clone()));

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_target().map(|w| w.id()), Some(watcher.id()));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert_eq!(ReactiveContext::depth(), 0);
    }

    #[test]
    fn nested_contexts_restore_outer_target() {
        let outer = idle_watcher();
        let inner = idle_watcher();

        {
            let _ctx1 = ReactiveContext::enter(Some(outer.clone()));
            {
                let _ctx2 = ReactiveContext::enter(Some(inner.clone()));
                assert_eq!(ReactiveContext::current_target().map(|w| w.id()), Some(inner.id()));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_target().map(|w| w.id()), Some(outer.id()));
        }

        assert!(ReactiveContext::current_target().is_none());
    }

    #[test]
    fn suspend_hides_outer_target() {
        let outer = idle_watcher();
        let _ctx = ReactiveContext::enter(Some(outer.clone()));

        untracked(|| {
            assert!(!ReactiveContext::is_active());
            assert_eq!(ReactiveContext::depth(), 2);
        });

        assert!(ReactiveContext::is_active());
    }

    #[test]
    fn stack_unwinds_on_panic() {
        let result = std::panic::catch_unwind(|| {
            let _ctx = ReactiveContext::enter(Some(idle_watcher()));
            panic!("getter failed");
        });

        assert!(result.is_err());
        assert_eq!(ReactiveContext::depth(), 0);
    }
}
