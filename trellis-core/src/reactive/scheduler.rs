//! Update Scheduler
//!
//! Watchers that are neither lazy nor sync do not run when notified. They
//! are queued, and the whole queue is flushed once on the next tick.
//!
//! # Algorithm
//!
//! 1. `queue_watcher` adds a watcher at most once per flush. The first
//!    queued watcher schedules the flush with `next_tick`.
//!
//! 2. The flush sorts the queue by watcher id. Ids follow creation order,
//!    so parents render before children, user watchers run before the
//!    render watcher of the same component, and a child destroyed by its
//!    parent's re-render is skipped because its watchers are inactive.
//!
//! 3. Each watcher runs its `before` hook and then `run`. A watcher queued
//!    while flushing is spliced in by id after the one currently running.
//!    A watcher that keeps re-queueing itself beyond `max_update_count`
//!    aborts the flush with [`Error::InfiniteUpdateLoop`].
//!
//! 4. After the loop the state is reset, `activated` hooks fire for
//!    kept-alive components inserted during the flush, and `updated` hooks
//!    fire child-first for owners of render watchers that ran.
//!
//! # Ticks
//!
//! The host drives time: [`tick`] drains the callbacks queued so far, in
//! FIFO order. Callbacks queued while draining run on the following tick.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::future::Future;

use tokio::sync::oneshot;

use super::subscriber::WatcherId;
use super::watcher::Watcher;
use crate::error::{handle_error, Error};
use crate::instance::{lifecycle, ComponentId};
use crate::runtime::Runtime;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Watcher>,
    has: HashSet<WatcherId>,
    circular: HashMap<WatcherId, usize>,
    activated: Vec<ComponentId>,
    waiting: bool,
    flushing: bool,
    index: usize,
}

thread_local! {
    static SCHEDULER: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
    static CALLBACKS: RefCell<Vec<Box<dyn FnOnce()>>> = const { RefCell::new(Vec::new()) };
}

/// Queue a watcher for the next flush. Duplicates are ignored.
pub fn queue_watcher(watcher: Watcher) {
    let id = watcher.id();
    let schedule = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        if !state.has.insert(id) {
            return false;
        }

        if !state.flushing {
            state.queue.push(watcher);
        } else {
            let mut at = state.queue.len();
            while at > state.index + 1 && state.queue[at - 1].id() > id {
                at -= 1;
            }
            state.queue.insert(at, watcher);
        }

        if state.waiting {
            return false;
        }
        state.waiting = true;
        true
    });

    if schedule {
        if Runtime::async_batching() {
            next_tick(flush_scheduler_queue);
        } else {
            flush_scheduler_queue();
        }
    }
}

/// Remember a kept-alive component to activate at the end of the flush.
pub(crate) fn queue_activated_component(id: ComponentId) {
    SCHEDULER.with(|state| state.borrow_mut().activated.push(id));
}

/// Whether a flush is in progress on this thread.
pub fn is_flushing() -> bool {
    SCHEDULER.with(|state| state.borrow().flushing)
}

/// Number of watchers currently queued.
pub fn queued_len() -> usize {
    SCHEDULER.with(|state| state.borrow().queue.len())
}

/// Run every queued watcher, then the activated and updated hooks.
pub fn flush_scheduler_queue() {
    let limit = Runtime::config().max_update_count;
    let queued = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        state.flushing = true;
        state.queue.sort_by_key(Watcher::id);
        state.queue.len()
    });
    tracing::debug!(watchers = queued, "flushing scheduler queue");

    let mut index = 0;
    loop {
        let next = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            state.index = index;
            state.queue.get(index).cloned()
        });
        let Some(watcher) = next else {
            break;
        };

        watcher.run_before();
        let id = watcher.id();
        SCHEDULER.with(|state| state.borrow_mut().has.remove(&id));
        watcher.run();

        let looping = SCHEDULER.with(|state| {
            let mut state = state.borrow_mut();
            if !state.has.contains(&id) {
                return false;
            }
            let count = state.circular.entry(id).or_insert(0);
            *count += 1;
            *count > limit
        });
        if looping {
            let expression = if watcher.is_render() {
                "component render function".to_string()
            } else if watcher.expression().is_empty() {
                "watcher".to_string()
            } else {
                format!("watcher with expression \"{}\"", watcher.expression())
            };
            handle_error(&Error::InfiniteUpdateLoop { expression, limit }, watcher.owner());
            break;
        }
        index += 1;
    }

    let (queue, activated) = SCHEDULER.with(|state| {
        let mut state = state.borrow_mut();
        let queue = std::mem::take(&mut state.queue);
        let activated = std::mem::take(&mut state.activated);
        state.has.clear();
        state.circular.clear();
        state.index = 0;
        state.waiting = false;
        state.flushing = false;
        (queue, activated)
    });

    lifecycle::call_activated_hooks(activated);
    lifecycle::call_updated_hooks(&queue);
}

/// Defer `callback` to the next tick.
pub fn next_tick(callback: impl FnOnce() + 'static) {
    CALLBACKS.with(|callbacks| callbacks.borrow_mut().push(Box::new(callback)));
}

/// A future that resolves once the next tick has run.
///
/// The callback is registered immediately, so the future observes the
/// state after every flush already queued.
pub fn next_tick_future() -> impl Future<Output = ()> {
    let (tx, rx) = oneshot::channel();
    next_tick(move || {
        let _ = tx.send(());
    });
    async move {
        let _ = rx.await;
    }
}

/// Drain the callbacks queued so far. Returns how many ran.
pub fn tick() -> usize {
    let callbacks = CALLBACKS.with(|callbacks| std::mem::take(&mut *callbacks.borrow_mut()));
    let count = callbacks.len();
    for callback in callbacks {
        callback();
    }
    count
}

/// Whether any tick callback is waiting.
pub fn has_pending() -> bool {
    CALLBACKS.with(|callbacks| !callbacks.borrow().is_empty())
}

/// Tick until no callbacks remain.
pub fn run_until_idle() {
    while has_pending() {
        tick();
    }
}

// ---- Tests ----
