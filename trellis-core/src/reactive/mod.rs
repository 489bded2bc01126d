//! Reactive Primitives
//!
//! This module implements the dependency-tracking data layer: deps,
//! observed objects and arrays, watchers, computed properties and the
//! batched scheduler.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is a subscriber list. Every reactive property owns one, and
//! every observed object or array owns a "shape" dep for key additions,
//! deletions and array mutation.
//!
//! ## Watchers
//!
//! A [`Watcher`] evaluates a getter with itself as the current evaluation
//! target, so every dep read along the way subscribes it. When a dep
//! notifies, the watcher is queued (or marked dirty, or run synchronously,
//! depending on its flags).
//!
//! ## Scheduler
//!
//! Queued watchers run once per tick in id order, see [`scheduler`].
//!
//! # Implementation Notes
//!
//! Objects and arrays are built observed: tracking is part of the
//! container, never patched in afterwards. The current evaluation target is
//! a thread-local stack maintained by RAII guards ([`ReactiveContext`]).

mod array;
mod computed;
mod context;
mod dep;
mod observer;
pub mod scheduler;
mod subscriber;
mod traverse;
mod value;
mod watcher;

pub use array::ReactiveArray;
pub use computed::{Computed, ComputedSetter};
pub use context::{untracked, ReactiveContext};
pub use dep::{Dep, DepId};
pub use observer::{define_reactive, del, depend_array, observe, set, Observer, PropKey, ReactiveObject, SetterHook};
pub use scheduler::{next_tick, next_tick_future, tick};
pub use subscriber::{Subscriber, WatcherId};
pub use traverse::traverse;
pub use value::Value;
pub use watcher::{BeforeHook, Callback, Getter, Watcher, WatcherBuilder, WatcherFlags};
