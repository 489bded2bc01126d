//! Watcher Implementation
//!
//! A Watcher evaluates a getter while collecting the deps it reads, and
//! reacts when any of them notifies. Render watchers, computed properties
//! and user watches are all watchers with different flags.
//!
//! # How Watchers Work
//!
//! 1. `get` pushes the watcher as the evaluation target, runs the getter,
//!    optionally deep-traverses the result, then pops.
//!
//! 2. Every dep read during evaluation lands in `new_deps`. Afterwards
//!    `cleanup_deps` unsubscribes from deps that were not read this time and
//!    rotates the sets, so a conditional branch that stops reading a
//!    property stops depending on it.
//!
//! 3. On notification:
//!    - lazy watchers only mark themselves dirty,
//!    - sync watchers run immediately,
//!    - everything else goes to the scheduler queue.
//!
//! # Locking
//!
//! The state mutex is never held while the getter, the callback or a dep
//! runs. Getters re-enter the watcher through `add_dep`.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::dep::{Dep, DepId};
use super::scheduler;
use super::subscriber::{Subscriber, WatcherId};
use super::traverse::traverse;
use super::value::Value;
use crate::error::{handle_error, invoke_with_error_handling, BoxError, Error};
use crate::instance::{arena, ComponentId};

/// Produces the watched value.
pub type Getter = Arc<dyn Fn() -> Result<Value, BoxError> + Send + Sync>;

/// Receives `(new, old)` after a run that changed the value.
pub type Callback = Arc<dyn Fn(&Value, &Value) -> Result<(), BoxError> + Send + Sync>;

/// Runs right before a queued watcher runs during a flush.
pub type BeforeHook = Arc<dyn Fn() + Send + Sync>;

/// Flags controlling how a watcher reacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherFlags {
    /// Traverse the value so nested mutations notify.
    pub deep: bool,
    /// Created by user code; callback errors are attributed to the watch.
    pub user: bool,
    /// Computed-style: evaluate on demand, only mark dirty on notify.
    pub lazy: bool,
    /// Run synchronously on notify instead of queueing.
    pub sync: bool,
}

struct WatcherState {
    value: Value,
    dirty: bool,
    active: bool,
    deps: SmallVec<[Dep; 4]>,
    new_deps: SmallVec<[Dep; 4]>,
    dep_ids: HashSet<DepId>,
    new_dep_ids: HashSet<DepId>,
    run_count: usize,
}

struct WatcherInner {
    id: WatcherId,
    owner: Option<ComponentId>,
    expression: String,
    getter: Getter,
    callback: Option<Callback>,
    before: Option<BeforeHook>,
    flags: WatcherFlags,
    is_render: bool,
    state: Mutex<WatcherState>,
}

impl Subscriber for WatcherInner {
    fn id(&self) -> WatcherId {
        self.id
    }

    fn update(self: Arc<Self>) {
        Watcher { inner: self }.update();
    }
}

/// Builder for [`Watcher`].
pub struct WatcherBuilder {
    getter: Getter,
    callback: Option<Callback>,
    before: Option<BeforeHook>,
    owner: Option<ComponentId>,
    expression: String,
    flags: WatcherFlags,
    is_render: bool,
    deferred: bool,
}

impl WatcherBuilder {
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Value, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn before<F>(mut self, before: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(before));
        self
    }

    /// The component this watcher belongs to.
    pub fn owner(mut self, owner: ComponentId) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Human-readable source, used in warnings and errors.
    pub fn expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = expression.into();
        self
    }

    pub fn flags(mut self, flags: WatcherFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn deep(mut self) -> Self {
        self.flags.deep = true;
        self
    }

    pub fn user(mut self) -> Self {
        self.flags.user = true;
        self
    }

    pub fn lazy(mut self) -> Self {
        self.flags.lazy = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.flags.sync = true;
        self
    }

    /// Mark as the owner's render watcher.
    pub fn render(mut self) -> Self {
        self.is_render = true;
        self
    }

    /// Skip the initial evaluation; call [`Watcher::prime`] later.
    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Create the watcher and, unless lazy or deferred, evaluate it once.
    pub fn build(self) -> Watcher {
        let lazy = self.flags.lazy;
        let watcher = Watcher {
            inner: Arc::new(WatcherInner {
                id: WatcherId::new(),
                owner: self.owner,
                expression: self.expression,
                getter: self.getter,
                callback: self.callback,
                before: self.before,
                flags: self.flags,
                is_render: self.is_render,
                state: Mutex::new(WatcherState {
                    value: Value::Null,
                    dirty: lazy,
                    active: true,
                    deps: SmallVec::new(),
                    new_deps: SmallVec::new(),
                    dep_ids: HashSet::new(),
                    new_dep_ids: HashSet::new(),
                    run_count: 0,
                }),
            }),
        };

        if !lazy && !self.deferred {
            watcher.prime();
        }
        watcher
    }
}

/// A dependency-collecting evaluation with change notification.
///
/// Cloning a `Watcher` creates another handle to the same watcher.
#[derive(Clone)]
pub struct Watcher {
    inner: Arc<WatcherInner>,
}

impl Watcher {
    /// Start building a watcher around `getter`.
    pub fn builder<F>(getter: F) -> WatcherBuilder
    where
        F: Fn() -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        WatcherBuilder {
            getter: Arc::new(getter),
            callback: None,
            before: None,
            owner: None,
            expression: String::new(),
            flags: WatcherFlags::default(),
            is_render: false,
            deferred: false,
        }
    }

    pub fn id(&self) -> WatcherId {
        self.inner.id
    }

    pub fn owner(&self) -> Option<ComponentId> {
        self.inner.owner
    }

    pub fn expression(&self) -> &str {
        &self.inner.expression
    }

    pub fn flags(&self) -> WatcherFlags {
        self.inner.flags
    }

    pub fn is_render(&self) -> bool {
        self.inner.is_render
    }

    pub fn is_active(&self) -> bool {
        self.inner.state.lock().active
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.state.lock().dirty
    }

    /// The cached value from the last evaluation.
    pub fn value(&self) -> Value {
        self.inner.state.lock().value.clone()
    }

    /// Number of deps this watcher is subscribed to.
    pub fn dep_count(&self) -> usize {
        self.inner.state.lock().deps.len()
    }

    /// How many times `run` re-evaluated the getter.
    pub fn run_count(&self) -> usize {
        self.inner.state.lock().run_count
    }

    /// Evaluate once and store the value. Used after a deferred build.
    pub fn prime(&self) {
        let value = self.get();
        self.inner.state.lock().value = value;
    }

    /// Evaluate the getter while collecting dependencies.
    pub fn get(&self) -> Value {
        let value = {
            let _ctx = ReactiveContext::enter(Some(self.clone()));
            let value = match (self.inner.getter)() {
                Ok(value) => value,
                Err(source) => {
                    let info = if self.inner.flags.user {
                        format!("getter for watcher \"{}\"", self.inner.expression)
                    } else if self.inner.is_render {
                        "render watcher".to_string()
                    } else {
                        "watcher getter".to_string()
                    };
                    handle_error(&Error::user(info, source), self.inner.owner);
                    Value::Null
                }
            };
            // Deep watchers subscribe to every nested property.
            if self.inner.flags.deep {
                traverse(&value);
            }
            value
        };
        self.cleanup_deps();
        value
    }

    /// Record a dep read during evaluation; subscribe if it is new.
    pub fn add_dep(&self, dep: &Dep) {
        let id = dep.id();
        let subscribe = {
            let mut state = self.inner.state.lock();
            if state.new_dep_ids.insert(id) {
                state.new_deps.push(dep.clone());
                !state.dep_ids.contains(&id)
            } else {
                false
            }
        };
        if subscribe {
            dep.add_sub(&self.as_subscriber());
        }
    }

    /// Drop subscriptions that the last evaluation no longer read.
    fn cleanup_deps(&self) {
        let stale: Vec<Dep> = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let stale = state
                .deps
                .iter()
                .filter(|dep| !state.new_dep_ids.contains(&dep.id()))
                .cloned()
                .collect();
            std::mem::swap(&mut state.dep_ids, &mut state.new_dep_ids);
            state.new_dep_ids.clear();
            std::mem::swap(&mut state.deps, &mut state.new_deps);
            state.new_deps.clear();
            stale
        };
        for dep in stale {
            dep.remove_sub(self.id());
        }
    }

    /// React to a dependency change.
    pub fn update(&self) {
        if self.inner.flags.lazy {
            self.inner.state.lock().dirty = true;
        } else if self.inner.flags.sync {
            self.run();
        } else {
            scheduler::queue_watcher(self.clone());
        }
    }

    /// Re-evaluate and invoke the callback if the value changed.
    ///
    /// Object and array values always count as changed since they may have
    /// been mutated in place. Does nothing once torn down.
    pub fn run(&self) {
        if !self.is_active() {
            return;
        }

        let value = self.get();
        let old = {
            let mut state = self.inner.state.lock();
            state.run_count += 1;
            let changed = !value.same(&state.value) || value.is_container() || self.inner.flags.deep;
            if !changed {
                return;
            }
            std::mem::replace(&mut state.value, value.clone())
        };

        if let Some(callback) = &self.inner.callback {
            let info = if self.inner.flags.user {
                format!("callback for watcher \"{}\"", self.inner.expression)
            } else {
                "watcher callback".to_string()
            };
            invoke_with_error_handling(|| callback(&value, &old), self.inner.owner, info);
        }
    }

    /// Run the `before` hook, if any.
    pub fn run_before(&self) {
        if let Some(before) = &self.inner.before {
            before();
        }
    }

    /// Evaluate a lazy watcher and clear its dirty flag.
    pub fn evaluate(&self) {
        let value = self.get();
        let mut state = self.inner.state.lock();
        state.value = value;
        state.dirty = false;
    }

    /// Make the current evaluation target depend on everything this watcher
    /// depends on.
    pub fn depend(&self) {
        let deps: SmallVec<[Dep; 4]> = self.inner.state.lock().deps.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Unsubscribe from every dep and deactivate. Idempotent.
    pub fn teardown(&self) {
        let deps = {
            let mut state = self.inner.state.lock();
            if !state.active {
                return;
            }
            state.active = false;
            state.dep_ids.clear();
            std::mem::take(&mut state.deps)
        };

        // Removing from the owner's list is skipped while the owner is
        // being destroyed; it drops the whole list itself.
        if let Some(vm) = self.inner.owner.and_then(arena::get) {
            if !vm.is_being_destroyed() {
                vm.forget_watcher(self.id());
            }
        }

        for dep in deps {
            dep.remove_sub(self.id());
        }
    }

    fn as_subscriber(&self) -> Arc<dyn Subscriber> {
        self.inner.clone()
    }
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Watcher")
            .field("id", &self.inner.id)
            .field("expression", &self.inner.expression)
            .field("flags", &self.inner.flags)
            .field("render", &self.inner.is_render)
            .field("active", &state.active)
            .field("dirty", &state.dirty)
            .field("deps", &state.deps.len())
            .finish()
    }
}

// ---- Tests ----
