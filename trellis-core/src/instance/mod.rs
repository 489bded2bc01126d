//! Component Instances
//!
//! A [`Vm`] is a live component: merged options, reactive state partitions
//! (props, data, computed, injections), a render watcher, an event table and
//! the last rendered vnode tree.
//!
//! # How Initialization Works
//!
//! Creating an instance runs a fixed sequence, each step free to rely on the
//! ones before it:
//!
//! 1. parent/child wiring and the event table (listeners from the
//!    placeholder become instance listeners)
//! 2. slots resolved from the placeholder's children
//! 3. `before_create`
//! 4. injections
//! 5. props, methods, data, computed, watch
//! 6. provided values
//! 7. `created`
//!
//! [`Vm::mount`] then runs `before_mount`, builds the render watcher (whose
//! first evaluation renders and patches) and, for root instances, `mounted`.
//! Child instances report `mounted` through the patch engine's insert queue,
//! once their parent has inserted them.
//!
//! # Ownership
//!
//! Instances live in the [`arena`]. Parents list their children by id;
//! children, watchers and vnodes refer back by id only. Destroying an
//! instance releases it from the arena.

pub mod arena;
mod events;
mod inject;
pub mod keep_alive;
pub mod lifecycle;
mod options;
mod props;
mod render;
mod state;

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

pub use arena::ComponentId;
pub use events::EventNames;
pub use keep_alive::keep_alive;
pub use options::{
    ComponentDef, ComponentOptions, ComputedDef, ComputedFn, ComputedSetFn, DataFn, ErrorCapturedFn, HookFn,
    InjectDef, LifecycleHook, MethodFn, ProvideFn, RenderErrorFn, RenderFn, WatchDef, WatchFn, WatchHandler,
};
pub use props::{hyphenate, DefaultFn, PropDef, PropDefault, PropType, ValidatorFn};
pub use render::CreateElement;
pub use state::{Unwatch, WatchSource};

use crate::error::{BoxError, Error};
use crate::reactive::{self, Computed, PropKey, ReactiveObject, Value, Watcher, WatcherId};
use crate::vdom::{handler, Handler, InsertEntry, NodeId, Patcher, RefTarget, VNode};

/// Where an instance is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Created,
    Mounting,
    Mounted,
    Updating,
    BeingDestroyed,
    Destroyed,
}

/// A registered `ref`: a single target, or a list for refs in loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefValue {
    One(RefTarget),
    Many(Vec<RefTarget>),
}

#[derive(Debug)]
struct Flags {
    phase: Phase,
    is_mounted: bool,
    is_destroyed: bool,
    is_being_destroyed: bool,
    /// `None` until first activated or deactivated.
    inactive: Option<bool>,
    direct_inactive: bool,
    has_hook_event: bool,
}

struct Instance {
    id: ComponentId,
    def: ComponentDef,
    patcher: Patcher,
    parent: Option<ComponentId>,
    root: ComponentId,
    children: Mutex<Vec<ComponentId>>,
    flags: Mutex<Flags>,

    props: ReactiveObject,
    props_data: Mutex<IndexMap<String, Value>>,
    data: RwLock<ReactiveObject>,
    injected: ReactiveObject,
    computed: RwLock<IndexMap<String, Computed>>,
    provided: RwLock<IndexMap<String, Value>>,

    events: Mutex<IndexMap<String, Vec<events::Listener>>>,
    parent_listeners: Mutex<IndexMap<String, Handler>>,

    render_watcher: Mutex<Option<Watcher>>,
    watchers: Mutex<Vec<Watcher>>,

    /// The placeholder this instance was created for in its parent's tree.
    placeholder: Mutex<Option<VNode>>,
    /// Root of the last rendered tree.
    vnode: Mutex<Option<VNode>>,
    elm: Mutex<Option<NodeId>>,
    slots: Mutex<IndexMap<String, Vec<VNode>>>,
    refs: Mutex<IndexMap<String, RefValue>>,
    pending_insert: Mutex<Vec<InsertEntry>>,
    keep_alive: Mutex<keep_alive::Cache>,
}

/// A component instance.
///
/// Cloning a `Vm` creates another handle to the same instance.
#[derive(Clone)]
pub struct Vm {
    inner: Arc<Instance>,
}

impl Vm {
    /// Create a root instance.
    pub fn new(def: &ComponentDef, patcher: &Patcher) -> Vm {
        Self::with_props(def, patcher, IndexMap::new())
    }

    /// Create a root instance with props.
    pub fn with_props(def: &ComponentDef, patcher: &Patcher, props_data: IndexMap<String, Value>) -> Vm {
        Self::create(def.clone(), patcher.clone(), None, None, props_data)
    }

    /// Create the instance behind a component placeholder.
    pub(crate) fn for_placeholder(placeholder: &VNode, parent: Option<ComponentId>, patcher: &Patcher) -> Option<Vm> {
        let options = placeholder.component.as_deref()?;
        let def = options.def.clone();
        let props_data = options.props_data.clone();
        let mut stored = placeholder.clone();
        stored.elm = None;
        Some(Self::create(def, patcher.clone(), parent, Some(stored), props_data))
    }

    fn create(
        def: ComponentDef,
        patcher: Patcher,
        parent: Option<ComponentId>,
        placeholder: Option<VNode>,
        props_data: IndexMap<String, Value>,
    ) -> Vm {
        let id = ComponentId::new();

        // Abstract ancestors are skipped.
        let mut parent = parent.and_then(arena::get);
        if !def.is_abstract() {
            while let Some(p) = parent.clone() {
                if !p.def().is_abstract() {
                    break;
                }
                match p.parent() {
                    Some(next) => parent = Some(next),
                    None => break,
                }
            }
        }
        let root = parent.as_ref().map(|p| p.inner.root).unwrap_or(id);

        let vm = Vm {
            inner: Arc::new(Instance {
                id,
                def,
                patcher,
                parent: parent.as_ref().map(Vm::id),
                root,
                children: Mutex::new(Vec::new()),
                flags: Mutex::new(Flags {
                    phase: Phase::Initializing,
                    is_mounted: false,
                    is_destroyed: false,
                    is_being_destroyed: false,
                    inactive: None,
                    direct_inactive: false,
                    has_hook_event: false,
                }),
                props: ReactiveObject::new(),
                props_data: Mutex::new(props_data),
                data: RwLock::new(ReactiveObject::new()),
                injected: ReactiveObject::new(),
                computed: RwLock::new(IndexMap::new()),
                provided: RwLock::new(IndexMap::new()),
                events: Mutex::new(IndexMap::new()),
                parent_listeners: Mutex::new(IndexMap::new()),
                render_watcher: Mutex::new(None),
                watchers: Mutex::new(Vec::new()),
                placeholder: Mutex::new(placeholder),
                vnode: Mutex::new(None),
                elm: Mutex::new(None),
                slots: Mutex::new(IndexMap::new()),
                refs: Mutex::new(IndexMap::new()),
                pending_insert: Mutex::new(Vec::new()),
                keep_alive: Mutex::new(keep_alive::Cache::default()),
            }),
        };

        arena::register(&vm);
        if let Some(parent) = &parent {
            if !vm.def().is_abstract() {
                parent.inner.children.lock().push(id);
            }
        }
        tracing::debug!(component = %id, name = ?vm.name(), "creating component");

        lifecycle::init(&vm);
        vm
    }

    /// Mount the instance, replacing `target` when given.
    pub fn mount(&self, target: Option<NodeId>) -> &Self {
        *self.inner.elm.lock() = target;
        lifecycle::mount_component(self);
        self
    }

    /// Tear the instance down. Idempotent.
    pub fn destroy(&self) {
        lifecycle::destroy(self);
    }

    /// Queue a re-render.
    pub fn force_update(&self) {
        let watcher = self.inner.render_watcher.lock().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    /// Run `callback` on the next tick with this instance.
    pub fn next_tick(&self, callback: impl FnOnce(&Vm) + 'static) {
        let id = self.id();
        reactive::next_tick(move || {
            if let Some(vm) = arena::get(id) {
                callback(&vm);
            }
        });
    }

    pub fn id(&self) -> ComponentId {
        self.inner.id
    }

    pub fn def(&self) -> &ComponentDef {
        &self.inner.def
    }

    pub fn name(&self) -> Option<String> {
        self.def().name().map(str::to_string).or_else(|| {
            self.inner
                .placeholder
                .lock()
                .as_ref()
                .and_then(|p| p.component_options())
                .and_then(|c| c.tag.clone())
        })
    }

    pub fn patcher(&self) -> &Patcher {
        &self.inner.patcher
    }

    pub fn parent(&self) -> Option<Vm> {
        self.inner.parent.and_then(arena::get)
    }

    pub fn parent_id(&self) -> Option<ComponentId> {
        self.inner.parent
    }

    pub fn root_id(&self) -> ComponentId {
        self.inner.root
    }

    pub fn children(&self) -> Vec<ComponentId> {
        self.inner.children.lock().clone()
    }

    pub fn phase(&self) -> Phase {
        self.inner.flags.lock().phase
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.flags.lock().is_mounted
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.flags.lock().is_destroyed
    }

    pub fn is_being_destroyed(&self) -> bool {
        self.inner.flags.lock().is_being_destroyed
    }

    /// Whether a keep-alive ancestor has this instance deactivated.
    pub fn is_inactive(&self) -> bool {
        self.inner.flags.lock().inactive == Some(true)
    }

    /// Root platform node of the rendered tree.
    pub fn el(&self) -> Option<NodeId> {
        *self.inner.elm.lock()
    }

    /// Whether this instance was created for a placeholder in a parent tree.
    pub fn has_placeholder(&self) -> bool {
        self.inner.placeholder.lock().is_some()
    }

    /// A copy of the last rendered tree.
    pub fn vnode(&self) -> Option<VNode> {
        self.inner.vnode.lock().clone()
    }

    pub fn render_watcher(&self) -> Option<Watcher> {
        self.inner.render_watcher.lock().clone()
    }

    /// Watchers owned by this instance besides the render watcher.
    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }

    pub fn props(&self) -> ReactiveObject {
        self.inner.props.clone()
    }

    pub fn data(&self) -> ReactiveObject {
        self.inner.data.read().clone()
    }

    /// Read state the way a render function sees it: computed, then data,
    /// then props, then injections. Reads are tracked.
    pub fn get(&self, key: &str) -> Value {
        let computed = self.inner.computed.read().get(key).cloned();
        if let Some(computed) = computed {
            return computed.get();
        }
        let data = self.data();
        if data.contains_key(key) {
            return data.get(key);
        }
        if self.inner.props.contains_key(key) {
            return self.inner.props.get(key);
        }
        if self.inner.injected.contains_key(key) {
            return self.inner.injected.get(key);
        }
        Value::Null
    }

    /// Write state: data, props (warning when a child mutates its own prop),
    /// a computed setter, or an injection.
    pub fn assign(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let computed = self.inner.computed.read().get(key).cloned();
        if let Some(computed) = computed {
            if !computed.set(value) {
                crate::runtime::warn(
                    format!("Computed property \"{key}\" was assigned to but it has no setter."),
                    Some(self.id()),
                );
            }
            return;
        }
        let data = self.data();
        if data.contains_key(key) {
            data.assign(key, value);
        } else if self.inner.props.contains_key(key) {
            self.inner.props.assign(key, value);
        } else if self.inner.injected.contains_key(key) {
            self.inner.injected.assign(key, value);
        } else {
            crate::runtime::warn(
                format!("Property \"{key}\" is not defined on the instance; declare it in data."),
                Some(self.id()),
            );
        }
    }

    /// Reactively add a property to a nested object or write an array index.
    pub fn set(&self, target: &Value, key: impl Into<PropKey>, value: impl Into<Value>) -> Value {
        reactive::set(target, key, value.into())
    }

    /// Reactively remove a property or array element.
    pub fn delete(&self, target: &Value, key: impl Into<PropKey>) {
        reactive::del(target, key)
    }

    /// Call a method.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, Error> {
        let f = self
            .def()
            .options()
            .methods
            .get(method)
            .cloned()
            .ok_or_else(|| Error::UnknownMethod(method.to_string()))?;
        f(self, args).map_err(|source| Error::user(format!("method \"{method}\""), source))
    }

    /// A listener that calls `method` on this instance, for `VNodeData::on`.
    pub fn method_handler(&self, method: &str) -> Handler {
        let id = self.id();
        let method = method.to_string();
        handler(move |args| {
            let vm = arena::get(id).ok_or(Error::InstanceGone(id))?;
            vm.call(&method, args).map(|_| ()).map_err(|e| -> BoxError { Box::new(e) })
        })
    }

    /// Slot content passed by the parent.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.inner.slots.lock().get(name).cloned().unwrap_or_default()
    }

    pub fn has_slot(&self, name: &str) -> bool {
        self.inner.slots.lock().contains_key(name)
    }

    pub fn ref_target(&self, name: &str) -> Option<RefValue> {
        self.inner.refs.lock().get(name).cloned()
    }

    /// A value provided by this instance.
    pub fn provided(&self, key: &str) -> Option<Value> {
        self.inner.provided.read().get(key).cloned()
    }

    // ---- crate internals ----

    pub(crate) fn raw_props_data(&self) -> IndexMap<String, Value> {
        self.inner.props_data.lock().clone()
    }

    pub(crate) fn injected(&self) -> &ReactiveObject {
        &self.inner.injected
    }

    pub(crate) fn placeholder(&self) -> Option<VNode> {
        self.inner.placeholder.lock().clone()
    }

    pub(crate) fn set_el(&self, elm: Option<NodeId>) {
        *self.inner.elm.lock() = elm;
    }

    pub(crate) fn add_watcher(&self, watcher: Watcher) {
        self.inner.watchers.lock().push(watcher);
    }

    pub(crate) fn forget_watcher(&self, id: WatcherId) {
        self.inner.watchers.lock().retain(|w| w.id() != id);
    }

    pub(crate) fn remove_child(&self, id: ComponentId) {
        self.inner.children.lock().retain(|c| *c != id);
    }

    pub(crate) fn add_ref(&self, name: &str, target: RefTarget, in_for: bool) {
        let mut refs = self.inner.refs.lock();
        if !in_for {
            refs.insert(name.to_string(), RefValue::One(target));
            return;
        }
        match refs.get_mut(name) {
            Some(RefValue::Many(list)) => {
                if !list.contains(&target) {
                    list.push(target);
                }
            }
            _ => {
                refs.insert(name.to_string(), RefValue::Many(vec![target]));
            }
        }
    }

    pub(crate) fn remove_ref(&self, name: &str, target: RefTarget) {
        let mut refs = self.inner.refs.lock();
        let remove = match refs.get_mut(name) {
            Some(RefValue::One(current)) => *current == target,
            Some(RefValue::Many(list)) => {
                list.retain(|t| *t != target);
                false
            }
            None => false,
        };
        if remove {
            refs.shift_remove(name);
        }
    }

    pub(crate) fn take_pending_insert(&self) -> Vec<InsertEntry> {
        std::mem::take(&mut *self.inner.pending_insert.lock())
    }

    pub(crate) fn set_pending_insert(&self, queue: Vec<InsertEntry>) {
        *self.inner.pending_insert.lock() = queue;
    }

    /// Shape of the rendered root: whether it is an element, and the
    /// instance behind it when it is a component placeholder.
    pub(crate) fn root_shape(&self) -> Option<(bool, Option<ComponentId>)> {
        self.inner
            .vnode
            .lock()
            .as_ref()
            .map(|v| (v.tag.is_some(), v.component_instance))
    }
}

impl PartialEq for Vm {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Vm {}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("id", &self.inner.id)
            .field("name", &self.name())
            .field("phase", &self.phase())
            .finish()
    }
}
