//! Component options and definitions.
//!
//! [`ComponentOptions`] is the builder users fill in. Building it resolves
//! `extends` and `mixins` into one flat [`OptionSet`] and freezes it into a
//! [`ComponentDef`], the immutable, cheaply cloned definition instances are
//! created from.
//!
//! # Merge Strategies
//!
//! Sources are merged parent-first (`extends`, then each mixin in order, then
//! the options themselves):
//!
//! - lifecycle hooks, watch handlers, `error_captured` hooks and provide
//!   factories concatenate, parent entries running first; a lifecycle hook
//!   reached through more than one source is kept once,
//! - data factories concatenate and are merged at instantiation, the child
//!   winning on conflicting keys,
//! - props, methods, computed, inject and components overwrite by key,
//! - name, render, render_error and scope id take the child's value when set.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use indexmap::IndexMap;

use super::props::{PropDef, PropDefault};
use super::render::CreateElement;
use super::{ComponentId, Vm};
use crate::error::{BoxError, Error};
use crate::reactive::Value;
use crate::vdom::Rendered;

pub type DataFn = Arc<dyn Fn(&Vm) -> Result<Value, BoxError> + Send + Sync>;
pub type HookFn = Arc<dyn Fn(&Vm) -> Result<(), BoxError> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&Vm, &[Value]) -> Result<Value, BoxError> + Send + Sync>;
pub type ComputedFn = Arc<dyn Fn(&Vm) -> Result<Value, BoxError> + Send + Sync>;
pub type ComputedSetFn = Arc<dyn Fn(&Vm, Value) -> Result<(), BoxError> + Send + Sync>;
pub type WatchFn = Arc<dyn Fn(&Vm, &Value, &Value) -> Result<(), BoxError> + Send + Sync>;
pub type RenderFn = Arc<dyn Fn(&Vm, &CreateElement) -> Result<Rendered, BoxError> + Send + Sync>;
pub type RenderErrorFn = Arc<dyn Fn(&Vm, &CreateElement, &Error) -> Result<Rendered, BoxError> + Send + Sync>;
pub type ErrorCapturedFn = Arc<dyn Fn(&Vm, &Error, ComponentId) -> Result<bool, BoxError> + Send + Sync>;
pub type ProvideFn = Arc<dyn Fn(&Vm) -> Result<IndexMap<String, Value>, BoxError> + Send + Sync>;

/// Lifecycle hooks, in the order an instance passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleHook {
    BeforeCreate,
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl LifecycleHook {
    pub fn name(self) -> &'static str {
        match self {
            LifecycleHook::BeforeCreate => "before_create",
            LifecycleHook::Created => "created",
            LifecycleHook::BeforeMount => "before_mount",
            LifecycleHook::Mounted => "mounted",
            LifecycleHook::BeforeUpdate => "before_update",
            LifecycleHook::Updated => "updated",
            LifecycleHook::Activated => "activated",
            LifecycleHook::Deactivated => "deactivated",
            LifecycleHook::BeforeDestroy => "before_destroy",
            LifecycleHook::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for LifecycleHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A computed property definition.
#[derive(Clone)]
pub enum ComputedDef {
    /// Cached, read-only.
    Getter(ComputedFn),
    Accessor {
        get: ComputedFn,
        set: Option<ComputedSetFn>,
        /// When false the getter runs on every read.
        cache: bool,
    },
}

impl ComputedDef {
    pub(crate) fn getter(&self) -> &ComputedFn {
        match self {
            ComputedDef::Getter(get) | ComputedDef::Accessor { get, .. } => get,
        }
    }

    pub(crate) fn setter(&self) -> Option<&ComputedSetFn> {
        match self {
            ComputedDef::Getter(_) => None,
            ComputedDef::Accessor { set, .. } => set.as_ref(),
        }
    }

    pub(crate) fn is_cached(&self) -> bool {
        match self {
            ComputedDef::Getter(_) => true,
            ComputedDef::Accessor { cache, .. } => *cache,
        }
    }
}

/// What a watch entry calls.
#[derive(Clone)]
pub enum WatchHandler {
    Callback(WatchFn),
    /// A method of the component, looked up by name.
    Method(String),
}

/// One handler of a `watch` option.
#[derive(Clone)]
pub struct WatchDef {
    pub handler: WatchHandler,
    pub deep: bool,
    pub immediate: bool,
    pub sync: bool,
}

impl WatchDef {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&Vm, &Value, &Value) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Self::with_handler(WatchHandler::Callback(Arc::new(handler)))
    }

    /// Call the method `name` with `(new, old)`.
    pub fn method(name: impl Into<String>) -> Self {
        Self::with_handler(WatchHandler::Method(name.into()))
    }

    fn with_handler(handler: WatchHandler) -> Self {
        Self {
            handler,
            deep: false,
            immediate: false,
            sync: false,
        }
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn sync(mut self) -> Self {
        self.sync = true;
        self
    }
}

/// An injected key.
#[derive(Clone)]
pub struct InjectDef {
    /// Provided key to look up, defaults to the local name.
    pub from: Option<String>,
    pub default: Option<PropDefault>,
}

impl InjectDef {
    pub fn new() -> Self {
        Self {
            from: None,
            default: None,
        }
    }

    pub fn from(mut self, key: impl Into<String>) -> Self {
        self.from = Some(key.into());
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(PropDefault::Value(value.into()));
        self
    }

    pub fn default_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Vm) -> Value + Send + Sync + 'static,
    {
        self.default = Some(PropDefault::Factory(Arc::new(factory)));
        self
    }
}

impl Default for InjectDef {
    fn default() -> Self {
        Self::new()
    }
}

/// Flat, merged options.
#[derive(Clone, Default)]
pub(crate) struct OptionSet {
    pub name: Option<String>,
    pub data: Vec<DataFn>,
    pub props: IndexMap<String, PropDef>,
    pub methods: IndexMap<String, MethodFn>,
    pub computed: IndexMap<String, ComputedDef>,
    pub watch: IndexMap<String, Vec<WatchDef>>,
    pub hooks: HashMap<LifecycleHook, Vec<HookFn>>,
    pub render: Option<RenderFn>,
    pub render_error: Option<RenderErrorFn>,
    pub error_captured: Vec<ErrorCapturedFn>,
    pub provide: Vec<ProvideFn>,
    pub inject: IndexMap<String, InjectDef>,
    pub components: IndexMap<String, ComponentDef>,
    pub is_abstract: bool,
    pub scope_id: Option<String>,
}

impl OptionSet {
    /// `self` as parent, `child` on top.
    fn merge(&self, child: &OptionSet) -> OptionSet {
        let mut merged = self.clone();

        if child.name.is_some() {
            merged.name = child.name.clone();
        }
        merged.data.extend(child.data.iter().cloned());
        merged.props.extend(child.props.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.methods.extend(child.methods.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.computed.extend(child.computed.iter().map(|(k, v)| (k.clone(), v.clone())));
        for (key, defs) in &child.watch {
            merged.watch.entry(key.clone()).or_default().extend(defs.iter().cloned());
        }
        for (hook, handlers) in &child.hooks {
            let merged_handlers = merged.hooks.entry(*hook).or_default();
            for handler in handlers {
                if !merged_handlers.iter().any(|h| Arc::ptr_eq(h, handler)) {
                    merged_handlers.push(handler.clone());
                }
            }
        }
        if child.render.is_some() {
            merged.render = child.render.clone();
        }
        if child.render_error.is_some() {
            merged.render_error = child.render_error.clone();
        }
        merged.error_captured.extend(child.error_captured.iter().cloned());
        merged.provide.extend(child.provide.iter().cloned());
        merged.inject.extend(child.inject.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
            .components
            .extend(child.components.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged.is_abstract |= child.is_abstract;
        if child.scope_id.is_some() {
            merged.scope_id = child.scope_id.clone();
        }
        merged
    }
}

/// Builder for a component definition.
#[derive(Default)]
pub struct ComponentOptions {
    own: OptionSet,
    mixins: Vec<ComponentDef>,
    extends: Option<ComponentDef>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.own.name = Some(name.into());
        self
    }

    /// Data factory. Must return an object.
    pub fn data<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.own.data.push(Arc::new(factory));
        self
    }

    pub fn prop(mut self, name: impl Into<String>, def: PropDef) -> Self {
        self.own.props.insert(name.into(), def);
        self
    }

    pub fn method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&Vm, &[Value]) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.own.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Cached, read-only computed property.
    pub fn computed<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn(&Vm) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.own
            .computed
            .insert(name.into(), ComputedDef::Getter(Arc::new(getter)));
        self
    }

    pub fn computed_def(mut self, name: impl Into<String>, def: ComputedDef) -> Self {
        self.own.computed.insert(name.into(), def);
        self
    }

    pub fn watch(mut self, path: impl Into<String>, def: WatchDef) -> Self {
        self.own.watch.entry(path.into()).or_default().push(def);
        self
    }

    pub fn hook<F>(mut self, hook: LifecycleHook, handler: F) -> Self
    where
        F: Fn(&Vm) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.own.hooks.entry(hook).or_default().push(Arc::new(handler));
        self
    }

    pub fn render<F>(mut self, render: F) -> Self
    where
        F: Fn(&Vm, &CreateElement) -> Result<Rendered, BoxError> + Send + Sync + 'static,
    {
        self.own.render = Some(Arc::new(render));
        self
    }

    /// Render used in place of the failed one when `render` errors.
    pub fn render_error<F>(mut self, render: F) -> Self
    where
        F: Fn(&Vm, &CreateElement, &Error) -> Result<Rendered, BoxError> + Send + Sync + 'static,
    {
        self.own.render_error = Some(Arc::new(render));
        self
    }

    /// Called with errors raised by descendants. `Ok(false)` stops
    /// propagation.
    pub fn error_captured<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Vm, &Error, ComponentId) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        self.own.error_captured.push(Arc::new(hook));
        self
    }

    pub fn provide<F>(mut self, provide: F) -> Self
    where
        F: Fn(&Vm) -> Result<IndexMap<String, Value>, BoxError> + Send + Sync + 'static,
    {
        self.own.provide.push(Arc::new(provide));
        self
    }

    pub fn inject(mut self, name: impl Into<String>, def: InjectDef) -> Self {
        self.own.inject.insert(name.into(), def);
        self
    }

    /// Register a child component under `name` for this component's render.
    pub fn component(mut self, name: impl Into<String>, def: ComponentDef) -> Self {
        self.own.components.insert(name.into(), def);
        self
    }

    pub fn mixin(mut self, mixin: ComponentDef) -> Self {
        self.mixins.push(mixin);
        self
    }

    pub fn extends(mut self, base: ComponentDef) -> Self {
        self.extends = Some(base);
        self
    }

    /// Abstract components are skipped in the parent chain.
    pub fn abstract_component(mut self) -> Self {
        self.own.is_abstract = true;
        self
    }

    pub fn scope_id(mut self, scope_id: impl Into<String>) -> Self {
        self.own.scope_id = Some(scope_id.into());
        self
    }

    /// Merge `extends`, mixins and own options into a definition.
    pub fn build(self) -> ComponentDef {
        let mut merged = match &self.extends {
            Some(base) => base.inner.options.clone(),
            None => OptionSet::default(),
        };
        for mixin in &self.mixins {
            merged = merged.merge(&mixin.inner.options);
        }
        merged = merged.merge(&self.own);
        ComponentDef::from_options(merged)
    }
}

struct DefInner {
    cid: u64,
    options: OptionSet,
}

/// An immutable, merged component definition.
///
/// Cloning a `ComponentDef` creates another handle to the same definition.
#[derive(Clone)]
pub struct ComponentDef {
    inner: Arc<DefInner>,
}

fn extend_cache() -> &'static DashMap<(u64, u64), ComponentDef> {
    static CACHE: OnceLock<DashMap<(u64, u64), ComponentDef>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

impl ComponentDef {
    fn from_options(options: OptionSet) -> Self {
        static CID: AtomicU64 = AtomicU64::new(1);
        Self {
            inner: Arc::new(DefInner {
                cid: CID.fetch_add(1, Ordering::Relaxed),
                options,
            }),
        }
    }

    /// A definition with `child` merged on top of this one.
    ///
    /// Memoized per (base, child) pair, so extending the same definitions
    /// twice yields the same `cid`.
    pub fn extend(&self, child: &ComponentDef) -> ComponentDef {
        let key = (self.cid(), child.cid());
        if let Some(def) = extend_cache().get(&key) {
            return def.value().clone();
        }
        let def = ComponentDef::from_options(self.inner.options.merge(&child.inner.options));
        extend_cache().entry(key).or_insert(def).value().clone()
    }

    /// Definition id.
    pub fn cid(&self) -> u64 {
        self.inner.cid
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.options.name.as_deref()
    }

    pub fn scope_id(&self) -> Option<&str> {
        self.inner.options.scope_id.as_deref()
    }

    pub fn is_abstract(&self) -> bool {
        self.inner.options.is_abstract
    }

    pub fn hooks(&self, hook: LifecycleHook) -> &[HookFn] {
        self.inner.options.hooks.get(&hook).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_captured_hooks(&self) -> &[ErrorCapturedFn] {
        &self.inner.options.error_captured
    }

    pub fn has_prop(&self, name: &str) -> bool {
        self.inner.options.props.contains_key(name)
    }

    /// A locally registered child component.
    pub fn resolve_component(&self, name: &str) -> Option<ComponentDef> {
        let components = &self.inner.options.components;
        components
            .get(name)
            .or_else(|| components.get(&super::props::hyphenate(name)))
            .cloned()
    }

    pub fn ptr_eq(&self, other: &ComponentDef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn options(&self) -> &OptionSet {
        &self.inner.options
    }
}

impl fmt::Debug for ComponentDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentDef")
            .field("cid", &self.inner.cid)
            .field("name", &self.inner.options.name)
            .finish()
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_hook(_: &Vm) -> Result<(), BoxError> {
        Ok(())
    }

    #[test]
    fn hooks_concatenate_parent_first() {
        let base = ComponentOptions::new()
            .hook(LifecycleHook::Created, noop_hook)
            .build();
        let mixin = ComponentOptions::new()
            .hook(LifecycleHook::Created, noop_hook)
            .build();
        let def = ComponentOptions::new()
            .extends(base)
            .mixin(mixin)
            .hook(LifecycleHook::Created, noop_hook)
            .hook(LifecycleHook::Mounted, noop_hook)
            .build();

        assert_eq!(def.hooks(LifecycleHook::Created).len(), 3);
        assert_eq!(def.hooks(LifecycleHook::Mounted).len(), 1);
        assert!(def.hooks(LifecycleHook::Destroyed).is_empty());
    }

    #[test]
    fn shared_mixin_hooks_are_kept_once() {
        let shared = ComponentOptions::new()
            .hook(LifecycleHook::Created, noop_hook)
            .build();
        let base = ComponentOptions::new().mixin(shared.clone()).build();
        let def = ComponentOptions::new()
            .extends(base)
            .mixin(shared)
            .hook(LifecycleHook::Created, noop_hook)
            .build();

        assert_eq!(def.hooks(LifecycleHook::Created).len(), 2);
    }

    #[test]
    fn child_overrides_scalar_options() {
        let base = ComponentOptions::new().name("base").scope_id("data-v-base").build();
        let def = ComponentOptions::new().extends(base.clone()).name("child").build();

        assert_eq!(def.name(), Some("child"));
        assert_eq!(def.scope_id(), Some("data-v-base"));
        assert_ne!(def.cid(), base.cid());
    }

    #[test]
    fn watch_entries_accumulate() {
        let mixin = ComponentOptions::new().watch("a", WatchDef::method("onA")).build();
        let def = ComponentOptions::new()
            .mixin(mixin)
            .watch("a", WatchDef::method("alsoOnA"))
            .build();
        assert_eq!(def.options().watch["a"].len(), 2);
    }

    #[test]
    fn extend_is_memoized() {
        let base = ComponentOptions::new().name("base").build();
        let child = ComponentOptions::new().name("child").build();

        let a = base.extend(&child);
        let b = base.extend(&child);

        assert!(a.ptr_eq(&b));
        assert_eq!(a.name(), Some("child"));
    }

    #[test]
    fn components_resolve_by_hyphenated_name() {
        let child = ComponentOptions::new().name("MyChild").build();
        let def = ComponentOptions::new().component("my-child", child.clone()).build();

        assert!(def.resolve_component("myChild").is_some_and(|d| d.ptr_eq(&child)));
        assert!(def.resolve_component("other").is_none());
    }

    #[test]
    fn hook_names() {
        assert_eq!(LifecycleHook::BeforeDestroy.name(), "before_destroy");
        assert_eq!(LifecycleHook::Mounted.to_string(), "mounted");
    }
}
