//! Lifecycle: initialization, mounting, updating, keep-alive activation and
//! destruction, plus the component hooks the patch engine calls.

use std::cell::Cell;

use super::{arena, events, inject, render, state, ComponentId, LifecycleHook, Phase, Vm};
use crate::error::invoke_with_error_handling;
use crate::reactive::scheduler::queue_activated_component;
use crate::reactive::{ReactiveContext, Value, Watcher};
use crate::runtime::warn;
use crate::vdom::{InsertEntry, OldVNode, Patcher, VNode};

thread_local! {
    static UPDATING_CHILD: Cell<bool> = const { Cell::new(false) };
}

/// Whether a parent is currently pushing new props into a child.
pub(crate) fn is_updating_child_component() -> bool {
    UPDATING_CHILD.with(Cell::get)
}

struct UpdatingChild {
    previous: bool,
}

impl UpdatingChild {
    fn enter() -> Self {
        Self {
            previous: UPDATING_CHILD.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for UpdatingChild {
    fn drop(&mut self) {
        UPDATING_CHILD.with(|flag| flag.set(self.previous));
    }
}

/// Run the initialization sequence up to `created`.
pub(crate) fn init(vm: &Vm) {
    events::init_events(vm);
    render::init_render(vm);
    call_hook(vm, LifecycleHook::BeforeCreate);
    inject::init_injections(vm);
    state::init_state(vm);
    inject::init_provide(vm);
    vm.inner.flags.lock().phase = Phase::Created;
    call_hook(vm, LifecycleHook::Created);
}

/// Invoke every handler of `hook`, then emit `hook:<name>` when a parent
/// listens for it. Dependency collection is suspended meanwhile.
pub fn call_hook(vm: &Vm, hook: LifecycleHook) {
    let _ctx = ReactiveContext::suspend();
    for handler in vm.def().hooks(hook) {
        invoke_with_error_handling(|| handler(vm), Some(vm.id()), format_args!("{hook} hook"));
    }
    if vm.inner.flags.lock().has_hook_event {
        vm.emit(format!("hook:{hook}"), &[]);
    }
}

pub(crate) fn mount_component(vm: &Vm) {
    if vm.def().options().render.is_none() {
        warn("Failed to mount component: render function not defined.", Some(vm.id()));
    }
    vm.inner.flags.lock().phase = Phase::Mounting;
    call_hook(vm, LifecycleHook::BeforeMount);

    let id = vm.id();
    let watcher = Watcher::builder(move || {
        if let Some(vm) = arena::get(id) {
            let vnode = render::render(&vm);
            update(&vm, vnode);
        }
        Ok(Value::Null)
    })
    .owner(id)
    .expression("render")
    .render()
    .deferred()
    .before(move || {
        if let Some(vm) = arena::get(id) {
            if vm.is_mounted() && !vm.is_destroyed() {
                call_hook(&vm, LifecycleHook::BeforeUpdate);
            }
        }
    })
    .build();

    // Stored before the first evaluation: a child's mounted hook may force
    // this instance to update.
    *vm.inner.render_watcher.lock() = Some(watcher.clone());
    watcher.prime();

    if !vm.has_placeholder() {
        mark_mounted(vm);
    }
}

fn mark_mounted(vm: &Vm) {
    {
        let mut flags = vm.inner.flags.lock();
        flags.is_mounted = true;
        flags.phase = Phase::Mounted;
    }
    tracing::debug!(component = %vm.id(), "mounted");
    call_hook(vm, LifecycleHook::Mounted);
}

/// Patch a freshly rendered tree against the previous one.
pub(crate) fn update(vm: &Vm, mut vnode: VNode) {
    let prev = vm.inner.vnode.lock().take();
    let updating = vm.is_mounted();
    if updating {
        vm.inner.flags.lock().phase = Phase::Updating;
    }

    let old = match prev {
        Some(prev) => Some(OldVNode::VNode(prev)),
        None => vm.el().map(OldVNode::Element),
    };
    let patcher: Patcher = vm.patcher().clone();
    let elm = patcher.patch(old, Some(&mut vnode), Some(vm.id()));

    *vm.inner.vnode.lock() = Some(vnode);
    vm.set_el(elm);
    if updating {
        let mut flags = vm.inner.flags.lock();
        if flags.phase == Phase::Updating {
            flags.phase = Phase::Mounted;
        }
    }

    // A parent whose root is this component shares its root node.
    let mut child = vm.clone();
    while let Some(parent) = child.parent() {
        let shares_root = parent
            .root_shape()
            .is_some_and(|(_, instance)| instance == Some(child.id()));
        if !shares_root {
            break;
        }
        parent.set_el(elm);
        child = parent;
    }
}

pub(crate) fn destroy(vm: &Vm) {
    if vm.is_being_destroyed() {
        return;
    }
    call_hook(vm, LifecycleHook::BeforeDestroy);
    {
        let mut flags = vm.inner.flags.lock();
        flags.is_being_destroyed = true;
        flags.phase = Phase::BeingDestroyed;
    }
    tracing::debug!(component = %vm.id(), "destroying");

    if let Some(parent) = vm.parent() {
        if !parent.is_being_destroyed() && !vm.def().is_abstract() {
            parent.remove_child(vm.id());
        }
    }

    let render_watcher = vm.inner.render_watcher.lock().clone();
    if let Some(watcher) = render_watcher {
        watcher.teardown();
    }
    let watchers = std::mem::take(&mut *vm.inner.watchers.lock());
    for watcher in watchers.iter().rev() {
        watcher.teardown();
    }
    if let Some(observer) = vm.data().observer() {
        observer.release_root();
    }
    vm.inner.flags.lock().is_destroyed = true;

    // Destroy hooks on the rendered tree tear down child components.
    let prev = vm.inner.vnode.lock().take();
    if let Some(prev) = prev {
        vm.patcher().patch(Some(OldVNode::VNode(prev)), None, Some(vm.id()));
    }
    if let Some(elm) = vm.el() {
        let ops = vm.patcher().ops().clone();
        if vm.parent_id().is_none() && !vm.has_placeholder() {
            if let Some(parent) = ops.parent_node(elm) {
                ops.remove_child(parent, elm);
            }
        }
        // Detached roots of pruned cache entries are otherwise never freed.
        if ops.parent_node(elm).is_none() {
            ops.discard(elm);
        }
    }

    call_hook(vm, LifecycleHook::Destroyed);
    vm.off_all();
    vm.inner.flags.lock().phase = Phase::Destroyed;
    arena::release(vm.id());
}

// ---- Component placeholder hooks ----

/// Create (or reactivate) the instance behind a placeholder.
pub(crate) fn init_component(vnode: &mut VNode, owner: Option<ComponentId>, patcher: &Patcher) {
    if vnode.is_keep_alive() {
        if let Some(vm) = vnode.component_instance.and_then(arena::get) {
            if !vm.is_destroyed() {
                update_child_component(&vm, vnode);
                return;
            }
        }
    }

    match Vm::for_placeholder(vnode, owner, patcher) {
        Some(child) => {
            vnode.component_instance = Some(child.id());
            child.mount(None);
        }
        None => vnode.component_instance = None,
    }
}

/// Reuse the instance for a patched placeholder and push new inputs into it.
pub(crate) fn prepatch_component(old: &VNode, vnode: &mut VNode) {
    let Some(id) = old.component_instance else {
        return;
    };
    vnode.component_instance = Some(id);
    if let Some(vm) = arena::get(id) {
        update_child_component(&vm, vnode);
    }
}

/// The parent re-rendered: update props, listeners and slots of `vm`.
pub(crate) fn update_child_component(vm: &Vm, vnode: &VNode) {
    let Some(options) = vnode.component_options() else {
        return;
    };
    let had_slots = vm
        .placeholder()
        .and_then(|p| p.component.map(|c| !c.children.is_empty()))
        .unwrap_or(false);
    let needs_force_update = had_slots || !options.children.is_empty();

    let mut stored = vnode.clone();
    stored.elm = None;
    *vm.inner.placeholder.lock() = Some(stored);

    {
        let _updating = UpdatingChild::enter();
        let props = vm.props();
        for (key, def) in &vm.def().options().props {
            let value = super::props::validate_prop(key, def, &options.props_data, vm);
            props.assign(key, value);
        }
        *vm.inner.props_data.lock() = options.props_data.clone();
    }

    let old_listeners = std::mem::replace(&mut *vm.inner.parent_listeners.lock(), options.listeners.clone());
    events::update_component_listeners(vm, &options.listeners, &old_listeners);

    if needs_force_update {
        render::set_slots(vm, &options.children, vnode.context);
        vm.force_update();
    }
}

/// A placeholder's subtree was inserted into the platform tree.
pub(crate) fn insert_component(entry: InsertEntry) {
    let Some(vm) = arena::get(entry.instance) else {
        return;
    };
    if !vm.is_mounted() {
        mark_mounted(&vm);
    }
    if entry.keep_alive {
        let context_mounted = entry
            .context
            .and_then(arena::get)
            .is_some_and(|context| context.is_mounted());
        if context_mounted {
            // The parent is mid-update; its children may still change, so
            // activation waits for the end of the flush.
            vm.inner.flags.lock().inactive = Some(false);
            queue_activated_component(vm.id());
        } else {
            activate_child_component(&vm, true);
        }
    }
}

/// A placeholder left the tree: destroy its instance, or deactivate it when
/// kept alive.
pub(crate) fn destroy_component(vnode: &VNode) {
    let Some(vm) = vnode.component_instance.and_then(arena::get) else {
        return;
    };
    if vm.is_destroyed() {
        return;
    }
    if vnode.is_keep_alive() {
        deactivate_child_component(&vm, true);
    } else {
        vm.destroy();
    }
}

// ---- Keep-alive activation ----

fn is_in_inactive_tree(vm: &Vm) -> bool {
    let mut current = vm.parent();
    while let Some(vm) = current {
        if vm.is_inactive() {
            return true;
        }
        current = vm.parent();
    }
    false
}

pub(crate) fn activate_child_component(vm: &Vm, direct: bool) {
    if direct {
        vm.inner.flags.lock().direct_inactive = false;
        if is_in_inactive_tree(vm) {
            return;
        }
    } else if vm.inner.flags.lock().direct_inactive {
        return;
    }

    let activate = {
        let mut flags = vm.inner.flags.lock();
        let activate = flags.inactive != Some(false);
        if activate {
            flags.inactive = Some(false);
        }
        activate
    };
    if activate {
        for child in vm.children().into_iter().filter_map(arena::get) {
            activate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Activated);
    }
}

pub(crate) fn deactivate_child_component(vm: &Vm, direct: bool) {
    if direct {
        vm.inner.flags.lock().direct_inactive = true;
        if is_in_inactive_tree(vm) {
            return;
        }
    }

    let deactivate = {
        let mut flags = vm.inner.flags.lock();
        let deactivate = flags.inactive != Some(true);
        if deactivate {
            flags.inactive = Some(true);
        }
        deactivate
    };
    if deactivate {
        for child in vm.children().into_iter().filter_map(arena::get) {
            deactivate_child_component(&child, false);
        }
        call_hook(vm, LifecycleHook::Deactivated);
    }
}

// ---- Scheduler callbacks ----

/// Fire `activated` for kept-alive components inserted during the flush.
pub(crate) fn call_activated_hooks(queue: Vec<ComponentId>) {
    for vm in queue.into_iter().filter_map(arena::get) {
        vm.inner.flags.lock().inactive = Some(true);
        activate_child_component(&vm, true);
    }
}

/// Fire `updated` for every mounted owner of a render watcher that ran,
/// children before parents.
pub(crate) fn call_updated_hooks(queue: &[Watcher]) {
    for watcher in queue.iter().rev() {
        if !watcher.is_render() {
            continue;
        }
        let Some(vm) = watcher.owner().and_then(arena::get) else {
            continue;
        };
        let is_current = vm
            .render_watcher()
            .is_some_and(|current| current.id() == watcher.id());
        if is_current && vm.is_mounted() && !vm.is_destroyed() {
            call_hook(&vm, LifecycleHook::Updated);
        }
    }
}
