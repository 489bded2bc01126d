//! Patch modules.
//!
//! A module keeps one aspect of a platform node (attributes, listeners,
//! refs...) in sync with the vnode's data. The patch engine calls every
//! module at three points:
//!
//! - `create` once the node exists, with an empty old vnode,
//! - `update` when a node is patched in place,
//! - `destroy` when the node leaves the tree.

use std::sync::Arc;

use super::node_ops::NodeId;
use super::vnode::VNode;
use crate::instance::{arena, ComponentId};

/// Hooks invoked by the patch engine.
pub trait Module: Send + Sync {
    fn create(&self, _old: &VNode, _vnode: &VNode) {}
    fn update(&self, _old: &VNode, _vnode: &VNode) {}
    fn destroy(&self, _vnode: &VNode) {}
}

/// What a `ref` resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefTarget {
    Element(NodeId),
    Component(ComponentId),
}

/// Registers `ref_name` targets on the rendering component.
pub struct RefModule;

impl Module for RefModule {
    fn create(&self, _old: &VNode, vnode: &VNode) {
        register_ref(vnode, false);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        if old.ref_name() != vnode.ref_name() {
            register_ref(old, true);
            register_ref(vnode, false);
        }
    }

    fn destroy(&self, vnode: &VNode) {
        register_ref(vnode, true);
    }
}

/// The base modules every patcher carries after the platform's own.
pub fn base_modules() -> Vec<Arc<dyn Module>> {
    vec![Arc::new(RefModule)]
}

fn register_ref(vnode: &VNode, remove: bool) {
    let Some(name) = vnode.ref_name() else {
        return;
    };
    let Some(vm) = vnode.context().and_then(arena::get) else {
        return;
    };
    let target = match (vnode.component_instance(), vnode.elm()) {
        (Some(id), _) => RefTarget::Component(id),
        (None, Some(elm)) => RefTarget::Element(elm),
        (None, None) => return,
    };
    let in_for = vnode.data().is_some_and(|d| d.ref_in_for);

    if remove {
        vm.remove_ref(name, target);
    } else {
        vm.add_ref(name, target, in_for);
    }
}
