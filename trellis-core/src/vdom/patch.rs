//! Patch Engine
//!
//! Diffs a new vnode tree against the previous one and applies the minimal
//! set of [`NodeOps`] calls.
//!
//! # Algorithm
//!
//! 1. Roots that are [`same_vnode`] are patched in place; otherwise the new
//!    tree is created next to the old root and the old root is removed.
//!
//! 2. Patching in place reuses the platform node, lets modules update its
//!    attributes, and reconciles children:
//!    - text nodes only update their text when it changed,
//!    - two child lists go through [`Patcher::update_children`].
//!
//! 3. `update_children` walks both lists from both ends, trying the four
//!    start/end pairings before falling back to a key lookup. Matched nodes
//!    are patched and moved with `insert_before`; unmatched new nodes are
//!    created; whatever is left of the old list is removed.
//!
//! # Components
//!
//! A component placeholder is created by instantiating and mounting its
//! component, then inserting the component's root node. `mounted` and
//! `activated` hooks are collected in an insert queue and fired once the
//! whole tree is attached. A component's own first patch hands its queue to
//! the parent instead, so children report mounted only after their parent
//! inserted them.

use std::collections::HashMap;
use std::sync::Arc;

use super::modules::{base_modules, Module, RefModule};
use super::node_ops::{NodeId, NodeOps};
use super::vnode::{same_vnode, Key, VNode};
use crate::instance::{arena, lifecycle, ComponentId};
use crate::runtime::warn;

/// What the new tree is patched against.
pub enum OldVNode {
    /// An existing platform node to mount over.
    Element(NodeId),
    /// The tree produced by the previous render.
    VNode(VNode),
}

/// A component waiting for its insert hook.
#[derive(Debug, Clone, Copy)]
pub struct InsertEntry {
    pub instance: ComponentId,
    pub keep_alive: bool,
    pub context: Option<ComponentId>,
}

struct PatchCx {
    /// The instance whose tree is being patched.
    owner: Option<ComponentId>,
    queue: Vec<InsertEntry>,
}

struct PatcherInner {
    ops: Arc<dyn NodeOps>,
    modules: Vec<Arc<dyn Module>>,
}

/// A patch function bound to a platform.
///
/// Cloning a `Patcher` creates another handle to the same platform.
#[derive(Clone)]
pub struct Patcher {
    inner: Arc<PatcherInner>,
}

enum Step {
    SkipOldStart,
    SkipOldEnd,
    Starts,
    Ends,
    /// Old start matches new end; the node moves after the old end.
    StartToEnd(Option<NodeId>),
    /// Old end matches new start; the node moves before the old start.
    EndToStart(Option<NodeId>),
    /// No pairing matched; the new start is looked up by key.
    Search(Option<NodeId>),
}

impl Patcher {
    /// A patcher running the platform's modules followed by the base ones.
    pub fn new(ops: Arc<dyn NodeOps>, platform_modules: Vec<Arc<dyn Module>>) -> Self {
        let mut modules = platform_modules;
        modules.extend(base_modules());
        Self {
            inner: Arc::new(PatcherInner { ops, modules }),
        }
    }

    pub fn ops(&self) -> &Arc<dyn NodeOps> {
        &self.inner.ops
    }

    /// Patch `vnode` against `old` and return the new root node.
    ///
    /// With no new tree, the old tree's destroy hooks run and nothing is
    /// mounted. With no old tree, the new tree is created detached.
    pub fn patch(&self, old: Option<OldVNode>, vnode: Option<&mut VNode>, owner: Option<ComponentId>) -> Option<NodeId> {
        let Some(vnode) = vnode else {
            if let Some(OldVNode::VNode(old)) = old {
                self.invoke_destroy_hook(&old);
            }
            return None;
        };

        let mut cx = PatchCx {
            owner,
            queue: Vec::new(),
        };
        let mut initial = false;

        match old {
            None => {
                initial = true;
                self.create_elm(vnode, &mut cx, None, None);
            }
            Some(OldVNode::VNode(old)) if same_vnode(&old, vnode) => {
                self.patch_vnode(old, vnode, &mut cx);
            }
            Some(old) => {
                let (old, hosted) = match old {
                    OldVNode::Element(elm) => (VNode::at(elm, self.inner.ops.tag_name(elm)), true),
                    OldVNode::VNode(old) => (old, false),
                };
                let old_elm = node_elm(&old);
                let parent = old_elm.and_then(|elm| self.inner.ops.parent_node(elm));
                let anchor = old_elm.and_then(|elm| self.inner.ops.next_sibling(elm));

                self.create_elm(vnode, &mut cx, parent, anchor);

                if hosted {
                    // The mount target leaves the tree but still belongs to the host.
                    if let Some(elm) = old_elm {
                        self.remove_node(elm);
                    }
                } else if parent.is_some() {
                    self.remove_vnodes(vec![old]);
                } else if old.tag.is_some() {
                    self.invoke_destroy_hook(&old);
                    if let Some(elm) = old_elm.filter(|_| !is_cached(&old)) {
                        self.inner.ops.discard(elm);
                    }
                }
            }
        }

        self.invoke_insert_hook(initial, cx);
        vnode.elm
    }

    fn create_elm(&self, vnode: &mut VNode, cx: &mut PatchCx, parent: Option<NodeId>, anchor: Option<NodeId>) {
        if self.create_component(vnode, cx, parent, anchor) {
            return;
        }

        let ops = &self.inner.ops;
        if let Some(tag) = vnode.tag.clone() {
            let elm = match &vnode.ns {
                Some(ns) => ops.create_element_ns(ns, &tag),
                None => ops.create_element(&tag),
            };
            vnode.elm = Some(elm);
            self.set_scope(vnode, cx);
            self.create_children(vnode, cx);
            if vnode.data.is_some() {
                self.invoke_create_hooks(vnode, cx);
            }
            self.insert(parent, elm, anchor);
        } else {
            let text = vnode.text.as_deref().unwrap_or("");
            let elm = if vnode.is_comment {
                ops.create_comment(text)
            } else {
                ops.create_text_node(text)
            };
            vnode.elm = Some(elm);
            self.insert(parent, elm, anchor);
        }
    }

    fn create_component(
        &self,
        vnode: &mut VNode,
        cx: &mut PatchCx,
        parent: Option<NodeId>,
        anchor: Option<NodeId>,
    ) -> bool {
        if vnode.component.is_none() {
            return false;
        }

        lifecycle::init_component(vnode, cx.owner, self);
        let Some(instance) = vnode.component_instance else {
            return false;
        };

        self.init_component(vnode, cx, instance);
        if let Some(elm) = vnode.elm {
            self.insert(parent, elm, anchor);
        }
        true
    }

    fn init_component(&self, vnode: &mut VNode, cx: &mut PatchCx, instance: ComponentId) {
        if let Some(vm) = arena::get(instance) {
            cx.queue.extend(vm.take_pending_insert());
            vnode.elm = vm.el();
        }

        if is_patchable(vnode) {
            self.invoke_create_hooks(vnode, cx);
            self.set_scope(vnode, cx);
        } else {
            // Empty root: only the ref and the insert hook apply.
            RefModule.create(&VNode::default(), vnode);
            cx.queue.push(insert_entry(vnode, instance));
        }
    }

    fn create_children(&self, vnode: &mut VNode, cx: &mut PatchCx) {
        let Some(elm) = vnode.elm else {
            return;
        };
        check_duplicate_keys(&vnode.children, vnode.context);
        for child in &mut vnode.children {
            self.create_elm(child, cx, Some(elm), None);
        }
    }

    fn invoke_create_hooks(&self, vnode: &VNode, cx: &mut PatchCx) {
        let empty = VNode::default();
        for module in &self.inner.modules {
            module.create(&empty, vnode);
        }
        if let Some(instance) = vnode.component_instance {
            cx.queue.push(insert_entry(vnode, instance));
        }
    }

    /// Apply the scope ids of the rendering component and of the instance
    /// being patched, so slot content picks up both.
    fn set_scope(&self, vnode: &VNode, cx: &PatchCx) {
        let Some(elm) = vnode.elm else {
            return;
        };
        let scope_of = |id: ComponentId| arena::get(id).and_then(|vm| vm.def().scope_id().map(str::to_string));

        if let Some(scope) = vnode.context.and_then(scope_of) {
            self.inner.ops.set_style_scope(elm, &scope);
        }
        if let Some(owner) = cx.owner {
            if Some(owner) != vnode.context {
                if let Some(scope) = scope_of(owner) {
                    self.inner.ops.set_style_scope(elm, &scope);
                }
            }
        }
    }

    fn insert(&self, parent: Option<NodeId>, elm: NodeId, anchor: Option<NodeId>) {
        let Some(parent) = parent else {
            return;
        };
        let ops = &self.inner.ops;
        match anchor {
            Some(anchor) if ops.parent_node(anchor) == Some(parent) => {
                ops.insert_before(parent, elm, Some(anchor));
            }
            Some(_) => {}
            None => ops.append_child(parent, elm),
        }
    }

    fn add_vnodes(&self, parent: NodeId, anchor: Option<NodeId>, vnodes: &mut [VNode], cx: &mut PatchCx) {
        for vnode in vnodes {
            self.create_elm(vnode, cx, Some(parent), anchor);
        }
    }

    fn remove_vnodes(&self, vnodes: impl IntoIterator<Item = VNode>) {
        for vnode in vnodes {
            // Resolve the node before destroy hooks release the instance.
            let elm = node_elm(&vnode);
            if let Some(elm) = elm {
                self.remove_node(elm);
            }
            if vnode.tag.is_some() {
                self.invoke_destroy_hook(&vnode);
            }
            if let Some(elm) = elm.filter(|_| !is_cached(&vnode)) {
                self.inner.ops.discard(elm);
            }
        }
    }

    fn remove_node(&self, elm: NodeId) {
        if let Some(parent) = self.inner.ops.parent_node(elm) {
            self.inner.ops.remove_child(parent, elm);
        }
    }

    fn invoke_destroy_hook(&self, vnode: &VNode) {
        if vnode.component_instance.is_some() {
            lifecycle::destroy_component(vnode);
        }
        if vnode.data.is_some() {
            for module in &self.inner.modules {
                module.destroy(vnode);
            }
        }
        for child in &vnode.children {
            self.invoke_destroy_hook(child);
        }
    }

    fn patch_vnode(&self, old: VNode, vnode: &mut VNode, cx: &mut PatchCx) {
        let elm = node_elm(&old);
        vnode.elm = elm;

        if vnode.component.is_some() {
            lifecycle::prepatch_component(&old, vnode);
        }
        if vnode.data.is_some() && is_patchable(vnode) {
            for module in &self.inner.modules {
                module.update(&old, vnode);
            }
        }

        let Some(elm) = elm else {
            return;
        };
        let VNode {
            children: old_children,
            text: old_text,
            ..
        } = old;
        let ops = &self.inner.ops;

        match &vnode.text {
            None => {
                if !old_children.is_empty() && !vnode.children.is_empty() {
                    self.update_children(elm, old_children, &mut vnode.children, cx);
                } else if !vnode.children.is_empty() {
                    check_duplicate_keys(&vnode.children, vnode.context);
                    if old_text.is_some() {
                        ops.set_text_content(elm, "");
                    }
                    self.add_vnodes(elm, None, &mut vnode.children, cx);
                } else if !old_children.is_empty() {
                    self.remove_vnodes(old_children);
                } else if old_text.is_some() {
                    ops.set_text_content(elm, "");
                }
            }
            Some(text) => {
                if old_text.as_deref() != Some(text.as_str()) {
                    ops.set_text_content(elm, text);
                }
            }
        }
    }

    /// Double-ended keyed reconciliation of two child lists under `parent`.
    fn update_children(&self, parent: NodeId, old_children: Vec<VNode>, new_children: &mut [VNode], cx: &mut PatchCx) {
        check_duplicate_keys(new_children, new_children.first().and_then(|c| c.context));

        let ops = self.inner.ops.clone();
        let mut old: Vec<Option<VNode>> = old_children.into_iter().map(Some).collect();
        let mut old_start: isize = 0;
        let mut old_end: isize = old.len() as isize - 1;
        let mut new_start: isize = 0;
        let mut new_end: isize = new_children.len() as isize - 1;
        let mut key_to_index: Option<HashMap<Key, usize>> = None;

        while old_start <= old_end && new_start <= new_end {
            let (os, oe, ns, ne) = (old_start as usize, old_end as usize, new_start as usize, new_end as usize);

            let step = match (&old[os], &old[oe]) {
                (None, _) => Step::SkipOldStart,
                (_, None) => Step::SkipOldEnd,
                (Some(start), Some(end)) => {
                    if same_vnode(start, &new_children[ns]) {
                        Step::Starts
                    } else if same_vnode(end, &new_children[ne]) {
                        Step::Ends
                    } else if same_vnode(start, &new_children[ne]) {
                        Step::StartToEnd(node_elm(end))
                    } else if same_vnode(end, &new_children[ns]) {
                        Step::EndToStart(node_elm(start))
                    } else {
                        Step::Search(node_elm(start))
                    }
                }
            };

            match step {
                Step::SkipOldStart => old_start += 1,
                Step::SkipOldEnd => old_end -= 1,
                Step::Starts => {
                    if let Some(node) = old[os].take() {
                        self.patch_vnode(node, &mut new_children[ns], cx);
                    }
                    old_start += 1;
                    new_start += 1;
                }
                Step::Ends => {
                    if let Some(node) = old[oe].take() {
                        self.patch_vnode(node, &mut new_children[ne], cx);
                    }
                    old_end -= 1;
                    new_end -= 1;
                }
                Step::StartToEnd(old_end_elm) => {
                    if let Some(node) = old[os].take() {
                        self.patch_vnode(node, &mut new_children[ne], cx);
                    }
                    if let Some(elm) = node_elm(&new_children[ne]) {
                        let after = old_end_elm.and_then(|e| ops.next_sibling(e));
                        ops.insert_before(parent, elm, after);
                    }
                    old_start += 1;
                    new_end -= 1;
                }
                Step::EndToStart(old_start_elm) => {
                    if let Some(node) = old[oe].take() {
                        self.patch_vnode(node, &mut new_children[ns], cx);
                    }
                    if let Some(elm) = node_elm(&new_children[ns]) {
                        ops.insert_before(parent, elm, old_start_elm);
                    }
                    old_end -= 1;
                    new_start += 1;
                }
                Step::Search(old_start_elm) => {
                    let found = match &new_children[ns].key {
                        Some(key) => {
                            let map = key_to_index.get_or_insert_with(|| build_key_map(&old, os, oe));
                            map.get(key).copied()
                        }
                        None => find_index_in_old(&new_children[ns], &old, os, oe),
                    };

                    let matched = found.and_then(|i| {
                        let same = old[i].as_ref().is_some_and(|candidate| same_vnode(candidate, &new_children[ns]));
                        if same {
                            old[i].take()
                        } else {
                            None
                        }
                    });

                    match matched {
                        Some(node) => {
                            self.patch_vnode(node, &mut new_children[ns], cx);
                            if let Some(elm) = node_elm(&new_children[ns]) {
                                ops.insert_before(parent, elm, old_start_elm);
                            }
                        }
                        // New, or same key but a different element.
                        None => self.create_elm(&mut new_children[ns], cx, Some(parent), old_start_elm),
                    }
                    new_start += 1;
                }
            }
        }

        if old_start > old_end {
            let next = (new_end + 1) as usize;
            let anchor = new_children.get(next).and_then(node_elm);
            if new_start <= new_end {
                let range = new_start as usize..=new_end as usize;
                self.add_vnodes(parent, anchor, &mut new_children[range], cx);
            }
        } else if new_start > new_end {
            let range = old_start as usize..=old_end as usize;
            let leftovers: Vec<VNode> = old[range].iter_mut().filter_map(Option::take).collect();
            self.remove_vnodes(leftovers);
        }
    }

    fn invoke_insert_hook(&self, initial: bool, cx: PatchCx) {
        let PatchCx { owner, queue } = cx;
        if initial {
            if let Some(vm) = owner.and_then(arena::get) {
                if vm.has_placeholder() {
                    vm.set_pending_insert(queue);
                    return;
                }
            }
        }
        for entry in queue {
            lifecycle::insert_component(entry);
        }
    }
}

impl std::fmt::Debug for Patcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Patcher")
            .field("modules", &self.inner.modules.len())
            .finish()
    }
}

fn insert_entry(vnode: &VNode, instance: ComponentId) -> InsertEntry {
    InsertEntry {
        instance,
        keep_alive: vnode.is_keep_alive(),
        context: vnode.context,
    }
}

/// The platform node a vnode currently stands for.
///
/// A component placeholder follows its instance, whose root may have been
/// replaced by a re-render since the placeholder was last patched.
pub(crate) fn node_elm(vnode: &VNode) -> Option<NodeId> {
    vnode
        .component_instance
        .and_then(arena::get)
        .and_then(|vm| vm.el())
        .or(vnode.elm)
}

/// Whether module hooks apply: the node, or the innermost root of a chain
/// of component placeholders, is an element.
/// A kept-alive placeholder whose instance survived removal. Its nodes are
/// inserted again on reactivation.
fn is_cached(vnode: &VNode) -> bool {
    vnode.is_keep_alive()
        && vnode
            .component_instance
            .and_then(arena::get)
            .is_some_and(|vm| !vm.is_destroyed())
}

fn is_patchable(vnode: &VNode) -> bool {
    let mut has_tag = vnode.tag.is_some();
    let mut current = vnode.component_instance;
    while let Some(id) = current {
        match arena::get(id).and_then(|vm| vm.root_shape()) {
            Some((tagged, inner)) => {
                has_tag = tagged;
                current = inner;
            }
            None => return false,
        }
    }
    has_tag
}

fn build_key_map(old: &[Option<VNode>], start: usize, end: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::new();
    for (i, node) in old.iter().enumerate().take(end + 1).skip(start) {
        if let Some(key) = node.as_ref().and_then(|n| n.key.clone()) {
            map.insert(key, i);
        }
    }
    map
}

fn find_index_in_old(vnode: &VNode, old: &[Option<VNode>], start: usize, end: usize) -> Option<usize> {
    (start..=end).find(|&i| old[i].as_ref().is_some_and(|candidate| same_vnode(candidate, vnode)))
}

fn check_duplicate_keys(children: &[VNode], context: Option<ComponentId>) {
    let mut seen = std::collections::HashSet::new();
    for child in children {
        if let Some(key) = &child.key {
            if !seen.insert(key) {
                warn(
                    format!("Duplicate keys detected: '{key}'. This may cause an update error."),
                    context,
                );
            }
        }
    }
}

// ---- Tests ----
