//! In-memory platform.
//!
//! A headless node tree implementing [`NodeOps`], plus the platform modules
//! (attributes, class, style, listeners) the patch engine needs to keep it in
//! sync. Every mutating call is appended to an operation log so tests can
//! assert exactly what a patch did.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::modules::Module;
use super::node_ops::{NodeId, NodeOps};
use super::vnode::{Handler, VNode};
use crate::error::invoke_with_error_handling;
use crate::instance::ComponentId;
use crate::reactive::Value;

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomOp {
    CreateElement { node: NodeId, tag: String },
    CreateText { node: NodeId, text: String },
    CreateComment { node: NodeId, text: String },
    InsertBefore { parent: NodeId, node: NodeId, reference: Option<NodeId> },
    AppendChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    SetTextContent { node: NodeId, text: String },
    SetStyleScope { node: NodeId, scope: String },
    SetAttribute { node: NodeId, name: String, value: String },
    RemoveAttribute { node: NodeId, name: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
}

impl DomOp {
    /// Whether the op changed an existing tree rather than building new nodes.
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            DomOp::CreateElement { .. } | DomOp::CreateText { .. } | DomOp::CreateComment { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeKind {
    Element,
    Text,
    Comment,
}

struct Listener {
    handler: Handler,
    context: Option<ComponentId>,
}

struct DomNode {
    kind: NodeKind,
    tag: String,
    namespace: Option<String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attrs: IndexMap<String, String>,
    listeners: IndexMap<String, Listener>,
}

impl DomNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            tag: String::new(),
            namespace: None,
            text: String::new(),
            parent: None,
            children: Vec::new(),
            attrs: IndexMap::new(),
            listeners: IndexMap::new(),
        }
    }
}

#[derive(Default)]
struct DomState {
    nodes: HashMap<NodeId, DomNode>,
    ops: Vec<DomOp>,
}

impl DomState {
    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get_mut(&node).and_then(|n| n.parent.take());
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            parent.children.retain(|c| *c != node);
        }
    }

    /// Drop `node` and its descendants from storage.
    fn evict(&mut self, node: NodeId) {
        let mut pending = vec![node];
        while let Some(id) = pending.pop() {
            if let Some(n) = self.nodes.remove(&id) {
                pending.extend(n.children);
            }
        }
    }

    fn create(&mut self, node: DomNode) -> NodeId {
        let id = NodeId::new();
        self.nodes.insert(id, node);
        id
    }
}

/// A headless node tree.
#[derive(Default)]
pub struct MemoryDom {
    state: Mutex<DomState>,
}

impl MemoryDom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a detached element to mount into. Not recorded.
    pub fn create_root(&self, tag: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Element);
        node.tag = tag.to_string();
        self.state.lock().create(node)
    }

    /// The modules that keep attributes, classes, styles and listeners of
    /// this tree in sync with vnode data.
    pub fn platform_modules(self: &Arc<Self>) -> Vec<Arc<dyn Module>> {
        vec![
            Arc::new(AttrsModule { dom: self.clone() }),
            Arc::new(ClassModule { dom: self.clone() }),
            Arc::new(StyleModule { dom: self.clone() }),
            Arc::new(EventsModule { dom: self.clone() }),
        ]
    }

    /// Every recorded op since the last [`MemoryDom::clear_ops`].
    pub fn ops(&self) -> Vec<DomOp> {
        self.state.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().ops.clear();
    }

    /// Nodes held in storage, attached or not.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Recorded ops that changed the existing tree.
    pub fn mutation_count(&self) -> usize {
        self.state.lock().ops.iter().filter(|op| op.is_mutation()).count()
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.state.lock().nodes.get(&node).and_then(|n| n.attrs.get(name).cloned())
    }

    pub fn namespace(&self, node: NodeId) -> Option<String> {
        self.state.lock().nodes.get(&node).and_then(|n| n.namespace.clone())
    }

    pub fn has_listener(&self, node: NodeId, event: &str) -> bool {
        self.state
            .lock()
            .nodes
            .get(&node)
            .is_some_and(|n| n.listeners.contains_key(event))
    }

    /// Concatenated text of the node and its descendants.
    pub fn text_content(&self, node: NodeId) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        collect_text(&state, node, &mut out);
        out
    }

    /// Serialize the subtree rooted at `node`.
    pub fn to_html(&self, node: NodeId) -> String {
        let state = self.state.lock();
        let mut out = String::new();
        write_html(&state, node, &mut out);
        out
    }

    /// Invoke the listener bound for `event` on `node`.
    ///
    /// Returns whether a listener was found. Handler failures are reported
    /// through the error handler of the component that rendered the node.
    pub fn dispatch(&self, node: NodeId, event: &str, args: &[Value]) -> bool {
        let found = {
            let state = self.state.lock();
            state
                .nodes
                .get(&node)
                .and_then(|n| n.listeners.get(event))
                .map(|l| (l.handler.clone(), l.context))
        };
        let Some((handler, context)) = found else {
            return false;
        };
        invoke_with_error_handling(|| handler(args), context, format_args!("event handler for \"{event}\""));
        true
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: String) {
        let mut state = self.state.lock();
        if let Some(n) = state.nodes.get_mut(&node) {
            n.attrs.insert(name.to_string(), value.clone());
            state.ops.push(DomOp::SetAttribute {
                node,
                name: name.to_string(),
                value,
            });
        }
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        let mut state = self.state.lock();
        let removed = state
            .nodes
            .get_mut(&node)
            .is_some_and(|n| n.attrs.shift_remove(name).is_some());
        if removed {
            state.ops.push(DomOp::RemoveAttribute {
                node,
                name: name.to_string(),
            });
        }
    }

    /// Bind a listener. Rebinding an already bound event swaps the handler
    /// without touching the tree.
    fn set_listener(&self, node: NodeId, event: &str, handler: Handler, context: Option<ComponentId>) {
        let mut state = self.state.lock();
        let Some(n) = state.nodes.get_mut(&node) else {
            return;
        };
        let added = n
            .listeners
            .insert(event.to_string(), Listener { handler, context })
            .is_none();
        if added {
            state.ops.push(DomOp::AddListener {
                node,
                event: event.to_string(),
            });
        }
    }

    fn remove_listener(&self, node: NodeId, event: &str) {
        let mut state = self.state.lock();
        let removed = state
            .nodes
            .get_mut(&node)
            .is_some_and(|n| n.listeners.shift_remove(event).is_some());
        if removed {
            state.ops.push(DomOp::RemoveListener {
                node,
                event: event.to_string(),
            });
        }
    }
}

impl NodeOps for MemoryDom {
    fn create_element(&self, tag: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Element);
        node.tag = tag.to_string();
        let mut state = self.state.lock();
        let id = state.create(node);
        state.ops.push(DomOp::CreateElement {
            node: id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_element_ns(&self, namespace: &str, tag: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Element);
        node.tag = tag.to_string();
        node.namespace = Some(namespace.to_string());
        let mut state = self.state.lock();
        let id = state.create(node);
        state.ops.push(DomOp::CreateElement {
            node: id,
            tag: tag.to_string(),
        });
        id
    }

    fn create_text_node(&self, text: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Text);
        node.text = text.to_string();
        let mut state = self.state.lock();
        let id = state.create(node);
        state.ops.push(DomOp::CreateText {
            node: id,
            text: text.to_string(),
        });
        id
    }

    fn create_comment(&self, text: &str) -> NodeId {
        let mut node = DomNode::new(NodeKind::Comment);
        node.text = text.to_string();
        let mut state = self.state.lock();
        let id = state.create(node);
        state.ops.push(DomOp::CreateComment {
            node: id,
            text: text.to_string(),
        });
        id
    }

    fn insert_before(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>) {
        let mut state = self.state.lock();
        state.detach(node);
        let Some(p) = state.nodes.get_mut(&parent) else {
            return;
        };
        let position = reference.and_then(|r| p.children.iter().position(|c| *c == r));
        match position {
            Some(i) => p.children.insert(i, node),
            None => p.children.push(node),
        }
        if let Some(n) = state.nodes.get_mut(&node) {
            n.parent = Some(parent);
        }
        state.ops.push(DomOp::InsertBefore { parent, node, reference });
    }

    fn remove_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.lock();
        let is_child = state.nodes.get(&child).is_some_and(|n| n.parent == Some(parent));
        if is_child {
            state.detach(child);
            state.ops.push(DomOp::RemoveChild { parent, child });
        }
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut state = self.state.lock();
        state.detach(child);
        let Some(p) = state.nodes.get_mut(&parent) else {
            return;
        };
        p.children.push(child);
        if let Some(n) = state.nodes.get_mut(&child) {
            n.parent = Some(parent);
        }
        state.ops.push(DomOp::AppendChild { parent, child });
    }

    fn parent_node(&self, node: NodeId) -> Option<NodeId> {
        self.state.lock().nodes.get(&node).and_then(|n| n.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let state = self.state.lock();
        let parent = state.nodes.get(&node)?.parent?;
        let siblings = &state.nodes.get(&parent)?.children;
        let i = siblings.iter().position(|c| *c == node)?;
        siblings.get(i + 1).copied()
    }

    fn tag_name(&self, node: NodeId) -> String {
        self.state
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.tag.to_uppercase())
            .unwrap_or_default()
    }

    fn set_text_content(&self, node: NodeId, text: &str) {
        let mut state = self.state.lock();
        let children = match state.nodes.get_mut(&node) {
            Some(n) if n.kind == NodeKind::Element => std::mem::take(&mut n.children),
            Some(n) => {
                n.text = text.to_string();
                Vec::new()
            }
            None => return,
        };
        for child in children {
            state.evict(child);
        }
        let is_element = state.nodes.get(&node).is_some_and(|n| n.kind == NodeKind::Element);
        if is_element && !text.is_empty() {
            let mut child = DomNode::new(NodeKind::Text);
            child.text = text.to_string();
            child.parent = Some(node);
            let id = state.create(child);
            if let Some(n) = state.nodes.get_mut(&node) {
                n.children.push(id);
            }
        }
        state.ops.push(DomOp::SetTextContent {
            node,
            text: text.to_string(),
        });
    }

    fn discard(&self, node: NodeId) {
        let mut state = self.state.lock();
        let detached = state.nodes.get(&node).is_some_and(|n| n.parent.is_none());
        if detached {
            state.evict(node);
        }
    }

    fn set_style_scope(&self, node: NodeId, scope_id: &str) {
        let mut state = self.state.lock();
        if let Some(n) = state.nodes.get_mut(&node) {
            n.attrs.insert(scope_id.to_string(), String::new());
            state.ops.push(DomOp::SetStyleScope {
                node,
                scope: scope_id.to_string(),
            });
        }
    }
}

fn collect_text(state: &DomState, node: NodeId, out: &mut String) {
    let Some(n) = state.nodes.get(&node) else {
        return;
    };
    match n.kind {
        NodeKind::Text => out.push_str(&n.text),
        NodeKind::Comment => {}
        NodeKind::Element => {
            for child in &n.children {
                collect_text(state, *child, out);
            }
        }
    }
}

fn write_html(state: &DomState, node: NodeId, out: &mut String) {
    let Some(n) = state.nodes.get(&node) else {
        return;
    };
    match n.kind {
        NodeKind::Text => out.push_str(&n.text),
        NodeKind::Comment => {
            let _ = write!(out, "<!--{}-->", n.text);
        }
        NodeKind::Element => {
            out.push('<');
            out.push_str(&n.tag);
            for (name, value) in &n.attrs {
                if value.is_empty() {
                    let _ = write!(out, " {name}");
                } else {
                    let _ = write!(out, " {name}=\"{value}\"");
                }
            }
            out.push('>');
            for child in &n.children {
                write_html(state, *child, out);
            }
            let _ = write!(out, "</{}>", n.tag);
        }
    }
}

// ---- Platform modules ----

/// Attribute text for a value; `None` removes the attribute.
fn attr_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::Bool(true) => Some(String::new()),
        other => Some(other.to_string()),
    }
}

struct AttrsModule {
    dom: Arc<MemoryDom>,
}

impl AttrsModule {
    fn sync(&self, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let empty = IndexMap::new();
        let old_attrs = old.data().map(|d| &d.attrs).unwrap_or(&empty);
        let attrs = vnode.data().map(|d| &d.attrs).unwrap_or(&empty);

        for (name, value) in attrs {
            let unchanged = old_attrs.get(name).is_some_and(|prev| prev.same(value));
            if unchanged {
                continue;
            }
            match attr_value(value) {
                Some(text) => self.dom.set_attribute(elm, name, text),
                None => self.dom.remove_attribute(elm, name),
            }
        }
        for name in old_attrs.keys() {
            if !attrs.contains_key(name) {
                self.dom.remove_attribute(elm, name);
            }
        }
    }
}

impl Module for AttrsModule {
    fn create(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }
}

struct ClassModule {
    dom: Arc<MemoryDom>,
}

fn class_string(vnode: &VNode) -> String {
    vnode
        .data()
        .map(|d| {
            d.class
                .iter()
                .filter(|(_, on)| **on)
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

impl ClassModule {
    fn sync(&self, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let class = class_string(vnode);
        if class == class_string(old) {
            return;
        }
        if class.is_empty() {
            self.dom.remove_attribute(elm, "class");
        } else {
            self.dom.set_attribute(elm, "class", class);
        }
    }
}

impl Module for ClassModule {
    fn create(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }
}

struct StyleModule {
    dom: Arc<MemoryDom>,
}

fn style_string(vnode: &VNode) -> String {
    vnode
        .data()
        .map(|d| {
            d.style
                .iter()
                .map(|(name, value)| format!("{name}: {value};"))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default()
}

impl StyleModule {
    fn sync(&self, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let style = style_string(vnode);
        if style == style_string(old) {
            return;
        }
        if style.is_empty() {
            self.dom.remove_attribute(elm, "style");
        } else {
            self.dom.set_attribute(elm, "style", style);
        }
    }
}

impl Module for StyleModule {
    fn create(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }
}

struct EventsModule {
    dom: Arc<MemoryDom>,
}

/// Platform listeners of a vnode. On a component placeholder `on` holds
/// component events, so only `native_on` reaches the platform.
fn platform_listeners(vnode: &VNode) -> Option<&IndexMap<String, Handler>> {
    let data = vnode.data()?;
    if vnode.component_options().is_some() {
        Some(&data.native_on)
    } else {
        Some(&data.on)
    }
}

impl EventsModule {
    fn sync(&self, old: &VNode, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        let empty = IndexMap::new();
        let old_on = platform_listeners(old).unwrap_or(&empty);
        let on = platform_listeners(vnode).unwrap_or(&empty);

        for (event, handler) in on {
            self.dom.set_listener(elm, event, handler.clone(), vnode.context());
        }
        for event in old_on.keys() {
            if !on.contains_key(event) {
                self.dom.remove_listener(elm, event);
            }
        }
    }
}

impl Module for EventsModule {
    fn create(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }

    fn update(&self, old: &VNode, vnode: &VNode) {
        self.sync(old, vnode);
    }

    fn destroy(&self, vnode: &VNode) {
        let Some(elm) = vnode.elm() else {
            return;
        };
        if let Some(on) = platform_listeners(vnode) {
            for event in on.keys() {
                self.dom.remove_listener(elm, event);
            }
        }
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vdom::vnode::handler;
    use crate::vdom::VNodeData;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn insert_moves_existing_nodes() {
        let dom = MemoryDom::new();
        let root = dom.create_root("div");
        let a = dom.create_text_node("a");
        let b = dom.create_text_node("b");
        dom.append_child(root, a);
        dom.append_child(root, b);

        dom.insert_before(root, b, Some(a));

        assert_eq!(dom.children(root), vec![b, a]);
        assert_eq!(dom.next_sibling(b), Some(a));
        assert_eq!(dom.text_content(root), "ba");
    }

    #[test]
    fn set_text_content_replaces_children() {
        let dom = MemoryDom::new();
        let root = dom.create_root("p");
        let span = dom.create_element("span");
        dom.append_child(root, span);

        dom.set_text_content(root, "hello");

        assert_eq!(dom.to_html(root), "<p>hello</p>");
        assert_eq!(dom.parent_node(span), None);
        assert_eq!(dom.node_count(), 2);
    }

    #[test]
    fn discard_frees_detached_subtrees_only() {
        let dom = MemoryDom::new();
        let root = dom.create_root("div");
        let list = dom.create_element("ul");
        let item = dom.create_element("li");
        dom.append_child(list, item);
        dom.append_child(root, list);
        assert_eq!(dom.node_count(), 3);

        dom.discard(list);
        assert_eq!(dom.node_count(), 3);

        dom.remove_child(root, list);
        dom.discard(list);
        assert_eq!(dom.node_count(), 1);
        assert_eq!(dom.to_html(root), "<div></div>");
    }

    #[test]
    fn serializes_attributes_and_comments() {
        let dom = MemoryDom::new();
        let root = dom.create_root("div");
        let comment = dom.create_comment("gap");
        dom.append_child(root, comment);
        dom.set_attribute(root, "id", "main".into());
        dom.set_style_scope(root, "data-v-1");

        assert_eq!(dom.to_html(root), "<div id=\"main\" data-v-1><!--gap--></div>");
    }

    #[test]
    fn listeners_rebind_without_ops() {
        let dom = MemoryDom::new();
        let node = dom.create_root("button");
        let hits = Arc::new(AtomicI32::new(0));

        let h1 = hits.clone();
        dom.set_listener(
            node,
            "click",
            handler(move |_| {
                h1.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
            None,
        );
        dom.clear_ops();

        let h2 = hits.clone();
        dom.set_listener(
            node,
            "click",
            handler(move |_| {
                h2.fetch_add(10, Ordering::SeqCst);
                Ok(())
            }),
            None,
        );
        assert_eq!(dom.mutation_count(), 0);

        assert!(dom.dispatch(node, "click", &[]));
        assert_eq!(hits.load(Ordering::SeqCst), 10);
        assert!(!dom.dispatch(node, "keyup", &[]));
    }

    #[test]
    fn class_module_joins_enabled_names() {
        let dom = MemoryDom::new();
        let mut vnode = VNode::element("div", VNodeData::new().class("a", true).class("b", false).class("c", true), vec![]);
        vnode.elm = Some(dom.create_root("div"));

        let module = ClassModule { dom: dom.clone() };
        module.create(&VNode::default(), &vnode);

        assert_eq!(dom.attribute(vnode.elm().expect("elm"), "class").as_deref(), Some("a c"));
    }

    #[test]
    fn false_attributes_are_removed() {
        let dom = MemoryDom::new();
        let elm = dom.create_root("input");
        let mut old = VNode::element("input", VNodeData::new().attr("disabled", true), vec![]);
        old.elm = Some(elm);
        let module = AttrsModule { dom: dom.clone() };
        module.create(&VNode::default(), &old);
        assert_eq!(dom.attribute(elm, "disabled").as_deref(), Some(""));

        let mut vnode = VNode::element("input", VNodeData::new().attr("disabled", false), vec![]);
        vnode.elm = Some(elm);
        module.update(&old, &vnode);
        assert_eq!(dom.attribute(elm, "disabled"), None);
    }
}
