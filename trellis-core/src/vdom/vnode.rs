//! Virtual nodes.
//!
//! A [`VNode`] describes one platform node: an element, a text node, a
//! comment, or a component placeholder. Trees are owned: rendering produces
//! a fresh tree, patching binds platform nodes into it, and the component
//! keeps it as the "old" tree for the next patch.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use super::node_ops::NodeId;
use crate::error::BoxError;
use crate::instance::{ComponentDef, ComponentId};
use crate::reactive::Value;

/// Event listener attached through [`VNodeData::on`].
pub type Handler = Arc<dyn Fn(&[Value]) -> Result<(), BoxError> + Send + Sync>;

/// Wrap a closure as a [`Handler`].
pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&[Value]) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Reconciliation key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Arc<str>),
    Int(i64),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => write!(f, "{s}"),
            Key::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s.into())
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i as i64)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

/// Attributes, properties, listeners and bookkeeping attached to a vnode.
#[derive(Clone, Default)]
pub struct VNodeData {
    pub key: Option<Key>,
    pub attrs: IndexMap<String, Value>,
    /// DOM properties on elements, component props on placeholders.
    pub props: IndexMap<String, Value>,
    pub class: IndexMap<String, bool>,
    pub style: IndexMap<String, String>,
    /// Element listeners, or component events on placeholders.
    pub on: IndexMap<String, Handler>,
    /// Platform listeners for a component's root element.
    pub native_on: IndexMap<String, Handler>,
    pub ref_name: Option<String>,
    pub ref_in_for: bool,
    /// Named slot this node is passed into.
    pub slot: Option<String>,
    /// Set by keep-alive on the placeholder it caches.
    pub keep_alive: bool,
}

impl VNodeData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn prop(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.class.insert(name.into(), enabled);
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.style.insert(name.into(), value.into());
        self
    }

    pub fn on(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.on.insert(event.into(), handler);
        self
    }

    pub fn native_on(mut self, event: impl Into<String>, handler: Handler) -> Self {
        self.native_on.insert(event.into(), handler);
        self
    }

    pub fn ref_name(mut self, name: impl Into<String>) -> Self {
        self.ref_name = Some(name.into());
        self
    }

    /// Collect the ref into a list (the node is rendered in a loop).
    pub fn ref_in_for(mut self) -> Self {
        self.ref_in_for = true;
        self
    }

    pub fn slot(mut self, name: impl Into<String>) -> Self {
        self.slot = Some(name.into());
        self
    }
}

impl fmt::Debug for VNodeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VNodeData")
            .field("key", &self.key)
            .field("attrs", &self.attrs)
            .field("props", &self.props)
            .field("class", &self.class)
            .field("style", &self.style)
            .field("on", &self.on.keys().collect::<Vec<_>>())
            .field("ref", &self.ref_name)
            .field("slot", &self.slot)
            .field("keep_alive", &self.keep_alive)
            .finish()
    }
}

/// Accepted wherever vnode data is optional: `VNodeData` or an `Option`.
pub trait IntoData {
    fn into_data(self) -> Option<VNodeData>;
}

impl IntoData for VNodeData {
    fn into_data(self) -> Option<VNodeData> {
        Some(self)
    }
}

impl IntoData for Option<VNodeData> {
    fn into_data(self) -> Option<VNodeData> {
        self
    }
}

/// What a component placeholder carries to its instance.
#[derive(Clone)]
pub struct ComponentVNode {
    pub def: ComponentDef,
    pub props_data: IndexMap<String, Value>,
    pub listeners: IndexMap<String, Handler>,
    /// Slot content.
    pub children: Vec<VNode>,
    /// Name the component was rendered under.
    pub tag: Option<String>,
}

/// A node in the virtual tree.
#[derive(Clone, Default)]
pub struct VNode {
    pub(crate) tag: Option<Arc<str>>,
    pub(crate) data: Option<VNodeData>,
    pub(crate) children: Vec<VNode>,
    pub(crate) text: Option<String>,
    pub(crate) is_comment: bool,
    pub(crate) key: Option<Key>,
    pub(crate) ns: Option<Arc<str>>,
    pub(crate) component: Option<Box<ComponentVNode>>,
    pub(crate) component_instance: Option<ComponentId>,
    /// The component whose render produced this node.
    pub(crate) context: Option<ComponentId>,
    pub(crate) elm: Option<NodeId>,
}

impl VNode {
    /// An element node.
    pub fn element(tag: &str, data: impl IntoData, children: Vec<VNode>) -> Self {
        let data = data.into_data();
        Self {
            tag: Some(tag.into()),
            key: data.as_ref().and_then(|d| d.key.clone()),
            data,
            children: normalize_children(children),
            ..Self::default()
        }
    }

    /// A text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A comment node.
    pub fn comment(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_comment: true,
            ..Self::default()
        }
    }

    /// The placeholder rendered when there is nothing to render.
    pub fn empty() -> Self {
        Self::comment("")
    }

    /// A node standing in for an existing platform node.
    pub(crate) fn at(elm: NodeId, tag: String) -> Self {
        Self {
            tag: Some(tag.to_lowercase().into()),
            elm: Some(elm),
            ..Self::default()
        }
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    pub fn data(&self) -> Option<&VNodeData> {
        self.data.as_ref()
    }

    pub fn children(&self) -> &[VNode] {
        &self.children
    }

    pub fn text_content(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn is_comment(&self) -> bool {
        self.is_comment
    }

    pub fn ns(&self) -> Option<&str> {
        self.ns.as_deref()
    }

    /// The platform node bound by the last patch.
    pub fn elm(&self) -> Option<NodeId> {
        self.elm
    }

    pub fn component_options(&self) -> Option<&ComponentVNode> {
        self.component.as_deref()
    }

    /// The component instance behind a placeholder.
    pub fn component_instance(&self) -> Option<ComponentId> {
        self.component_instance
    }

    pub fn context(&self) -> Option<ComponentId> {
        self.context
    }

    pub(crate) fn is_keep_alive(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.keep_alive)
    }

    pub(crate) fn ref_name(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.ref_name.as_deref())
    }

    /// Whitespace-only text.
    pub(crate) fn is_whitespace(&self) -> bool {
        self.tag.is_none()
            && !self.is_comment
            && self.text.as_deref().is_some_and(|t| t.trim().is_empty())
    }

    /// Set the rendering context on this node and its descendants that do
    /// not have one yet.
    pub(crate) fn set_context(&mut self, context: ComponentId) {
        if self.context.is_none() {
            self.context = Some(context);
        }
        for child in &mut self.children {
            child.set_context(context);
        }
        if let Some(component) = &mut self.component {
            for child in &mut component.children {
                child.set_context(context);
            }
        }
    }

    /// Apply a namespace down the tree. `foreignObject` children go back to
    /// the default namespace.
    pub(crate) fn apply_ns(&mut self, ns: &Arc<str>) {
        if self.tag.is_none() || self.component.is_some() {
            return;
        }
        self.ns = Some(ns.clone());
        if self.tag.as_deref() == Some("foreignObject") {
            return;
        }
        for child in &mut self.children {
            if child.ns.is_none() {
                child.apply_ns(ns);
            }
        }
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            let mut s = f.debug_struct("VNode");
            s.field("tag", tag);
            if let Some(key) = &self.key {
                s.field("key", key);
            }
            if !self.children.is_empty() {
                s.field("children", &self.children);
            }
            if let Some(id) = self.component_instance {
                s.field("instance", &id);
            }
            s.finish()
        } else if self.is_comment {
            write!(f, "Comment({:?})", self.text.as_deref().unwrap_or(""))
        } else {
            write!(f, "Text({:?})", self.text.as_deref().unwrap_or(""))
        }
    }
}

/// Merge adjacent text nodes.
pub fn normalize_children(children: Vec<VNode>) -> Vec<VNode> {
    let mut out: Vec<VNode> = Vec::with_capacity(children.len());
    for child in children {
        let is_text = child.tag.is_none() && !child.is_comment;
        if is_text {
            if let Some(last) = out.last_mut() {
                if last.tag.is_none() && !last.is_comment && last.elm.is_none() {
                    let merged = format!(
                        "{}{}",
                        last.text.as_deref().unwrap_or(""),
                        child.text.as_deref().unwrap_or("")
                    );
                    last.text = Some(merged);
                    continue;
                }
            }
        }
        out.push(child);
    }
    out
}

/// Whether `b` can be patched in place of `a`.
///
/// Same key, same tag, both comments or neither, data present on both or
/// neither, and for `input` elements the same `type` attribute.
pub fn same_vnode(a: &VNode, b: &VNode) -> bool {
    a.key == b.key
        && a.tag == b.tag
        && a.is_comment == b.is_comment
        && a.data.is_some() == b.data.is_some()
        && same_input_type(a, b)
}

fn same_input_type(a: &VNode, b: &VNode) -> bool {
    if a.tag.as_deref() != Some("input") {
        return true;
    }
    let input_type = |v: &VNode| v.data.as_ref().and_then(|d| d.attrs.get("type").cloned());
    let (ta, tb) = (input_type(a), input_type(b));
    match (&ta, &tb) {
        (Some(x), Some(y)) => x.same(y),
        (None, None) => true,
        _ => false,
    }
}

/// What a render function returns.
pub enum Rendered {
    Node(VNode),
    /// Only valid with exactly one node.
    Nodes(Vec<VNode>),
    Nothing,
}

impl From<VNode> for Rendered {
    fn from(vnode: VNode) -> Self {
        Rendered::Node(vnode)
    }
}

impl From<Vec<VNode>> for Rendered {
    fn from(nodes: Vec<VNode>) -> Self {
        Rendered::Nodes(nodes)
    }
}

impl From<Option<VNode>> for Rendered {
    fn from(node: Option<VNode>) -> Self {
        node.map(Rendered::Node).unwrap_or(Rendered::Nothing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_text_is_merged() {
        let children = normalize_children(vec![
            VNode::text("a"),
            VNode::text("b"),
            VNode::element("span", None, vec![]),
            VNode::text("c"),
        ]);
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].text_content(), Some("ab"));
    }

    #[test]
    fn same_vnode_rules() {
        let a = VNode::element("li", VNodeData::new().key("a"), vec![]);
        let a2 = VNode::element("li", VNodeData::new().key("a"), vec![]);
        let b = VNode::element("li", VNodeData::new().key("b"), vec![]);
        let no_data = VNode::element("li", None, vec![]);

        assert!(same_vnode(&a, &a2));
        assert!(!same_vnode(&a, &b));
        assert!(!same_vnode(&a, &no_data));
        assert!(same_vnode(&VNode::text("x"), &VNode::text("y")));
        assert!(!same_vnode(&VNode::text("x"), &VNode::comment("x")));
    }

    #[test]
    fn input_type_must_match() {
        let text = VNode::element("input", VNodeData::new().attr("type", "text"), vec![]);
        let check = VNode::element("input", VNodeData::new().attr("type", "checkbox"), vec![]);
        assert!(!same_vnode(&text, &check));
    }

    #[test]
    fn namespace_propagates_to_children() {
        let mut svg = VNode::element(
            "svg",
            None,
            vec![VNode::element("circle", None, vec![]), VNode::element("foreignObject", None, vec![VNode::element("div", None, vec![])])],
        );
        let ns: Arc<str> = "svg".into();
        svg.apply_ns(&ns);
        assert_eq!(svg.children()[0].ns(), Some("svg"));
        assert_eq!(svg.children()[1].ns(), Some("svg"));
        assert_eq!(svg.children()[1].children()[0].ns(), None);
    }
}
