//! Rendering: the `create_element` helper handed to render functions, slot
//! resolution and the guarded render call.

use std::sync::Arc;

use indexmap::IndexMap;

use super::props::extract_props;
use super::{ComponentDef, ComponentId, Vm};
use crate::error::{handle_error, Error};
use crate::runtime::warn;
use crate::vdom::{ComponentVNode, IntoData, Rendered, VNode, VNodeData};

const SVG_NAMESPACE: &str = "svg";
const MATH_NAMESPACE: &str = "math";

/// Node factory passed to render functions.
///
/// Tags registered as components on the rendering component resolve to
/// component placeholders; everything else becomes an element.
pub struct CreateElement {
    vm: Vm,
}

impl CreateElement {
    pub(crate) fn new(vm: &Vm) -> Self {
        Self { vm: vm.clone() }
    }

    /// An element, or a placeholder when `tag` names a registered component.
    pub fn el(&self, tag: &str, data: impl IntoData, children: Vec<VNode>) -> VNode {
        if let Some(def) = self.vm.def().resolve_component(tag) {
            return self.placeholder(&def, Some(tag), data.into_data(), children);
        }
        let mut vnode = VNode::element(tag, data, children);
        let ns = match tag {
            "svg" => Some(SVG_NAMESPACE),
            "math" => Some(MATH_NAMESPACE),
            _ => None,
        };
        if let Some(ns) = ns {
            let ns: Arc<str> = ns.into();
            vnode.apply_ns(&ns);
        }
        vnode
    }

    pub fn text(&self, text: impl Into<String>) -> VNode {
        VNode::text(text)
    }

    pub fn comment(&self, text: impl Into<String>) -> VNode {
        VNode::comment(text)
    }

    pub fn empty(&self) -> VNode {
        VNode::empty()
    }

    /// A placeholder for `def`. `children` become its slot content.
    pub fn component(&self, def: &ComponentDef, data: impl IntoData, children: Vec<VNode>) -> VNode {
        self.placeholder(def, None, data.into_data(), children)
    }

    /// Copies of the slot content passed in by the parent.
    pub fn slot(&self, name: &str) -> Vec<VNode> {
        self.vm.slot(name)
    }

    /// The instance being rendered.
    pub fn vm(&self) -> &Vm {
        &self.vm
    }

    fn placeholder(
        &self,
        def: &ComponentDef,
        tag: Option<&str>,
        data: Option<VNodeData>,
        children: Vec<VNode>,
    ) -> VNode {
        let mut data = data.unwrap_or_default();
        let props_data = extract_props(&def.options().props, &mut data);
        let listeners = data.on.clone();

        if def.is_abstract() {
            // Abstract components keep nothing but slot placement.
            data = VNodeData {
                key: data.key.take(),
                slot: data.slot.take(),
                ..VNodeData::default()
            };
        }

        let name = tag
            .map(str::to_string)
            .or_else(|| def.name().map(str::to_string));
        let vtag = format!("component-{}-{}", def.cid(), name.as_deref().unwrap_or("anonymous"));

        VNode {
            tag: Some(vtag.into()),
            key: data.key.clone(),
            data: Some(data),
            component: Some(Box::new(ComponentVNode {
                def: def.clone(),
                props_data,
                listeners,
                children,
                tag: name,
            })),
            ..VNode::default()
        }
    }
}

pub(crate) fn init_render(vm: &Vm) {
    let (children, context) = vm
        .placeholder()
        .map(|p| (p.component.map(|c| c.children).unwrap_or_default(), p.context))
        .unwrap_or_default();
    set_slots(vm, &children, context);
}

/// `context` is the component that rendered the placeholder.
pub(crate) fn set_slots(vm: &Vm, children: &[VNode], context: Option<ComponentId>) {
    *vm.inner.slots.lock() = resolve_slots(children, context);
}

/// Group slot content by the slot name in its data. Unnamed content goes to
/// `default`, which is dropped when it is only whitespace.
///
/// A slot name only counts on nodes rendered by `context`. Content passed
/// down from further up keeps its own context and lands in `default`.
fn resolve_slots(children: &[VNode], context: Option<ComponentId>) -> IndexMap<String, Vec<VNode>> {
    let mut slots: IndexMap<String, Vec<VNode>> = IndexMap::new();
    for child in children {
        let name = child
            .data
            .as_ref()
            .and_then(|d| d.slot.clone())
            .filter(|_| child.context == context)
            .unwrap_or_else(|| "default".to_string());
        slots.entry(name).or_default().push(child.clone());
    }
    let whitespace_only = slots
        .get("default")
        .is_some_and(|nodes| nodes.iter().all(|n| n.is_whitespace() || n.is_comment));
    if whitespace_only {
        slots.shift_remove("default");
    }
    slots
}

/// Run the render function. A failing render reports the error and falls
/// back to the `render_error` output, then to the previous tree.
pub(crate) fn render(vm: &Vm) -> VNode {
    let h = CreateElement::new(vm);
    let Some(render_fn) = vm.def().options().render.clone() else {
        return VNode::empty();
    };

    let rendered = match render_fn(vm, &h) {
        Ok(rendered) => rendered,
        Err(source) => {
            let err = Error::user("render", source);
            handle_error(&err, Some(vm.id()));
            match vm.def().options().render_error.clone() {
                Some(render_error) => match render_error(vm, &h, &err) {
                    Ok(rendered) => rendered,
                    Err(source) => {
                        handle_error(&Error::user("render_error", source), Some(vm.id()));
                        fallback(vm)
                    }
                },
                None => fallback(vm),
            }
        }
    };

    let mut vnode = match rendered {
        Rendered::Node(vnode) => vnode,
        Rendered::Nodes(mut nodes) if nodes.len() == 1 => nodes.remove(0),
        Rendered::Nodes(nodes) if nodes.is_empty() => VNode::empty(),
        Rendered::Nodes(_) => {
            warn(
                "Multiple root nodes returned from render function. Render function should return a single root node.",
                Some(vm.id()),
            );
            VNode::empty()
        }
        Rendered::Nothing => VNode::empty(),
    };
    vnode.set_context(vm.id());
    vnode
}

fn fallback(vm: &Vm) -> Rendered {
    vm.vnode().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_group_by_name() {
        let children = vec![
            VNode::element("h1", VNodeData::new().slot("header"), vec![]),
            VNode::text("body"),
            VNode::element("p", VNodeData::new().slot("header"), vec![]),
        ];
        let slots = resolve_slots(&children, None);
        assert_eq!(slots["header"].len(), 2);
        assert_eq!(slots["default"].len(), 1);
    }

    #[test]
    fn forwarded_named_content_goes_to_default() {
        let parent = ComponentId::new();
        let outer = ComponentId::new();
        let mut own = VNode::element("h1", VNodeData::new().slot("header"), vec![]);
        own.set_context(parent);
        let mut forwarded = VNode::element("h2", VNodeData::new().slot("header"), vec![]);
        forwarded.set_context(outer);

        let slots = resolve_slots(&[own, forwarded], Some(parent));

        assert_eq!(slots["header"].len(), 1);
        assert_eq!(slots["header"][0].tag(), Some("h1"));
        assert_eq!(slots["default"].len(), 1);
        assert_eq!(slots["default"][0].tag(), Some("h2"));
    }

    #[test]
    fn whitespace_default_slot_is_dropped() {
        let slots = resolve_slots(&[VNode::text("  \n ")], None);
        assert!(!slots.contains_key("default"));
    }
}
