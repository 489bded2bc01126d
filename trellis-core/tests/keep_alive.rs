//! Keep-alive Tests
//!
//! A parent switches between named components inside `<keep-alive>` and the
//! tests follow which instances are created, reused, deactivated and
//! destroyed.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use serde_json::json;

use trellis_core::instance::keep_alive::{self, cached_instances};
use trellis_core::instance::{arena, ComponentDef, ComponentOptions, LifecycleHook, Vm};
use trellis_core::reactive::tick;
use trellis_core::vdom::{MemoryDom, NodeId, NodeOps, Patcher, VNodeData};

#[derive(Default)]
struct Counts {
    created: AtomicI32,
    activated: AtomicI32,
    deactivated: AtomicI32,
    destroyed: AtomicI32,
}

impl Counts {
    fn get(&self) -> (i32, i32, i32, i32) {
        (
            self.created.load(Ordering::SeqCst),
            self.activated.load(Ordering::SeqCst),
            self.deactivated.load(Ordering::SeqCst),
            self.destroyed.load(Ordering::SeqCst),
        )
    }
}

/// A component rendering its name and counting its lifecycle.
fn tracked(name: &'static str, counts: &Arc<Counts>) -> ComponentDef {
    let created = counts.clone();
    let activated = counts.clone();
    let deactivated = counts.clone();
    let destroyed = counts.clone();
    ComponentOptions::new()
        .name(name)
        .hook(LifecycleHook::Created, move |_| {
            created.created.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .hook(LifecycleHook::Activated, move |_| {
            activated.activated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .hook(LifecycleHook::Deactivated, move |_| {
            deactivated.deactivated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .hook(LifecycleHook::Destroyed, move |_| {
            destroyed.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .render(move |_, h| Ok(h.el("span", None, vec![h.text(name)]).into()))
        .build()
}

struct Fixture {
    dom: Arc<MemoryDom>,
    container: NodeId,
    vm: Vm,
    a: Arc<Counts>,
    b: Arc<Counts>,
    c: Arc<Counts>,
}

/// Mount a parent showing `view` inside a keep-alive configured by `config`.
/// The parent's data may carry `include` and `exclude`, passed through as
/// props.
fn mount(data: serde_json::Value, config: VNodeData) -> Fixture {
    let dom = MemoryDom::new();
    let patcher = Patcher::new(dom.clone(), dom.platform_modules());
    let container = dom.create_root("div");
    let target = dom.create_element("div");
    dom.append_child(container, target);

    let (a, b, c) = (Arc::default(), Arc::default(), Arc::default());
    let parent = ComponentOptions::new()
        .data(move |_| Ok(data.clone().into()))
        .component("keep-alive", keep_alive::keep_alive())
        .component("a", tracked("a", &a))
        .component("b", tracked("b", &b))
        .component("c", tracked("c", &c))
        .render(move |vm, h| {
            let mut config = config.clone();
            for key in ["include", "exclude"] {
                let value = vm.get(key);
                if !value.is_null() {
                    config = config.prop(key, value);
                }
            }
            let view = vm.get("view").to_string();
            let cached = h.el("keep-alive", config, vec![h.el(&view, None, vec![])]);
            Ok(h.el("div", None, vec![cached]).into())
        })
        .build();

    let vm = Vm::new(&parent, &patcher);
    vm.mount(Some(target));
    Fixture {
        dom,
        container,
        vm,
        a,
        b,
        c,
    }
}

impl Fixture {
    fn show(&self, view: &str) {
        self.vm.assign("view", view);
        tick();
    }

    fn keep_alive(&self) -> Vm {
        let root = self.vm.vnode().expect("rendered");
        let id = root.children()[0].component_instance().expect("keep-alive instance");
        arena::get(id).expect("keep-alive is alive")
    }

    fn html(&self) -> String {
        self.dom.to_html(self.container)
    }
}

#[test]
fn first_render_caches_and_activates() {
    let f = mount(json!({ "view": "a" }), VNodeData::new());

    assert_eq!(f.html(), "<div><div><span>a</span></div></div>");
    assert_eq!(f.a.get(), (1, 1, 0, 0));
    assert_eq!(keep_alive::cached_len(&f.keep_alive()), 1);
}

#[test]
fn switching_deactivates_instead_of_destroying() {
    let f = mount(json!({ "view": "a" }), VNodeData::new());
    let first = f.vm.children()[0];

    f.show("b");
    assert_eq!(f.html(), "<div><div><span>b</span></div></div>");
    assert_eq!(f.a.get(), (1, 1, 1, 0));
    assert_eq!(f.b.get(), (1, 1, 0, 0));
    assert!(arena::get(first).is_some_and(|a| a.is_inactive()));

    f.show("a");
    assert_eq!(f.html(), "<div><div><span>a</span></div></div>");
    assert_eq!(f.a.get(), (1, 2, 1, 0));
    assert_eq!(f.b.get(), (1, 1, 1, 0));
    assert_eq!(cached_instances(&f.keep_alive()).len(), 2);
    assert!(arena::get(first).is_some_and(|a| !a.is_inactive()));
}

#[test]
fn max_evicts_least_recently_used() {
    let f = mount(json!({ "view": "a" }), VNodeData::new().prop("max", 2));
    let first = f.vm.children()[0];

    f.show("b");
    f.show("c");

    assert_eq!(f.a.get(), (1, 1, 1, 1));
    assert!(!arena::contains(first));
    let cached = cached_instances(&f.keep_alive());
    assert_eq!(cached.len(), 2);

    // Returning to `b` reuses its instance and makes it most recent.
    let b_id = cached[0];
    f.show("b");
    assert_eq!(f.b.get(), (1, 2, 1, 0));
    assert_eq!(f.c.get(), (1, 1, 1, 0));
    assert_eq!(cached_instances(&f.keep_alive()).last(), Some(&b_id));
    assert_eq!(f.html(), "<div><div><span>b</span></div></div>");

    // `a` comes back as a fresh instance and evicts `c`.
    f.show("a");
    assert_eq!(f.a.get(), (2, 2, 1, 1));
    assert_eq!(f.c.get(), (1, 1, 1, 1));
}

#[test]
fn max_accepts_string() {
    let f = mount(json!({ "view": "a" }), VNodeData::new().prop("max", "1"));

    f.show("b");
    assert_eq!(f.a.get().3, 1);
    assert_eq!(cached_instances(&f.keep_alive()).len(), 1);
}

#[test]
fn excluded_components_are_not_cached() {
    let f = mount(json!({ "view": "a", "exclude": "b" }), VNodeData::new());

    f.show("b");
    f.show("a");

    assert_eq!(f.a.get(), (1, 2, 1, 0));
    assert_eq!(f.b.get(), (1, 0, 0, 1));
    assert_eq!(cached_instances(&f.keep_alive()).len(), 1);
}

#[test]
fn include_accepts_arrays() {
    let f = mount(json!({ "view": "a", "include": ["a"] }), VNodeData::new());

    f.show("c");
    assert_eq!(f.a.get(), (1, 1, 1, 0));

    f.show("a");
    assert_eq!(f.c.get(), (1, 0, 0, 1));
    assert_eq!(f.a.get(), (1, 2, 1, 0));
}

#[test]
fn narrowing_include_prunes_cache() {
    let f = mount(json!({ "view": "a", "include": "a,b" }), VNodeData::new());
    f.show("b");
    assert_eq!(cached_instances(&f.keep_alive()).len(), 2);

    f.vm.assign("include", "b");
    tick();

    assert_eq!(f.a.get().3, 1);
    assert_eq!(f.b.get().3, 0);
    assert_eq!(cached_instances(&f.keep_alive()).len(), 1);
}

#[test]
fn destroying_the_parent_destroys_cached_instances() {
    let f = mount(json!({ "view": "a" }), VNodeData::new());
    f.show("b");
    f.show("c");
    let children = f.vm.children();
    assert_eq!(children.len(), 3);

    f.vm.destroy();

    assert_eq!(f.a.get().3, 1);
    assert_eq!(f.b.get().3, 1);
    assert_eq!(f.c.get().3, 1);
    assert!(children.iter().all(|id| !arena::contains(*id)));
    assert_eq!(f.html(), "<div></div>");
}

#[test]
fn cached_nodes_survive_switching() {
    let f = mount(json!({ "view": "a" }), VNodeData::new());
    f.show("b");
    f.show("a");
    let settled = f.dom.node_count();

    for _ in 0..5 {
        f.show("b");
        f.show("a");
    }

    assert_eq!(f.dom.node_count(), settled);
    assert_eq!(f.html(), "<div><div><span>a</span></div></div>");
    assert_eq!(f.a.get(), (1, 7, 6, 0));
    assert_eq!(f.b.get(), (1, 6, 6, 0));
}

#[test]
fn evicted_instances_release_their_nodes() {
    let f = mount(json!({ "view": "a" }), VNodeData::new().prop("max", 1));
    f.show("b");
    let settled = f.dom.node_count();

    for view in ["c", "a", "b", "c", "a", "b"] {
        f.show(view);
    }

    assert_eq!(f.dom.node_count(), settled);
    assert_eq!(f.b.get(), (3, 3, 2, 2));
}

#[test]
fn clearing_include_prunes_all_but_current() {
    let f = mount(json!({ "view": "a", "include": "a,b,c" }), VNodeData::new());
    f.show("b");
    f.show("c");
    assert_eq!(cached_instances(&f.keep_alive()).len(), 3);

    f.vm.assign("include", "");
    tick();

    assert_eq!(f.a.get().3, 1);
    assert_eq!(f.b.get().3, 1);
    assert_eq!(f.c.get().3, 0);
    assert!(cached_instances(&f.keep_alive()).is_empty());
    assert_eq!(f.html(), "<div><div><span>c</span></div></div>");
}
