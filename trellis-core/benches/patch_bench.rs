//! Benchmarks for keyed reconciliation and component re-rendering.
//!
//! Run with: cargo bench -p trellis-core --bench patch_bench

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use serde_json::json;

use trellis_core::instance::{ComponentOptions, Vm};
use trellis_core::reactive::tick;
use trellis_core::vdom::{MemoryDom, NodeOps, OldVNode, Patcher, VNode, VNodeData};

fn keyed_list(keys: &[usize]) -> VNode {
    VNode::element(
        "ul",
        None,
        keys.iter()
            .map(|k| VNode::element("li", VNodeData::new().key(*k), vec![VNode::text(k.to_string())]))
            .collect(),
    )
}

/// A patcher with `keys` already mounted, plus the tree to patch towards.
fn mounted(keys: &[usize], next: &[usize]) -> (Patcher, VNode, VNode) {
    let dom = MemoryDom::new();
    let patcher = Patcher::new(dom.clone(), dom.platform_modules());
    let container = dom.create_root("div");
    let target = dom.create_element("div");
    dom.append_child(container, target);

    let mut old = keyed_list(keys);
    patcher.patch(Some(OldVNode::Element(target)), Some(&mut old), None);
    (patcher, old, keyed_list(next))
}

fn bench_keyed(c: &mut Criterion) {
    let mut group = c.benchmark_group("patch/keyed");

    for n in [100usize, 1_000] {
        group.throughput(Throughput::Elements(n as u64));
        let keys: Vec<usize> = (0..n).collect();

        let scenarios: [(&str, Vec<usize>); 4] = [
            ("identical", keys.clone()),
            ("reverse", keys.iter().rev().copied().collect()),
            ("rotate", keys.iter().cycle().skip(1).take(n).copied().collect()),
            ("replace_half", keys.iter().map(|k| if k % 2 == 0 { k + n } else { *k }).collect()),
        ];

        for (name, next) in scenarios {
            group.bench_with_input(BenchmarkId::new(name, n), &next, |b, next| {
                b.iter_batched(
                    || mounted(&keys, next),
                    |(patcher, old, mut new)| {
                        black_box(patcher.patch(Some(OldVNode::VNode(old)), Some(&mut new), None));
                    },
                    BatchSize::LargeInput,
                )
            });
        }
    }

    group.finish();
}

fn bench_component_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("component/update");

    for n in [100usize, 1_000] {
        let dom = MemoryDom::new();
        let patcher = Patcher::new(dom.clone(), dom.platform_modules());
        let container = dom.create_root("div");
        let target = dom.create_element("div");
        dom.append_child(container, target);

        let def = ComponentOptions::new()
            .data(move |_| Ok(json!({ "offset": 0, "rows": n }).into()))
            .render(|vm, h| {
                let offset = vm.get("offset").as_f64().unwrap_or(0.0) as usize;
                let rows = vm.get("rows").as_f64().unwrap_or(0.0) as usize;
                let items = (0..rows)
                    .map(|i| {
                        let label = (i + offset).to_string();
                        h.el("li", VNodeData::new().key(i), vec![h.text(label)])
                    })
                    .collect();
                Ok(h.el("ul", None, items).into())
            })
            .build();
        let vm = Vm::new(&def, &patcher);
        vm.mount(Some(target));

        let mut offset = 0usize;
        group.throughput(Throughput::Elements(n as u64));
        group.bench_function(BenchmarkId::new("text_change", n), |b| {
            b.iter(|| {
                offset += 1;
                vm.assign("offset", offset);
                tick();
            })
        });

        vm.destroy();
    }

    group.finish();
}

criterion_group!(benches, bench_keyed, bench_component_update);
criterion_main!(benches);
