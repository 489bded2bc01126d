//! Trellis Core
//!
//! This crate provides the core runtime of the Trellis UI framework:
//!
//! - Reactive state (observed objects and arrays, dependencies, watchers)
//! - A batching scheduler driven by an explicit tick
//! - Component instances and their lifecycle, including keep-alive caching
//! - A virtual DOM patcher with keyed reconciliation
//!
//! # Architecture
//!
//! - `reactive`: values, dependency tracking, watchers and the scheduler
//! - `instance`: component definitions, instances and lifecycle
//! - `vdom`: virtual nodes, the patch engine and platform adapters
//! - `error` / `runtime`: the error choke point, warnings and configuration
//!
//! Rendering targets a platform through the [`vdom::NodeOps`] trait. The
//! crate ships [`vdom::MemoryDom`], an in-memory tree that records every
//! mutation.
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::instance::{ComponentOptions, Vm};
//! use trellis_core::reactive::tick;
//! use trellis_core::vdom::{MemoryDom, NodeOps, Patcher};
//!
//! let dom = MemoryDom::new();
//! let patcher = Patcher::new(dom.clone(), dom.platform_modules());
//! let app = dom.create_root("div");
//! let target = dom.create_element("div");
//! dom.append_child(app, target);
//!
//! let counter = ComponentOptions::new()
//!     .data(|_| Ok(serde_json::json!({ "count": 0 }).into()))
//!     .render(|vm, h| Ok(h.el("p", None, vec![h.text(vm.get("count").to_string())]).into()))
//!     .build();
//!
//! let vm = Vm::new(&counter, &patcher);
//! vm.mount(Some(target));
//!
//! vm.assign("count", 1);
//! tick();
//! assert_eq!(dom.to_html(app), "<div><p>1</p></div>");
//! ```

pub mod error;
pub mod instance;
pub mod reactive;
pub mod runtime;
pub mod vdom;

pub use error::{BoxError, Error};
pub use instance::{ComponentDef, ComponentId, ComponentOptions, Vm};
pub use reactive::{next_tick, tick, Value};
pub use runtime::{Config, Runtime};
pub use vdom::{MemoryDom, Patcher, VNode, VNodeData};
