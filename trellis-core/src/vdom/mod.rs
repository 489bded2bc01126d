//! Virtual DOM
//!
//! Render functions produce [`VNode`] trees; a [`Patcher`] reconciles each
//! new tree against the previous one and drives a platform through
//! [`NodeOps`]. Attribute-level work is delegated to [`Module`]s.
//!
//! [`MemoryDom`] is a complete headless platform, used by the tests and
//! usable by hosts that render elsewhere.

pub mod memory_dom;
mod modules;
mod node_ops;
mod patch;
mod vnode;

pub use memory_dom::{DomOp, MemoryDom};
pub use modules::{base_modules, Module, RefModule, RefTarget};
pub use node_ops::{NodeId, NodeOps};
pub use patch::{InsertEntry, OldVNode, Patcher};
pub(crate) use patch::node_elm;
pub use vnode::{handler, normalize_children, same_vnode, ComponentVNode, Handler, IntoData, Key, Rendered, VNode, VNodeData};
