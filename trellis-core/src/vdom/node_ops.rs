//! Platform Node Operations
//!
//! The patch engine never touches real nodes directly. Everything goes
//! through this fixed set of operations, implemented once per platform.
//! Nodes are referred to by opaque [`NodeId`]s handed out by the platform.

use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque handle to a platform node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// The operations a platform must provide.
///
/// `insert_before` with no reference node appends. Inserting a node that
/// already has a parent moves it. A removed node may be inserted again until
/// it is passed to [`NodeOps::discard`].
pub trait NodeOps: Send + Sync {
    fn create_element(&self, tag: &str) -> NodeId;
    fn create_element_ns(&self, namespace: &str, tag: &str) -> NodeId;
    fn create_text_node(&self, text: &str) -> NodeId;
    fn create_comment(&self, text: &str) -> NodeId;
    fn insert_before(&self, parent: NodeId, node: NodeId, reference: Option<NodeId>);
    fn remove_child(&self, parent: NodeId, child: NodeId);
    fn append_child(&self, parent: NodeId, child: NodeId);
    fn parent_node(&self, node: NodeId) -> Option<NodeId>;
    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;
    fn tag_name(&self, node: NodeId) -> String;
    fn set_text_content(&self, node: NodeId, text: &str);
    fn set_style_scope(&self, node: NodeId, scope_id: &str);

    /// A detached node and its subtree will not be inserted again.
    ///
    /// Platforms that own node storage free it here. Nodes that are still
    /// attached must be left alone.
    fn discard(&self, _node: NodeId) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let a = NodeId::new();
        let b = NodeId::new();
        assert_ne!(a, b);
        assert_eq!(NodeId::from(a.raw()), a);
    }
}
