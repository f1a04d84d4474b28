//! interface to the node storage of a history tree
//!
//! Nodes are addressed by [NodeAddr], so a store is essentially a map from addresses to node
//! contents. A node that is absent from the store is not materialized: either growth has not
//! reached it yet, or it was pruned away and only its parent carries information about it.
use crate::address::NodeAddr;
mod array_store;
mod mem_store;

pub use array_store::ArrayStore;
pub use mem_store::MemStore;

/// contents of a materialized node
#[derive(Debug, Clone)]
pub struct Node<A, V> {
    /// value, only ever present on leaves
    pub value: Option<V>,
    /// aggregate, absent while the node is open or when it was never copied
    pub agg: Option<A>,
    /// the aggregate slot holds a trustworthy aggregate
    pub valid: bool,
}

impl<A, V> Default for Node<A, V> {
    fn default() -> Self {
        Self {
            value: None,
            agg: None,
            valid: false,
        }
    }
}

/// Storage for the nodes of a single tree.
///
/// All mutation goes through `&mut self`, so a store is only ever written by the single writer
/// that owns the tree.
pub trait NodeStore<A, V> {
    /// creates an empty node at `NodeAddr::root(layer)` and returns its address
    ///
    /// existing nodes are kept, so when the tree grows the old root stays where it is and becomes
    /// the left child of the new root.
    fn create_root(&mut self, layer: u32) -> NodeAddr;

    /// notifies the store that the tree now holds `version`
    ///
    /// stores that preallocate space can use this as a capacity hint.
    fn update_version(&mut self, version: u64);

    /// true if the node is materialized
    fn contains(&self, addr: NodeAddr) -> bool;

    /// materializes an empty node if it is absent. Never touches an existing node.
    fn materialize(&mut self, addr: NodeAddr);

    fn value(&self, addr: NodeAddr) -> Option<&V>;

    fn set_value(&mut self, addr: NodeAddr, value: V);

    fn agg(&self, addr: NodeAddr) -> Option<&A>;

    /// sets the aggregate and marks it valid
    ///
    /// the engine never calls this for a node that already has an aggregate.
    fn set_agg(&mut self, addr: NodeAddr, agg: A);

    fn mark_valid(&mut self, addr: NodeAddr);

    fn is_agg_valid(&self, addr: NodeAddr) -> bool;

    /// number of materialized nodes
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn left(&self, addr: NodeAddr) -> Option<NodeAddr> {
        addr.left_child().filter(|child| self.contains(*child))
    }

    fn right(&self, addr: NodeAddr) -> Option<NodeAddr> {
        addr.right_child().filter(|child| self.contains(*child))
    }

    fn force_left(&mut self, addr: NodeAddr) -> NodeAddr {
        let child = addr
            .left_child()
            .unwrap_or_else(|| panic!("leaf {} has no children", addr));
        self.materialize(child);
        child
    }

    fn force_right(&mut self, addr: NodeAddr) -> NodeAddr {
        let child = addr
            .right_child()
            .unwrap_or_else(|| panic!("leaf {} has no children", addr));
        self.materialize(child);
        child
    }

    fn is_leaf(&self, addr: NodeAddr) -> bool {
        addr.is_leaf()
    }

    fn is_frozen(&self, addr: NodeAddr, version: u64) -> bool {
        addr.is_frozen(version)
    }
}
