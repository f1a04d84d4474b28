use super::{Node, NodeStore};
use crate::address::NodeAddr;
use fnv::FnvHashMap;

/// A MemStore keeps the materialized nodes in a hash map keyed by address.
///
/// It works for any tree shape, so this is the store to use for pruned trees.
#[derive(Debug, Clone)]
pub struct MemStore<A, V> {
    nodes: FnvHashMap<NodeAddr, Node<A, V>>,
}

impl<A, V> Default for MemStore<A, V> {
    fn default() -> Self {
        Self {
            nodes: FnvHashMap::default(),
        }
    }
}

impl<A, V> MemStore<A, V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, addr: NodeAddr) -> &mut Node<A, V> {
        self.nodes.entry(addr).or_default()
    }
}

impl<A, V> NodeStore<A, V> for MemStore<A, V> {
    fn create_root(&mut self, layer: u32) -> NodeAddr {
        let root = NodeAddr::root(layer);
        self.materialize(root);
        root
    }

    fn update_version(&mut self, _version: u64) {}

    fn contains(&self, addr: NodeAddr) -> bool {
        self.nodes.contains_key(&addr)
    }

    fn materialize(&mut self, addr: NodeAddr) {
        self.nodes.entry(addr).or_default();
    }

    fn value(&self, addr: NodeAddr) -> Option<&V> {
        self.nodes.get(&addr).and_then(|node| node.value.as_ref())
    }

    fn set_value(&mut self, addr: NodeAddr, value: V) {
        self.node_mut(addr).value = Some(value);
    }

    fn agg(&self, addr: NodeAddr) -> Option<&A> {
        self.nodes.get(&addr).and_then(|node| node.agg.as_ref())
    }

    fn set_agg(&mut self, addr: NodeAddr, agg: A) {
        let node = self.node_mut(addr);
        node.agg = Some(agg);
        node.valid = true;
    }

    fn mark_valid(&mut self, addr: NodeAddr) {
        self.node_mut(addr).valid = true;
    }

    fn is_agg_valid(&self, addr: NodeAddr) -> bool {
        self.nodes
            .get(&addr)
            .map(|node| node.valid && node.agg.is_some())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }
}
