use super::{Node, NodeStore};
use crate::address::NodeAddr;
use std::{collections::BTreeMap, convert::TryFrom};

/// The vec may grow to at least this many slots in one step, beyond that at most by doubling.
const MIN_GROWTH: usize = 1 << 16;

/// An ArrayStore keeps the nodes in a vec, indexed by their in-order position.
///
/// A full tree of version `v` occupies roughly the first `2 * (v + 1)` slots, so this is
/// compact for trees that are built by appending. Nodes whose position lies far beyond the
/// allocated slots, like the upper path of a pruned tree with a large version, are kept in a
/// sparse map until the vec grows to reach them. Pruned trees are still better kept in a
/// [MemStore](super::MemStore).
#[derive(Debug, Clone)]
pub struct ArrayStore<A, V> {
    slots: Vec<Option<Node<A, V>>>,
    sparse: BTreeMap<usize, Node<A, V>>,
    count: usize,
}

impl<A, V> Default for ArrayStore<A, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            sparse: BTreeMap::new(),
            count: 0,
        }
    }
}

impl<A, V> ArrayStore<A, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// number of slots currently allocated, materialized or not
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(addr: NodeAddr) -> usize {
        usize::try_from(addr.inorder())
            .unwrap_or_else(|_| panic!("{} does not fit into an array store", addr))
    }

    /// number of nodes kept outside the vec
    pub fn sparse_len(&self) -> usize {
        self.sparse.len()
    }

    /// largest length the vec may grow to in one step
    fn growth_limit(&self) -> usize {
        self.slots.len().saturating_mul(2).max(MIN_GROWTH)
    }

    /// grows the vec to `len` slots, moving sparse nodes that now fit into it
    fn grow(&mut self, len: usize) {
        if len <= self.slots.len() {
            return;
        }
        self.slots.resize_with(len, || None);
        let rest = self.sparse.split_off(&len);
        for (slot, node) in std::mem::replace(&mut self.sparse, rest) {
            self.slots[slot] = Some(node);
        }
    }

    fn get(&self, addr: NodeAddr) -> Option<&Node<A, V>> {
        let slot = Self::slot(addr);
        if slot < self.slots.len() {
            self.slots[slot].as_ref()
        } else {
            self.sparse.get(&slot)
        }
    }

    fn node_mut(&mut self, addr: NodeAddr) -> &mut Node<A, V> {
        let slot = Self::slot(addr);
        if slot >= self.slots.len() && slot < self.growth_limit() {
            self.grow(slot + 1);
        }
        if slot < self.slots.len() {
            let entry = &mut self.slots[slot];
            if entry.is_none() {
                self.count += 1;
            }
            entry.get_or_insert_with(Node::default)
        } else {
            let count = &mut self.count;
            self.sparse.entry(slot).or_insert_with(|| {
                *count += 1;
                Node::default()
            })
        }
    }
}

impl<A, V> NodeStore<A, V> for ArrayStore<A, V> {
    fn create_root(&mut self, layer: u32) -> NodeAddr {
        let root = NodeAddr::root(layer);
        self.materialize(root);
        root
    }

    fn update_version(&mut self, version: u64) {
        // only a hint, a template or pruned tree may have a huge version and very few nodes
        if let Ok(needed) = usize::try_from(version.saturating_add(1).saturating_mul(2)) {
            if needed <= self.growth_limit() {
                self.grow(needed);
            }
        }
    }

    fn contains(&self, addr: NodeAddr) -> bool {
        self.get(addr).is_some()
    }

    fn materialize(&mut self, addr: NodeAddr) {
        self.node_mut(addr);
    }

    fn value(&self, addr: NodeAddr) -> Option<&V> {
        self.get(addr).and_then(|node| node.value.as_ref())
    }

    fn set_value(&mut self, addr: NodeAddr, value: V) {
        self.node_mut(addr).value = Some(value);
    }

    fn agg(&self, addr: NodeAddr) -> Option<&A> {
        self.get(addr).and_then(|node| node.agg.as_ref())
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
        self.get(addr)
            .map(|node| node.valid && node.agg.is_some())
            .unwrap_or_default()
    }

    fn len(&self) -> usize {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{MAX_LAYER, MAX_VERSION};

    #[test]
    fn preallocates_on_version_update() {
        let mut store = ArrayStore::<u32, u32>::new();
        store.update_version(3);
        assert_eq!(store.capacity(), 8);
        assert!(store.is_empty());
    }

    #[test]
    fn grows_on_demand() {
        let mut store = ArrayStore::<u32, u32>::new();
        let root = store.create_root(2);
        let right = store.force_right(root);
        let leaf = store.force_left(right);
        assert_eq!(leaf, NodeAddr::leaf(2));
        store.set_value(leaf, 42);
        assert_eq!(store.value(leaf), Some(&42));
        assert!(store.contains(right));
        assert!(!store.contains(NodeAddr::leaf(3)));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn huge_versions_stay_sparse() {
        let mut store = ArrayStore::<u32, u32>::new();
        store.update_version(MAX_VERSION);
        assert_eq!(store.capacity(), 0);
        let root = store.create_root(MAX_LAYER);
        let right = store.force_right(root);
        store.set_agg(right, 7);
        assert!(store.contains(root));
        assert_eq!(store.agg(right), Some(&7));
        assert!(!store.contains(NodeAddr::new(MAX_LAYER - 1, 0)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.sparse_len(), 2);
        assert!(store.capacity() < 1 << 20);
    }

    #[test]
    fn sparse_nodes_move_into_the_vec() {
        let mut store = ArrayStore::<u32, u32>::new();
        let far = NodeAddr::leaf(1 << 17);
        store.set_value(far, 1);
        assert_eq!(store.sparse_len(), 1);
        let mut version = 0;
        while store.sparse_len() > 0 {
            version = version * 2 + 1;
            store.update_version(version);
        }
        assert!(store.capacity() > 1 << 18);
        assert_eq!(store.value(far), Some(&1));
        assert_eq!(store.len(), 1);
    }
}
