//! the history tree engine
use crate::{
    address::{self, NodeAddr, MAX_VERSION},
    aggregation::Aggregation,
    store::NodeStore,
};
use core::fmt;
use tracing::{debug, error, trace};

#[cfg(feature = "metrics")]
use crate::prom;

/// An append only authenticated tree over a log of values.
///
/// Leaf `i` holds the value appended as version `i`. Internal nodes get their aggregate exactly
/// once, as soon as they are frozen, i.e. as soon as every version they cover has been appended.
///
/// The tree is parametrized with the aggregation function and the node store. Both are fixed for
/// the lifetime of the tree.
pub struct HistoryTree<G: Aggregation, S> {
    /// most recently appended version, `None` for an empty tree
    version: Option<u64>,
    /// current root, always at index 0 of its layer
    root: Option<NodeAddr>,
    aggobj: G,
    store: S,
}

impl<G, S> HistoryTree<G, S>
where
    G: Aggregation,
    S: NodeStore<G::Agg, G::Value>,
{
    pub fn new(aggobj: G, store: S) -> Self {
        Self {
            version: None,
            root: None,
            aggobj,
            store,
        }
    }

    /// version of the most recently appended value, `None` for an empty tree
    pub fn version(&self) -> Option<u64> {
        self.version
    }

    /// number of values in the log
    pub fn len(&self) -> u64 {
        self.version.map(|v| v + 1).unwrap_or_default()
    }

    /// true for an empty tree
    pub fn is_empty(&self) -> bool {
        self.version.is_none()
    }

    pub fn root(&self) -> Option<NodeAddr> {
        self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// a fresh copy of the aggregation object, for building derived trees
    pub fn agg_obj(&self) -> G {
        self.aggobj.clone()
    }

    pub(crate) fn aggobj(&self) -> &G {
        &self.aggobj
    }

    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub(crate) fn set_root(&mut self, root: NodeAddr) {
        self.root = Some(root);
    }

    /// Turns an empty tree into a template at the given version.
    ///
    /// The template has no root yet. It is filled by copying paths from a full tree or by
    /// parsing an encoding.
    pub fn update_version(&mut self, version: u64) -> &mut Self {
        assert!(
            self.root.is_none(),
            "only a tree without nodes can be turned into a template"
        );
        assert!(version <= MAX_VERSION, "version {} is too large", version);
        self.version = Some(version);
        self.store.update_version(version);
        self
    }

    /// Appends a value as the next version
    pub fn append(&mut self, value: G::Value) {
        let leaf = match self.version {
            None => {
                self.version = Some(0);
                self.store.update_version(0);
                let root = self.store.create_root(0);
                self.root = Some(root);
                root
            }
            Some(version) => {
                assert!(version < MAX_VERSION, "history tree is full");
                let version = version + 1;
                self.version = Some(version);
                self.store.update_version(version);
                self.reparent(version);
                self.force_leaf(version)
            }
        };
        self.store.set_value(leaf, value);
        self.compute_frozen_aggs(leaf);
        #[cfg(feature = "metrics")]
        prom::APPEND_COUNT.inc();
    }

    /// Grows the tree until the root covers `version`.
    ///
    /// The old root keeps its address, so it automatically becomes the left child of the new
    /// root. The right child starts out as an empty stub.
    fn reparent(&mut self, version: u64) {
        let mut root = self
            .root
            .expect("cannot grow a tree without a root, append to a template");
        while root.max_version() < version {
            let layer = root.layer + 1;
            root = self.store.create_root(layer);
            self.store.force_right(root);
            debug!("reparent to layer {} for version {}", layer, version);
            #[cfg(feature = "metrics")]
            prom::REPARENT_COUNT.inc();
        }
        self.root = Some(root);
    }

    /// Walks from the leaf upwards, computing the aggregate of every node that just got frozen
    fn compute_frozen_aggs(&mut self, leaf: NodeAddr) {
        let version = self.version.expect("tree must not be empty");
        let root = self.root.expect("tree must not be empty");
        if self.store.agg(leaf).is_none() {
            if let Some(value) = self.store.value(leaf) {
                let agg = self.aggobj.map_value(value);
                self.store.mark_valid(leaf);
                self.store.set_agg(leaf, agg);
                #[cfg(feature = "metrics")]
                prom::AGG_COUNT.inc();
            }
        }
        let mut node = leaf;
        while node.layer < root.layer {
            node = node.parent();
            if !node.is_frozen(version) || self.store.agg(node).is_some() {
                break;
            }
            let agg = self.combine_children(node);
            trace!("aggregate computed for {} at version {}", node, version);
            self.store.set_agg(node, agg);
            #[cfg(feature = "metrics")]
            prom::AGG_COUNT.inc();
        }
    }

    fn combine_children(&self, node: NodeAddr) -> G::Agg {
        self.try_combine_children(node).unwrap_or_else(|| {
            panic!(
                "frozen node {} is missing a child aggregate at version {:?}",
                node, self.version
            )
        })
    }

    pub(crate) fn try_combine_children(&self, node: NodeAddr) -> Option<G::Agg> {
        let left = self.store.agg(node.left_child()?)?;
        let right = self.store.agg(node.right_child()?)?;
        Some(self.aggobj.combine(left, right))
    }

    fn check_version(&self, version: u64) {
        match self.version {
            Some(current) => assert!(
                version <= current,
                "version {} is beyond the current version {}",
                version,
                current
            ),
            None => panic!("version {} requested from an empty tree", version),
        }
    }

    /// The leaf for `version`, if the whole path to it is materialized
    pub fn find_leaf(&self, version: u64) -> Option<NodeAddr> {
        let root = self.root?;
        if !root.covers(version) {
            return None;
        }
        let mut node = root;
        while let Some(child) = node.child_towards(version) {
            if !self.store.contains(child) {
                return None;
            }
            node = child;
        }
        Some(node)
    }

    /// The leaf for `version`.
    ///
    /// Panics if the path is broken. For a tree built by appending this can not happen.
    pub fn leaf(&self, version: u64) -> NodeAddr {
        self.check_version(version);
        self.find_leaf(version)
            .unwrap_or_else(|| panic!("broken path to leaf {}", version))
    }

    /// The leaf for `version`, materializing every missing node on the way
    fn force_leaf(&mut self, version: u64) -> NodeAddr {
        let root = self.root.expect("tree must not be empty");
        let mut node = root;
        while let Some(child) = node.child_towards(version) {
            self.store.materialize(child);
            node = child;
        }
        node
    }

    /// value for `version`, unless it was pruned away
    pub fn value(&self, version: u64) -> Option<&G::Value> {
        self.check_version(version);
        self.find_leaf(version)
            .and_then(|leaf| self.store.value(leaf))
    }

    /// stored aggregate of a node, if it is frozen and materialized
    pub fn node_agg(&self, addr: NodeAddr) -> Option<&G::Agg> {
        self.store.agg(addr)
    }

    /// Computes the aggregate of a node from scratch, from its value or its children.
    ///
    /// For a frozen node this is always equal to the stored aggregate.
    pub fn recompute_agg(&self, addr: NodeAddr) -> Option<G::Agg> {
        if addr.is_leaf() {
            self.store
                .value(addr)
                .map(|value| self.aggobj.map_value(value))
        } else {
            self.try_combine_children(addr)
        }
    }

    /// commitment for the current version
    pub fn agg(&self) -> Option<G::Agg> {
        self.version.and_then(|version| self.agg_at(version))
    }

    /// Commitment for an earlier version.
    ///
    /// This is the aggregate of the smallest subtree containing versions `0..=version`, as it
    /// was at that version. Subtrees that were still empty contribute nothing, which is expressed
    /// using [Aggregation::combine_open]. Returns `None` if a required aggregate was pruned away.
    pub fn agg_at(&self, version: u64) -> Option<G::Agg> {
        self.check_version(version);
        let top = NodeAddr::root_layer(version);
        let mut child = self.find_leaf(version)?;
        let mut agg = self.store.agg(child)?.clone();
        while child.layer < top {
            let parent = child.parent();
            agg = if child.is_left_child() {
                self.aggobj.combine_open(&agg)
            } else {
                let left = self.store.agg(child.sibling())?;
                self.aggobj.combine(left, &agg)
            };
            child = parent;
        }
        Some(agg)
    }

    /// An empty template at the same version, sharing a copy of the aggregation object.
    ///
    /// Fill it with [HistoryTree::copy_path] to build a pruned tree.
    pub fn make_pruned<S2>(&self, store: S2) -> HistoryTree<G, S2>
    where
        S2: NodeStore<G::Agg, G::Value>,
    {
        let mut tree = HistoryTree::new(self.agg_obj(), store);
        if let Some(version) = self.version {
            tree.update_version(version);
        }
        tree
    }

    /// Copies the path from the root to the leaf for `version` out of `orig`.
    ///
    /// Siblings along the path are copied as aggregate only stubs when they are frozen, so the
    /// result carries everything needed to recompute the commitments involving this leaf. The
    /// leaf value is only copied if `with_value` is set, otherwise just its aggregate.
    pub fn copy_path<S2>(&mut self, orig: &HistoryTree<G, S2>, version: u64, with_value: bool)
    where
        S2: NodeStore<G::Agg, G::Value>,
    {
        assert_eq!(
            self.version, orig.version,
            "can only copy between trees at the same version"
        );
        orig.check_version(version);
        let orig_root = orig.root.expect("tree must not be empty");
        let root = match self.root {
            Some(root) => root,
            None => {
                let root = self.store.create_root(orig_root.layer);
                self.root = Some(root);
                root
            }
        };
        assert_eq!(root, orig_root, "root layer mismatch");
        for node in address::path(root, version) {
            assert!(
                orig.store.contains(node),
                "broken path to leaf {} at {}",
                version,
                node
            );
            self.store.materialize(node);
            if let Some(agg) = orig.store.agg(node) {
                self.copy_agg(node, agg);
            }
            if node.is_leaf() {
                if with_value {
                    if let Some(value) = orig.store.value(node) {
                        self.store.set_value(node, value.clone());
                    }
                }
            } else if let Some(next) = node.child_towards(version) {
                let other = next.sibling();
                if let Some(agg) = orig.store.agg(other) {
                    self.store.materialize(other);
                    self.copy_agg(other, agg);
                }
            }
        }
    }

    fn copy_agg(&mut self, node: NodeAddr, agg: &G::Agg) {
        if self.store.agg(node).is_none() {
            self.store.set_agg(node, agg.clone());
        }
    }

    /// Checks the structural invariants of the tree, returning a message for every violation.
    pub fn check_invariants(&self) -> Vec<String> {
        let mut msgs = Vec::new();
        if let (Some(version), Some(root)) = (self.version, self.root) {
            if root.max_version() < version {
                msgs.push(format!(
                    "root {} does not cover version {}",
                    root, version
                ));
            }
            self.check_invariants0(root, version, &mut msgs);
        }
        msgs
    }

    fn check_invariants0(&self, node: NodeAddr, version: u64, msgs: &mut Vec<String>) {
        if node.min_version() > version {
            msgs.push(format!("{} lies beyond version {}", node, version));
        }
        let agg = self.store.agg(node);
        if agg.is_some() && !node.is_frozen(version) {
            msgs.push(format!("open node {} has an aggregate", node));
        }
        if node.is_leaf() {
            if let (Some(value), Some(agg)) = (self.store.value(node), agg) {
                if self.aggobj.map_value(value) != *agg {
                    msgs.push(format!("leaf {} aggregate does not match its value", node));
                }
            }
            return;
        }
        if self.store.value(node).is_some() {
            msgs.push(format!("non leaf node {} holds a value", node));
        }
        match (self.try_combine_children(node), agg) {
            (Some(expected), Some(agg)) if expected != *agg => {
                msgs.push(format!("aggregate of {} does not match its children", node));
            }
            (Some(_), None) if node.is_frozen(version) => {
                msgs.push(format!("frozen node {} is missing its aggregate", node));
            }
            _ => {}
        }
        if let Some(left) = self.store.left(node) {
            self.check_invariants0(left, version, msgs);
        }
        if let Some(right) = self.store.right(node) {
            self.check_invariants0(right, version, msgs);
        }
    }

    pub fn assert_invariants(&self) {
        let msgs = self.check_invariants();
        if !msgs.is_empty() {
            let invariants = msgs.join(",");
            for msg in msgs {
                error!("Invariant failed: {}", msg);
            }
            panic!("assert_invariants failed {}", invariants);
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, prefix: &str, node: NodeAddr) -> fmt::Result {
        write!(f, "{}\t{}\t", prefix, node)?;
        match self.store.value(node) {
            Some(value) if node.is_leaf() => write!(f, "{:?}", value)?,
            _ => f.write_str("<>")?,
        }
        f.write_str("\t")?;
        match self.store.agg(node) {
            Some(agg) if self.store.is_agg_valid(node) => write!(f, "{:?}", agg)?,
            _ => f.write_str("<>")?,
        }
        writeln!(f)?;
        if let Some(left) = self.store.left(node) {
            self.fmt_node(f, &format!("{}L", prefix), left)?;
        }
        if let Some(right) = self.store.right(node) {
            self.fmt_node(f, &format!("{}R", prefix), right)?;
        }
        Ok(())
    }
}

impl<G, S> fmt::Display for HistoryTree<G, S>
where
    G: Aggregation,
    S: NodeStore<G::Agg, G::Value>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => writeln!(f, "  version = {}", version)?,
            None => writeln!(f, "  version = -1")?,
        }
        match self.root {
            Some(root) => self.fmt_node(f, "", root),
            None => Ok(()),
        }
    }
}

impl<G, S> fmt::Debug for HistoryTree<G, S>
where
    G: Aggregation,
    S: NodeStore<G::Agg, G::Value>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryTree")
            .field("version", &self.version)
            .field("root", &self.root)
            .field("nodes", &self.store.len())
            .finish()
    }
}

impl<G: Aggregation + Clone, S: Clone> Clone for HistoryTree<G, S> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            root: self.root,
            aggobj: self.aggobj.clone(),
            store: self.store.clone(),
        }
    }
}
