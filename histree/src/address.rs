//! arithmetic addressing of history tree nodes
//!
//! A node is identified by its layer (height above the leaves) and its index within that layer.
//! The node at layer `l`, index `i` covers the versions `i * 2^l ..= i * 2^l + 2^l - 1`.
//! Parents, children and siblings are all computed from the address, so nodes never have to
//! store links to each other.
use derive_more::Display;
use smallvec::SmallVec;

/// Largest layer a tree can grow to. Keeps every covered range representable in an u64.
pub const MAX_LAYER: u32 = 62;

/// Largest version that can be appended.
pub const MAX_VERSION: u64 = (1 << MAX_LAYER) - 1;

/// A path from the root down to a leaf, root first
pub type Path = SmallVec<[NodeAddr; 32]>;

/// Address of a node in a history tree
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display(fmt = "<{},{}>", layer, index)]
pub struct NodeAddr {
    /// height above the leaves, leaves are at layer 0
    pub layer: u32,
    /// position within the layer
    pub index: u64,
}

impl NodeAddr {
    pub const fn new(layer: u32, index: u64) -> Self {
        Self { layer, index }
    }

    /// the leaf holding the value for `version`
    pub const fn leaf(version: u64) -> Self {
        Self::new(0, version)
    }

    /// the root of a tree at the given layer
    pub const fn root(layer: u32) -> Self {
        Self::new(layer, 0)
    }

    /// Smallest root layer whose range contains `version`.
    ///
    /// This is the bit length of `version`, so version 0 fits in a single leaf.
    pub fn root_layer(version: u64) -> u32 {
        64 - version.leading_zeros()
    }

    pub fn is_leaf(&self) -> bool {
        self.layer == 0
    }

    /// first version covered by this node
    pub fn min_version(&self) -> u64 {
        self.index << self.layer
    }

    /// last version covered by this node
    pub fn max_version(&self) -> u64 {
        self.min_version() + ((1u64 << self.layer) - 1)
    }

    pub fn covers(&self, version: u64) -> bool {
        self.min_version() <= version && version <= self.max_version()
    }

    /// A node is frozen once every version it covers has been appended.
    ///
    /// The aggregate of a frozen node never changes again.
    pub fn is_frozen(&self, version: u64) -> bool {
        self.max_version() <= version
    }

    pub fn is_left_child(&self) -> bool {
        self.index & 1 == 0
    }

    pub fn parent(&self) -> Self {
        assert!(self.layer < MAX_LAYER, "{} has no parent", self);
        Self::new(self.layer + 1, self.index >> 1)
    }

    pub fn sibling(&self) -> Self {
        Self::new(self.layer, self.index ^ 1)
    }

    pub fn left_child(&self) -> Option<Self> {
        if self.is_leaf() {
            None
        } else {
            Some(Self::new(self.layer - 1, self.index << 1))
        }
    }

    pub fn right_child(&self) -> Option<Self> {
        if self.is_leaf() {
            None
        } else {
            Some(Self::new(self.layer - 1, (self.index << 1) | 1))
        }
    }

    /// The child on the way down to the leaf for `version`.
    ///
    /// Bit `layer - 1` of the version selects the right child.
    pub fn child_towards(&self, version: u64) -> Option<Self> {
        if self.is_leaf() {
            return None;
        }
        let mask = 1u64 << (self.layer - 1);
        if version & mask == mask {
            self.right_child()
        } else {
            self.left_child()
        }
    }

    /// position of this node in an in-order flattening of the tree
    ///
    /// leaves land on even positions, a node at layer `l` sits between its two subtrees.
    pub fn inorder(&self) -> u64 {
        (self.index << (self.layer + 1)) + ((1u64 << self.layer) - 1)
    }
}

/// addresses from `root` down to the leaf for `version`, both included
pub fn path(root: NodeAddr, version: u64) -> Path {
    assert!(
        root.covers(version),
        "version {} is not covered by root {}",
        version,
        root
    );
    let mut result = Path::new();
    let mut node = Some(root);
    while let Some(current) = node {
        result.push(current);
        node = current.child_towards(version);
    }
    result
}
