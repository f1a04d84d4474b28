//! the pruned tree encoding
//!
//! A tree is encoded as its version and a recursive encoding of its root. Each node is exactly one
//! of
//!
//! - a leaf value,
//! - an aggregate standing in for a leaf without value or a subtree that is not expanded,
//! - a branch node with whichever of its children are present.
//!
//! The same format is used for complete snapshots and for pruned trees that only contain a few
//! paths. Encoded bytes are dag-cbor, using the keys `version` and `root` for the tree, and
//! `value`, `agg`, `branches`, `left` and `right` for nodes.
use crate::{
    address::{NodeAddr, MAX_LAYER, MAX_VERSION},
    aggregation::Aggregation,
    error::Error,
    store::NodeStore,
    tree::HistoryTree,
};
use anyhow::{bail, ensure, Result};
use libipld::{cbor::DagCborCodec, codec::Codec, Ipld};
use maplit::btreemap;
use std::{collections::BTreeMap, convert::TryFrom};
use tracing::debug;

#[cfg(feature = "metrics")]
use crate::prom;

/// Serialized form of a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistTree {
    /// `None` for an empty tree, encoded as -1
    pub version: Option<u64>,
    pub root: Option<HistNode>,
}

/// Serialized form of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistNode {
    /// leaf with a known value
    Value(Vec<u8>),
    /// aggregate only stub
    Agg(Vec<u8>),
    /// branch with the children that are present
    Branches {
        left: Option<Box<HistNode>>,
        right: Option<Box<HistNode>>,
    },
}

impl HistTree {
    pub fn to_ipld(&self) -> Ipld {
        let version = self.version.map(i128::from).unwrap_or(-1);
        let mut map = btreemap! {
            "version".to_string() => Ipld::Integer(version),
        };
        if let Some(root) = &self.root {
            map.insert("root".to_string(), root.to_ipld());
        }
        Ipld::Map(map)
    }

    pub fn from_ipld(ipld: &Ipld) -> Result<Self> {
        let map = as_map(ipld)?;
        ensure!(
            map.keys().all(|k| k == "version" || k == "root"),
            Error::Malformed("unexpected key in tree")
        );
        let version = match map.get("version") {
            Some(Ipld::Integer(-1)) => None,
            Some(Ipld::Integer(v)) => {
                let v = u64::try_from(*v).map_err(|_| Error::VersionOutOfRange {
                    tried: *v,
                    max: MAX_VERSION,
                })?;
                ensure!(
                    v <= MAX_VERSION,
                    Error::VersionOutOfRange {
                        tried: v.into(),
                        max: MAX_VERSION,
                    }
                );
                Some(v)
            }
            _ => bail!(Error::Malformed("missing or invalid version")),
        };
        let root = map
            .get("root")
            .map(|root| HistNode::from_ipld(root, 0))
            .transpose()?;
        Ok(Self { version, root })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(DagCborCodec.encode(&self.to_ipld())?)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let ipld: Ipld = DagCborCodec.decode(data)?;
        Self::from_ipld(&ipld)
    }
}

impl HistNode {
    pub fn to_ipld(&self) -> Ipld {
        let map = match self {
            Self::Value(data) => btreemap! {
                "value".to_string() => Ipld::Bytes(data.clone()),
            },
            Self::Agg(data) => btreemap! {
                "agg".to_string() => Ipld::Bytes(data.clone()),
            },
            Self::Branches { left, right } => {
                let mut branches = BTreeMap::new();
                if let Some(left) = left {
                    branches.insert("left".to_string(), left.to_ipld());
                }
                if let Some(right) = right {
                    branches.insert("right".to_string(), right.to_ipld());
                }
                btreemap! {
                    "branches".to_string() => Ipld::Map(branches),
                }
            }
        };
        Ipld::Map(map)
    }

    /// `depth` is the distance from the root, a tree can never be deeper than its max layer
    pub fn from_ipld(ipld: &Ipld, depth: u32) -> Result<Self> {
        ensure!(depth <= MAX_LAYER, Error::TooDeep(MAX_LAYER));
        let map = as_map(ipld)?;
        ensure!(map.len() == 1, Error::Malformed("node must have exactly one field"));
        if let Some(value) = map.get("value") {
            return Ok(Self::Value(as_bytes(value)?));
        }
        if let Some(agg) = map.get("agg") {
            return Ok(Self::Agg(as_bytes(agg)?));
        }
        if let Some(branches) = map.get("branches") {
            let branches = as_map(branches)?;
            ensure!(
                branches.keys().all(|k| k == "left" || k == "right"),
                Error::Malformed("unexpected key in branches")
            );
            let child = |key: &str| -> Result<Option<Box<HistNode>>> {
                branches
                    .get(key)
                    .map(|child| Self::from_ipld(child, depth + 1).map(Box::new))
                    .transpose()
            };
            return Ok(Self::Branches {
                left: child("left")?,
                right: child("right")?,
            });
        }
        bail!(Error::Malformed("unknown node kind"))
    }

    /// number of encoded nodes, including this one
    pub fn count(&self) -> usize {
        match self {
            Self::Branches { left, right } => {
                1 + left.as_ref().map(|x| x.count()).unwrap_or_default()
                    + right.as_ref().map(|x| x.count()).unwrap_or_default()
            }
            _ => 1,
        }
    }
}

fn as_map(ipld: &Ipld) -> Result<&BTreeMap<String, Ipld>> {
    match ipld {
        Ipld::Map(map) => Ok(map),
        _ => bail!(Error::Malformed("expected a map")),
    }
}

fn as_bytes(ipld: &Ipld) -> Result<Vec<u8>> {
    match ipld {
        Ipld::Bytes(data) => Ok(data.clone()),
        _ => bail!(Error::Malformed("expected bytes")),
    }
}

impl<G, S> HistoryTree<G, S>
where
    G: Aggregation,
    S: NodeStore<G::Agg, G::Value>,
{
    /// Serializes the materialized part of the tree.
    ///
    /// For a tree built by appending this is a complete snapshot, for a pruned tree it contains
    /// just the copied paths and their sibling aggregates.
    pub fn serialize(&self) -> HistTree {
        HistTree {
            version: self.version(),
            root: self.root().map(|root| self.serialize_node(root)),
        }
    }

    /// serializes the tree to dag-cbor bytes
    pub fn serialize_bytes(&self) -> Result<Vec<u8>> {
        self.serialize().encode()
    }

    fn serialize_node(&self, node: NodeAddr) -> HistNode {
        let store = self.store();
        if node.is_leaf() {
            return if let Some(value) = store.value(node) {
                HistNode::Value(self.aggobj().serialize_value(value))
            } else if let Some(agg) = store.agg(node) {
                HistNode::Agg(self.aggobj().serialize_agg(agg))
            } else {
                panic!("leaf {} has neither a value nor an aggregate", node)
            };
        }
        let left = store.left(node);
        let right = store.right(node);
        if left.is_none() && right.is_none() {
            if let Some(agg) = store.agg(node) {
                return HistNode::Agg(self.aggobj().serialize_agg(agg));
            }
        }
        HistNode::Branches {
            left: left.map(|child| Box::new(self.serialize_node(child))),
            right: right.map(|child| Box::new(self.serialize_node(child))),
        }
    }

    /// Rebuilds a tree from its serialized form.
    ///
    /// Value leaves get their aggregate from the value, and every frozen branch whose children
    /// both carry an aggregate gets its aggregate recomputed, so the result is indistinguishable
    /// from the corresponding part of a tree built by appending.
    pub fn parse_tree(aggobj: G, store: S, data: &HistTree) -> Result<Self> {
        let mut tree = Self::new(aggobj, store);
        match (data.version, &data.root) {
            (None, None) => {}
            (None, Some(_)) => bail!(Error::Malformed("empty tree with a root")),
            (Some(version), root) => {
                ensure!(
                    version <= MAX_VERSION,
                    Error::VersionOutOfRange {
                        tried: version.into(),
                        max: MAX_VERSION,
                    }
                );
                tree.update_version(version);
                if let Some(node) = root {
                    let root = tree
                        .store_mut()
                        .create_root(NodeAddr::root_layer(version));
                    tree.set_root(root);
                    tree.parse_node(root, version, node)?;
                }
            }
        }
        debug!(
            "parsed tree at version {:?} with {} nodes",
            tree.version(),
            tree.store().len()
        );
        #[cfg(feature = "metrics")]
        prom::PARSE_COUNT.inc();
        Ok(tree)
    }

    /// rebuilds a tree from dag-cbor bytes
    pub fn parse(aggobj: G, store: S, data: &[u8]) -> Result<Self> {
        Self::parse_tree(aggobj, store, &HistTree::decode(data)?)
    }

    fn parse_node(&mut self, node: NodeAddr, version: u64, data: &HistNode) -> Result<()> {
        ensure!(
            node.min_version() <= version,
            Error::NodeBeyondVersion {
                node: node.to_string(),
                version,
            }
        );
        match data {
            HistNode::Value(bytes) => {
                ensure!(node.is_leaf(), Error::Malformed("value above the leaf layer"));
                let value = self.aggobj().parse_value(bytes)?;
                let agg = self.aggobj().map_value(&value);
                let store = self.store_mut();
                store.set_value(node, value);
                store.mark_valid(node);
                store.set_agg(node, agg);
            }
            HistNode::Agg(bytes) => {
                ensure!(
                    node.is_frozen(version),
                    Error::Malformed("aggregate on an open node")
                );
                let agg = self.aggobj().parse_agg(bytes)?;
                let store = self.store_mut();
                store.mark_valid(node);
                store.set_agg(node, agg);
            }
            HistNode::Branches { left, right } => {
                ensure!(!node.is_leaf(), Error::Malformed("branches at the leaf layer"));
                if let Some(left) = left {
                    let child = self.store_mut().force_left(node);
                    self.parse_node(child, version, left)?;
                }
                if let Some(right) = right {
                    let child = self.store_mut().force_right(node);
                    self.parse_node(child, version, right)?;
                }
                if node.is_frozen(version) {
                    if let Some(agg) = self.try_combine_children(node) {
                        self.store_mut().set_agg(node, agg);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tree_encoding() -> Result<()> {
        let tree = HistTree {
            version: None,
            root: None,
        };
        let ipld = tree.to_ipld();
        assert_eq!(
            ipld,
            Ipld::Map(btreemap! { "version".to_string() => Ipld::Integer(-1) })
        );
        assert_eq!(HistTree::decode(&tree.encode()?)?, tree);
        Ok(())
    }

    #[test]
    fn asymmetric_branches() -> Result<()> {
        let tree = HistTree {
            version: Some(2),
            root: Some(HistNode::Branches {
                left: Some(Box::new(HistNode::Agg(vec![1, 2]))),
                right: Some(Box::new(HistNode::Branches {
                    left: Some(Box::new(HistNode::Value(b"c".to_vec()))),
                    right: None,
                })),
            }),
        };
        let bytes = tree.encode()?;
        let decoded = HistTree::decode(&bytes)?;
        assert_eq!(decoded, tree);
        assert_eq!(decoded.root.map(|x| x.count()), Some(4));
        Ok(())
    }

    #[test]
    fn rejects_malformed_nodes() {
        let two_kinds = Ipld::Map(btreemap! {
            "value".to_string() => Ipld::Bytes(vec![]),
            "agg".to_string() => Ipld::Bytes(vec![]),
        });
        assert!(HistNode::from_ipld(&two_kinds, 0).is_err());
        let wrong_type = Ipld::Map(btreemap! {
            "value".to_string() => Ipld::String("a".into()),
        });
        assert!(HistNode::from_ipld(&wrong_type, 0).is_err());
        let unknown = Ipld::Map(btreemap! {
            "leaf".to_string() => Ipld::Bytes(vec![]),
        });
        assert!(HistNode::from_ipld(&unknown, 0).is_err());
        assert!(HistNode::from_ipld(&Ipld::Null, 0).is_err());
    }

    #[test]
    fn rejects_bad_versions() {
        let negative = Ipld::Map(btreemap! { "version".to_string() => Ipld::Integer(-2) });
        assert!(HistTree::from_ipld(&negative).is_err());
        let huge = Ipld::Map(btreemap! {
            "version".to_string() => Ipld::Integer(i128::from(MAX_VERSION) + 1),
        });
        assert!(HistTree::from_ipld(&huge).is_err());
        let missing = Ipld::Map(BTreeMap::new());
        assert!(HistTree::from_ipld(&missing).is_err());
    }

    #[test]
    fn rejects_deep_nesting() {
        let mut node = HistNode::Agg(vec![0]);
        for _ in 0..=MAX_LAYER + 1 {
            node = HistNode::Branches {
                left: Some(Box::new(node)),
                right: None,
            };
        }
        assert!(HistNode::from_ipld(&node.to_ipld(), 0).is_err());
    }
}
