//! # History trees
//!
//! A history tree is an append only, authenticated log. Every appended value becomes a leaf of a
//! binary tree, and every internal node carries an aggregate (typically a cryptographic digest)
//! of the subtree below it.
//!
//! The tree does not know how aggregates are computed. This is defined by an [Aggregation]
//! object. It also does not care how nodes are stored, which is defined by a [NodeStore].
//!
//! ## Addressing
//!
//! A node is addressed by its layer and index. The node at layer `l` and index `i` covers the
//! versions `i * 2^l ..= i * 2^l + 2^l - 1`. The shape of a tree is a pure function of its
//! version, so navigation is just bit arithmetic on the version. See [NodeAddr].
//!
//! ## Growth
//!
//! When a version is appended that is not covered by the current root, the root is replaced by a
//! node one layer taller, with the old root as its left child. Nothing is ever moved or
//! recomputed.
//!
//! ## Frozen nodes
//!
//! A node is *frozen* as soon as every version it covers has been appended. From then on its
//! aggregate can never change. Aggregates are computed exactly once, lazily, at the moment a node
//! becomes frozen. Open nodes never carry an aggregate.
//!
//! ## Pruned trees
//!
//! A tree can be serialized in full, or pruned to a few paths plus the aggregates of the siblings
//! along those paths. Pruned trees are enough to recompute the commitment for a version, so they
//! can be used as compact membership and consistency artifacts. Parsing a pruned tree gives a
//! tree that behaves exactly like the corresponding part of the full tree.
//!
//! [Aggregation]: aggregation::Aggregation
//! [NodeStore]: store::NodeStore
//! [NodeAddr]: address::NodeAddr
pub mod address;
pub mod aggregation;
pub mod error;
#[cfg(feature = "metrics")]
mod prom;
pub mod serialization;
pub mod store;
pub mod tree;

pub use address::NodeAddr;
pub use aggregation::Aggregation;
pub use serialization::{HistNode, HistTree};
pub use store::{ArrayStore, MemStore, NodeStore};
pub use tree::HistoryTree;

/// registers the histree counters with a prometheus registry
#[cfg(feature = "metrics")]
pub fn register_metrics(registry: &prometheus::Registry) -> anyhow::Result<()> {
    prom::register(registry)
}

#[cfg(test)]
extern crate quickcheck;
#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;
