//! The aggregation function of a history tree
//!
//! The tree itself does not know anything about hashing or accumulators. It only needs to know
//! how to turn a value into an aggregate, how to combine two aggregates into the aggregate of
//! their parent, and how to turn both into bytes and back for serialization.
//!
//! An aggregation object may carry setup state (e.g. keys of an accumulator), so it is passed
//! around by value and cloned whenever a tree is derived from a template.
use anyhow::Result;
use std::fmt::Debug;

pub trait Aggregation: Clone {
    /// aggregate stored in every frozen node
    type Agg: Clone + Debug + PartialEq;
    /// value stored in the leaves
    type Value: Clone + Debug;

    /// aggregate of a single leaf
    fn map_value(&self, value: &Self::Value) -> Self::Agg;

    /// aggregate of a node from the aggregates of its two children
    ///
    /// must be deterministic, since aggregates are only computed once and never checked again.
    fn combine(&self, left: &Self::Agg, right: &Self::Agg) -> Self::Agg;

    /// aggregate of a node whose right subtree is still empty
    ///
    /// Only used to compute commitments for versions that do not fill a complete subtree. It is
    /// never stored in the tree.
    fn combine_open(&self, left: &Self::Agg) -> Self::Agg;

    fn serialize_agg(&self, agg: &Self::Agg) -> Vec<u8>;

    fn serialize_value(&self, value: &Self::Value) -> Vec<u8>;

    fn parse_agg(&self, data: &[u8]) -> Result<Self::Agg>;

    fn parse_value(&self, data: &[u8]) -> Result<Self::Value>;
}
