#![allow(dead_code)]
//! helper methods for the tests
use histree::{Aggregation, ArrayStore, HistoryTree, MemStore};
use sha2::{Digest, Sha256};
use std::{
    convert::TryInto,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub type Sha256Tree = HistoryTree<Sha256Agg, MemStore<Sha256Digest, Vec<u8>>>;
pub type Sha256ArrayTree = HistoryTree<Sha256Agg, ArrayStore<Sha256Digest, Vec<u8>>>;
pub type ConcatTree = HistoryTree<Concat, MemStore<String, String>>;

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// For tests, we use a Sha2-256 digest as aggregate
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Sha256Digest([u8; 32]);

impl Sha256Digest {
    /// digest of `left` and `right`, domain separated by a prefix byte
    pub fn digest(domain: u8, left: &[u8], right: &[u8]) -> Self {
        let result = Sha256::new()
            .chain_update([domain])
            .chain_update(left)
            .chain_update(right)
            .finalize();
        Sha256Digest(result.into())
    }

    pub fn read(data: &[u8]) -> anyhow::Result<Self> {
        Ok(Self(data.try_into()?))
    }
}

impl AsRef<[u8]> for Sha256Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.as_ref()))
    }
}

/// domain separated sha256 over byte values
#[derive(Debug, Clone, Default)]
pub struct Sha256Agg;

impl Aggregation for Sha256Agg {
    type Agg = Sha256Digest;
    type Value = Vec<u8>;

    fn map_value(&self, value: &Vec<u8>) -> Sha256Digest {
        Sha256Digest::digest(0, value, &[])
    }

    fn combine(&self, left: &Sha256Digest, right: &Sha256Digest) -> Sha256Digest {
        Sha256Digest::digest(1, left.as_ref(), right.as_ref())
    }

    fn combine_open(&self, left: &Sha256Digest) -> Sha256Digest {
        Sha256Digest::digest(2, left.as_ref(), &[])
    }

    fn serialize_agg(&self, agg: &Sha256Digest) -> Vec<u8> {
        agg.as_ref().to_vec()
    }

    fn serialize_value(&self, value: &Vec<u8>) -> Vec<u8> {
        value.clone()
    }

    fn parse_agg(&self, data: &[u8]) -> anyhow::Result<Sha256Digest> {
        Sha256Digest::read(data)
    }

    fn parse_value(&self, data: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// builds strings so the shape of every aggregate is visible
#[derive(Debug, Clone, Default)]
pub struct Concat {
    map_count: Arc<AtomicU64>,
    combine_count: Arc<AtomicU64>,
}

impl Concat {
    /// number of leaf aggregates computed so far, shared between clones
    pub fn map_count(&self) -> u64 {
        self.map_count.load(Ordering::SeqCst)
    }

    /// number of branch aggregates computed so far, shared between clones
    pub fn combine_count(&self) -> u64 {
        self.combine_count.load(Ordering::SeqCst)
    }
}

impl Aggregation for Concat {
    type Agg = String;
    type Value = String;

    fn map_value(&self, value: &String) -> String {
        self.map_count.fetch_add(1, Ordering::SeqCst);
        value.clone()
    }

    fn combine(&self, left: &String, right: &String) -> String {
        self.combine_count.fetch_add(1, Ordering::SeqCst);
        format!("[{},{}]", left, right)
    }

    fn combine_open(&self, left: &String) -> String {
        format!("[{},]", left)
    }

    fn serialize_agg(&self, agg: &String) -> Vec<u8> {
        agg.as_bytes().to_vec()
    }

    fn serialize_value(&self, value: &String) -> Vec<u8> {
        value.as_bytes().to_vec()
    }

    fn parse_agg(&self, data: &[u8]) -> anyhow::Result<String> {
        Ok(String::from_utf8(data.to_vec())?)
    }

    fn parse_value(&self, data: &[u8]) -> anyhow::Result<String> {
        Ok(String::from_utf8(data.to_vec())?)
    }
}

pub fn sha256_tree(values: &[Vec<u8>]) -> Sha256Tree {
    let mut tree = Sha256Tree::new(Sha256Agg, MemStore::new());
    for value in values {
        tree.append(value.clone());
    }
    tree
}

pub fn sha256_array_tree(values: &[Vec<u8>]) -> Sha256ArrayTree {
    let mut tree = Sha256ArrayTree::new(Sha256Agg, ArrayStore::new());
    for value in values {
        tree.append(value.clone());
    }
    tree
}

pub fn concat_tree(values: &[&str]) -> ConcatTree {
    let mut tree = ConcatTree::new(Concat::default(), MemStore::new());
    for value in values {
        tree.append(value.to_string());
    }
    tree
}

/// values 0..n as decimal strings
pub fn numbered(n: u64) -> Vec<Vec<u8>> {
    (0..n).map(|i| i.to_string().into_bytes()).collect()
}
