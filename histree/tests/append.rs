use histree::{MemStore, NodeAddr, NodeStore};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
mod common;
use common::{
    concat_tree, numbered, sha256_tree, Concat, ConcatTree, Sha256Agg, Sha256Tree,
};

#[quickcheck]
fn version_tracks_appends(n: u8) -> bool {
    let tree = sha256_tree(&numbered(n as u64));
    tree.len() == n as u64 && tree.version() == (n as u64).checked_sub(1)
}

#[quickcheck]
fn values_are_retrievable(values: Vec<Vec<u8>>) -> bool {
    let tree = sha256_tree(&values);
    values
        .iter()
        .enumerate()
        .all(|(i, value)| tree.value(i as u64) == Some(value))
}

#[quickcheck]
fn invariants_hold_after_every_append(n: u8) -> bool {
    common::init_logging();
    let mut tree = Sha256Tree::new(Sha256Agg, MemStore::new());
    for value in numbered(n as u64) {
        tree.append(value);
        if !tree.check_invariants().is_empty() {
            return false;
        }
    }
    true
}

#[quickcheck]
fn frozen_aggregates_match_recomputation(n: u8) -> bool {
    let tree = sha256_tree(&numbered(n as u64));
    let version = match tree.version() {
        Some(version) => version,
        None => return true,
    };
    let root = NodeAddr::root(NodeAddr::root_layer(version));
    (0..=root.layer).all(|layer| {
        (0..=(version >> layer)).all(|index| {
            let node = NodeAddr::new(layer, index);
            match tree.node_agg(node) {
                Some(agg) => {
                    node.is_frozen(version) && tree.recompute_agg(node).as_ref() == Some(agg)
                }
                None => !node.is_frozen(version),
            }
        })
    })
}

#[test]
fn root_grows_when_full() {
    let mut tree = Sha256Tree::new(Sha256Agg, MemStore::new());
    for (i, value) in numbered(17).into_iter().enumerate() {
        tree.append(value);
        let layer = NodeAddr::root_layer(i as u64);
        assert_eq!(tree.root(), Some(NodeAddr::root(layer)));
        // the previous root stays in place as the left child
        if layer > 0 {
            assert_eq!(
                tree.store().left(NodeAddr::root(layer)),
                Some(NodeAddr::root(layer - 1))
            );
        }
    }
    assert_eq!(tree.root(), Some(NodeAddr::root(5)));
}

#[test]
fn aggregates_are_computed_exactly_once() {
    let mut tree = ConcatTree::new(Concat::default(), MemStore::new());
    let counter = tree.agg_obj();
    for version in 0u64..100 {
        let maps = counter.map_count();
        let combines = counter.combine_count();
        tree.append(version.to_string());
        assert_eq!(counter.map_count() - maps, 1);
        assert_eq!(
            counter.combine_count() - combines,
            u64::from(version.trailing_ones())
        );
    }
    assert_eq!(counter.map_count(), 100);
    // every frozen non leaf node got exactly one combine
    let frozen: u64 = (1..7).map(|layer| 100u64 >> layer).sum();
    assert_eq!(counter.combine_count(), frozen);
}

#[test]
fn scenario_three_values() {
    let tree = concat_tree(&["a", "b", "c"]);
    assert_eq!(tree.version(), Some(2));
    assert_eq!(tree.root(), Some(NodeAddr::root(2)));
    assert_eq!(tree.node_agg(NodeAddr::new(1, 0)), Some(&"[a,b]".to_string()));
    assert_eq!(tree.node_agg(NodeAddr::root(2)), None);
    assert_eq!(tree.node_agg(NodeAddr::new(1, 1)), None);
    assert_eq!(tree.agg(), Some("[[a,b],[c,]]".to_string()));
}

#[test]
fn commitments_do_not_change_after_the_fact() {
    let mut tree = ConcatTree::new(Concat::default(), MemStore::new());
    let mut history = Vec::new();
    for i in 0..40u64 {
        tree.append(i.to_string());
        history.push(tree.agg());
        for (v, agg) in history.iter().enumerate() {
            assert_eq!(&tree.agg_at(v as u64), agg);
        }
    }
}

#[quickcheck]
fn commitment_prefix_consistency(n: u8, k: u8) -> TestResult {
    if k >= n {
        return TestResult::discard();
    }
    let values = numbered(n as u64);
    let full = sha256_tree(&values);
    let prefix = sha256_tree(&values[..=k as usize]);
    TestResult::from_bool(full.agg_at(k as u64) == prefix.agg())
}

#[test]
#[should_panic(expected = "beyond the current version")]
fn value_beyond_version() {
    let tree = concat_tree(&["a", "b", "c"]);
    tree.value(3);
}

#[test]
#[should_panic(expected = "empty tree")]
fn agg_at_on_empty_tree() {
    let tree = concat_tree(&[]);
    tree.agg_at(0);
}
