use histree::{Aggregation, HistTree, HistoryTree, NodeAddr, NodeStore};
use libipld::{codec::Codec, json::DagJsonCodec};
use std::collections::BTreeMap;

type Node<'a> = &'a NodeDescriptor;
type Edge<'a> = (NodeAddr, NodeAddr);

#[derive(Default)]
struct TreeGraph {
    nodes: BTreeMap<NodeAddr, NodeDescriptor>,
    edges: Vec<(NodeAddr, NodeAddr)>,
}

enum NodeDescriptor {
    Branch {
        addr: NodeAddr,
        frozen: bool,
        /// aggregate only, children not expanded
        stub: bool,
    },
    Leaf {
        addr: NodeAddr,
        /// value pruned away, just the aggregate is there
        stub: bool,
    },
}

impl NodeDescriptor {
    fn addr(&self) -> NodeAddr {
        match self {
            Self::Branch { addr, .. } | Self::Leaf { addr, .. } => *addr,
        }
    }

    fn frozen(&self) -> bool {
        match self {
            Self::Branch { frozen, .. } => *frozen,
            Self::Leaf { .. } => true,
        }
    }

    fn stub(&self) -> bool {
        match self {
            Self::Branch { stub, .. } | Self::Leaf { stub, .. } => *stub,
        }
    }
}

impl TreeGraph {
    fn add<A, V>(&mut self, store: &impl NodeStore<A, V>, node: NodeAddr, version: u64) {
        let descriptor = if node.is_leaf() {
            NodeDescriptor::Leaf {
                addr: node,
                stub: store.value(node).is_none(),
            }
        } else {
            let left = store.left(node);
            let right = store.right(node);
            for child in left.into_iter().chain(right) {
                self.edges.push((node, child));
                self.add(store, child, version);
            }
            NodeDescriptor::Branch {
                addr: node,
                frozen: node.is_frozen(version),
                stub: left.is_none() && right.is_none() && store.agg(node).is_some(),
            }
        };
        self.nodes.insert(node, descriptor);
    }
}

impl<'a> dot::Labeller<'a, Node<'a>, Edge<'a>> for TreeGraph {
    fn graph_id(&'a self) -> dot::Id<'a> {
        dot::Id::new("histree").expect("valid dot id")
    }

    fn node_id(&'a self, n: &Node<'a>) -> dot::Id<'a> {
        let addr = n.addr();
        dot::Id::new(format!("N{}_{}", addr.layer, addr.index)).expect("valid dot id")
    }

    fn node_label(&'a self, n: &Node<'a>) -> dot::LabelText<'a> {
        let label = match n {
            NodeDescriptor::Branch { addr, .. } => addr.to_string(),
            NodeDescriptor::Leaf { addr, .. } => addr.index.to_string(),
        };
        dot::LabelText::label(label)
    }

    fn node_shape(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        let shape = match n {
            NodeDescriptor::Branch { .. } => "box",
            NodeDescriptor::Leaf { .. } => "circle",
        };
        Some(dot::LabelText::label(shape))
    }

    fn node_color(&'a self, n: &Node<'a>) -> Option<dot::LabelText<'a>> {
        if n.frozen() {
            Some(dot::LabelText::label("grey"))
        } else {
            None
        }
    }

    fn node_style(&'a self, n: &Node<'a>) -> dot::Style {
        match (n.frozen(), n.stub()) {
            (_, true) => dot::Style::Dashed,
            (true, false) => dot::Style::Filled,
            (false, false) => dot::Style::None,
        }
    }
}

impl<'a> dot::GraphWalk<'a, Node<'a>, Edge<'a>> for TreeGraph {
    fn nodes(&'a self) -> dot::Nodes<'a, Node<'a>> {
        self.nodes.values().collect()
    }

    fn edges(&'a self) -> dot::Edges<'a, Edge<'a>> {
        self.edges.iter().cloned().collect()
    }

    fn source(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[&edge.0]
    }

    fn target(&'a self, edge: &Edge<'a>) -> Node<'a> {
        &self.nodes[&edge.1]
    }
}

/// Renders the materialized part of a tree as a graphviz dot graph.
///
/// Branches are boxes, leaves are circles. Frozen nodes are greyed out, stubs that only carry an
/// aggregate are dashed.
pub fn graph<G, S>(tree: &HistoryTree<G, S>, mut out: impl std::io::Write) -> anyhow::Result<()>
where
    G: Aggregation,
    S: NodeStore<G::Agg, G::Value>,
{
    let mut graph = TreeGraph::default();
    if let (Some(version), Some(root)) = (tree.version(), tree.root()) {
        graph.add(tree.store(), root, version);
    }
    dot::render(&graph, &mut out)?;
    Ok(())
}

/// Takes a dag-cbor encoded tree, and writes it as dag-json to `writer`
pub fn dump_json(data: &[u8], mut writer: impl std::io::Write) -> anyhow::Result<()> {
    let tree = HistTree::decode(data)?;
    let json = DagJsonCodec.encode(&tree.to_ipld())?;
    writeln!(writer, "{}", std::str::from_utf8(&json)?)?;
    Ok(())
}
