//! Graph building utilities for integration tests
//!
//! Builds graphs by node name straight through the store, skipping
//! resolution, so tests can lay out exact topologies.

use ideagraph::graph::{EdgeUpsert, Node, NodeId};
use ideagraph::GraphStore;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;

/// Name-addressed builder over a store
pub struct GraphBuilder {
    store: Arc<dyn GraphStore>,
    ids: HashMap<String, NodeId>,
}

impl GraphBuilder {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            ids: HashMap::new(),
        }
    }

    /// Add a node unless one with this name was already added
    pub fn node(mut self, name: &str, node_type: &str) -> Self {
        if !self.ids.contains_key(name) {
            let node = Node::new(name, node_type);
            self.store.create_node(&node).expect("create node");
            self.ids.insert(name.to_string(), node.id);
        }
        self
    }

    /// Add a directed edge, creating `idea` nodes for unknown names
    pub fn edge(self, from: &str, to: &str, edge_type: &str) -> Self {
        let builder = self.node(from, "idea").node(to, "idea");
        let upsert = EdgeUpsert::new(builder.id(from), builder.id(to), edge_type);
        builder.store.upsert_edge(&upsert).expect("upsert edge");
        builder
    }

    pub fn id(&self, name: &str) -> NodeId {
        self.ids[name]
    }

    pub fn ids(&self) -> &HashMap<String, NodeId> {
        &self.ids
    }
}

/// `nodes` nodes in a ring plus `extra_edges` random chords, self-loops included.
///
/// Every node has at least one outgoing edge, and the ring makes every
/// node reachable from every other.
pub fn random_cyclic_graph(
    store: Arc<dyn GraphStore>,
    nodes: usize,
    extra_edges: usize,
    rng: &mut impl Rng,
) -> Vec<NodeId> {
    let ids: Vec<NodeId> = (0..nodes)
        .map(|i| {
            let node = Node::new(format!("n{}", i), "concept");
            store.create_node(&node).expect("create node");
            node.id
        })
        .collect();
    for i in 0..nodes {
        let upsert = EdgeUpsert::new(ids[i], ids[(i + 1) % nodes], "supports");
        store.upsert_edge(&upsert).expect("ring edge");
    }
    for _ in 0..extra_edges {
        let a = ids[rng.gen_range(0..nodes)];
        let b = ids[rng.gen_range(0..nodes)];
        let edge_type = if rng.gen_bool(0.5) { "supports" } else { "part_of" };
        store
            .upsert_edge(&EdgeUpsert::new(a, b, edge_type))
            .expect("chord edge");
    }
    ids
}
