//! Traversal over dense cyclic graphs: bounded, never revisiting,
//! cancellable.

mod common;

use common::{random_cyclic_graph, GraphBuilder};
use ideagraph::query::{CancellationToken, Direction, TraversalParams, TraverseQuery};
use ideagraph::storage::GraphEntity;
use ideagraph::{GraphStore, OpenStore, QueryRequest, SqliteStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::Arc;

fn store() -> Arc<dyn GraphStore> {
    Arc::new(SqliteStore::open_in_memory().unwrap())
}

fn node_names(visited: &[ideagraph::query::Visit]) -> Vec<String> {
    visited
        .iter()
        .filter_map(|v| match &v.entity {
            GraphEntity::Node(n) => Some(n.name.clone()),
            GraphEntity::Insight(_) => None,
        })
        .collect()
}

#[test]
fn random_cyclic_graphs_never_revisit_or_exceed_the_cap() {
    for seed in 0..12u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let s = store();
        let ids = random_cyclic_graph(s.clone(), 60, 400, &mut rng);
        let cap = 25;

        for direction in [Direction::Outgoing, Direction::Incoming, Direction::Both] {
            let result = TraverseQuery::from(ids[0])
                .depth(2)
                .direction(direction)
                .visit_cap(cap)
                .execute(&s)
                .unwrap();

            assert!(result.visited.len() <= cap, "seed {} visited {}", seed, result.visited.len());
            let unique: HashSet<_> = result.visited.iter().map(|v| v.entity.endpoint()).collect();
            assert_eq!(unique.len(), result.visited.len(), "seed {} revisited a node", seed);
            assert!(result.visited.iter().all(|v| v.depth <= 2));
            assert_eq!(result.visited[0].depth, 0);
        }
    }
}

#[test]
fn uncapped_depth_two_stops_at_two_hops() {
    let s = store();
    let built = GraphBuilder::new(s.clone())
        .edge("a", "b", "supports")
        .edge("b", "c", "supports")
        .edge("c", "d", "supports")
        .edge("c", "a", "supports");

    let result = TraverseQuery::from(built.id("a")).depth(2).execute(&s).unwrap();
    let mut names = node_names(&result.visited);
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(!result.truncated);
}

#[test]
fn edge_type_filter_limits_expansion() {
    let s = store();
    let built = GraphBuilder::new(s.clone())
        .edge("a", "b", "supports")
        .edge("a", "c", "mentions");

    let result = TraverseQuery::from(built.id("a"))
        .with_edge_type("supports")
        .execute(&s)
        .unwrap();
    assert_eq!(node_names(&result.visited), vec!["a", "b"]);
    assert_eq!(result.edges.len(), 1);
}

#[test]
fn cancelled_traversal_returns_a_truncated_partial_result() {
    let mut rng = StdRng::seed_from_u64(7);
    let s = store();
    let ids = random_cyclic_graph(s.clone(), 40, 200, &mut rng);
    let token = CancellationToken::new();
    token.cancel();

    let result = TraverseQuery::from(ids[0])
        .depth(3)
        .direction(Direction::Both)
        .cancel_token(token)
        .execute(&s)
        .unwrap();
    assert!(result.truncated);
    assert!(result.visited.len() < ids.len());
}

#[tokio::test]
async fn traversal_request_reports_the_cap_as_truncation() {
    let g = common::graph().await;
    let mut rng = StdRng::seed_from_u64(3);
    let ids = random_cyclic_graph(g.store().clone(), 50, 300, &mut rng);

    let response = g
        .query(QueryRequest::Traversal(TraversalParams {
            seed: ids[0],
            depth: Some(4),
            edge_types: Vec::new(),
            direction: Direction::Both,
            visit_cap: Some(10),
            timeout_ms: None,
        }))
        .await
        .unwrap();
    assert_eq!(response.nodes.len(), 10);
    assert!(response.flags.truncated);
    assert_eq!(response.nodes[0].item.id, ids[0]);
}

#[test]
fn traversal_over_a_snapshot_ignores_later_deletes() {
    let s = store();
    let built = GraphBuilder::new(s.clone())
        .edge("a", "b", "supports")
        .edge("b", "c", "supports");

    let snapshot = s.snapshot().unwrap();
    s.delete_node(&built.id("b")).unwrap();

    let pinned = TraverseQuery::from(built.id("a")).depth(2).execute(&snapshot).unwrap();
    let mut names = node_names(&pinned.visited);
    names.sort();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert_eq!(pinned.edges.len(), 2);

    let live = TraverseQuery::from(built.id("a")).depth(2).execute(&s).unwrap();
    assert_eq!(node_names(&live.visited), vec!["a"]);
    assert!(live.edges.is_empty());
}
