//! Store-level invariants: one edge per triple, cascading deletes and the
//! insight and gap lifecycles.

mod common;

use common::{from_email, graph, GraphBuilder};
use ideagraph::graph::{EdgeUpsert, GapPriority, GapStatus, Node, NodeUpdate};
use ideagraph::{Endpoint, GraphError};

#[tokio::test]
async fn reupserting_a_triple_updates_the_weight_in_place() {
    let g = graph().await;
    let a = g.create_node(Node::new("A", "idea")).await.unwrap().node;
    let b = g.create_node(Node::new("B", "idea")).await.unwrap().node;

    let first = g
        .upsert_edge(EdgeUpsert::new(a.id, b.id, "supports").weight(0.6))
        .unwrap();
    let second = g
        .upsert_edge(EdgeUpsert::new(a.id, b.id, "supports").weight(0.9))
        .unwrap();

    assert!(first.created);
    assert!(!second.created);
    let edges = g.store().list_edges(&[]).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].weight, 0.9);
    assert_eq!(edges[0].id, first.edge.id);
}

#[tokio::test]
async fn different_edge_types_are_different_triples() {
    let g = graph().await;
    let built = GraphBuilder::new(g.store().clone())
        .edge("A", "B", "supports")
        .edge("A", "B", "part_of")
        .edge("B", "A", "supports");
    assert_eq!(built.ids().len(), 2);
    assert_eq!(g.store().list_edges(&[]).unwrap().len(), 3);
}

#[tokio::test]
async fn deleting_a_node_removes_its_edges_and_provenance() {
    let g = graph().await;
    let hub = g
        .ingest_entity(&from_email("Hub", "concept", 0.9, "1"))
        .await
        .unwrap()
        .node;
    let spoke = g.create_node(Node::new("Spoke", "idea")).await.unwrap().node;
    let other = g.create_node(Node::new("Other", "idea")).await.unwrap().node;
    g.upsert_edge(EdgeUpsert::new(hub.id, spoke.id, "supports")).unwrap();
    g.upsert_edge(EdgeUpsert::new(other.id, hub.id, "mentions")).unwrap();
    let kept = g
        .upsert_edge(EdgeUpsert::new(spoke.id, other.id, "supports"))
        .unwrap()
        .edge;

    let report = g.delete_node(&hub.id).await.unwrap();
    assert_eq!(report.edges_removed.len(), 2);
    assert_eq!(report.provenance_removed, 1);

    let edges = g.store().list_edges(&[]).unwrap();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].id, kept.id);
    assert!(g.list_provenance(hub.id.as_uuid()).unwrap().is_empty());
    assert!(matches!(g.delete_node(&hub.id).await, Err(GraphError::NotFound { .. })));
}

#[tokio::test]
async fn node_type_change_needs_an_override() {
    let g = graph().await;
    let node = g.create_node(Node::new("Mercury", "idea")).await.unwrap().node;

    let err = g
        .update_node(&node.id, NodeUpdate::new().retype("technology", false))
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Validation { .. }));
    assert_eq!(g.get_node(&node.id).unwrap().node_type, "idea");

    let updated = g
        .update_node(&node.id, NodeUpdate::new().retype("technology", true))
        .await
        .unwrap();
    assert_eq!(updated.node_type, "technology");
}

#[tokio::test]
async fn validating_an_insight_twice_is_not_an_error() {
    let g = graph().await;
    let insight = g
        .create_insight("Small models suffice", "For extraction, not synthesis", "ada")
        .await
        .unwrap();
    assert!(!insight.is_validated);

    let once = g.validate_insight(&insight.id).unwrap();
    let twice = g.validate_insight(&insight.id).unwrap();
    assert!(once.is_validated);
    assert!(twice.is_validated);
    assert_eq!(g.list_insights(Some(true)).unwrap().len(), 1);
}

#[tokio::test]
async fn resolved_gaps_cannot_reopen() {
    let g = graph().await;
    let gap = g
        .create_gap("Does federated learning beat fine-tuning?", GapPriority::High, "ada")
        .unwrap();
    assert_eq!(gap.status, GapStatus::Open);

    g.transition_gap(&gap.id, GapStatus::Resolved).unwrap();
    let err = g.transition_gap(&gap.id, GapStatus::Open).unwrap_err();
    assert!(matches!(err, GraphError::InvalidTransition { .. }));
    assert_eq!(g.get_gap(&gap.id).unwrap().status, GapStatus::Resolved);
}

#[tokio::test]
async fn gaps_pass_through_review() {
    let g = graph().await;
    let gap = g.create_gap("Who maintains Flower?", GapPriority::Low, "bob").unwrap();
    g.transition_gap(&gap.id, GapStatus::UnderReview).unwrap();
    g.transition_gap(&gap.id, GapStatus::Resolved).unwrap();

    assert_eq!(g.list_gaps(Some(GapStatus::Resolved)).unwrap().len(), 1);
    assert!(g.list_gaps(Some(GapStatus::Open)).unwrap().is_empty());
}

#[tokio::test]
async fn insights_link_to_nodes_and_show_up_as_neighbors() {
    let g = graph().await;
    let node = g.create_node(Node::new("LangGraph", "technology")).await.unwrap().node;
    let insight = g.create_insight("Cycles matter", "", "ada").await.unwrap();
    g.upsert_edge(EdgeUpsert::new(insight.id, node.id, "mentions")).unwrap();

    let neighbors = g
        .neighbors(node.id, ideagraph::query::Direction::Incoming, Vec::new())
        .unwrap();
    assert_eq!(neighbors.len(), 1);
    assert_eq!(neighbors[0].endpoint, Endpoint::Insight(insight.id));
}
