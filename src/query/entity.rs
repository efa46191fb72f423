//! Entity mode: normalized-name lookup plus the one-hop neighborhood

use super::types::{Direction, Scored};
use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, EdgeId, Endpoint, Insight, Node};
use crate::resolver::normalize_name;
use crate::storage::{GraphEntity, GraphStore, Neighbors, NodeFilter};
use crate::taxonomy::BuiltinNodeType;
use std::collections::HashSet;
use std::sync::Arc;

/// Score for an exact match
pub const MATCH_SCORE: f32 = 1.0;
/// Score for an entity reached through a match's edges
pub const NEIGHBOR_SCORE: f32 = 0.5;
/// Edges followed per matched node
const NEIGHBORHOOD_CAP: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct EntityHits {
    /// Exact matches, highest-priority node types first
    pub matches: Vec<Node>,
    pub neighbors: Vec<Node>,
    pub neighbor_insights: Vec<Insight>,
    pub edges: Vec<Edge>,
}

impl EntityHits {
    /// Matches and neighbors as one scored list, matches first
    pub fn scored_nodes(&self) -> Vec<Scored<Node>> {
        self.matches
            .iter()
            .map(|n| Scored::new(n.clone(), MATCH_SCORE))
            .chain(self.neighbors.iter().map(|n| Scored::new(n.clone(), NEIGHBOR_SCORE)))
            .collect()
    }
}

/// Look nodes up by normalized name, node type, or both.
///
/// With `with_neighbors`, every edge touching a match is returned along
/// with the entity on its other end.
pub fn entity_lookup(
    store: &Arc<dyn GraphStore>,
    name: Option<&str>,
    node_type: Option<&str>,
    limit: usize,
    with_neighbors: bool,
) -> GraphResult<EntityHits> {
    let mut filter = NodeFilter::new();
    match (name, node_type) {
        (None, None) => {
            return Err(GraphError::validation(
                "parameters",
                "entity lookup needs a name or a node_type",
            ))
        }
        (Some(name), _) => {
            let normalized = normalize_name(name);
            if normalized.is_empty() {
                return Ok(EntityHits::default());
            }
            filter = filter.with_normalized_name(normalized);
        }
        (None, Some(_)) => filter = filter.with_limit(limit),
    }
    if let Some(node_type) = node_type {
        filter = filter.with_type(node_type);
    }

    let mut matches = store.find_nodes(&filter)?;
    matches.sort_by_key(|n| std::cmp::Reverse(priority(&n.node_type)));
    matches.truncate(limit);

    let mut hits = EntityHits {
        matches,
        ..Default::default()
    };
    if !with_neighbors {
        return Ok(hits);
    }

    let mut seen: HashSet<Endpoint> = hits.matches.iter().map(|n| Endpoint::Node(n.id)).collect();
    let mut seen_edges: HashSet<EdgeId> = HashSet::new();
    for origin in hits.matches.iter().map(|n| n.id).collect::<Vec<_>>() {
        let neighbors = Neighbors::new(store.clone(), origin, Vec::new(), Direction::Both)
            .take(NEIGHBORHOOD_CAP);
        for neighbor in neighbors {
            let neighbor = neighbor?;
            if seen_edges.insert(neighbor.edge.id) {
                hits.edges.push(neighbor.edge);
            }
            if !seen.insert(neighbor.endpoint) {
                continue;
            }
            match neighbor.entity {
                GraphEntity::Node(n) => hits.neighbors.push(n),
                GraphEntity::Insight(i) => hits.neighbor_insights.push(i),
            }
        }
    }
    Ok(hits)
}

fn priority(node_type: &str) -> u8 {
    BuiltinNodeType::from_name(node_type)
        .map(|t| t.ranking_priority())
        .unwrap_or(0)
}
