//! Breadth-first expansion from a seed node

use super::cancel::{CancellationToken, StopSignal};
use super::types::Direction;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, EdgeId, Endpoint, NodeId};
use crate::storage::{GraphEntity, GraphStore, Neighbors};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

/// Query for traversing the graph from a seed node
#[derive(Debug, Clone)]
pub struct TraverseQuery {
    pub seed: NodeId,
    /// 0 = seed only, 1 = immediate neighbors, etc.
    pub max_depth: usize,
    pub direction: Direction,
    /// Empty means every edge type
    pub edge_types: Vec<String>,
    /// Upper bound on visited entities, seed included
    pub visit_cap: usize,
    pub stop: StopSignal,
}

/// An entity reached by a traversal and the hop count it was first reached at
#[derive(Debug, Clone)]
pub struct Visit {
    pub entity: GraphEntity,
    pub depth: usize,
}

#[derive(Debug, Clone)]
pub struct TraversalResult {
    pub seed: NodeId,
    /// In visit order; every entity appears once
    pub visited: Vec<Visit>,
    /// Edges among visited entities
    pub edges: Vec<Edge>,
    /// Stopped by the visit cap, the token or the deadline
    pub truncated: bool,
}

impl TraverseQuery {
    pub const DEFAULT_DEPTH: usize = 2;
    pub const DEFAULT_VISIT_CAP: usize = 500;

    pub fn from(seed: NodeId) -> Self {
        Self {
            seed,
            max_depth: Self::DEFAULT_DEPTH,
            direction: Direction::Outgoing,
            edge_types: Vec::new(),
            visit_cap: Self::DEFAULT_VISIT_CAP,
            stop: StopSignal::default(),
        }
    }

    pub fn depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_edge_type(mut self, edge_type: impl Into<String>) -> Self {
        self.edge_types.push(edge_type.into());
        self
    }

    pub fn edge_types(mut self, edge_types: Vec<String>) -> Self {
        self.edge_types = edge_types;
        self
    }

    pub fn visit_cap(mut self, visit_cap: usize) -> Self {
        self.visit_cap = visit_cap.max(1);
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.stop.deadline = Some(deadline);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.stop.token = Some(token);
        self
    }

    /// Run the traversal against a snapshot of the store.
    ///
    /// Read-only; writes landing mid-walk are not seen. Stopping early returns everything gathered so far with
    /// `truncated` set.
    pub fn execute(&self, store: &Arc<dyn GraphStore>) -> GraphResult<TraversalResult> {
        let store = store.snapshot()?;
        let seed = store.load_node(&self.seed)?.ok_or_else(|| GraphError::NotFound {
            kind: "node",
            id: self.seed.to_string(),
        })?;

        let mut result = TraversalResult {
            seed: self.seed,
            visited: vec![Visit {
                entity: GraphEntity::Node(seed),
                depth: 0,
            }],
            edges: Vec::new(),
            truncated: false,
        };
        let mut visited: HashSet<Endpoint> = HashSet::from([Endpoint::Node(self.seed)]);
        let mut seen_edges: HashSet<EdgeId> = HashSet::new();
        let mut frontier = vec![Endpoint::Node(self.seed)];

        'levels: for depth in 1..=self.max_depth {
            let mut next = Vec::new();
            for origin in &frontier {
                let neighbors = Neighbors::new(
                    store.clone(),
                    *origin,
                    self.edge_types.clone(),
                    self.direction,
                );
                for neighbor in neighbors {
                    if self.stop.should_stop() {
                        result.truncated = true;
                        break 'levels;
                    }
                    let neighbor = neighbor?;
                    if visited.contains(&neighbor.endpoint) {
                        if seen_edges.insert(neighbor.edge.id) {
                            result.edges.push(neighbor.edge);
                        }
                        continue;
                    }
                    if visited.len() >= self.visit_cap {
                        result.truncated = true;
                        break 'levels;
                    }
                    visited.insert(neighbor.endpoint);
                    next.push(neighbor.endpoint);
                    if seen_edges.insert(neighbor.edge.id) {
                        result.edges.push(neighbor.edge);
                    }
                    result.visited.push(Visit {
                        entity: neighbor.entity,
                        depth,
                    });
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        if result.truncated {
            tracing::debug!(
                seed = %self.seed,
                visited = result.visited.len(),
                "traversal stopped early"
            );
        }
        Ok(result)
    }
}
