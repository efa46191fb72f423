//! Lazy neighbor cursor over the store's edge index

use super::traits::{EdgeSelector, GraphStore, StorageResult};
use crate::graph::{Edge, EdgeId, Endpoint, Insight, Node};
use crate::query::Direction;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

const DEFAULT_PAGE_SIZE: usize = 64;

/// A node or insight, as found on the far side of an edge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum GraphEntity {
    Node(Node),
    Insight(Insight),
}

impl GraphEntity {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            Self::Node(n) => Endpoint::Node(n.id),
            Self::Insight(i) => Endpoint::Insight(i.id),
        }
    }
}

/// Load whatever an endpoint points at
pub fn load_entity(store: &dyn GraphStore, endpoint: &Endpoint) -> StorageResult<Option<GraphEntity>> {
    Ok(match endpoint {
        Endpoint::Node(id) => store.load_node(id)?.map(GraphEntity::Node),
        Endpoint::Insight(id) => store.load_insight(id)?.map(GraphEntity::Insight),
    })
}

/// One step away from the cursor's origin
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub edge: Edge,
    pub endpoint: Endpoint,
    pub entity: GraphEntity,
}

/// Iterator over `(edge, neighbor)` pairs around one endpoint.
///
/// Pages edges from the store by id, so it never holds more than one page
/// and can be restarted from the beginning. Neighbors deleted while the
/// cursor is open are skipped.
#[derive(Clone)]
pub struct Neighbors {
    store: Arc<dyn GraphStore>,
    selector: EdgeSelector,
    page_size: usize,
    after: Option<EdgeId>,
    buffer: VecDeque<Edge>,
    exhausted: bool,
}

impl Neighbors {
    pub fn new(
        store: Arc<dyn GraphStore>,
        origin: impl Into<Endpoint>,
        edge_types: Vec<String>,
        direction: Direction,
    ) -> Self {
        Self {
            store,
            selector: EdgeSelector {
                endpoint: origin.into(),
                direction,
                edge_types,
            },
            page_size: DEFAULT_PAGE_SIZE,
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Rewind to the first edge
    pub fn restart(&mut self) {
        self.after = None;
        self.buffer.clear();
        self.exhausted = false;
    }

    fn fill(&mut self) -> StorageResult<()> {
        let page = self
            .store
            .edges_page(&self.selector, self.after.as_ref(), self.page_size)?;
        if page.len() < self.page_size {
            self.exhausted = true;
        }
        self.after = page.last().map(|e| e.id).or(self.after);
        self.buffer.extend(page);
        Ok(())
    }
}

impl Iterator for Neighbors {
    type Item = StorageResult<Neighbor>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.buffer.is_empty() {
                if self.exhausted {
                    return None;
                }
                if let Err(e) = self.fill() {
                    self.exhausted = true;
                    return Some(Err(e));
                }
                continue;
            }

            let edge = self.buffer.pop_front()?;
            let Some(endpoint) = edge.other_end(&self.selector.endpoint) else {
                continue;
            };
            match load_entity(self.store.as_ref(), &endpoint) {
                Ok(Some(entity)) => {
                    return Some(Ok(Neighbor {
                        edge,
                        endpoint,
                        entity,
                    }))
                }
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeUpsert;
    use crate::storage::{OpenStore, SqliteStore};
    use crate::taxonomy::EdgeType;

    fn star(store: &SqliteStore, spokes: usize) -> Node {
        let hub = Node::new("hub", "idea");
        store.create_node(&hub).unwrap();
        for i in 0..spokes {
            let n = Node::new(format!("spoke {}", i), "concept");
            store.create_node(&n).unwrap();
            store.upsert_edge(&EdgeUpsert::new(hub.id, n.id, "mentions")).unwrap();
        }
        hub
    }

    #[test]
    fn walks_every_page_and_restarts() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let hub = star(&store, 7);

        let mut cursor = Neighbors::new(store.clone(), hub.id, vec![], Direction::Outgoing)
            .with_page_size(3);
        let first: Vec<_> = cursor.by_ref().map(|n| n.unwrap().endpoint).collect();
        assert_eq!(first.len(), 7);

        cursor.restart();
        let second: Vec<_> = cursor.map(|n| n.unwrap().endpoint).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn incoming_and_type_filters_apply() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let hub = star(&store, 3);

        let incoming = Neighbors::new(store.clone(), hub.id, vec![], Direction::Incoming);
        assert_eq!(incoming.count(), 0);

        let filtered = Neighbors::new(store.clone(), hub.id, vec!["supports".into()], Direction::Both);
        assert_eq!(filtered.count(), 0);

        let both = Neighbors::new(store.clone(), hub.id, vec!["mentions".into()], Direction::Both);
        assert_eq!(both.count(), 3);
    }

    #[test]
    fn undirected_edges_are_seen_from_either_end() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .insert_edge_type(&EdgeType::new("contradicts", "#f00", "tension").undirected())
            .unwrap();
        let a = Node::new("A", "idea");
        let b = Node::new("B", "idea");
        store.create_node(&a).unwrap();
        store.create_node(&b).unwrap();
        store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "contradicts")).unwrap();

        let from_b: Vec<_> = Neighbors::new(store.clone(), b.id, vec![], Direction::Outgoing)
            .map(|n| n.unwrap())
            .collect();
        assert_eq!(from_b.len(), 1);
        assert_eq!(from_b[0].endpoint, Endpoint::Node(a.id));
    }

    #[test]
    fn deleted_neighbors_are_skipped() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let hub = star(&store, 2);
        let mut cursor = Neighbors::new(store.clone(), hub.id, vec![], Direction::Outgoing);

        let first = cursor.next().unwrap().unwrap();
        store.delete_node(&first.endpoint.as_node().unwrap()).unwrap();
        cursor.restart();
        assert_eq!(cursor.count(), 1);
    }
}
