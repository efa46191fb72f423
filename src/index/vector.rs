//! Vector storage and nearest-neighbor search

use super::IndexError;
use crate::graph::Endpoint;
use std::collections::HashMap;
use std::sync::RwLock;

/// Trait for storing and querying embedding vectors.
///
/// Keys are graph endpoints, so nodes and insights share one index.
pub trait VectorStore: Send + Sync {
    /// Insert or replace the vector for an entity
    fn upsert(&self, key: &Endpoint, vector: Vec<f32>) -> Result<(), IndexError>;

    fn remove(&self, key: &Endpoint) -> Result<(), IndexError>;

    /// Up to `k` entities by descending cosine similarity
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Endpoint, f32)>, IndexError>;

    fn len(&self) -> Result<usize, IndexError>;

    fn is_empty(&self) -> Result<bool, IndexError> {
        Ok(self.len()? == 0)
    }
}

/// In-memory vector store with brute-force cosine search.
///
/// Contents are lost on restart; `SemanticIndex::rebuild` repopulates it
/// from the graph store.
#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<Endpoint, Vec<f32>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> IndexError {
    IndexError::Unavailable("vector store lock poisoned".into())
}

impl VectorStore for InMemoryVectorStore {
    fn upsert(&self, key: &Endpoint, vector: Vec<f32>) -> Result<(), IndexError> {
        self.vectors.write().map_err(|_| poisoned())?.insert(*key, vector);
        Ok(())
    }

    fn remove(&self, key: &Endpoint) -> Result<(), IndexError> {
        self.vectors.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Endpoint, f32)>, IndexError> {
        let vectors = self.vectors.read().map_err(|_| poisoned())?;
        let mut scored: Vec<(Endpoint, f32)> = vectors
            .iter()
            .map(|(key, v)| (*key, cosine_similarity(query, v)))
            .filter(|(_, sim)| *sim > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.uuid().cmp(&b.0.uuid())));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> Result<usize, IndexError> {
        Ok(self.vectors.read().map_err(|_| poisoned())?.len())
    }
}

/// Cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InsightId, NodeId};

    #[test]
    fn search_orders_by_similarity_and_truncates() {
        let store = InMemoryVectorStore::new();
        let travel = Endpoint::Node(NodeId::new());
        let journey = Endpoint::Insight(InsightId::new());
        let democracy = Endpoint::Node(NodeId::new());
        store.upsert(&travel, vec![0.9, 0.3, 0.1]).unwrap();
        store.upsert(&journey, vec![0.85, 0.35, 0.15]).unwrap();
        store.upsert(&democracy, vec![0.1, 0.2, 0.95]).unwrap();

        let hits = store.search(&[0.9, 0.3, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, travel);
        assert_eq!(hits[1].0, journey);
    }

    #[test]
    fn remove_and_replace() {
        let store = InMemoryVectorStore::new();
        let key = Endpoint::Node(NodeId::new());
        store.upsert(&key, vec![1.0, 0.0]).unwrap();
        store.upsert(&key, vec![0.0, 1.0]).unwrap();
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.search(&[1.0, 0.0], 5).unwrap().is_empty());

        store.remove(&key).unwrap();
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn cosine_similarity_correct() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
