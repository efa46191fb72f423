//! Semantic mode: nearest neighbors in the embedding index

use super::types::Scored;
use crate::error::GraphResult;
use crate::graph::{Endpoint, Insight, Node};
use crate::index::SemanticIndex;
use crate::storage::GraphStore;

pub const DEFAULT_TOP_K: usize = 20;

#[derive(Debug, Clone, Default)]
pub struct SemanticHits {
    pub nodes: Vec<Scored<Node>>,
    pub insights: Vec<Scored<Insight>>,
}

/// Top `top_k` nodes and insights by cosine similarity to `text`.
///
/// Fails with `SemanticUnavailable` when the index cannot answer. Hits for
/// entities deleted since they were indexed are dropped.
pub fn semantic_search(
    store: &dyn GraphStore,
    index: &SemanticIndex,
    text: &str,
    top_k: usize,
) -> GraphResult<SemanticHits> {
    let mut hits = SemanticHits::default();
    if text.trim().is_empty() || top_k == 0 {
        return Ok(hits);
    }
    for (endpoint, similarity) in index.search(text, top_k)? {
        match endpoint {
            Endpoint::Node(id) => {
                if let Some(node) = store.load_node(&id)? {
                    hits.nodes.push(Scored::new(node, similarity));
                }
            }
            Endpoint::Insight(id) => {
                if let Some(insight) = store.load_insight(&id)? {
                    hits.insights.push(Scored::new(insight, similarity));
                }
            }
        }
    }
    Ok(hits)
}
