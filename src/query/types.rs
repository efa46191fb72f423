//! Query request and response envelopes

use crate::graph::{Edge, Insight, KnowledgeGap, Node, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Direction for edge traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow outgoing edges (source -> target)
    #[default]
    Outgoing,
    /// Follow incoming edges (target <- source)
    Incoming,
    /// Follow edges in both directions
    Both,
}

/// Re-ranking weights for combined mode.
///
/// Final score is `semantic * sem + keyword * kw` plus each bonus that applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankWeights {
    pub semantic: f32,
    pub keyword: f32,
    pub entity_match_bonus: f32,
    pub validated_insight_bonus: f32,
}

impl Default for RankWeights {
    fn default() -> Self {
        Self {
            semantic: 1.0,
            keyword: 1.0,
            entity_match_bonus: 2.0,
            validated_insight_bonus: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeywordParams {
    pub text: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Entity lookup by normalized name and/or node type
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityParams {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SemanticParams {
    pub text: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraversalParams {
    pub seed: NodeId,
    #[serde(default)]
    pub depth: Option<usize>,
    #[serde(default)]
    pub edge_types: Vec<String>,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub visit_cap: Option<usize>,
    /// Wall-clock budget; the traversal returns what it has when it runs out
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CombinedParams {
    pub text: String,
    /// Restrict the entity leg to one node type
    #[serde(default)]
    pub node_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub weights: Option<RankWeights>,
}

/// A query in any of the five modes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", content = "parameters", rename_all = "lowercase")]
pub enum QueryRequest {
    Keyword(KeywordParams),
    Entity(EntityParams),
    Semantic(SemanticParams),
    Traversal(TraversalParams),
    Combined(CombinedParams),
}

impl QueryRequest {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword",
            Self::Entity(_) => "entity",
            Self::Semantic(_) => "semantic",
            Self::Traversal(_) => "traversal",
            Self::Combined(_) => "combined",
        }
    }
}

/// An item with its relevance score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    #[serde(flatten)]
    pub item: T,
    pub score: f32,
}

impl<T> Scored<T> {
    pub fn new(item: T, score: f32) -> Self {
        Self { item, score }
    }
}

/// Per-type counts over the returned nodes and edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facets {
    pub node_types: BTreeMap<String, usize>,
    pub edge_types: BTreeMap<String, usize>,
}

impl Facets {
    pub fn from_results(nodes: &[Scored<Node>], edges: &[Edge]) -> Self {
        let mut facets = Self::default();
        for node in nodes {
            *facets.node_types.entry(node.item.node_type.clone()).or_default() += 1;
        }
        for edge in edges {
            *facets.edge_types.entry(edge.edge_type.clone()).or_default() += 1;
        }
        facets
    }
}

/// Wall-clock time per retrieval leg, in milliseconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timing {
    pub total_ms: f64,
    #[serde(default)]
    pub modes: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFlags {
    /// The semantic leg was skipped because the index could not answer
    pub semantic_unavailable: bool,
    /// A traversal stopped early (cap, cancellation or deadline)
    pub truncated: bool,
}

/// Result envelope shared by every mode
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub mode: String,
    pub nodes: Vec<Scored<Node>>,
    pub edges: Vec<Edge>,
    pub insights: Vec<Scored<Insight>>,
    pub gaps: Vec<Scored<KnowledgeGap>>,
    pub facets: Facets,
    pub timing: Timing,
    pub flags: QueryFlags,
}

impl QueryResponse {
    pub fn new(mode: &str) -> Self {
        Self {
            mode: mode.to_string(),
            ..Default::default()
        }
    }

    /// Sort every list by descending score and recompute facets
    pub fn finish(mut self) -> Self {
        self.nodes.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.insights.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.gaps.sort_by(|a, b| b.score.total_cmp(&a.score));
        self.facets = Facets::from_results(&self.nodes, &self.edges);
        self
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.item.id).collect()
    }
}
