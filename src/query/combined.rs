//! Combined mode: keyword, semantic and entity legs merged and re-ranked

use super::entity::EntityHits;
use super::keyword::KeywordHits;
use super::semantic::SemanticHits;
use super::types::{QueryResponse, RankWeights, Scored};
use crate::graph::{Insight, InsightId, Node, NodeId};
use std::collections::HashMap;

#[derive(Default)]
struct NodeScore {
    semantic: f32,
    keyword: f32,
    entity_match: bool,
}

#[derive(Default)]
struct InsightScore {
    semantic: f32,
    keyword: f32,
}

/// Merge leg results by identity and score each entity once:
/// `w_sem * semantic + w_kw * keyword` plus the entity-match bonus for
/// nodes and the validated bonus for insights.
///
/// `semantic` is `None` when that leg was unavailable.
pub fn merge_legs(
    keyword: KeywordHits,
    semantic: Option<SemanticHits>,
    entity: EntityHits,
    weights: &RankWeights,
) -> QueryResponse {
    let mut nodes: HashMap<NodeId, (Node, NodeScore)> = HashMap::new();
    let mut insights: HashMap<InsightId, (Insight, InsightScore)> = HashMap::new();

    for hit in keyword.nodes {
        let entry = nodes.entry(hit.item.id).or_insert_with(|| (hit.item, NodeScore::default()));
        entry.1.keyword = entry.1.keyword.max(hit.score);
    }
    for hit in keyword.insights {
        let entry = insights
            .entry(hit.item.id)
            .or_insert_with(|| (hit.item, InsightScore::default()));
        entry.1.keyword = entry.1.keyword.max(hit.score);
    }
    if let Some(semantic) = semantic {
        for hit in semantic.nodes {
            let entry = nodes.entry(hit.item.id).or_insert_with(|| (hit.item, NodeScore::default()));
            entry.1.semantic = entry.1.semantic.max(hit.score);
        }
        for hit in semantic.insights {
            let entry = insights
                .entry(hit.item.id)
                .or_insert_with(|| (hit.item, InsightScore::default()));
            entry.1.semantic = entry.1.semantic.max(hit.score);
        }
    }
    for node in entity.matches {
        let entry = nodes.entry(node.id).or_insert_with(|| (node, NodeScore::default()));
        entry.1.entity_match = true;
    }

    let mut response = QueryResponse::new("combined");
    response.nodes = nodes
        .into_values()
        .map(|(node, s)| {
            let bonus = if s.entity_match { weights.entity_match_bonus } else { 0.0 };
            let score = weights.semantic * s.semantic + weights.keyword * s.keyword + bonus;
            Scored::new(node, score)
        })
        .collect();
    response.insights = insights
        .into_values()
        .map(|(insight, s)| {
            let bonus = if insight.is_validated {
                weights.validated_insight_bonus
            } else {
                0.0
            };
            let score = weights.semantic * s.semantic + weights.keyword * s.keyword + bonus;
            Scored::new(insight, score)
        })
        .collect();
    response.gaps = keyword
        .gaps
        .into_iter()
        .map(|g| Scored::new(g.item, weights.keyword * g.score))
        .collect();
    response
}
