//! Keyword mode: token match over stored text, ranked by term frequency

use super::text::tokenize;
use super::types::Scored;
use crate::error::GraphResult;
use crate::graph::{GapId, Insight, InsightId, KnowledgeGap, Node, NodeId};
use crate::storage::{GraphStore, StorageResult};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Weight of a term hit in a name or title relative to one in a description
const TITLE_BOOST: f32 = 2.0;
/// Rows read per round trip while scanning matches
const PAGE: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct KeywordHits {
    pub nodes: Vec<Scored<Node>>,
    pub insights: Vec<Scored<Insight>>,
    pub gaps: Vec<Scored<KnowledgeGap>>,
}

impl KeywordHits {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.insights.is_empty() && self.gaps.is_empty()
    }
}

/// Match `text` against node names and descriptions, insight titles and
/// descriptions, and gap descriptions.
///
/// A document token counts as a hit when it starts with a query term, so
/// `learn` finds `learning`. Every matching row is scored with tf-idf over
/// the whole corpus; only the best `limit` per list are kept. Scores are
/// scaled so the best hit across all three lists scores 1.0.
pub fn keyword_search(store: &dyn GraphStore, text: &str, limit: usize) -> GraphResult<KeywordHits> {
    let mut terms = tokenize(text);
    terms.sort();
    terms.dedup();
    if terms.is_empty() || limit == 0 {
        return Ok(KeywordHits::default());
    }

    let stats = store.text_stats(&terms)?;
    let idf: Vec<f32> = stats
        .frequencies
        .iter()
        .map(|&df| {
            if df == 0 {
                0.0
            } else {
                (1.0 + stats.documents as f32 / df as f32).ln()
            }
        })
        .collect();
    let score = |fields: &[(&str, f32)]| -> f32 {
        term_frequencies(&terms, fields)
            .iter()
            .zip(&idf)
            .filter(|(f, _)| **f > 0.0)
            .map(|(f, w)| w * (1.0 + f.ln()))
            .sum()
    };

    let mut hits = KeywordHits {
        nodes: top_matches(
            limit,
            |after: Option<NodeId>| store.nodes_matching_text(&terms, after.as_ref(), PAGE),
            |n: &Node| n.id,
            |n| score(&[(&n.name, TITLE_BOOST), (&n.description, 1.0)]),
        )?,
        insights: top_matches(
            limit,
            |after: Option<InsightId>| store.insights_matching_text(&terms, after.as_ref(), PAGE),
            |i: &Insight| i.id,
            |i| score(&[(&i.title, TITLE_BOOST), (&i.description, 1.0)]),
        )?,
        gaps: top_matches(
            limit,
            |after: Option<GapId>| store.gaps_matching_text(&terms, after.as_ref(), PAGE),
            |g: &KnowledgeGap| g.id,
            |g| score(&[(&g.description, 1.0)]),
        )?,
    };

    let best = hits
        .nodes
        .iter()
        .map(|s| s.score)
        .chain(hits.insights.iter().map(|s| s.score))
        .chain(hits.gaps.iter().map(|s| s.score))
        .fold(0.0f32, f32::max);
    if best > 0.0 {
        hits.nodes.iter_mut().for_each(|s| s.score /= best);
        hits.insights.iter_mut().for_each(|s| s.score /= best);
        hits.gaps.iter_mut().for_each(|s| s.score /= best);
    }
    Ok(hits)
}

/// Weighted count of prefix hits per term across the given fields
fn term_frequencies(terms: &[String], fields: &[(&str, f32)]) -> Vec<f32> {
    let mut tf = vec![0.0f32; terms.len()];
    for (text, weight) in fields {
        for token in tokenize(text) {
            for (i, term) in terms.iter().enumerate() {
                if token.starts_with(term.as_str()) {
                    tf[i] += weight;
                }
            }
        }
    }
    tf
}

/// Heap entry ordered by score; on ties the row seen first ranks higher
struct Ranked<T> {
    score: f32,
    seq: usize,
    item: T,
}

impl<T> Ord for Ranked<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Ranked<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Ranked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Ranked<T> {}

/// Page through every match keyed by id and keep the best `limit`, best first
fn top_matches<T, K: Copy>(
    limit: usize,
    mut fetch: impl FnMut(Option<K>) -> StorageResult<Vec<T>>,
    key: impl Fn(&T) -> K,
    score: impl Fn(&T) -> f32,
) -> GraphResult<Vec<Scored<T>>> {
    let mut heap: BinaryHeap<Reverse<Ranked<T>>> = BinaryHeap::with_capacity(limit + 1);
    let mut after = None;
    let mut seq = 0;
    loop {
        let page = fetch(after)?;
        let full = page.len() == PAGE;
        for item in page {
            after = Some(key(&item));
            let score = score(&item);
            seq += 1;
            if score <= 0.0 {
                continue;
            }
            heap.push(Reverse(Ranked { score, seq, item }));
            if heap.len() > limit {
                heap.pop();
            }
        }
        if !full {
            break;
        }
    }
    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|Reverse(r)| Scored::new(r.item, r.score))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GapPriority;
    use crate::storage::{OpenStore, SqliteStore};
    use uuid::Uuid;

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_node(
                &Node::new("Federated learning", "concept")
                    .with_description("Training models where the data lives"),
            )
            .unwrap();
        store
            .create_node(
                &Node::new("Flower", "technology")
                    .with_description("A federated learning framework"),
            )
            .unwrap();
        store
            .create_node(&Node::new("Sourdough", "concept").with_description("Bread"))
            .unwrap();
        store
            .create_insight(&Insight::new(
                "Learning on device",
                "Federated setups avoid copying inboxes",
                "ada",
            ))
            .unwrap();
        store
            .create_gap(&KnowledgeGap::new(
                "Is federated learning viable for email?",
                GapPriority::High,
                "ada",
            ))
            .unwrap();
        store
    }

    #[test]
    fn name_hits_outrank_description_hits() {
        let s = store();
        let hits = keyword_search(&s, "federated learning", 10).unwrap();
        assert_eq!(hits.nodes.len(), 2);
        assert_eq!(hits.nodes[0].item.name, "Federated learning");
        assert_eq!(hits.nodes[0].score, 1.0);
        assert!(hits.nodes[1].score < 1.0);
    }

    #[test]
    fn insights_and_gaps_are_searched() {
        let s = store();
        let hits = keyword_search(&s, "federated", 10).unwrap();
        assert_eq!(hits.insights.len(), 1);
        assert_eq!(hits.gaps.len(), 1);
        assert!(hits.gaps[0].score > 0.0 && hits.gaps[0].score <= 1.0);
    }

    #[test]
    fn prefixes_match_whole_tokens() {
        let s = store();
        let hits = keyword_search(&s, "learn", 10).unwrap();
        assert!(hits.nodes.iter().any(|n| n.item.name == "Federated learning"));
        assert!(hits.nodes.iter().all(|n| n.item.name != "Sourdough"));
    }

    #[test]
    fn stopword_queries_match_nothing() {
        let s = store();
        assert!(keyword_search(&s, "the of and", 10).unwrap().is_empty());
    }

    #[test]
    fn best_match_wins_beyond_the_first_page() {
        let s = SqliteStore::open_in_memory().unwrap();
        for i in 0..(PAGE + 50) {
            let mut filler = Node::new(format!("Filler {}", i), "concept")
                .with_description("Notes that mention learning once");
            filler.id = NodeId::from_uuid(Uuid::from_u128(i as u128 + 1));
            s.create_node(&filler).unwrap();
        }
        let mut target = Node::new("Learning", "concept").with_description("Learning about learning");
        target.id = NodeId::from_uuid(Uuid::from_u128(u128::MAX));
        s.create_node(&target).unwrap();

        let hits = keyword_search(&s, "learning", 5).unwrap();
        assert_eq!(hits.nodes.len(), 5);
        assert_eq!(hits.nodes[0].item.name, "Learning");
        assert_eq!(hits.nodes[0].score, 1.0);
        assert!(hits.nodes[1].score < 1.0);
    }

    #[test]
    fn non_ascii_terms_match_case_insensitively() {
        let s = store();
        s.create_node(&Node::new("Ökonomie", "concept").with_description("Über Märkte"))
            .unwrap();
        for query in ["ökonomie", "ÖKONOMIE", "über"] {
            let hits = keyword_search(&s, query, 10).unwrap();
            assert_eq!(hits.nodes.len(), 1, "query {}", query);
            assert_eq!(hits.nodes[0].item.name, "Ökonomie");
        }
    }

    #[test]
    fn ties_keep_scan_order() {
        let s = SqliteStore::open_in_memory().unwrap();
        let mut ids = Vec::new();
        for i in 0..3u128 {
            let mut node = Node::new("Sourdough", "concept");
            node.id = NodeId::from_uuid(Uuid::from_u128(i + 1));
            s.create_node(&node).unwrap();
            ids.push(node.id);
        }
        let hits = keyword_search(&s, "sourdough", 2).unwrap();
        let found: Vec<NodeId> = hits.nodes.iter().map(|h| h.item.id).collect();
        assert_eq!(found, ids[..2].to_vec());
    }

    #[test]
    fn limit_applies_per_list() {
        let s = store();
        let hits = keyword_search(&s, "federated learning", 1).unwrap();
        assert_eq!(hits.nodes.len(), 1);
    }
}
