//! Create-or-merge decisions for extraction candidates

use super::candidate::ExtractionCandidate;
use super::normalize::{
    name_similarity, normalize_name, similarity_length, similarity_length_window,
};
use super::review::DuplicateFlag;
use crate::config::ResolverConfig;
use crate::error::GraphResult;
use crate::graph::{EntityKind, Node, NodeUpdate};
use crate::provenance::ProvenanceTracker;
use crate::storage::{FuzzyWindow, GraphStore, NodeFilter};
use crate::taxonomy::TaxonomyRegistry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// Nodes fetched per page when looking for near-duplicate names
const FUZZY_PAGE: usize = 128;

/// Whether resolution produced a new node or folded into an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionOutcome {
    Created,
    Merged,
}

/// Result of resolving one extraction candidate
#[derive(Debug, Clone)]
pub struct Resolution {
    pub node: Node,
    pub outcome: ResolutionOutcome,
    /// The node type is not in the taxonomy
    pub unknown_type: bool,
    /// Set when a new node closely resembles an existing one
    pub possible_duplicate: Option<DuplicateFlag>,
}

/// The dedup gatekeeper between extraction candidates and the graph store.
///
/// Exact matches on (node_type, normalized name) merge into the existing
/// node. Near matches are flagged for review and never merged. Resolution
/// of one key is serialized in-process so two concurrent candidates for the
/// same entity cannot both create a node.
pub struct EntityResolver {
    pub(super) store: Arc<dyn GraphStore>,
    pub(super) taxonomy: TaxonomyRegistry,
    provenance: ProvenanceTracker,
    pub(super) config: ResolverConfig,
    key_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl EntityResolver {
    pub fn new(store: Arc<dyn GraphStore>, config: ResolverConfig) -> Self {
        Self {
            taxonomy: TaxonomyRegistry::new(store.clone()),
            provenance: ProvenanceTracker::new(store.clone()),
            store,
            config,
            key_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Validate, then merge into an exact match or create a new node
    pub fn resolve_entity(&self, candidate: &ExtractionCandidate) -> GraphResult<Resolution> {
        candidate.validate()?;
        let normalized = normalize_name(&candidate.name);
        let key = (candidate.node_type.clone(), normalized);

        let lock = self.key_locks.entry(key.clone()).or_default().clone();
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.resolve_locked(candidate, &key.1)
        };
        drop(lock);
        self.key_locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
        result
    }

    fn resolve_locked(
        &self,
        candidate: &ExtractionCandidate,
        normalized: &str,
    ) -> GraphResult<Resolution> {
        let unknown_type = !self.taxonomy.check_node_type(&candidate.node_type)?;
        let existing = self.store.find_nodes(
            &NodeFilter::new()
                .with_type(&candidate.node_type)
                .with_normalized_name(normalized)
                .with_limit(1),
        )?;

        match existing.into_iter().next() {
            Some(node) => {
                let node = self.merge(node, candidate)?;
                Ok(Resolution {
                    node,
                    outcome: ResolutionOutcome::Merged,
                    unknown_type,
                    possible_duplicate: None,
                })
            }
            None => {
                let (node, possible_duplicate) = self.create(candidate, normalized)?;
                Ok(Resolution {
                    node,
                    outcome: ResolutionOutcome::Created,
                    unknown_type,
                    possible_duplicate,
                })
            }
        }
    }

    fn merge(&self, node: Node, candidate: &ExtractionCandidate) -> GraphResult<Node> {
        let mut update = NodeUpdate::new();
        let mut changed = false;

        if node.description.trim().is_empty() && !candidate.description.trim().is_empty() {
            update = update.description(candidate.description.clone());
            changed = true;
        }

        let candidate_wins = candidate.confidence > node.confidence;
        let mut attributes = node.attributes.clone();
        for (key, value) in &candidate.attributes {
            match attributes.get(key) {
                None => {
                    attributes.insert(key.clone(), value.clone());
                }
                Some(current) if candidate_wins && current != value => {
                    attributes.insert(key.clone(), value.clone());
                }
                Some(_) => {}
            }
        }
        if attributes != node.attributes {
            update = update.attributes(attributes);
            changed = true;
        }
        if candidate_wins {
            update = update.confidence(candidate.confidence);
            changed = true;
        }

        let node = if changed {
            self.store.update_node(&node.id, &update)?
        } else {
            node
        };
        self.record_provenance(&node, candidate)?;
        tracing::debug!(
            node_id = %node.id,
            name = %node.name,
            source = %candidate.source_ref(),
            changed,
            "merged candidate into existing node"
        );
        Ok(node)
    }

    fn create(
        &self,
        candidate: &ExtractionCandidate,
        normalized: &str,
    ) -> GraphResult<(Node, Option<DuplicateFlag>)> {
        let near = if self.config.fuzzy_enabled {
            self.closest_match(&candidate.node_type, normalized)?
        } else {
            None
        };

        let mut node = Node::new(&candidate.name, &candidate.node_type)
            .with_description(&candidate.description)
            .with_source(candidate.source_ref())
            .with_confidence(candidate.confidence);
        node.attributes = candidate.attributes.clone();
        self.store.create_node(&node)?;
        self.record_provenance(&node, candidate)?;
        tracing::debug!(node_id = %node.id, name = %node.name, node_type = %node.node_type, "created node");

        let flag = match near {
            Some((existing, similarity)) => {
                let flag = DuplicateFlag::new(node.id, existing.id, similarity);
                self.store.insert_duplicate_flag(&flag)?;
                tracing::warn!(
                    node_id = %node.id,
                    existing_node_id = %existing.id,
                    similarity,
                    "possible duplicate flagged for review"
                );
                Some(flag)
            }
            None => None,
        };
        Ok((node, flag))
    }

    /// Most similar node of the same type at or above the fuzzy threshold.
    ///
    /// Only names whose length can still reach the threshold are read, a
    /// page at a time.
    fn closest_match(&self, node_type: &str, normalized: &str) -> GraphResult<Option<(Node, f32)>> {
        let threshold = self.config.fuzzy_threshold;
        let (min_length, max_length) =
            similarity_length_window(similarity_length(normalized), threshold);
        let window = FuzzyWindow {
            node_type: node_type.to_string(),
            min_length,
            max_length,
        };

        let mut best: Option<(Node, f32)> = None;
        let mut after = None;
        loop {
            let page = self.store.fuzzy_candidates(&window, after.as_ref(), FUZZY_PAGE)?;
            let full = page.len() == FUZZY_PAGE;
            after = page.last().map(|n| n.id).or(after);
            for node in page {
                let similarity = name_similarity(&normalize_name(&node.name), normalized);
                if similarity >= threshold && best.as_ref().map_or(true, |(_, s)| similarity > *s) {
                    best = Some((node, similarity));
                }
            }
            if !full {
                return Ok(best);
            }
        }
    }

    fn record_provenance(&self, node: &Node, candidate: &ExtractionCandidate) -> GraphResult<()> {
        self.provenance.record(
            *node.id.as_uuid(),
            EntityKind::Node,
            &candidate.source_type,
            &candidate.source_id,
            &candidate.snippet,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;
    use crate::graph::{AttributeValue, SourceRef};
    use crate::storage::{OpenStore, SqliteStore};

    fn resolver() -> EntityResolver {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        TaxonomyRegistry::new(store.clone()).seed_defaults().unwrap();
        EntityResolver::new(store, ResolverConfig::default())
    }

    fn candidate(name: &str, confidence: f32, source_id: &str) -> ExtractionCandidate {
        ExtractionCandidate::new(name, "idea", confidence, SourceRef::new("email", source_id))
    }

    #[test]
    fn normalized_names_merge_into_one_node() {
        let r = resolver();
        let first = r.resolve_entity(&candidate("LangGraph", 0.9, "42")).unwrap();
        let second = r.resolve_entity(&candidate("langgraph", 0.95, "77")).unwrap();

        assert_eq!(first.outcome, ResolutionOutcome::Created);
        assert_eq!(second.outcome, ResolutionOutcome::Merged);
        assert_eq!(first.node.id, second.node.id);
        assert_eq!(second.node.name, "LangGraph");
        assert_eq!(second.node.confidence, 0.95);
        assert_eq!(r.store.find_nodes(&NodeFilter::new()).unwrap().len(), 1);
        assert_eq!(r.store.list_provenance(first.node.id.as_uuid()).unwrap().len(), 2);
    }

    #[test]
    fn same_name_different_type_stays_separate() {
        let r = resolver();
        r.resolve_entity(&candidate("Mercury", 0.8, "1")).unwrap();
        let planet = ExtractionCandidate::new("Mercury", "concept", 0.8, SourceRef::new("email", "2"));
        let resolution = r.resolve_entity(&planet).unwrap();
        assert_eq!(resolution.outcome, ResolutionOutcome::Created);
        assert_eq!(r.store.find_nodes(&NodeFilter::new()).unwrap().len(), 2);
    }

    #[test]
    fn merge_fills_description_and_unions_attributes() {
        let r = resolver();
        let mut attrs = crate::graph::Attributes::new();
        attrs.insert("license".into(), AttributeValue::from("MIT"));
        attrs.insert("lang".into(), AttributeValue::from("python"));
        r.resolve_entity(&candidate("LangGraph", 0.9, "1").with_attributes(attrs))
            .unwrap();

        let mut weaker = crate::graph::Attributes::new();
        weaker.insert("license".into(), AttributeValue::from("Apache-2.0"));
        weaker.insert("stars".into(), AttributeValue::Int(1200));
        let merged = r
            .resolve_entity(
                &candidate("langgraph", 0.5, "2")
                    .with_description("Agent orchestration library")
                    .with_attributes(weaker),
            )
            .unwrap()
            .node;

        assert_eq!(merged.description, "Agent orchestration library");
        assert_eq!(merged.attributes["license"], AttributeValue::from("MIT"));
        assert_eq!(merged.attributes["stars"], AttributeValue::Int(1200));
        assert_eq!(merged.confidence, 0.9);
    }

    #[test]
    fn higher_confidence_overrides_existing_attribute() {
        let r = resolver();
        let mut attrs = crate::graph::Attributes::new();
        attrs.insert("license".into(), AttributeValue::from("MIT"));
        r.resolve_entity(&candidate("LangGraph", 0.4, "1").with_attributes(attrs))
            .unwrap();

        let mut stronger = crate::graph::Attributes::new();
        stronger.insert("license".into(), AttributeValue::from("Apache-2.0"));
        let merged = r
            .resolve_entity(&candidate("LANGGRAPH", 0.9, "2").with_attributes(stronger))
            .unwrap()
            .node;
        assert_eq!(merged.attributes["license"], AttributeValue::from("Apache-2.0"));
    }

    #[test]
    fn near_match_is_flagged_not_merged() {
        let r = resolver();
        let original = r.resolve_entity(&candidate("LangGraph", 0.9, "1")).unwrap();
        let near = r.resolve_entity(&candidate("LangGraphs", 0.9, "2")).unwrap();

        assert_eq!(near.outcome, ResolutionOutcome::Created);
        let flag = near.possible_duplicate.unwrap();
        assert_eq!(flag.existing_node_id, original.node.id);
        assert_eq!(flag.node_id, near.node.id);
        assert_eq!(r.store.list_duplicate_flags().unwrap().len(), 1);
    }

    #[test]
    fn near_match_is_found_beyond_the_first_page() {
        let r = resolver();
        for i in 0..(FUZZY_PAGE + 20) {
            r.store
                .create_node(&Node::new(format!("unrelated idea {:04}", i), "idea"))
                .unwrap();
        }
        let original = r.resolve_entity(&candidate("Kubernetes", 0.9, "1")).unwrap();
        let near = r.resolve_entity(&candidate("Kubernetess", 0.9, "2")).unwrap();
        let flag = near.possible_duplicate.unwrap();
        assert_eq!(flag.existing_node_id, original.node.id);
    }

    #[test]
    fn names_outside_the_length_window_are_not_read() {
        let r = resolver();
        r.store.create_node(&Node::new("Kubernetes orchestration platform", "idea")).unwrap();
        r.store.create_node(&Node::new("K8s", "idea")).unwrap();
        r.store.create_node(&Node::new("Kubernete", "idea")).unwrap();

        let window = FuzzyWindow {
            node_type: "idea".into(),
            min_length: 4,
            max_length: 25,
        };
        let names: Vec<_> = r
            .store
            .fuzzy_candidates(&window, None, 10)
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["Kubernete"]);
    }

    #[test]
    fn fuzzy_check_can_be_disabled() {
        let store: Arc<dyn GraphStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        let config = ResolverConfig {
            fuzzy_enabled: false,
            ..Default::default()
        };
        let r = EntityResolver::new(store, config);
        r.resolve_entity(&candidate("LangGraph", 0.9, "1")).unwrap();
        let near = r.resolve_entity(&candidate("LangGraphs", 0.9, "2")).unwrap();
        assert!(near.possible_duplicate.is_none());
    }

    #[test]
    fn unknown_type_is_created_and_reported() {
        let r = resolver();
        let c = ExtractionCandidate::new("Hunch", "hunch", 0.5, SourceRef::new("page", "9"));
        let resolution = r.resolve_entity(&c).unwrap();
        assert!(resolution.unknown_type);
        assert_eq!(resolution.outcome, ResolutionOutcome::Created);
    }

    #[test]
    fn invalid_candidate_writes_nothing() {
        let r = resolver();
        let err = r.resolve_entity(&candidate("LangGraph", 2.0, "1")).unwrap_err();
        assert!(matches!(err, GraphError::Validation { .. }));
        assert!(r.store.find_nodes(&NodeFilter::new()).unwrap().is_empty());
    }

    #[test]
    fn concurrent_candidates_for_one_entity_create_one_node() {
        let r = Arc::new(resolver());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let r = r.clone();
                std::thread::spawn(move || {
                    r.resolve_entity(&candidate("Federated Learning", 0.8, &i.to_string()))
                        .unwrap()
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|res| res.outcome == ResolutionOutcome::Created)
            .count();
        assert_eq!(created, 1);
        assert_eq!(r.store.find_nodes(&NodeFilter::new()).unwrap().len(), 1);
        assert!(r.key_locks.is_empty());
    }
}
