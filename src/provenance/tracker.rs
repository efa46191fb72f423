//! Append-only provenance log backed by the graph store

use super::types::ProvenanceRecord;
use crate::error::GraphResult;
use crate::graph::{EntityKind, SourceRef};
use crate::storage::GraphStore;
use std::sync::Arc;
use uuid::Uuid;

/// Writes and reads provenance records.
///
/// Written by whichever component creates or corroborates an entity.
#[derive(Clone)]
pub struct ProvenanceTracker {
    store: Arc<dyn GraphStore>,
}

impl ProvenanceTracker {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Append a record. Duplicate corroboration is accepted as-is.
    pub fn record(
        &self,
        entity_id: Uuid,
        entity_kind: EntityKind,
        source_type: &str,
        source_id: &str,
        snippet: &str,
    ) -> GraphResult<ProvenanceRecord> {
        let record = ProvenanceRecord::new(
            entity_id,
            entity_kind,
            &SourceRef::new(source_type, source_id),
            snippet,
        );
        self.store.append_provenance(&record)?;
        Ok(record)
    }

    /// Records for one entity, most recent first
    pub fn list_for(&self, entity_id: &Uuid) -> GraphResult<Vec<ProvenanceRecord>> {
        Ok(self.store.list_provenance(entity_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{OpenStore, SqliteStore};

    #[test]
    fn duplicate_corroboration_is_kept() {
        let tracker = ProvenanceTracker::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let entity = Uuid::new_v4();

        tracker.record(entity, EntityKind::Node, "email", "42", "LangGraph is neat").unwrap();
        tracker.record(entity, EntityKind::Node, "email", "42", "LangGraph is neat").unwrap();

        assert_eq!(tracker.list_for(&entity).unwrap().len(), 2);
    }

    #[test]
    fn listing_is_most_recent_first() {
        let tracker = ProvenanceTracker::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        let entity = Uuid::new_v4();

        for source_id in ["1", "2", "3"] {
            tracker.record(entity, EntityKind::Insight, "page", source_id, "").unwrap();
        }

        let ids: Vec<_> = tracker
            .list_for(&entity)
            .unwrap()
            .into_iter()
            .map(|r| r.source_id)
            .collect();
        assert_eq!(ids, vec!["3", "2", "1"]);
    }

    #[test]
    fn unknown_entity_has_no_records() {
        let tracker = ProvenanceTracker::new(Arc::new(SqliteStore::open_in_memory().unwrap()));
        assert!(tracker.list_for(&Uuid::new_v4()).unwrap().is_empty());
    }
}
