//! Provenance record type

use crate::graph::{EntityKind, SourceRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Links a node or insight to a verbatim source snippet.
///
/// Many records may point at one entity; repeated corroboration from the
/// same source is kept as additional evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub id: Uuid,
    pub entity_id: Uuid,
    pub entity_kind: EntityKind,
    pub source_type: String,
    pub source_id: String,
    #[serde(default)]
    pub snippet: String,
    pub recorded_at: DateTime<Utc>,
}

impl ProvenanceRecord {
    pub fn new(
        entity_id: Uuid,
        entity_kind: EntityKind,
        source: &SourceRef,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            entity_id,
            entity_kind,
            source_type: source.source_type.clone(),
            source_id: source.source_id.clone(),
            snippet: snippet.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn source(&self) -> SourceRef {
        SourceRef::new(&self.source_type, &self.source_id)
    }
}
