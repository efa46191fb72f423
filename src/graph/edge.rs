//! Typed relationships between graph entities

use super::id::{EdgeId, Endpoint};
use super::node::SourceRef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default edge weight when the caller supplies none
pub const DEFAULT_WEIGHT: f32 = 1.0;

/// A typed edge.
///
/// At most one edge exists per (source, target, edge_type) triple; writing
/// the same triple again updates weight, confidence and context in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source: Endpoint,
    pub target: Endpoint,
    /// Taxonomy type name (soft reference)
    pub edge_type: String,
    /// Relationship strength (0.0 - 1.0)
    pub weight: f32,
    #[serde(default)]
    pub context: String,
    pub source_ref: Option<SourceRef>,
    /// Confidence in the relationship (0.0 - 1.0)
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Edge {
    /// The endpoint on the other side of `from`, if `from` touches this edge
    pub fn other_end(&self, from: &Endpoint) -> Option<Endpoint> {
        if &self.source == from {
            Some(self.target)
        } else if &self.target == from {
            Some(self.source)
        } else {
            None
        }
    }

    /// True if the edge starts and ends at the same entity
    pub fn is_loop(&self) -> bool {
        self.source == self.target
    }
}

/// Arguments for `GraphStore::upsert_edge`
#[derive(Debug, Clone)]
pub struct EdgeUpsert {
    pub source: Endpoint,
    pub target: Endpoint,
    pub edge_type: String,
    pub weight: f32,
    pub context: String,
    pub confidence: f32,
    pub source_ref: Option<SourceRef>,
}

impl EdgeUpsert {
    pub fn new(
        source: impl Into<Endpoint>,
        target: impl Into<Endpoint>,
        edge_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            edge_type: edge_type.into(),
            weight: DEFAULT_WEIGHT,
            context: String::new(),
            confidence: 1.0,
            source_ref: None,
        }
    }

    pub fn weight(mut self, weight: f32) -> Self {
        self.weight = weight.clamp(0.0, 1.0);
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn source_ref(mut self, source_ref: SourceRef) -> Self {
        self.source_ref = Some(source_ref);
        self
    }
}
