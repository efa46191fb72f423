//! Insight & gap registry: lifecycle of synthesized conclusions and open questions
//!
//! Insights go draft -> validated, one way. Gaps go open -> under_review ->
//! resolved or open -> resolved, and are never deleted. The state changes
//! themselves are conditional writes in the store, so a refused transition
//! leaves the row untouched.

use crate::error::{GraphError, GraphResult};
use crate::graph::{GapId, GapPriority, GapStatus, Insight, InsightId, KnowledgeGap};
use crate::storage::GraphStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct LifecycleRegistry {
    store: Arc<dyn GraphStore>,
}

impl LifecycleRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    // === Insights ===

    /// Store a new draft insight
    pub fn create_insight(
        &self,
        title: &str,
        description: &str,
        created_by: &str,
    ) -> GraphResult<Insight> {
        require("title", title)?;
        require("created_by", created_by)?;
        let insight = Insight::new(title.trim(), description, created_by);
        self.store.create_insight(&insight)?;
        tracing::debug!(insight_id = %insight.id, "created insight");
        Ok(insight)
    }

    /// Mark an insight validated. A second call is a no-op.
    pub fn validate_insight(&self, id: &InsightId) -> GraphResult<Insight> {
        let (insight, changed) = self.store.validate_insight(id)?;
        if changed {
            tracing::info!(insight_id = %id, "insight validated");
        }
        Ok(insight)
    }

    pub fn get_insight(&self, id: &InsightId) -> GraphResult<Insight> {
        self.store
            .load_insight(id)?
            .ok_or_else(|| GraphError::NotFound {
                kind: "insight",
                id: id.to_string(),
            })
    }

    /// All insights, or only validated / only draft ones
    pub fn list_insights(&self, validated: Option<bool>) -> GraphResult<Vec<Insight>> {
        Ok(self.store.list_insights(validated)?)
    }

    // === Knowledge gaps ===

    pub fn create_gap(
        &self,
        description: &str,
        priority: GapPriority,
        created_by: &str,
    ) -> GraphResult<KnowledgeGap> {
        require("description", description)?;
        require("created_by", created_by)?;
        let gap = KnowledgeGap::new(description.trim(), priority, created_by);
        self.store.create_gap(&gap)?;
        tracing::debug!(gap_id = %gap.id, priority = gap.priority.as_str(), "opened knowledge gap");
        Ok(gap)
    }

    /// Move a gap to `to`; `InvalidTransition` leaves it where it was
    pub fn transition_gap(&self, id: &GapId, to: GapStatus) -> GraphResult<KnowledgeGap> {
        match self.store.transition_gap(id, to) {
            Ok(gap) => {
                tracing::info!(gap_id = %id, status = %gap.status, "gap transitioned");
                Ok(gap)
            }
            Err(e) => {
                let e = GraphError::from(e);
                if matches!(e, GraphError::InvalidTransition { .. }) {
                    tracing::warn!(gap_id = %id, error = %e, "gap transition refused");
                }
                Err(e)
            }
        }
    }

    pub fn get_gap(&self, id: &GapId) -> GraphResult<KnowledgeGap> {
        self.store.load_gap(id)?.ok_or_else(|| GraphError::NotFound {
            kind: "gap",
            id: id.to_string(),
        })
    }

    pub fn list_gaps(&self, status: Option<GapStatus>) -> GraphResult<Vec<KnowledgeGap>> {
        Ok(self.store.list_gaps(status)?)
    }
}

fn require(field: &str, value: &str) -> GraphResult<()> {
    if value.trim().is_empty() {
        return Err(GraphError::missing_field(field));
    }
    Ok(())
}
