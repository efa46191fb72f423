//! Relation resolution: name lookup, bounded retry, dead-lettering

use super::candidate::RelationCandidate;
use super::entity::EntityResolver;
use super::normalize::normalize_name;
use super::review::DeadLetter;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, EdgeUpsert, Endpoint, DEFAULT_WEIGHT};
use crate::storage::{EdgeUpsertOutcome, NodeFilter};
use crate::taxonomy::BuiltinNodeType;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

/// Result of resolving one relation candidate
#[derive(Debug, Clone)]
pub enum RelationResolution {
    Linked {
        edge: Edge,
        /// False when an existing edge was updated in place
        created: bool,
        unknown_type: bool,
    },
    DeadLettered(DeadLetter),
}

/// Outcome of a pass over the dead-letter queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetryReport {
    pub resolved: Vec<Edge>,
    pub still_pending: usize,
}

impl EntityResolver {
    /// Find the endpoint a relation name refers to. Never creates anything.
    ///
    /// With a type hint only nodes of that type match (or insights, for the
    /// hint `insight`). Without one, nodes are preferred by ranking priority,
    /// then insights by title.
    pub fn lookup(&self, name: &str, type_hint: Option<&str>) -> GraphResult<Option<Endpoint>> {
        let normalized = normalize_name(name);
        if normalized.is_empty() {
            return Ok(None);
        }

        if type_hint != Some("insight") {
            let mut filter = NodeFilter::new().with_normalized_name(&normalized);
            if let Some(hint) = type_hint {
                filter = filter.with_type(hint);
            }
            let best = self.store.find_nodes(&filter)?.into_iter().max_by_key(|n| {
                BuiltinNodeType::from_name(&n.node_type)
                    .map(|t| t.ranking_priority())
                    .unwrap_or(0)
            });
            if let Some(node) = best {
                return Ok(Some(Endpoint::Node(node.id)));
            }
        }

        if type_hint.is_none() || type_hint == Some("insight") {
            let insight = self.store.find_insights_by_title(&normalized)?.into_iter().next();
            return Ok(insight.map(|i| Endpoint::Insight(i.id)));
        }
        Ok(None)
    }

    /// One resolution attempt: look both names up, then upsert the edge
    pub fn link_relation(&self, candidate: &RelationCandidate) -> GraphResult<RelationResolution> {
        let (outcome, known) = self.link(candidate)?;
        Ok(RelationResolution::Linked {
            edge: outcome.edge,
            created: outcome.created,
            unknown_type: !known,
        })
    }

    /// Upsert the edge for a candidate; the flag is false for an unregistered edge type
    fn link(&self, candidate: &RelationCandidate) -> GraphResult<(EdgeUpsertOutcome, bool)> {
        candidate.validate()?;
        let source = self.require(&candidate.source_name, candidate.source_type_hint.as_deref())?;
        let target = self.require(&candidate.target_name, candidate.target_type_hint.as_deref())?;

        let mut upsert = EdgeUpsert::new(source, target, &candidate.edge_type)
            .weight(candidate.weight.unwrap_or(DEFAULT_WEIGHT))
            .confidence(candidate.confidence)
            .context(&candidate.context)
            .source_ref(candidate.source_ref());
        let known = self.taxonomy.prepare_edge(&mut upsert)?;
        let outcome = self.store.upsert_edge(&upsert)?;
        tracing::debug!(
            edge_id = %outcome.edge.id,
            edge_type = %outcome.edge.edge_type,
            created = outcome.created,
            "linked relation"
        );
        Ok((outcome, known))
    }

    /// Resolve with bounded exponential backoff, dead-lettering on exhaustion.
    ///
    /// Only unresolved names are retried; validation and storage errors
    /// return immediately.
    pub async fn resolve_relation(
        &self,
        candidate: &RelationCandidate,
    ) -> GraphResult<RelationResolution> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.link_relation(candidate) {
                Ok(resolution) => return Ok(resolution),
                Err(e) if is_unresolved(&e) => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                let letter = DeadLetter::new(candidate.clone(), err.to_string(), attempt);
                self.store.insert_dead_letter(&letter)?;
                tracing::info!(
                    dead_letter_id = %letter.id,
                    source_name = %candidate.source_name,
                    target_name = %candidate.target_name,
                    attempts = attempt,
                    "relation dead-lettered for manual review"
                );
                return Ok(RelationResolution::DeadLettered(letter));
            }

            let delay = self.backoff(attempt);
            tracing::warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "relation unresolved, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Re-run every dead letter once; the ones that now resolve are removed
    pub fn retry_dead_letters(&self) -> GraphResult<RetryReport> {
        let mut report = RetryReport::default();
        for mut letter in self.store.list_dead_letters()? {
            match self.link(&letter.candidate) {
                Ok((outcome, _)) => {
                    self.store.delete_dead_letter(&letter.id)?;
                    tracing::info!(dead_letter_id = %letter.id, edge_id = %outcome.edge.id, "dead letter resolved");
                    report.resolved.push(outcome.edge);
                }
                Err(e) if is_unresolved(&e) => {
                    letter.attempts += 1;
                    letter.reason = e.to_string();
                    letter.last_attempt_at = Utc::now();
                    self.store.update_dead_letter(&letter)?;
                    report.still_pending += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    fn require(&self, name: &str, type_hint: Option<&str>) -> GraphResult<Endpoint> {
        self.lookup(name, type_hint)?
            .ok_or_else(|| GraphError::UnresolvedReference {
                name: name.to_string(),
                type_hint: type_hint.map(str::to_string),
            })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        let ms = self
            .config
            .backoff_base_ms
            .saturating_mul(factor)
            .min(self.config.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// An endpoint missing now may appear once the rest of the batch lands
fn is_unresolved(e: &GraphError) -> bool {
    matches!(
        e,
        GraphError::UnresolvedReference { .. } | GraphError::NotFound { .. }
    )
}
