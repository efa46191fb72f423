//! One source document's candidates processed as a unit of work

use super::candidate::{ExtractionCandidate, RelationCandidate};
use super::entity::{EntityResolver, ResolutionOutcome};
use super::relation::RelationResolution;
use crate::error::{GraphError, GraphResult};
use crate::graph::{EdgeId, Node, NodeId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Everything extracted from one source document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceBatch {
    #[serde(default)]
    pub entities: Vec<ExtractionCandidate>,
    #[serde(default)]
    pub relations: Vec<RelationCandidate>,
}

impl SourceBatch {
    /// Parse candidates one by one.
    ///
    /// Malformed entries do not fail the batch; they come back as
    /// `Rejected` outcomes to be merged into the report.
    pub fn from_json(value: &Value) -> GraphResult<(Self, Vec<CandidateOutcome>)> {
        let Some(object) = value.as_object() else {
            return Err(GraphError::validation("batch", "expected an object"));
        };
        let mut batch = Self::default();
        let mut rejected = Vec::new();

        let entries = |field: &str| -> Vec<Value> {
            object
                .get(field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        for (index, entry) in entries("entities").iter().enumerate() {
            match ExtractionCandidate::from_json(entry) {
                Ok(c) => batch.entities.push(c),
                Err(e) => rejected.push(CandidateOutcome::rejected(
                    CandidateKind::Entity,
                    index,
                    entry.get("name").and_then(Value::as_str).unwrap_or_default(),
                    &e,
                )),
            }
        }
        for (index, entry) in entries("relations").iter().enumerate() {
            match RelationCandidate::from_json(entry) {
                Ok(c) => batch.relations.push(c),
                Err(e) => rejected.push(CandidateOutcome::rejected(
                    CandidateKind::Relation,
                    index,
                    entry.get("source_name").and_then(Value::as_str).unwrap_or_default(),
                    &e,
                )),
            }
        }
        Ok((batch, rejected))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Entity,
    Relation,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Created { node_id: NodeId },
    Merged { node_id: NodeId },
    Linked { edge_id: EdgeId, created: bool },
    DeadLettered { dead_letter_id: Uuid },
    Rejected { error: String },
}

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateOutcome {
    pub kind: CandidateKind,
    /// Position in the batch's entity or relation list
    pub index: usize,
    pub name: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl CandidateOutcome {
    fn rejected(kind: CandidateKind, index: usize, name: &str, error: &GraphError) -> Self {
        Self {
            kind,
            index,
            name: name.to_string(),
            status: OutcomeStatus::Rejected {
                error: error.to_string(),
            },
            warnings: Vec::new(),
        }
    }
}

/// Per-candidate results for a batch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<CandidateOutcome>,
    /// Nodes created or merged, for the caller to re-index
    #[serde(skip)]
    pub touched: Vec<Node>,
}

impl BatchReport {
    pub fn count(&self, pred: impl Fn(&OutcomeStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Created { .. }))
    }

    pub fn merged(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Merged { .. }))
    }

    pub fn linked(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Linked { .. }))
    }

    pub fn dead_lettered(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::DeadLettered { .. }))
    }

    pub fn rejected(&self) -> usize {
        self.count(|s| matches!(s, OutcomeStatus::Rejected { .. }))
    }

    /// Add outcomes produced before ingestion, e.g. parse rejections
    pub fn absorb(&mut self, outcomes: Vec<CandidateOutcome>) {
        self.outcomes.extend(outcomes);
    }
}

impl EntityResolver {
    /// Resolve every entity, then every relation.
    ///
    /// A failing candidate, storage errors included, becomes a `Rejected`
    /// outcome and the rest of the batch continues.
    pub async fn ingest_batch(&self, batch: &SourceBatch) -> BatchReport {
        let mut report = BatchReport::default();

        for (index, candidate) in batch.entities.iter().enumerate() {
            let outcome = match self.resolve_entity(candidate) {
                Ok(resolution) => {
                    let mut warnings = Vec::new();
                    if resolution.unknown_type {
                        warnings.push(format!("unknown node type '{}'", candidate.node_type));
                    }
                    if let Some(flag) = &resolution.possible_duplicate {
                        warnings.push(format!(
                            "possible duplicate of {} (similarity {:.2})",
                            flag.existing_node_id, flag.similarity
                        ));
                    }
                    let node_id = resolution.node.id;
                    report.touched.push(resolution.node);
                    CandidateOutcome {
                        kind: CandidateKind::Entity,
                        index,
                        name: candidate.name.clone(),
                        status: match resolution.outcome {
                            ResolutionOutcome::Created => OutcomeStatus::Created { node_id },
                            ResolutionOutcome::Merged => OutcomeStatus::Merged { node_id },
                        },
                        warnings,
                    }
                }
                Err(e) => {
                    tracing::warn!(index, name = %candidate.name, error = %e, "entity candidate rejected");
                    CandidateOutcome::rejected(CandidateKind::Entity, index, &candidate.name, &e)
                }
            };
            report.outcomes.push(outcome);
        }

        for (index, candidate) in batch.relations.iter().enumerate() {
            let name = format!("{} -> {}", candidate.source_name, candidate.target_name);
            let outcome = match self.resolve_relation(candidate).await {
                Ok(RelationResolution::Linked {
                    edge,
                    created,
                    unknown_type,
                }) => CandidateOutcome {
                    kind: CandidateKind::Relation,
                    index,
                    name,
                    status: OutcomeStatus::Linked {
                        edge_id: edge.id,
                        created,
                    },
                    warnings: if unknown_type {
                        vec![format!("unknown edge type '{}'", candidate.edge_type)]
                    } else {
                        Vec::new()
                    },
                },
                Ok(RelationResolution::DeadLettered(letter)) => CandidateOutcome {
                    kind: CandidateKind::Relation,
                    index,
                    name,
                    status: OutcomeStatus::DeadLettered {
                        dead_letter_id: letter.id,
                    },
                    warnings: Vec::new(),
                },
                Err(e) => {
                    tracing::warn!(index, relation = %name, error = %e, "relation candidate rejected");
                    CandidateOutcome::rejected(CandidateKind::Relation, index, &name, &e)
                }
            };
            report.outcomes.push(outcome);
        }

        tracing::info!(
            entities = batch.entities.len(),
            relations = batch.relations.len(),
            created = report.created(),
            merged = report.merged(),
            dead_lettered = report.dead_lettered(),
            rejected = report.rejected(),
            "ingested batch"
        );
        report
    }
}
