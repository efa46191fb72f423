//! Manual review queues: dead-lettered relations and possible duplicates

use super::candidate::RelationCandidate;
use crate::graph::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A relation that could not be resolved after every retry.
///
/// Kept until a later retry resolves it or someone removes it by hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub id: Uuid,
    pub candidate: RelationCandidate,
    pub reason: String,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(candidate: RelationCandidate, reason: impl Into<String>, attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            candidate,
            reason: reason.into(),
            attempts,
            created_at: now,
            last_attempt_at: now,
        }
    }
}

/// A newly created node that closely resembles an existing one.
///
/// Fuzzy matches are never merged automatically; this is the review record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateFlag {
    pub id: Uuid,
    /// The node just created
    pub node_id: NodeId,
    /// The existing node it resembles
    pub existing_node_id: NodeId,
    pub similarity: f32,
    pub created_at: DateTime<Utc>,
}

impl DuplicateFlag {
    pub fn new(node_id: NodeId, existing_node_id: NodeId, similarity: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            node_id,
            existing_node_id,
            similarity,
            created_at: Utc::now(),
        }
    }
}
