//! Knowledge gaps: tracked open questions and contradictions

use super::id::GapId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a gap.
///
/// `open -> under_review -> resolved` or `open -> resolved`.
/// Nothing leaves `resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapStatus {
    Open,
    UnderReview,
    Resolved,
}

impl GapStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::UnderReview => "under_review",
            Self::Resolved => "resolved",
        }
    }

    /// States from which `self` may be entered
    pub fn allowed_predecessors(&self) -> &'static [GapStatus] {
        match self {
            Self::Open => &[],
            Self::UnderReview => &[Self::Open],
            Self::Resolved => &[Self::Open, Self::UnderReview],
        }
    }

    pub fn can_transition_to(&self, next: GapStatus) -> bool {
        next.allowed_predecessors().contains(self)
    }
}

impl std::fmt::Display for GapStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GapStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "under_review" => Ok(Self::UnderReview),
            "resolved" => Ok(Self::Resolved),
            other => Err(format!("unknown gap status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GapPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl GapPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for GapPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown gap priority: {}", other)),
        }
    }
}

/// A tracked open question. Never hard-deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeGap {
    pub id: GapId,
    pub description: String,
    pub status: GapStatus,
    pub priority: GapPriority,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeGap {
    pub fn new(
        description: impl Into<String>,
        priority: GapPriority,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GapId::new(),
            description: description.into(),
            status: GapStatus::Open,
            priority,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }
}
