//! Synthesized conclusions derived from connected graph entities

use super::id::InsightId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An insight. Starts as a draft; validation is one-way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: InsightId,
    pub title: String,
    pub description: String,
    pub is_validated: bool,
    /// Who or what synthesized the insight (user id, agent name)
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: InsightId::new(),
            title: title.into(),
            description: description.into(),
            is_validated: false,
            created_by: created_by.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn text_representation(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}
