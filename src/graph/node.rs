//! Node representation in the knowledge graph

use super::id::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Typed attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<AttributeValue>),
    Object(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Flatten the value into plain text for indexing
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Array(items) => items
                .iter()
                .map(|v| v.to_text())
                .collect::<Vec<_>>()
                .join(" "),
            Self::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{} {}", k, v.to_text()))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// Open attribute map. Ordered so stored JSON is stable.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// Where a piece of knowledge came from (e.g. `email` / `42`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_type: String,
    pub source_id: String,
}

impl SourceRef {
    pub fn new(source_type: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            source_type: source_type.into(),
            source_id: source_id.into(),
        }
    }
}

impl std::fmt::Display for SourceRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.source_type, self.source_id)
    }
}

/// A node in the knowledge graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier
    pub id: NodeId,
    /// Display name as first ingested
    pub name: String,
    /// Taxonomy type name (soft reference)
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub source: Option<SourceRef>,
    /// Extraction confidence (0.0 - 1.0)
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a new node with the given name and type
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: NodeId::new(),
            name: name.into(),
            node_type: node_type.into(),
            description: String::new(),
            attributes: Attributes::new(),
            source: None,
            confidence: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn with_source(mut self, source: SourceRef) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Text used for keyword and semantic indexing: name, description, attributes
    pub fn text_representation(&self) -> String {
        let mut text = self.name.clone();
        if !self.description.is_empty() {
            text.push(' ');
            text.push_str(&self.description);
        }
        for (key, value) in &self.attributes {
            text.push(' ');
            text.push_str(key);
            text.push(' ');
            text.push_str(&value.to_text());
        }
        text
    }
}

/// Partial update for `GraphStore::update_node`
#[derive(Debug, Clone, Default)]
pub struct NodeUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Replaces the whole attribute map
    pub attributes: Option<Attributes>,
    pub confidence: Option<f32>,
    pub node_type: Option<String>,
    /// Required for `node_type` to change
    pub admin_override: bool,
}

impl NodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = Some(attributes);
        self
    }

    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Change the node type. Only honoured together with `admin_override`.
    pub fn retype(mut self, node_type: impl Into<String>, admin_override: bool) -> Self {
        self.node_type = Some(node_type.into());
        self.admin_override = admin_override;
        self
    }
}
