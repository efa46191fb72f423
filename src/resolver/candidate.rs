//! Extraction candidates consumed from the extraction collaborator

use super::normalize::normalize_name;
use crate::error::{GraphError, GraphResult};
use crate::graph::{Attributes, SourceRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An unverified entity proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub name: String,
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: Attributes,
    pub confidence: f32,
    pub source_type: String,
    pub source_id: String,
    #[serde(default)]
    pub snippet: String,
}

impl ExtractionCandidate {
    pub fn new(
        name: impl Into<String>,
        node_type: impl Into<String>,
        confidence: f32,
        source: SourceRef,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            description: String::new(),
            attributes: Attributes::new(),
            confidence,
            source_type: source.source_type,
            source_id: source.source_id,
            snippet: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(&self.source_type, &self.source_id)
    }

    /// Parse from loosely-typed JSON, naming the first missing field
    pub fn from_json(value: &Value) -> GraphResult<Self> {
        let candidate = Self {
            name: required_str(value, "name")?,
            node_type: required_str(value, "node_type")?,
            description: optional_str(value, "description"),
            attributes: match value.get("attributes") {
                None | Some(Value::Null) => Attributes::new(),
                Some(v) => serde_json::from_value(v.clone())
                    .map_err(|e| GraphError::validation("attributes", e.to_string()))?,
            },
            confidence: required_f32(value, "confidence")?,
            source_type: required_str(value, "source_type")?,
            source_id: required_str(value, "source_id")?,
            snippet: optional_str(value, "snippet"),
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> GraphResult<()> {
        non_empty("name", &self.name)?;
        if normalize_name(&self.name).is_empty() {
            return Err(GraphError::validation("name", "name has no matchable characters"));
        }
        non_empty("node_type", &self.node_type)?;
        non_empty("source_type", &self.source_type)?;
        non_empty("source_id", &self.source_id)?;
        unit_interval("confidence", self.confidence)
    }
}

/// An unverified relationship proposal between two named entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub source_name: String,
    #[serde(default)]
    pub source_type_hint: Option<String>,
    pub target_name: String,
    #[serde(default)]
    pub target_type_hint: Option<String>,
    pub edge_type: String,
    #[serde(default)]
    pub context: String,
    pub confidence: f32,
    #[serde(default)]
    pub weight: Option<f32>,
    pub source_type: String,
    pub source_id: String,
}

impl RelationCandidate {
    pub fn new(
        source_name: impl Into<String>,
        target_name: impl Into<String>,
        edge_type: impl Into<String>,
        confidence: f32,
        source: SourceRef,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            source_type_hint: None,
            target_name: target_name.into(),
            target_type_hint: None,
            edge_type: edge_type.into(),
            context: String::new(),
            confidence,
            weight: None,
            source_type: source.source_type,
            source_id: source.source_id,
        }
    }

    pub fn with_type_hints(mut self, source: Option<&str>, target: Option<&str>) -> Self {
        self.source_type_hint = source.map(str::to_string);
        self.target_type_hint = target.map(str::to_string);
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn source_ref(&self) -> SourceRef {
        SourceRef::new(&self.source_type, &self.source_id)
    }

    pub fn from_json(value: &Value) -> GraphResult<Self> {
        let candidate = Self {
            source_name: required_str(value, "source_name")?,
            source_type_hint: hint(value, "source_type_hint"),
            target_name: required_str(value, "target_name")?,
            target_type_hint: hint(value, "target_type_hint"),
            edge_type: required_str(value, "edge_type")?,
            context: optional_str(value, "context"),
            confidence: required_f32(value, "confidence")?,
            weight: match value.get("weight") {
                None | Some(Value::Null) => None,
                Some(_) => Some(required_f32(value, "weight")?),
            },
            source_type: required_str(value, "source_type")?,
            source_id: required_str(value, "source_id")?,
        };
        candidate.validate()?;
        Ok(candidate)
    }

    pub fn validate(&self) -> GraphResult<()> {
        non_empty("source_name", &self.source_name)?;
        non_empty("target_name", &self.target_name)?;
        non_empty("edge_type", &self.edge_type)?;
        non_empty("source_type", &self.source_type)?;
        non_empty("source_id", &self.source_id)?;
        unit_interval("confidence", self.confidence)?;
        if let Some(weight) = self.weight {
            unit_interval("weight", weight)?;
        }
        Ok(())
    }
}

fn required_str(value: &Value, field: &str) -> GraphResult<String> {
    match value.get(field) {
        None | Some(Value::Null) => Err(GraphError::missing_field(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(GraphError::validation(field, "expected a string")),
    }
}

fn optional_str(value: &Value, field: &str) -> String {
    value
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn hint(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required_f32(value: &Value, field: &str) -> GraphResult<f32> {
    match value.get(field) {
        None | Some(Value::Null) => Err(GraphError::missing_field(field)),
        Some(v) => v
            .as_f64()
            .map(|f| f as f32)
            .ok_or_else(|| GraphError::validation(field, "expected a number")),
    }
}

fn non_empty(field: &str, value: &str) -> GraphResult<()> {
    if value.trim().is_empty() {
        return Err(GraphError::missing_field(field));
    }
    Ok(())
}

fn unit_interval(field: &str, value: f32) -> GraphResult<()> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(GraphError::validation(field, format!("{} is outside 0..=1", value)));
    }
    Ok(())
}
