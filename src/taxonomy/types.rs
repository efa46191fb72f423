//! Node and edge type definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Attribute name -> free-form type description (e.g. `"url"`, `"string"`)
pub type AttributeSchema = BTreeMap<String, String>;

/// Whether an edge type has a meaningful direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Directionality {
    #[default]
    Directed,
    Undirected,
}

impl Directionality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directed => "directed",
            Self::Undirected => "undirected",
        }
    }
}

impl FromStr for Directionality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directed" => Ok(Self::Directed),
            "undirected" => Ok(Self::Undirected),
            other => Err(format!("unknown directionality: {}", other)),
        }
    }
}

/// A registered node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,
    /// Display color, e.g. `#4f46e5`
    pub color: String,
    pub definition: String,
    pub example: String,
    #[serde(default)]
    pub attribute_schema: AttributeSchema,
    pub created_at: DateTime<Utc>,
}

impl NodeType {
    pub fn new(name: impl Into<String>, color: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            definition: definition.into(),
            example: String::new(),
            attribute_schema: AttributeSchema::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: impl Into<String>) -> Self {
        self.attribute_schema.insert(name.into(), kind.into());
        self
    }
}

/// A registered edge type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeType {
    pub name: String,
    pub color: String,
    pub definition: String,
    pub example: String,
    #[serde(default)]
    pub attribute_schema: AttributeSchema,
    #[serde(default)]
    pub directionality: Directionality,
    pub created_at: DateTime<Utc>,
}

impl EdgeType {
    pub fn new(name: impl Into<String>, color: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            definition: definition.into(),
            example: String::new(),
            attribute_schema: AttributeSchema::new(),
            directionality: Directionality::Directed,
            created_at: Utc::now(),
        }
    }

    pub fn undirected(mut self) -> Self {
        self.directionality = Directionality::Undirected;
        self
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = example.into();
        self
    }
}

/// Either kind of type definition, as returned by `TaxonomyRegistry::get_type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TypeDefinition {
    Node(NodeType),
    Edge(EdgeType),
}

/// Node types the engine ranks specially.
///
/// Everything else is a plain runtime string; this closed set only exists
/// so ranking priorities are matched exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinNodeType {
    Idea,
    Concept,
    Technology,
    Project,
    Person,
    Organization,
    SourceDocument,
}

impl BuiltinNodeType {
    pub const ALL: [BuiltinNodeType; 7] = [
        Self::Idea,
        Self::Concept,
        Self::Technology,
        Self::Project,
        Self::Person,
        Self::Organization,
        Self::SourceDocument,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Concept => "concept",
            Self::Technology => "technology",
            Self::Project => "project",
            Self::Person => "person",
            Self::Organization => "organization",
            Self::SourceDocument => "source_document",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }

    /// Default ordering priority for entity lookups; higher sorts first
    pub fn ranking_priority(&self) -> u8 {
        match self {
            Self::Idea => 6,
            Self::Concept => 5,
            Self::Technology => 4,
            Self::Project => 3,
            Self::Person | Self::Organization => 2,
            Self::SourceDocument => 1,
        }
    }

    fn color(&self) -> &'static str {
        match self {
            Self::Idea => "#f59e0b",
            Self::Concept => "#6366f1",
            Self::Technology => "#10b981",
            Self::Project => "#3b82f6",
            Self::Person => "#ec4899",
            Self::Organization => "#8b5cf6",
            Self::SourceDocument => "#6b7280",
        }
    }

    fn definition(&self) -> (&'static str, &'static str) {
        match self {
            Self::Idea => ("A proposal or notion worth tracking", "Use graph retrieval for email triage"),
            Self::Concept => ("An abstract topic or field", "federated learning"),
            Self::Technology => ("A tool, library, protocol or product", "LangGraph"),
            Self::Project => ("An initiative with a goal", "Inbox knowledge base"),
            Self::Person => ("An individual", "Ada Lovelace"),
            Self::Organization => ("A company, team or institution", "Mozilla"),
            Self::SourceDocument => ("An ingested source such as an email or page", "email #42"),
        }
    }

    pub fn definition_record(&self) -> NodeType {
        let (definition, example) = self.definition();
        NodeType::new(self.name(), self.color(), definition).with_example(example)
    }
}

/// Default node types
pub fn default_node_types() -> Vec<NodeType> {
    BuiltinNodeType::ALL
        .iter()
        .map(|t| t.definition_record())
        .collect()
}

/// Default edge types
pub fn default_edge_types() -> Vec<EdgeType> {
    vec![
        EdgeType::new("supports", "#22c55e", "Source provides evidence for target")
            .with_example("benchmark supports idea"),
        EdgeType::new("contradicts", "#ef4444", "The two entities are in tension")
            .with_example("study contradicts claim")
            .undirected(),
        EdgeType::new("related_to", "#94a3b8", "Loosely associated entities").undirected(),
        EdgeType::new("part_of", "#0ea5e9", "Source is a component of target"),
        EdgeType::new("mentions", "#a3a3a3", "Source refers to target"),
        EdgeType::new("derived_from", "#f97316", "Source was synthesized from target"),
        EdgeType::new("authored_by", "#d946ef", "Source was created by target"),
    ]
}
