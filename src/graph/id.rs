//! Globally unique identifiers and polymorphic edge endpoints

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a node
    NodeId
);
define_id!(
    /// Unique identifier for an edge
    EdgeId
);
define_id!(
    /// Unique identifier for an insight
    InsightId
);
define_id!(
    /// Unique identifier for a knowledge gap
    GapId
);

/// The kind of entity an identifier or provenance record refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Node,
    Insight,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Insight => "insight",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Self::Node),
            "insight" => Ok(Self::Insight),
            other => Err(format!("unknown entity kind: {}", other)),
        }
    }
}

/// One end of an edge.
///
/// Nodes and insights share the edge namespace; the tag keeps the two
/// identifier spaces apart so an edge always knows what it points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Endpoint {
    Node(NodeId),
    Insight(InsightId),
}

impl Endpoint {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Node(_) => EntityKind::Node,
            Self::Insight(_) => EntityKind::Insight,
        }
    }

    pub fn uuid(&self) -> Uuid {
        match self {
            Self::Node(id) => *id.as_uuid(),
            Self::Insight(id) => *id.as_uuid(),
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::Node(id) => Some(*id),
            Self::Insight(_) => None,
        }
    }

    /// Rebuild an endpoint from its stored (kind, id) columns
    pub fn from_parts(kind: EntityKind, uuid: Uuid) -> Self {
        match kind {
            EntityKind::Node => Self::Node(NodeId::from_uuid(uuid)),
            EntityKind::Insight => Self::Insight(InsightId::from_uuid(uuid)),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.uuid())
    }
}

impl From<NodeId> for Endpoint {
    fn from(id: NodeId) -> Self {
        Self::Node(id)
    }
}

impl From<InsightId> for Endpoint {
    fn from(id: InsightId) -> Self {
        Self::Insight(id)
    }
}
