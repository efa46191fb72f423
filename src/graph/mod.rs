//! Core graph data structures

mod edge;
mod gap;
mod id;
mod insight;
mod node;

#[cfg(test)]
mod tests;

pub use edge::{Edge, EdgeUpsert, DEFAULT_WEIGHT};
pub use gap::{GapPriority, GapStatus, KnowledgeGap};
pub use id::{EdgeId, Endpoint, EntityKind, GapId, InsightId, NodeId};
pub use insight::Insight;
pub use node::{AttributeValue, Attributes, Node, NodeUpdate, SourceRef};
