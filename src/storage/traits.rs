//! Storage trait definitions

use crate::export::{GraphExport, RestoreCounts};
use crate::graph::{
    Edge, EdgeId, EdgeUpsert, Endpoint, GapId, GapStatus, InsightId, Insight, KnowledgeGap, Node,
    NodeId, NodeUpdate,
};
use crate::provenance::ProvenanceRecord;
use crate::query::Direction;
use crate::resolver::{DeadLetter, DuplicateFlag};
use crate::taxonomy::{EdgeType, NodeType};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Type already registered: {0}")]
    DuplicateType(String),

    #[error("Gap {id}: invalid transition from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: GapStatus,
        to: GapStatus,
    },

    #[error("Field is immutable: {0}")]
    Immutable(&'static str),

    #[error("Connection lock poisoned")]
    Poisoned,

    #[error("Snapshots are read-only")]
    ReadOnlySnapshot,
}

impl StorageError {
    pub fn not_found(kind: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter criteria for querying nodes
#[derive(Debug, Clone, Default)]
pub struct NodeFilter {
    /// Exact node type
    pub node_type: Option<String>,
    /// Exact normalized-name match
    pub normalized_name: Option<String>,
    /// Only nodes updated at or after this instant
    pub updated_since: Option<DateTime<Utc>>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_normalized_name(mut self, normalized: impl Into<String>) -> Self {
        self.normalized_name = Some(normalized.into());
        self
    }

    pub fn updated_since(mut self, since: DateTime<Utc>) -> Self {
        self.updated_since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Edge selection around one endpoint, used by neighbor cursors and traversal
#[derive(Debug, Clone)]
pub struct EdgeSelector {
    pub endpoint: Endpoint,
    pub direction: Direction,
    /// Empty means every edge type
    pub edge_types: Vec<String>,
}

/// Result of `upsert_edge`
#[derive(Debug, Clone)]
pub struct EdgeUpsertOutcome {
    pub edge: Edge,
    /// False when an existing triple was updated in place
    pub created: bool,
}

/// What a node deletion removed along with the node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub edges_removed: Vec<EdgeId>,
    pub provenance_removed: usize,
}

/// Document counts for keyword weighting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextStats {
    /// Nodes, insights and gaps in the store
    pub documents: usize,
    /// Per search term, the documents holding a token that starts with it
    pub frequencies: Vec<usize>,
}

/// Node lookup window for fuzzy name comparison
#[derive(Debug, Clone)]
pub struct FuzzyWindow {
    pub node_type: String,
    /// Whitespace-free character count of the normalized name, inclusive bounds
    pub min_length: usize,
    pub max_length: usize,
}

/// Trait for graph storage backends
///
/// The store is the single owner of persisted mutation. Implementations
/// must be thread-safe (Send + Sync); every mutating method is atomic.
pub trait GraphStore: Send + Sync {
    // === Taxonomy ===

    /// Register a node type; fails with `DuplicateType` on name collision
    fn insert_node_type(&self, node_type: &NodeType) -> StorageResult<()>;

    /// Register an edge type; fails with `DuplicateType` on name collision
    fn insert_edge_type(&self, edge_type: &EdgeType) -> StorageResult<()>;

    /// All node types ordered by name
    fn list_node_types(&self) -> StorageResult<Vec<NodeType>>;

    /// All edge types ordered by name
    fn list_edge_types(&self) -> StorageResult<Vec<EdgeType>>;

    fn get_node_type(&self, name: &str) -> StorageResult<Option<NodeType>>;

    fn get_edge_type(&self, name: &str) -> StorageResult<Option<EdgeType>>;

    // === Nodes ===

    fn create_node(&self, node: &Node) -> StorageResult<()>;

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Apply a partial update. `node_type` changes require `admin_override`.
    fn update_node(&self, id: &NodeId, update: &NodeUpdate) -> StorageResult<Node>;

    /// Delete a node with every edge and provenance record referencing it
    fn delete_node(&self, id: &NodeId) -> StorageResult<CascadeReport>;

    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>>;

    /// Nodes of one type whose name length falls in the window, paged by id
    fn fuzzy_candidates(
        &self,
        window: &FuzzyWindow,
        after: Option<&NodeId>,
        limit: usize,
    ) -> StorageResult<Vec<Node>>;

    // === Text search ===
    //
    // `terms` are lowercase tokens as produced by `query::tokenize`. A row
    // matches when one of its tokens starts with one of the terms.

    fn text_stats(&self, terms: &[String]) -> StorageResult<TextStats>;

    /// One page of matching nodes, ordered by id, strictly after `after`
    fn nodes_matching_text(
        &self,
        terms: &[String],
        after: Option<&NodeId>,
        limit: usize,
    ) -> StorageResult<Vec<Node>>;

    fn insights_matching_text(
        &self,
        terms: &[String],
        after: Option<&InsightId>,
        limit: usize,
    ) -> StorageResult<Vec<Insight>>;

    fn gaps_matching_text(
        &self,
        terms: &[String],
        after: Option<&GapId>,
        limit: usize,
    ) -> StorageResult<Vec<KnowledgeGap>>;

    // === Edges ===

    /// Insert or update the edge for (source, target, edge_type) in one atomic write
    fn upsert_edge(&self, upsert: &EdgeUpsert) -> StorageResult<EdgeUpsertOutcome>;

    fn load_edge(&self, id: &EdgeId) -> StorageResult<Option<Edge>>;

    fn delete_edge(&self, id: &EdgeId) -> StorageResult<()>;

    /// One page of edges around an endpoint, ordered by edge id, strictly after `after`
    fn edges_page(
        &self,
        selector: &EdgeSelector,
        after: Option<&EdgeId>,
        limit: usize,
    ) -> StorageResult<Vec<Edge>>;

    /// Every edge, optionally restricted to the given types
    fn list_edges(&self, edge_types: &[String]) -> StorageResult<Vec<Edge>>;

    // === Insights ===

    fn create_insight(&self, insight: &Insight) -> StorageResult<()>;

    fn load_insight(&self, id: &InsightId) -> StorageResult<Option<Insight>>;

    fn list_insights(&self, validated: Option<bool>) -> StorageResult<Vec<Insight>>;

    /// Insights whose normalized title equals `normalized_title`
    fn find_insights_by_title(&self, normalized_title: &str) -> StorageResult<Vec<Insight>>;

    /// Mark validated. Returns the insight and whether this call changed it.
    fn validate_insight(&self, id: &InsightId) -> StorageResult<(Insight, bool)>;

    // === Knowledge gaps ===

    fn create_gap(&self, gap: &KnowledgeGap) -> StorageResult<()>;

    fn load_gap(&self, id: &GapId) -> StorageResult<Option<KnowledgeGap>>;

    fn list_gaps(&self, status: Option<GapStatus>) -> StorageResult<Vec<KnowledgeGap>>;

    /// Conditional status change; leaves the row untouched on a disallowed move
    fn transition_gap(&self, id: &GapId, to: GapStatus) -> StorageResult<KnowledgeGap>;

    // === Provenance ===

    fn append_provenance(&self, record: &ProvenanceRecord) -> StorageResult<()>;

    /// Records for one entity, most recent first
    fn list_provenance(&self, entity_id: &Uuid) -> StorageResult<Vec<ProvenanceRecord>>;

    fn list_all_provenance(&self) -> StorageResult<Vec<ProvenanceRecord>>;

    // === Review queues ===

    fn insert_dead_letter(&self, letter: &DeadLetter) -> StorageResult<()>;

    fn update_dead_letter(&self, letter: &DeadLetter) -> StorageResult<()>;

    fn delete_dead_letter(&self, id: &Uuid) -> StorageResult<bool>;

    fn list_dead_letters(&self) -> StorageResult<Vec<DeadLetter>>;

    fn insert_duplicate_flag(&self, flag: &DuplicateFlag) -> StorageResult<()>;

    fn list_duplicate_flags(&self) -> StorageResult<Vec<DuplicateFlag>>;

    // === Bulk ===

    /// Upsert every entity in a dump inside one transaction
    fn restore(&self, dump: &GraphExport) -> StorageResult<RestoreCounts>;

    // === Snapshots ===

    /// A read-only view pinned to the state committed when it was taken.
    ///
    /// Every read through the view sees that state until the view is
    /// dropped; writes through it fail with `ReadOnlySnapshot`. Taking a
    /// snapshot of a snapshot shares the pin.
    fn snapshot(&self) -> StorageResult<Arc<dyn GraphStore>>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
