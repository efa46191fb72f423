//! ideagraph: typed knowledge graph engine for idea ingestion
//!
//! Extraction candidates from an external collaborator are resolved into a
//! deduplicated graph of typed nodes and edges, with provenance for every
//! entity, and queried through keyword, entity, semantic, traversal and
//! combined retrieval.
//!
//! # Core Concepts
//!
//! - **Nodes**: extracted entities, ideas and concepts, typed by a runtime-extensible taxonomy
//! - **Edges**: typed relationships, at most one per (source, target, edge_type)
//! - **Insights**: synthesized conclusions that can sit on either end of an edge
//! - **Knowledge gaps**: open questions with a one-way status lifecycle
//!
//! # Example
//!
//! ```no_run
//! use ideagraph::{GraphConfig, IdeaGraph};
//!
//! # async fn run() -> ideagraph::GraphResult<()> {
//! let graph = IdeaGraph::open(GraphConfig::in_memory()).await?;
//! // Graph is ready for ingestion and queries
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod export;
pub mod graph;
pub mod index;
pub mod lifecycle;
pub mod provenance;
pub mod query;
pub mod resolver;
pub mod storage;
pub mod taxonomy;

pub use api::{EdgeWrite, IdeaGraph, NodeWrite};
pub use config::GraphConfig;
pub use error::{GraphError, GraphResult};
pub use export::{ExportFilter, GraphExport, RestoreCounts};
pub use graph::{
    Edge, EdgeId, EdgeUpsert, Endpoint, GapId, GapPriority, GapStatus, Insight, InsightId,
    KnowledgeGap, Node, NodeId, NodeUpdate,
};
pub use query::{QueryEngine, QueryRequest, QueryResponse};
pub use resolver::{BatchReport, ExtractionCandidate, RelationCandidate, SourceBatch};
pub use storage::{GraphStore, OpenStore, SqliteStore, StorageError, StorageResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
