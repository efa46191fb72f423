//! Transport-independent API layer.
//!
//! `IdeaGraph` is the single entry point for consumer-facing operations.
//! The CLI and embedding hosts call `IdeaGraph` methods; they never reach
//! into the resolver, the lifecycle registry or the index worker directly.
//! Every write that changes indexed text also queues an index task.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::export::{export_graph, import_graph, ExportFilter, GraphExport, RestoreCounts};
use crate::graph::{
    Edge, EdgeId, EdgeUpsert, Endpoint, GapId, GapPriority, GapStatus, Insight,
    InsightId, KnowledgeGap, Node, NodeId, NodeUpdate,
};
use crate::index::{open_index, IndexTask, SemanticIndex};
use crate::lifecycle::LifecycleRegistry;
use crate::provenance::{ProvenanceRecord, ProvenanceTracker};
use crate::query::{CancellationToken, Direction, QueryEngine, QueryRequest, QueryResponse};
use crate::resolver::{
    BatchReport, DeadLetter, DuplicateFlag, EntityResolver, ExtractionCandidate,
    RelationCandidate, RelationResolution, Resolution, RetryReport, SourceBatch,
};
use crate::storage::{CascadeReport, GraphStore, Neighbor, Neighbors, OpenStore, SqliteStore};
use crate::taxonomy::{EdgeType, NodeType, TaxonomyRegistry};

/// A node write, with the soft type check result
#[derive(Debug, Clone)]
pub struct NodeWrite {
    pub node: Node,
    pub unknown_type: bool,
}

/// An edge write: the stored edge, whether it is new, and the soft type check result
#[derive(Debug, Clone)]
pub struct EdgeWrite {
    pub edge: Edge,
    pub created: bool,
    pub unknown_type: bool,
}

/// Single entry point for all consumer-facing operations.
#[derive(Clone)]
pub struct IdeaGraph {
    store: Arc<dyn GraphStore>,
    taxonomy: TaxonomyRegistry,
    resolver: Arc<EntityResolver>,
    provenance: ProvenanceTracker,
    lifecycle: LifecycleRegistry,
    index: Option<SemanticIndex>,
    query: QueryEngine,
    config: GraphConfig,
}

impl IdeaGraph {
    /// Open the configured database and start the semantic index worker.
    ///
    /// Must be called inside a tokio runtime. An empty vector store (always
    /// the case for the in-memory backend) queues the whole graph for
    /// indexing. If the index cannot be built the graph opens without one
    /// and semantic queries report `semantic_unavailable`.
    pub async fn open(config: GraphConfig) -> GraphResult<Self> {
        config.validate()?;
        let store: Arc<dyn GraphStore> = match &config.database {
            Some(path) => Arc::new(SqliteStore::open(path)?),
            None => Arc::new(SqliteStore::open_in_memory()?),
        };
        let index = match open_index(&config.index, config.database.as_deref()) {
            Ok(index) => Some(index),
            Err(GraphError::SemanticUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "opening without a semantic index");
                None
            }
            Err(e) => return Err(e),
        };
        let graph = Self::with_parts(store, index, config)?;
        if let Some(index) = &graph.index {
            if index.vector_store().is_empty()? {
                index.rebuild(graph.store.as_ref()).await?;
            }
        }
        tracing::info!(
            database = ?graph.config.database,
            "opened idea graph"
        );
        Ok(graph)
    }

    /// Assemble from an already-open store and an optional index.
    ///
    /// Seeds the default taxonomy when configured.
    pub fn with_parts(
        store: Arc<dyn GraphStore>,
        index: Option<SemanticIndex>,
        config: GraphConfig,
    ) -> GraphResult<Self> {
        let taxonomy = TaxonomyRegistry::new(store.clone());
        if config.seed_taxonomy {
            taxonomy.seed_defaults()?;
        }
        Ok(Self {
            resolver: Arc::new(EntityResolver::new(store.clone(), config.resolver.clone())),
            provenance: ProvenanceTracker::new(store.clone()),
            lifecycle: LifecycleRegistry::new(store.clone()),
            query: QueryEngine::new(store.clone(), index.clone(), config.query.clone()),
            taxonomy,
            index,
            store,
            config,
        })
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn taxonomy(&self) -> &TaxonomyRegistry {
        &self.taxonomy
    }

    // --- Taxonomy ---

    pub fn register_node_type(&self, node_type: NodeType) -> GraphResult<()> {
        self.taxonomy.register_node_type(node_type)
    }

    pub fn register_edge_type(&self, edge_type: EdgeType) -> GraphResult<()> {
        self.taxonomy.register_edge_type(edge_type)
    }

    pub fn list_node_types(&self) -> GraphResult<Vec<NodeType>> {
        self.taxonomy.list_node_types()
    }

    pub fn list_edge_types(&self) -> GraphResult<Vec<EdgeType>> {
        self.taxonomy.list_edge_types()
    }

    // --- Nodes ---

    /// Store a node as given. Bypasses dedup; ingestion goes through `ingest_entity`.
    pub async fn create_node(&self, node: Node) -> GraphResult<NodeWrite> {
        if node.name.trim().is_empty() {
            return Err(GraphError::missing_field("name"));
        }
        if !(0.0..=1.0).contains(&node.confidence) {
            return Err(GraphError::validation("confidence", "must be within 0..=1"));
        }
        let unknown_type = !self.taxonomy.check_node_type(&node.node_type)?;
        self.store.create_node(&node)?;
        self.reindex_node(&node).await;
        Ok(NodeWrite { node, unknown_type })
    }

    pub fn get_node(&self, id: &NodeId) -> GraphResult<Node> {
        self.store
            .load_node(id)?
            .ok_or_else(|| GraphError::NotFound {
                kind: "node",
                id: id.to_string(),
            })
    }

    /// Partial update. A `node_type` change needs `admin_override`.
    pub async fn update_node(&self, id: &NodeId, update: NodeUpdate) -> GraphResult<Node> {
        if let Some(node_type) = &update.node_type {
            self.taxonomy.check_node_type(node_type)?;
        }
        let node = self.store.update_node(id, &update)?;
        self.reindex_node(&node).await;
        Ok(node)
    }

    /// Delete a node with its edges and provenance
    pub async fn delete_node(&self, id: &NodeId) -> GraphResult<CascadeReport> {
        let report = self.store.delete_node(id)?;
        self.queue(IndexTask::Remove(Endpoint::Node(*id))).await;
        Ok(report)
    }

    // --- Edges ---

    /// Insert or update the edge for its (source, target, edge_type) triple
    pub fn upsert_edge(&self, mut upsert: EdgeUpsert) -> GraphResult<EdgeWrite> {
        if !(0.0..=1.0).contains(&upsert.weight) {
            return Err(GraphError::validation("weight", "must be within 0..=1"));
        }
        if !(0.0..=1.0).contains(&upsert.confidence) {
            return Err(GraphError::validation("confidence", "must be within 0..=1"));
        }
        let known = self.taxonomy.prepare_edge(&mut upsert)?;
        let outcome = self.store.upsert_edge(&upsert)?;
        tracing::debug!(
            edge_id = %outcome.edge.id,
            edge_type = %outcome.edge.edge_type,
            created = outcome.created,
            "upserted edge"
        );
        Ok(EdgeWrite {
            edge: outcome.edge,
            created: outcome.created,
            unknown_type: !known,
        })
    }

    pub fn get_edge(&self, id: &EdgeId) -> GraphResult<Edge> {
        self.store
            .load_edge(id)?
            .ok_or_else(|| GraphError::NotFound {
                kind: "edge",
                id: id.to_string(),
            })
    }

    pub fn delete_edge(&self, id: &EdgeId) -> GraphResult<()> {
        self.store.delete_edge(id)?;
        Ok(())
    }

    /// Every entity one edge away from `origin`
    pub fn neighbors(
        &self,
        origin: impl Into<Endpoint>,
        direction: Direction,
        edge_types: Vec<String>,
    ) -> GraphResult<Vec<Neighbor>> {
        Neighbors::new(self.store.clone(), origin, edge_types, direction)
            .map(|n| n.map_err(GraphError::from))
            .collect()
    }

    // --- Ingestion ---

    /// Resolve one extraction candidate into a created or merged node
    pub async fn ingest_entity(&self, candidate: &ExtractionCandidate) -> GraphResult<Resolution> {
        let resolution = self.resolver.resolve_entity(candidate)?;
        self.reindex_node(&resolution.node).await;
        Ok(resolution)
    }

    /// Link one relation candidate, retrying and then dead-lettering unresolved endpoints
    pub async fn ingest_relation(
        &self,
        candidate: &RelationCandidate,
    ) -> GraphResult<RelationResolution> {
        self.resolver.resolve_relation(candidate).await
    }

    /// Ingest one source document's candidates as a unit of work
    pub async fn ingest_batch(&self, batch: &SourceBatch) -> BatchReport {
        let report = self.resolver.ingest_batch(batch).await;
        for node in &report.touched {
            self.reindex_node(node).await;
        }
        tracing::info!(
            created = report.created(),
            merged = report.merged(),
            linked = report.linked(),
            dead_lettered = report.dead_lettered(),
            rejected = report.rejected(),
            "ingested batch"
        );
        report
    }

    /// Parse a JSON batch leniently; malformed candidates are reported, not fatal
    pub async fn ingest_json(&self, value: &serde_json::Value) -> GraphResult<BatchReport> {
        let (batch, rejected) = SourceBatch::from_json(value)?;
        let mut report = self.ingest_batch(&batch).await;
        report.absorb(rejected);
        Ok(report)
    }

    pub fn list_dead_letters(&self) -> GraphResult<Vec<DeadLetter>> {
        Ok(self.store.list_dead_letters()?)
    }

    pub fn retry_dead_letters(&self) -> GraphResult<RetryReport> {
        self.resolver.retry_dead_letters()
    }

    pub fn list_duplicate_flags(&self) -> GraphResult<Vec<DuplicateFlag>> {
        Ok(self.store.list_duplicate_flags()?)
    }

    // --- Provenance ---

    /// Attach evidence to an existing node or insight
    pub fn record_provenance(
        &self,
        entity: Endpoint,
        source_type: &str,
        source_id: &str,
        snippet: &str,
    ) -> GraphResult<ProvenanceRecord> {
        let exists = match entity {
            Endpoint::Node(id) => self.store.load_node(&id)?.is_some(),
            Endpoint::Insight(id) => self.store.load_insight(&id)?.is_some(),
        };
        if !exists {
            return Err(GraphError::NotFound {
                kind: entity.kind().as_str(),
                id: entity.uuid().to_string(),
            });
        }
        self.provenance
            .record(entity.uuid(), entity.kind(), source_type, source_id, snippet)
    }

    /// Records for one entity, most recent first
    pub fn list_provenance(&self, entity_id: &Uuid) -> GraphResult<Vec<ProvenanceRecord>> {
        self.provenance.list_for(entity_id)
    }

    // --- Insights & gaps ---

    pub async fn create_insight(
        &self,
        title: &str,
        description: &str,
        created_by: &str,
    ) -> GraphResult<Insight> {
        let insight = self.lifecycle.create_insight(title, description, created_by)?;
        self.queue(IndexTask::Upsert {
            key: Endpoint::Insight(insight.id),
            text: insight.text_representation(),
        })
        .await;
        Ok(insight)
    }

    /// One-way; validating twice is not an error
    pub fn validate_insight(&self, id: &InsightId) -> GraphResult<Insight> {
        self.lifecycle.validate_insight(id)
    }

    pub fn get_insight(&self, id: &InsightId) -> GraphResult<Insight> {
        self.lifecycle.get_insight(id)
    }

    pub fn list_insights(&self, validated: Option<bool>) -> GraphResult<Vec<Insight>> {
        self.lifecycle.list_insights(validated)
    }

    pub fn create_gap(
        &self,
        description: &str,
        priority: GapPriority,
        created_by: &str,
    ) -> GraphResult<KnowledgeGap> {
        self.lifecycle.create_gap(description, priority, created_by)
    }

    pub fn transition_gap(&self, id: &GapId, to: GapStatus) -> GraphResult<KnowledgeGap> {
        self.lifecycle.transition_gap(id, to)
    }

    pub fn get_gap(&self, id: &GapId) -> GraphResult<KnowledgeGap> {
        self.lifecycle.get_gap(id)
    }

    pub fn list_gaps(&self, status: Option<GapStatus>) -> GraphResult<Vec<KnowledgeGap>> {
        self.lifecycle.list_gaps(status)
    }

    // --- Query ---

    pub async fn query(&self, request: QueryRequest) -> GraphResult<QueryResponse> {
        self.query.execute(request).await
    }

    /// As `query`, with a token that stops a traversal early
    pub async fn query_with(
        &self,
        request: QueryRequest,
        token: CancellationToken,
    ) -> GraphResult<QueryResponse> {
        self.query.execute_with(request, Some(token)).await
    }

    pub fn query_engine(&self) -> &QueryEngine {
        &self.query
    }

    // --- Semantic index ---

    pub fn index_available(&self) -> bool {
        self.index.as_ref().is_some_and(SemanticIndex::is_available)
    }

    /// Wait for every queued index task to be applied
    pub async fn flush_index(&self) -> GraphResult<()> {
        if let Some(index) = &self.index {
            index.flush().await?;
        }
        Ok(())
    }

    /// Re-queue every node and insight for embedding
    pub async fn rebuild_index(&self) -> GraphResult<usize> {
        match &self.index {
            Some(index) => index.rebuild(self.store.as_ref()).await,
            None => Ok(0),
        }
    }

    // --- Export ---

    pub fn export(&self, filter: &ExportFilter) -> GraphResult<GraphExport> {
        export_graph(self.store.as_ref(), filter)
    }

    /// Restore a dump and re-index what it brought in
    pub async fn import(&self, dump: &GraphExport) -> GraphResult<RestoreCounts> {
        let counts = import_graph(self.store.as_ref(), dump)?;
        self.rebuild_index().await?;
        Ok(counts)
    }

    async fn reindex_node(&self, node: &Node) {
        self.queue(IndexTask::Upsert {
            key: Endpoint::Node(node.id),
            text: node.text_representation(),
        })
        .await;
    }

    /// The graph write already succeeded, so an index failure only degrades
    /// semantic search.
    async fn queue(&self, task: IndexTask) {
        let Some(index) = &self.index else {
            return;
        };
        if let Err(e) = index.enqueue(task).await {
            tracing::warn!(error = %e, "could not queue semantic index update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CombinedParams, EntityParams};

    async fn graph() -> IdeaGraph {
        IdeaGraph::open(GraphConfig::in_memory()).await.unwrap()
    }

    #[tokio::test]
    async fn open_seeds_the_default_taxonomy() {
        let g = graph().await;
        let names: Vec<_> = g.list_node_types().unwrap().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"idea".to_string()));
        assert!(g.index_available());
    }

    #[tokio::test]
    async fn unknown_node_type_is_accepted_and_flagged() {
        let g = graph().await;
        let write = g.create_node(Node::new("Zettel", "slip")).await.unwrap();
        assert!(write.unknown_type);
        assert_eq!(g.get_node(&write.node.id).unwrap().node_type, "slip");
    }

    #[tokio::test]
    async fn undirected_edges_collapse_to_one_triple() {
        let g = graph().await;
        let a = g.create_node(Node::new("A", "idea")).await.unwrap().node;
        let b = g.create_node(Node::new("B", "idea")).await.unwrap().node;

        let first = g.upsert_edge(EdgeUpsert::new(a.id, b.id, "related_to")).unwrap();
        let second = g
            .upsert_edge(EdgeUpsert::new(b.id, a.id, "related_to").weight(0.4))
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.edge.id, second.edge.id);
        assert_eq!(second.edge.weight, 0.4);
    }

    #[tokio::test]
    async fn edge_weight_out_of_range_is_rejected() {
        let g = graph().await;
        let a = g.create_node(Node::new("A", "idea")).await.unwrap().node;
        let b = g.create_node(Node::new("B", "idea")).await.unwrap().node;
        let err = g
            .upsert_edge(EdgeUpsert::new(a.id, b.id, "supports").weight(1.5))
            .unwrap_err();
        assert!(matches!(err, GraphError::Validation { ref field, .. } if field == "weight"));
    }

    #[tokio::test]
    async fn provenance_requires_an_existing_entity() {
        let g = graph().await;
        let err = g
            .record_provenance(Endpoint::Node(NodeId::new()), "email", "1", "")
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound { kind: "node", .. }));
    }

    #[tokio::test]
    async fn inserted_insight_is_searchable_after_flush() {
        let g = graph().await;
        let insight = g
            .create_insight("Graphs orchestrate agents", "LangGraph style planning", "ada")
            .await
            .unwrap();
        g.flush_index().await.unwrap();

        let response = g
            .query(QueryRequest::Combined(CombinedParams {
                text: "graphs orchestrate agents".into(),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(response.insights[0].item.id, insight.id);
    }

    #[tokio::test]
    async fn deleted_node_leaves_entity_lookup() {
        let g = graph().await;
        let node = g.create_node(Node::new("Ephemeral", "idea")).await.unwrap().node;
        g.delete_node(&node.id).await.unwrap();
        let response = g
            .query(QueryRequest::Entity(EntityParams {
                name: Some("ephemeral".into()),
                node_type: None,
                limit: None,
            }))
            .await
            .unwrap();
        assert!(response.nodes.is_empty());
        assert!(matches!(g.get_node(&node.id), Err(GraphError::NotFound { .. })));
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn node_delete_is_logged_once() {
        let g = graph().await;
        let node = g.create_node(Node::new("Ephemeral", "idea")).await.unwrap().node;

        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        {
            let _guard = tracing::subscriber::set_default(subscriber);
            g.delete_node(&node.id).await.unwrap();
        }

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.matches("deleted node").count(), 1, "{}", text);
    }
}
