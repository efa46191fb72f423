//! Query engine: dispatches requests to the five retrieval modes

use super::cancel::CancellationToken;
use super::combined::merge_legs;
use super::entity::{entity_lookup, NEIGHBOR_SCORE};
use super::keyword::keyword_search;
use super::semantic::semantic_search;
use super::traverse::TraverseQuery;
use super::types::{
    CombinedParams, EntityParams, KeywordParams, QueryRequest, QueryResponse, Scored,
    SemanticParams, TraversalParams,
};
use crate::config::QueryConfig;
use crate::error::{GraphError, GraphResult};
use crate::index::SemanticIndex;
use crate::storage::{GraphEntity, GraphStore};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read-side entry point. Cheap to clone; every clone shares the store and index.
#[derive(Clone)]
pub struct QueryEngine {
    store: Arc<dyn GraphStore>,
    index: Option<SemanticIndex>,
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(store: Arc<dyn GraphStore>, index: Option<SemanticIndex>, config: QueryConfig) -> Self {
        Self {
            store,
            index,
            config,
        }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    /// Run any request. Store reads happen on the blocking pool.
    pub async fn execute(&self, request: QueryRequest) -> GraphResult<QueryResponse> {
        self.execute_with(request, None).await
    }

    /// As `execute`, with a token that can stop a traversal early
    pub async fn execute_with(
        &self,
        request: QueryRequest,
        token: Option<CancellationToken>,
    ) -> GraphResult<QueryResponse> {
        let started = Instant::now();
        let mode = request.mode();
        let mut response = match request {
            QueryRequest::Combined(p) => self.combined(&p).await?,
            QueryRequest::Keyword(p) => self.blocking(move |e| e.keyword(&p)).await?,
            QueryRequest::Entity(p) => self.blocking(move |e| e.entity(&p)).await?,
            QueryRequest::Semantic(p) => self.blocking(move |e| e.semantic(&p)).await?,
            QueryRequest::Traversal(p) => self.blocking(move |e| e.traverse(&p, token)).await?,
        };
        let total_ms = elapsed_ms(started);
        response.timing.modes.entry(mode.to_string()).or_insert(total_ms);
        response.timing.total_ms = total_ms;
        tracing::debug!(
            mode,
            nodes = response.nodes.len(),
            total_ms,
            "query executed"
        );
        Ok(response)
    }

    pub fn keyword(&self, params: &KeywordParams) -> GraphResult<QueryResponse> {
        let limit = params.limit.unwrap_or(self.config.keyword_limit);
        let store = self.store.snapshot()?;
        let hits = keyword_search(store.as_ref(), &params.text, limit)?;
        let mut response = QueryResponse::new("keyword");
        response.nodes = hits.nodes;
        response.insights = hits.insights;
        response.gaps = hits.gaps;
        Ok(response.finish())
    }

    pub fn entity(&self, params: &EntityParams) -> GraphResult<QueryResponse> {
        let limit = params.limit.unwrap_or(self.config.keyword_limit);
        let store = self.store.snapshot()?;
        let hits = entity_lookup(
            &store,
            params.name.as_deref(),
            params.node_type.as_deref(),
            limit,
            true,
        )?;
        let mut response = QueryResponse::new("entity");
        response.nodes = hits.scored_nodes();
        response.insights = hits
            .neighbor_insights
            .into_iter()
            .map(|i| Scored::new(i, NEIGHBOR_SCORE))
            .collect();
        response.edges = hits.edges;
        Ok(response.finish())
    }

    /// Semantic lookup. An unavailable index yields an empty, flagged response.
    pub fn semantic(&self, params: &SemanticParams) -> GraphResult<QueryResponse> {
        let top_k = params.top_k.unwrap_or(self.config.semantic_top_k);
        let mut response = QueryResponse::new("semantic");
        let store = self.store.snapshot()?;
        match self.semantic_leg(store.as_ref(), &params.text, top_k) {
            Ok(hits) => {
                response.nodes = hits.nodes;
                response.insights = hits.insights;
            }
            Err(GraphError::SemanticUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "semantic index unavailable");
                response.flags.semantic_unavailable = true;
            }
            Err(e) => return Err(e),
        }
        Ok(response.finish())
    }

    /// Breadth-first expansion. Nodes score `1 / (1 + depth)`.
    pub fn traverse(
        &self,
        params: &TraversalParams,
        token: Option<CancellationToken>,
    ) -> GraphResult<QueryResponse> {
        let mut query = TraverseQuery::from(params.seed)
            .depth(params.depth.unwrap_or(self.config.traversal_depth))
            .direction(params.direction)
            .edge_types(params.edge_types.clone())
            .visit_cap(params.visit_cap.unwrap_or(self.config.traversal_visit_cap));
        if let Some(ms) = params.timeout_ms {
            query = query.deadline(Instant::now() + Duration::from_millis(ms));
        }
        if let Some(token) = token {
            query = query.cancel_token(token);
        }
        let result = query.execute(&self.store)?;

        let mut response = QueryResponse::new("traversal");
        for visit in result.visited {
            let score = 1.0 / (1.0 + visit.depth as f32);
            match visit.entity {
                GraphEntity::Node(n) => response.nodes.push(Scored::new(n, score)),
                GraphEntity::Insight(i) => response.insights.push(Scored::new(i, score)),
            }
        }
        response.edges = result.edges;
        response.flags.truncated = result.truncated;
        Ok(response.finish())
    }

    /// Keyword, semantic and entity legs run concurrently over one snapshot,
    /// then merge.
    ///
    /// A semantic failure degrades to keyword + entity with
    /// `semantic_unavailable` set; the other legs' errors are returned.
    pub async fn combined(&self, params: &CombinedParams) -> GraphResult<QueryResponse> {
        let limit = params.limit.unwrap_or(self.config.keyword_limit);
        let top_k = self.config.semantic_top_k.max(limit);
        let weights = params.weights.unwrap_or(self.config.weights);

        let snapshot = {
            let store = self.store.clone();
            tokio::task::spawn_blocking(move || store.snapshot()).await??
        };
        let keyword = {
            let (store, text) = (snapshot.clone(), params.text.clone());
            tokio::task::spawn_blocking(move || timed(|| keyword_search(store.as_ref(), &text, limit)))
        };
        let semantic = {
            let (engine, store, text) = (self.clone(), snapshot.clone(), params.text.clone());
            tokio::task::spawn_blocking(move || {
                timed(|| engine.semantic_leg(store.as_ref(), &text, top_k))
            })
        };
        let entity = {
            let (store, text, node_type) =
                (snapshot, params.text.clone(), params.node_type.clone());
            tokio::task::spawn_blocking(move || {
                timed(|| entity_lookup(&store, Some(&text), node_type.as_deref(), limit, false))
            })
        };
        let (keyword, semantic, entity) = tokio::join!(keyword, semantic, entity);
        let (keyword, keyword_ms) = keyword?;
        let (semantic, semantic_ms) = semantic?;
        let (entity, entity_ms) = entity?;

        let semantic = match semantic {
            Ok(hits) => Some(hits),
            Err(GraphError::SemanticUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "semantic leg unavailable, ranking keyword and entity results only");
                None
            }
            Err(e) => return Err(e),
        };
        let semantic_unavailable = semantic.is_none();

        let mut response = merge_legs(keyword?, semantic, entity?, &weights).finish();
        response.nodes.truncate(limit);
        response.insights.truncate(limit);
        response.gaps.truncate(limit);
        let mut response = response.finish();
        response.flags.semantic_unavailable = semantic_unavailable;
        response.timing.modes.insert("keyword".into(), keyword_ms);
        response.timing.modes.insert("semantic".into(), semantic_ms);
        response.timing.modes.insert("entity".into(), entity_ms);
        Ok(response)
    }

    async fn blocking<F>(&self, f: F) -> GraphResult<QueryResponse>
    where
        F: FnOnce(&QueryEngine) -> GraphResult<QueryResponse> + Send + 'static,
    {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || f(&engine)).await?
    }

    fn semantic_leg(
        &self,
        store: &dyn GraphStore,
        text: &str,
        top_k: usize,
    ) -> GraphResult<super::semantic::SemanticHits> {
        match &self.index {
            Some(index) => semantic_search(store, index, text, top_k),
            None => Err(GraphError::SemanticUnavailable(
                "no semantic index configured".into(),
            )),
        }
    }
}

fn timed<T>(f: impl FnOnce() -> T) -> (T, f64) {
    let started = Instant::now();
    let out = f();
    (out, elapsed_ms(started))
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
