//! Common test utilities for ideagraph integration tests
//!
//! Graph setup helpers, a name-addressed graph builder and an embedder
//! that is always offline.

#![allow(dead_code)]

pub mod graph_builder;

pub use graph_builder::{random_cyclic_graph, GraphBuilder};

use ideagraph::config::ResolverConfig;
use ideagraph::graph::SourceRef;
use ideagraph::index::{Embedder, InMemoryVectorStore, IndexError, SemanticIndex};
use ideagraph::{ExtractionCandidate, GraphConfig, IdeaGraph, OpenStore, SqliteStore};
use std::sync::Arc;

/// Resolver settings that keep retry tests fast
pub fn fast_resolver() -> ResolverConfig {
    ResolverConfig {
        backoff_base_ms: 1,
        backoff_max_ms: 4,
        ..ResolverConfig::default()
    }
}

/// In-memory graph with the default taxonomy and a working index
pub async fn graph() -> IdeaGraph {
    let config = GraphConfig {
        resolver: fast_resolver(),
        ..GraphConfig::in_memory()
    };
    IdeaGraph::open(config).await.expect("open in-memory graph")
}

/// Embedder whose backend never answers
pub struct OfflineEmbedder;

impl Embedder for OfflineEmbedder {
    fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        Err(IndexError::Embedding("embedding service unreachable".into()))
    }

    fn dimensions(&self) -> usize {
        8
    }
}

/// In-memory graph whose semantic index cannot embed anything
pub fn graph_with_index_down() -> IdeaGraph {
    let store = Arc::new(SqliteStore::open_in_memory().expect("open store"));
    let index = SemanticIndex::spawn(
        Arc::new(OfflineEmbedder),
        Arc::new(InMemoryVectorStore::new()),
        8,
    );
    let config = GraphConfig {
        resolver: fast_resolver(),
        ..GraphConfig::in_memory()
    };
    IdeaGraph::with_parts(store, Some(index), config).expect("assemble graph")
}

/// Candidate from an email with the given message id
pub fn from_email(name: &str, node_type: &str, confidence: f32, message: &str) -> ExtractionCandidate {
    ExtractionCandidate::new(name, node_type, confidence, SourceRef::new("email", message))
}
