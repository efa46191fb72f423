//! Semantic similarity index over node and insight text

mod embedder;
mod sqlite_vec;
mod vector;
mod worker;

pub use embedder::{Embedder, HashingEmbedder};
pub use vector::{cosine_similarity, InMemoryVectorStore, VectorStore};
pub use worker::{IndexTask, SemanticIndex};

#[cfg(feature = "embeddings")]
pub use embedder::FastEmbedEmbedder;
#[cfg(feature = "embeddings")]
pub use sqlite_vec::SqliteVecStore;

use crate::config::{EmbedderBackend, IndexConfig, VectorBackend};
use crate::error::{GraphError, GraphResult};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors from embedding or vector search
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("embedding returned no results")]
    EmptyResult,

    #[error("vector store error: {0}")]
    Store(String),

    #[error("semantic index unavailable: {0}")]
    Unavailable(String),
}

impl From<IndexError> for GraphError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::Unavailable(reason) => Self::SemanticUnavailable(reason),
            other => Self::SemanticUnavailable(other.to_string()),
        }
    }
}

/// Build the configured embedder and vector store and start the worker.
///
/// `database` locates the default sqlite-vec file. Backends compiled out
/// report `SemanticUnavailable`.
pub fn open_index(config: &IndexConfig, database: Option<&Path>) -> GraphResult<SemanticIndex> {
    let embedder = open_embedder(config)?;
    let vectors = open_vectors(config, database, embedder.dimensions())?;
    tracing::info!(
        embedder = ?config.embedder,
        vectors = ?config.vectors,
        dimensions = embedder.dimensions(),
        "semantic index ready"
    );
    Ok(SemanticIndex::spawn(embedder, vectors, config.queue_capacity))
}

fn open_embedder(config: &IndexConfig) -> Result<Arc<dyn Embedder>, IndexError> {
    match config.embedder {
        EmbedderBackend::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        #[cfg(feature = "embeddings")]
        EmbedderBackend::Fastembed => Ok(Arc::new(FastEmbedEmbedder::default_model()?)),
        #[cfg(not(feature = "embeddings"))]
        EmbedderBackend::Fastembed => Err(compiled_out("fastembed")),
    }
}

fn open_vectors(
    config: &IndexConfig,
    database: Option<&Path>,
    dimensions: usize,
) -> Result<Arc<dyn VectorStore>, IndexError> {
    match config.vectors {
        VectorBackend::Memory => Ok(Arc::new(InMemoryVectorStore::new())),
        #[cfg(feature = "embeddings")]
        VectorBackend::SqliteVec => {
            let store = match config.vector_path_for(database) {
                Some(path) => SqliteVecStore::open(&path, dimensions)?,
                None => SqliteVecStore::open_in_memory(dimensions)?,
            };
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "embeddings"))]
        VectorBackend::SqliteVec => {
            let _ = (database, dimensions);
            Err(compiled_out("sqlite_vec"))
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn compiled_out(backend: &str) -> IndexError {
    IndexError::Unavailable(format!("{} backend needs the `embeddings` feature", backend))
}
