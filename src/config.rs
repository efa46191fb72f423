//! Engine configuration, loadable from YAML
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration that runs against a throwaway database.

use crate::error::{GraphError, GraphResult};
use crate::query::RankWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for `IdeaGraph`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// SQLite database file; `None` opens a throwaway store removed on drop
    pub database: Option<PathBuf>,
    pub resolver: ResolverConfig,
    pub query: QueryConfig,
    pub index: IndexConfig,
    /// Insert the default node and edge types on open
    pub seed_taxonomy: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            database: None,
            resolver: ResolverConfig::default(),
            query: QueryConfig::default(),
            index: IndexConfig::default(),
            seed_taxonomy: true,
        }
    }
}

impl GraphConfig {
    /// In-memory configuration with defaults everywhere else
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database = Some(path.into());
        self
    }

    pub fn from_yaml(text: &str) -> GraphResult<Self> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| GraphError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> GraphResult<()> {
        let r = &self.resolver;
        if !(0.0..=1.0).contains(&r.fuzzy_threshold) {
            return Err(GraphError::Config(format!(
                "resolver.fuzzy_threshold must be within 0..=1, got {}",
                r.fuzzy_threshold
            )));
        }
        if r.max_attempts == 0 {
            return Err(GraphError::Config("resolver.max_attempts must be at least 1".into()));
        }
        if self.index.dimensions == 0 {
            return Err(GraphError::Config("index.dimensions must be at least 1".into()));
        }
        if !cfg!(feature = "embeddings") {
            if self.index.embedder == EmbedderBackend::Fastembed {
                return Err(GraphError::Config(
                    "index.embedder fastembed needs the `embeddings` feature".into(),
                ));
            }
            if self.index.vectors == VectorBackend::SqliteVec {
                return Err(GraphError::Config(
                    "index.vectors sqlite_vec needs the `embeddings` feature".into(),
                ));
            }
        }
        if self.query.traversal_visit_cap == 0 {
            return Err(GraphError::Config("query.traversal_visit_cap must be at least 1".into()));
        }
        Ok(())
    }
}

/// Entity and relation resolution settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Name similarity at or above which a new node is flagged as a possible duplicate
    pub fuzzy_threshold: f32,
    pub fuzzy_enabled: bool,
    /// Resolution attempts for a relation before it is dead-lettered
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.92,
            fuzzy_enabled: true,
            max_attempts: 3,
            backoff_base_ms: 50,
            backoff_max_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub semantic_top_k: usize,
    pub traversal_depth: usize,
    pub traversal_visit_cap: usize,
    pub keyword_limit: usize,
    pub weights: RankWeights,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: 20,
            traversal_depth: 2,
            traversal_visit_cap: 500,
            keyword_limit: 50,
            weights: RankWeights::default(),
        }
    }
}

/// Which model turns text into vectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedderBackend {
    /// Feature hashing over tokens; no model download
    #[default]
    Hashing,
    /// ONNX text model via fastembed
    Fastembed,
}

/// Where vectors are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// Rebuilt from the graph on every open
    #[default]
    Memory,
    /// Persistent sqlite-vec file
    SqliteVec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub embedder: EmbedderBackend,
    pub vectors: VectorBackend,
    /// sqlite-vec file; defaults to `<database>.vectors.db`, in memory without a database
    pub vector_path: Option<PathBuf>,
    /// Vector length for the hashing embedder
    pub dimensions: usize,
    /// Pending index tasks before writers wait
    pub queue_capacity: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderBackend::default(),
            vectors: VectorBackend::default(),
            vector_path: None,
            dimensions: 256,
            queue_capacity: 1024,
        }
    }
}

impl IndexConfig {
    /// The sqlite-vec file for a graph stored at `database`
    pub fn vector_path_for(&self, database: Option<&Path>) -> Option<PathBuf> {
        self.vector_path
            .clone()
            .or_else(|| database.map(|db| db.with_extension("vectors.db")))
    }
}
