//! Query engine for ideagraph
//!
//! Five retrieval modes over the graph store and semantic index: keyword,
//! entity, semantic, traversal and a combined mode that runs the first
//! three concurrently and re-ranks the merged result.

mod cancel;
mod combined;
mod engine;
mod entity;
mod keyword;
mod semantic;
mod text;
mod traverse;
mod types;

pub use cancel::{CancellationToken, StopSignal};
pub use combined::merge_legs;
pub use engine::QueryEngine;
pub use entity::{entity_lookup, EntityHits};
pub use keyword::{keyword_search, KeywordHits};
pub use semantic::{semantic_search, SemanticHits, DEFAULT_TOP_K};
pub use text::tokenize;
pub use traverse::{TraversalResult, TraverseQuery, Visit};
pub use types::{
    CombinedParams, Direction, EntityParams, Facets, KeywordParams, QueryFlags, QueryRequest,
    QueryResponse, RankWeights, Scored, SemanticParams, Timing, TraversalParams,
};
