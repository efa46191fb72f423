//! Storage backends
//!
//! The `GraphStore` trait is the single owner of persisted mutation. The
//! primary implementation is `SqliteStore`.

mod neighbors;
mod sqlite;
mod traits;

pub use neighbors::{load_entity, GraphEntity, Neighbor, Neighbors};
pub use sqlite::SqliteStore;
pub use traits::{
    CascadeReport, EdgeSelector, EdgeUpsertOutcome, FuzzyWindow, GraphStore, NodeFilter,
    OpenStore, StorageError, StorageResult, TextStats,
};
