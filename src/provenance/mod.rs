//! Provenance tracking: an append-only log linking graph entities to the
//! source fragments that justified them.

mod tracker;
mod types;

pub use tracker::ProvenanceTracker;
pub use types::ProvenanceRecord;
