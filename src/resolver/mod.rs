//! Entity resolution: turns extraction candidates into create-or-merge
//! decisions against the graph store.
//!
//! Entities merge on exact (node_type, normalized name) matches; near
//! matches are flagged for review. Relations look both names up, retry with
//! bounded backoff and are dead-lettered when they still do not resolve.

mod batch;
mod candidate;
mod entity;
mod normalize;
mod relation;
mod review;

pub use batch::{BatchReport, CandidateKind, CandidateOutcome, OutcomeStatus, SourceBatch};
pub use candidate::{ExtractionCandidate, RelationCandidate};
pub use entity::{EntityResolver, Resolution, ResolutionOutcome};
pub use normalize::{
    name_similarity, normalize_name, similarity_length, similarity_length_window,
};
pub use relation::{RelationResolution, RetryReport};
pub use review::{DeadLetter, DuplicateFlag};
