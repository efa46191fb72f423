//! Crate-level error taxonomy

use crate::storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the graph engine.
///
/// Re-ingesting a known entity is a merge, not an error; it never appears here.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Malformed candidate or argument, rejected before any write
    #[error("validation error on `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("type already registered: {0}")]
    DuplicateType(String),

    #[error("unresolved reference: no entity named '{name}'{}", type_hint.as_ref().map(|t| format!(" of type '{}'", t)).unwrap_or_default())]
    UnresolvedReference {
        name: String,
        type_hint: Option<String>,
    },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("semantic index unavailable: {0}")]
    SemanticUnavailable(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(StorageError),

    /// A background task panicked or was cancelled
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::validation(field, "missing required field")
    }
}

impl From<StorageError> for GraphError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { kind, id } => Self::NotFound { kind, id },
            StorageError::DuplicateType(name) => Self::DuplicateType(name),
            StorageError::InvalidTransition { from, to, .. } => Self::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            },
            StorageError::Immutable(field) => {
                Self::validation(field, "cannot change without administrative override")
            }
            other => Self::Storage(other),
        }
    }
}

impl From<tokio::task::JoinError> for GraphError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Result type for engine operations
pub type GraphResult<T> = Result<T, GraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GapStatus;

    #[test]
    fn storage_domain_errors_are_lifted() {
        let e: GraphError = StorageError::DuplicateType("idea".into()).into();
        assert!(matches!(e, GraphError::DuplicateType(ref n) if n == "idea"));

        let e: GraphError = StorageError::InvalidTransition {
            id: "g1".into(),
            from: GapStatus::Resolved,
            to: GapStatus::Open,
        }
        .into();
        assert!(matches!(e, GraphError::InvalidTransition { ref from, ref to } if from == "resolved" && to == "open"));
    }

    #[test]
    fn unresolved_reference_mentions_type_hint() {
        let e = GraphError::UnresolvedReference {
            name: "LangGraph".into(),
            type_hint: Some("idea".into()),
        };
        assert_eq!(
            e.to_string(),
            "unresolved reference: no entity named 'LangGraph' of type 'idea'"
        );
    }
}
