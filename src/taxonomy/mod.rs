//! Taxonomy registry: runtime-extensible node and edge types.
//!
//! Types are soft references. Registering a type is never a precondition
//! for using its name on a node or edge; the registry exists for
//! classification, display metadata and default ranking.

mod types;

pub use types::{
    default_edge_types, default_node_types, AttributeSchema, BuiltinNodeType, Directionality,
    EdgeType, NodeType, TypeDefinition,
};

use crate::error::GraphResult;
use crate::graph::EdgeUpsert;
use crate::storage::{GraphStore, StorageError};
use std::sync::Arc;

/// Registry of node and edge type definitions
#[derive(Clone)]
pub struct TaxonomyRegistry {
    store: Arc<dyn GraphStore>,
}

impl TaxonomyRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Fails with `DuplicateType` if the name is taken
    pub fn register_node_type(&self, node_type: NodeType) -> GraphResult<()> {
        self.store.insert_node_type(&node_type)?;
        tracing::info!(name = %node_type.name, "registered node type");
        Ok(())
    }

    /// Fails with `DuplicateType` if the name is taken
    pub fn register_edge_type(&self, edge_type: EdgeType) -> GraphResult<()> {
        self.store.insert_edge_type(&edge_type)?;
        tracing::info!(
            name = %edge_type.name,
            directionality = edge_type.directionality.as_str(),
            "registered edge type"
        );
        Ok(())
    }

    /// Node types ordered by name. Each call re-reads the store.
    pub fn list_node_types(&self) -> GraphResult<Vec<NodeType>> {
        Ok(self.store.list_node_types()?)
    }

    /// Edge types ordered by name. Each call re-reads the store.
    pub fn list_edge_types(&self) -> GraphResult<Vec<EdgeType>> {
        Ok(self.store.list_edge_types()?)
    }

    pub fn get_node_type(&self, name: &str) -> GraphResult<Option<NodeType>> {
        Ok(self.store.get_node_type(name)?)
    }

    pub fn get_edge_type(&self, name: &str) -> GraphResult<Option<EdgeType>> {
        Ok(self.store.get_edge_type(name)?)
    }

    /// Look a name up in both tables, node types first
    pub fn get_type(&self, name: &str) -> GraphResult<Option<TypeDefinition>> {
        if let Some(node_type) = self.store.get_node_type(name)? {
            return Ok(Some(TypeDefinition::Node(node_type)));
        }
        Ok(self.store.get_edge_type(name)?.map(TypeDefinition::Edge))
    }

    /// Soft validation: logs a warning for unknown node types and reports it
    pub fn check_node_type(&self, name: &str) -> GraphResult<bool> {
        let known = self.store.get_node_type(name)?.is_some();
        if !known {
            tracing::warn!(node_type = name, "node type is not registered in the taxonomy");
        }
        Ok(known)
    }

    /// Soft validation for edge types, as `check_node_type`
    pub fn check_edge_type(&self, name: &str) -> GraphResult<bool> {
        let known = self.store.get_edge_type(name)?.is_some();
        if !known {
            tracing::warn!(edge_type = name, "edge type is not registered in the taxonomy");
        }
        Ok(known)
    }

    /// Directionality of an edge type; unregistered types count as directed
    pub fn directionality(&self, edge_type: &str) -> GraphResult<Directionality> {
        Ok(self
            .store
            .get_edge_type(edge_type)?
            .map(|t| t.directionality)
            .unwrap_or_default())
    }

    /// Soft-check an edge's type and put undirected endpoints in canonical order.
    ///
    /// Undirected edges are stored with the lower endpoint id as source so
    /// `A-B` and `B-A` address the same triple. Returns whether the type is
    /// registered.
    pub fn prepare_edge(&self, upsert: &mut EdgeUpsert) -> GraphResult<bool> {
        let edge_type = self.store.get_edge_type(&upsert.edge_type)?;
        match edge_type {
            None => {
                tracing::warn!(edge_type = %upsert.edge_type, "edge type is not registered in the taxonomy");
                Ok(false)
            }
            Some(t) => {
                if t.directionality == Directionality::Undirected
                    && upsert.target.uuid() < upsert.source.uuid()
                {
                    std::mem::swap(&mut upsert.source, &mut upsert.target);
                }
                Ok(true)
            }
        }
    }

    /// Names of every registered undirected edge type
    pub fn undirected_edge_types(&self) -> GraphResult<Vec<String>> {
        Ok(self
            .store
            .list_edge_types()?
            .into_iter()
            .filter(|t| t.directionality == Directionality::Undirected)
            .map(|t| t.name)
            .collect())
    }

    /// Insert the default types, skipping names that already exist.
    ///
    /// Returns how many node and edge types were added.
    pub fn seed_defaults(&self) -> GraphResult<(usize, usize)> {
        let mut nodes = 0;
        for node_type in default_node_types() {
            match self.store.insert_node_type(&node_type) {
                Ok(()) => nodes += 1,
                Err(StorageError::DuplicateType(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let mut edges = 0;
        for edge_type in default_edge_types() {
            match self.store.insert_edge_type(&edge_type) {
                Ok(()) => edges += 1,
                Err(StorageError::DuplicateType(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::debug!(nodes, edges, "seeded default taxonomy");
        Ok((nodes, edges))
    }
}
