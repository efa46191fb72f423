//! Self-describing graph dump for backup and migration

use crate::error::{GraphError, GraphResult};
use crate::graph::{Edge, Endpoint, Insight, KnowledgeGap, Node};
use crate::provenance::ProvenanceRecord;
use crate::storage::{GraphStore, NodeFilter};
use crate::taxonomy::{EdgeType, NodeType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

/// Current dump format version
pub const EXPORT_VERSION: u32 = 1;

/// Complete dump of the graph, taxonomy included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphExport {
    pub version: u32,
    pub exported_at: DateTime<Utc>,
    pub node_types: Vec<NodeType>,
    pub edge_types: Vec<EdgeType>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub insights: Vec<Insight>,
    pub gaps: Vec<KnowledgeGap>,
    pub provenance: Vec<ProvenanceRecord>,
}

/// Restricts what `export_graph` writes.
///
/// Edges are kept only when both endpoints are part of the dump, so a
/// filtered export is still self-consistent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExportFilter {
    /// Only nodes of these types; empty means all
    #[serde(default)]
    pub node_types: Vec<String>,
    /// Only nodes updated at or after this instant
    #[serde(default)]
    pub updated_since: Option<DateTime<Utc>>,
    /// Leave insights and gaps out of the dump
    #[serde(default)]
    pub nodes_only: bool,
}

/// How many rows a restore wrote, per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreCounts {
    pub node_types: usize,
    pub edge_types: usize,
    pub nodes: usize,
    pub edges: usize,
    pub insights: usize,
    pub gaps: usize,
    pub provenance: usize,
}

/// Dump the graph as of one snapshot, applying `filter`
pub fn export_graph(store: &dyn GraphStore, filter: &ExportFilter) -> GraphResult<GraphExport> {
    let snapshot = store.snapshot()?;
    let store = snapshot.as_ref();

    let mut nodes = Vec::new();
    if filter.node_types.is_empty() {
        nodes = store.find_nodes(&node_filter(None, filter))?;
    } else {
        let node_types: BTreeSet<&String> = filter.node_types.iter().collect();
        for node_type in node_types {
            nodes.extend(store.find_nodes(&node_filter(Some(node_type), filter))?);
        }
    }

    let (insights, gaps) = if filter.nodes_only {
        (Vec::new(), Vec::new())
    } else {
        (store.list_insights(None)?, store.list_gaps(None)?)
    };

    let mut present: HashSet<Uuid> = nodes.iter().map(|n| *n.id.as_uuid()).collect();
    present.extend(insights.iter().map(|i| *i.id.as_uuid()));
    let included = |e: &Endpoint| present.contains(&e.uuid());

    let edges: Vec<Edge> = store
        .list_edges(&[])?
        .into_iter()
        .filter(|e| included(&e.source) && included(&e.target))
        .collect();

    let provenance = store
        .list_all_provenance()?
        .into_iter()
        .filter(|p| present.contains(&p.entity_id))
        .collect();

    let dump = GraphExport {
        version: EXPORT_VERSION,
        exported_at: Utc::now(),
        node_types: store.list_node_types()?,
        edge_types: store.list_edge_types()?,
        nodes,
        edges,
        insights,
        gaps,
        provenance,
    };
    tracing::info!(
        nodes = dump.nodes.len(),
        edges = dump.edges.len(),
        insights = dump.insights.len(),
        gaps = dump.gaps.len(),
        "exported graph"
    );
    Ok(dump)
}

/// Restore a dump, upserting every row by id
pub fn import_graph(store: &dyn GraphStore, dump: &GraphExport) -> GraphResult<RestoreCounts> {
    if dump.version > EXPORT_VERSION {
        return Err(GraphError::validation(
            "version",
            format!("dump version {} is newer than supported {}", dump.version, EXPORT_VERSION),
        ));
    }
    let counts = store.restore(dump)?;
    tracing::info!(
        nodes = counts.nodes,
        edges = counts.edges,
        provenance = counts.provenance,
        "imported graph"
    );
    Ok(counts)
}

fn node_filter(node_type: Option<&String>, filter: &ExportFilter) -> NodeFilter {
    let mut f = NodeFilter::new();
    if let Some(t) = node_type {
        f = f.with_type(t.clone());
    }
    if let Some(since) = filter.updated_since {
        f = f.updated_since(since);
    }
    f
}
