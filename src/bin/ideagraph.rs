//! ideagraph CLI: ingest extraction batches and query the graph.
//!
//! Usage:
//!   ideagraph ingest <batch.json> [--db path]
//!   ideagraph query <request.json> | query keyword <text> | ...
//!   ideagraph export [--node-type t]... > dump.json
//!   ideagraph import <dump.json>
//!   ideagraph taxonomy list|add-node-type|add-edge-type
//!   ideagraph gaps list [--status s]
//!   ideagraph dead-letters list|retry
//!
//! `--embedder fastembed` and `--vectors sqlite-vec` need a build with the
//! `embeddings` feature.
//!
//! Results are printed as pretty JSON on stdout; logs go to stderr
//! (`IDEAGRAPH_LOG`, default `info`).

use clap::{Parser, Subcommand, ValueEnum};
use ideagraph::graph::{GapStatus, NodeId};
use ideagraph::query::{
    CombinedParams, Direction, EntityParams, KeywordParams, SemanticParams, TraversalParams,
};
use ideagraph::config::{EmbedderBackend, VectorBackend};
use ideagraph::taxonomy::{EdgeType, NodeType};
use ideagraph::{ExportFilter, GraphConfig, GraphError, GraphExport, GraphResult, IdeaGraph, QueryRequest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ideagraph",
    version,
    about = "Typed knowledge graph for idea ingestion and retrieval"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Text embedding backend (overrides the config file)
    #[arg(long, global = true, value_enum)]
    embedder: Option<EmbedderArg>,
    /// Vector storage backend (overrides the config file)
    #[arg(long, global = true, value_enum)]
    vectors: Option<VectorsArg>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one source document's extraction batch (JSON)
    Ingest {
        /// File with `{"entities": [...], "relations": [...]}`
        path: PathBuf,
    },
    /// Run a query, from a request file or a mode subcommand
    #[command(args_conflicts_with_subcommands = true)]
    Query {
        /// File with `{"mode": ..., "parameters": {...}}`
        request: Option<PathBuf>,
        #[command(subcommand)]
        mode: Option<QueryMode>,
    },
    /// Dump the graph as JSON
    Export {
        /// Only nodes of this type (repeatable)
        #[arg(long = "node-type")]
        node_types: Vec<String>,
        /// Leave insights and gaps out
        #[arg(long)]
        nodes_only: bool,
    },
    /// Restore a JSON dump, upserting by id
    Import { path: PathBuf },
    /// Manage node and edge types
    Taxonomy {
        #[command(subcommand)]
        action: TaxonomyAction,
    },
    /// Inspect knowledge gaps
    Gaps {
        #[command(subcommand)]
        action: GapsAction,
    },
    /// Inspect or retry relations that could not be resolved
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterAction,
    },
}

#[derive(Subcommand)]
enum QueryMode {
    /// Token match over names, titles and descriptions
    Keyword {
        text: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Normalized-name lookup with the one-hop neighborhood
    Entity {
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Nearest neighbors in the embedding index
    Semantic {
        text: String,
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Breadth-first expansion from a seed node
    Traverse {
        seed: NodeId,
        #[arg(long)]
        depth: Option<usize>,
        /// Follow only this edge type (repeatable)
        #[arg(long = "edge-type")]
        edge_types: Vec<String>,
        #[arg(long, value_enum, default_value_t = DirectionArg::Outgoing)]
        direction: DirectionArg,
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Keyword, semantic and entity legs merged and re-ranked
    Combined {
        text: String,
        #[arg(long = "type")]
        node_type: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderArg {
    Hashing,
    Fastembed,
}

impl From<EmbedderArg> for EmbedderBackend {
    fn from(arg: EmbedderArg) -> Self {
        match arg {
            EmbedderArg::Hashing => EmbedderBackend::Hashing,
            EmbedderArg::Fastembed => EmbedderBackend::Fastembed,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum VectorsArg {
    Memory,
    SqliteVec,
}

impl From<VectorsArg> for VectorBackend {
    fn from(arg: VectorsArg) -> Self {
        match arg {
            VectorsArg::Memory => VectorBackend::Memory,
            VectorsArg::SqliteVec => VectorBackend::SqliteVec,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Outgoing,
    Incoming,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Outgoing => Direction::Outgoing,
            DirectionArg::Incoming => Direction::Incoming,
            DirectionArg::Both => Direction::Both,
        }
    }
}

#[derive(Subcommand)]
enum TaxonomyAction {
    /// List node and edge types
    List,
    /// Register a node type
    AddNodeType {
        name: String,
        #[arg(long, default_value = "#9ca3af")]
        color: String,
        #[arg(long, default_value = "")]
        definition: String,
        #[arg(long)]
        example: Option<String>,
    },
    /// Register an edge type
    AddEdgeType {
        name: String,
        #[arg(long, default_value = "#9ca3af")]
        color: String,
        #[arg(long, default_value = "")]
        definition: String,
        /// A-B and B-A are the same edge
        #[arg(long)]
        undirected: bool,
    },
}

#[derive(Subcommand)]
enum GapsAction {
    /// List gaps, optionally by status
    List {
        #[arg(long)]
        status: Option<GapStatus>,
    },
}

#[derive(Subcommand)]
enum DeadLetterAction {
    List,
    /// Re-run resolution for every dead letter
    Retry,
}

/// Get the default database path (~/.local/share/ideagraph/ideagraph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("ideagraph").join("ideagraph.db")
}

fn load_config(cli: &Cli) -> GraphResult<GraphConfig> {
    let mut config = match &cli.config {
        Some(path) => GraphConfig::load(path)?,
        None => GraphConfig::default(),
    };
    if let Some(db) = &cli.db {
        config.database = Some(db.clone());
    } else if config.database.is_none() {
        config.database = Some(default_db_path());
    }
    if let Some(embedder) = cli.embedder {
        config.index.embedder = embedder.into();
    }
    if let Some(vectors) = cli.vectors {
        config.index.vectors = vectors.into();
    }
    config.validate()?;
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> GraphResult<T> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        GraphError::validation("path", format!("cannot read {}: {}", path.display(), e))
    })?;
    Ok(serde_json::from_str(&text)?)
}

fn print_json<T: Serialize>(value: &T) -> GraphResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn query_request(mode: QueryMode) -> QueryRequest {
    match mode {
        QueryMode::Keyword { text, limit } => QueryRequest::Keyword(KeywordParams { text, limit }),
        QueryMode::Entity {
            name,
            node_type,
            limit,
        } => QueryRequest::Entity(EntityParams {
            name,
            node_type,
            limit,
        }),
        QueryMode::Semantic { text, top_k } => QueryRequest::Semantic(SemanticParams { text, top_k }),
        QueryMode::Traverse {
            seed,
            depth,
            edge_types,
            direction,
            timeout_ms,
        } => QueryRequest::Traversal(TraversalParams {
            seed,
            depth,
            edge_types,
            direction: direction.into(),
            visit_cap: None,
            timeout_ms,
        }),
        QueryMode::Combined {
            text,
            node_type,
            limit,
        } => QueryRequest::Combined(CombinedParams {
            text,
            node_type,
            limit,
            weights: None,
        }),
    }
}

async fn run(cli: Cli) -> GraphResult<()> {
    let config = load_config(&cli)?;
    let graph = IdeaGraph::open(config).await?;

    match cli.command {
        Commands::Ingest { path } => {
            let value: serde_json::Value = read_json(&path)?;
            let report = graph.ingest_json(&value).await?;
            graph.flush_index().await?;
            print_json(&report)
        }
        Commands::Query { request, mode } => {
            let request = match (request, mode) {
                (Some(path), _) => read_json(&path)?,
                (None, Some(mode)) => query_request(mode),
                (None, None) => {
                    return Err(GraphError::validation(
                        "query",
                        "give a request file or a mode subcommand",
                    ))
                }
            };
            graph.flush_index().await?;
            print_json(&graph.query(request).await?)
        }
        Commands::Export {
            node_types,
            nodes_only,
        } => {
            let filter = ExportFilter {
                node_types,
                updated_since: None,
                nodes_only,
            };
            print_json(&graph.export(&filter)?)
        }
        Commands::Import { path } => {
            let dump: GraphExport = read_json(&path)?;
            print_json(&graph.import(&dump).await?)
        }
        Commands::Taxonomy { action } => match action {
            TaxonomyAction::List => print_json(&serde_json::json!({
                "node_types": graph.list_node_types()?,
                "edge_types": graph.list_edge_types()?,
            })),
            TaxonomyAction::AddNodeType {
                name,
                color,
                definition,
                example,
            } => {
                let mut node_type = NodeType::new(name, color, definition);
                if let Some(example) = example {
                    node_type = node_type.with_example(example);
                }
                graph.register_node_type(node_type.clone())?;
                print_json(&node_type)
            }
            TaxonomyAction::AddEdgeType {
                name,
                color,
                definition,
                undirected,
            } => {
                let mut edge_type = EdgeType::new(name, color, definition);
                if undirected {
                    edge_type = edge_type.undirected();
                }
                graph.register_edge_type(edge_type.clone())?;
                print_json(&edge_type)
            }
        },
        Commands::Gaps { action } => match action {
            GapsAction::List { status } => print_json(&graph.list_gaps(status)?),
        },
        Commands::DeadLetters { action } => match action {
            DeadLetterAction::List => print_json(&graph.list_dead_letters()?),
            DeadLetterAction::Retry => {
                let report = graph.retry_dead_letters()?;
                print_json(&serde_json::json!({
                    "resolved": report.resolved,
                    "still_pending": report.still_pending,
                }))
            }
        },
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("IDEAGRAPH_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
