//! SQLite storage backend

use super::traits::{
    CascadeReport, EdgeSelector, EdgeUpsertOutcome, FuzzyWindow, GraphStore, NodeFilter,
    OpenStore, StorageError, StorageResult, TextStats,
};
use crate::export::{GraphExport, RestoreCounts};
use crate::graph::{
    Edge, EdgeId, EdgeUpsert, Endpoint, EntityKind, GapId, GapStatus, Insight, InsightId,
    KnowledgeGap, Node, NodeId, NodeUpdate, SourceRef,
};
use crate::provenance::ProvenanceRecord;
use crate::query::{tokenize, Direction};
use crate::resolver::{normalize_name, similarity_length, DeadLetter, DuplicateFlag};
use crate::taxonomy::{EdgeType, NodeType};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Params, Row, ToSql, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
/// Snapshot connections kept open for reuse
const MAX_IDLE_SNAPSHOTS: usize = 4;

/// SQLite-backed graph store
///
/// One writer connection behind a mutex and a separate reader connection.
/// With WAL enabled, reads see the last committed state and never wait on
/// an in-flight write. `snapshot` pins a further connection inside one read
/// transaction, so a multi-statement request sees a single committed state.
pub struct SqliteStore {
    shared: Arc<Connections>,
    /// Set on snapshot views; every read goes through this connection
    pinned: Option<Arc<PinnedReader>>,
}

struct Connections {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    idle: Mutex<Vec<Connection>>,
    path: PathBuf,
    // Declared last so every connection above is closed before removal
    _scratch: Option<ScratchFile>,
}

impl Connections {
    fn connect(&self) -> StorageResult<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }
}

/// Database file owned by a throwaway store, removed on drop
struct ScratchFile(PathBuf);

impl Drop for ScratchFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.0.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A connection held inside one read transaction
struct PinnedReader {
    conn: Option<Mutex<Connection>>,
    shared: Arc<Connections>,
}

impl Drop for PinnedReader {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take().and_then(|m| m.into_inner().ok()) else {
            return;
        };
        if conn.execute_batch("COMMIT").is_err() {
            return;
        }
        if let Ok(mut idle) = self.shared.idle.lock() {
            if idle.len() < MAX_IDLE_SNAPSHOTS {
                idle.push(conn);
            }
        }
    }
}

/// Lowercased tokens of every field, each preceded by a space.
///
/// `LIKE '% term%'` against this finds tokens starting with `term` without
/// relying on SQLite's ASCII-only case folding.
fn search_text(fields: &[&str]) -> String {
    let mut out = String::new();
    for field in fields {
        for token in tokenize(field) {
            out.push(' ');
            out.push_str(&token);
        }
    }
    out
}

fn sql_len(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// `search_text LIKE ?a OR search_text LIKE ?b ...`, numbering from `first`
fn any_term(count: usize, first: usize) -> String {
    let clauses: Vec<String> = (first..first + count)
        .map(|i| format!("search_text LIKE ?{}", i))
        .collect();
    format!("({})", clauses.join(" OR "))
}

fn term_patterns(terms: &[String]) -> Vec<String> {
    terms.iter().map(|t| format!("% {}%", t)).collect()
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS node_types (
                name TEXT PRIMARY KEY,
                color TEXT NOT NULL,
                definition TEXT NOT NULL,
                example TEXT NOT NULL,
                attribute_schema_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS edge_types (
                name TEXT PRIMARY KEY,
                color TEXT NOT NULL,
                definition TEXT NOT NULL,
                example TEXT NOT NULL,
                attribute_schema_json TEXT NOT NULL,
                directionality TEXT NOT NULL DEFAULT 'directed',
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL,
                name_length INTEGER NOT NULL,
                search_text TEXT NOT NULL,
                node_type TEXT NOT NULL,
                description TEXT NOT NULL,
                attributes_json TEXT NOT NULL,
                source_type TEXT,
                source_id TEXT,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Entity resolution looks nodes up by (type, normalized name)
            CREATE INDEX IF NOT EXISTS idx_nodes_type_name
                ON nodes(node_type, normalized_name);
            CREATE INDEX IF NOT EXISTS idx_nodes_name
                ON nodes(normalized_name);
            -- Fuzzy duplicate checks scan one type within a length window
            CREATE INDEX IF NOT EXISTS idx_nodes_type_length
                ON nodes(node_type, name_length);

            CREATE TABLE IF NOT EXISTS insights (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                normalized_title TEXT NOT NULL,
                search_text TEXT NOT NULL,
                description TEXT NOT NULL,
                is_validated INTEGER NOT NULL DEFAULT 0,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_insights_title
                ON insights(normalized_title);

            CREATE TABLE IF NOT EXISTS knowledge_gaps (
                id TEXT PRIMARY KEY,
                description TEXT NOT NULL,
                search_text TEXT NOT NULL,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Endpoints are nodes or insights; ids are globally unique so the
            -- triple constraint does not need the kind columns.
            CREATE TABLE IF NOT EXISTS edges (
                id TEXT PRIMARY KEY,
                source_kind TEXT NOT NULL,
                source_id TEXT NOT NULL,
                target_kind TEXT NOT NULL,
                target_id TEXT NOT NULL,
                edge_type TEXT NOT NULL,
                weight REAL NOT NULL,
                context TEXT NOT NULL,
                source_type TEXT,
                source_ref_id TEXT,
                confidence REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (source_id, target_id, edge_type)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);

            CREATE TABLE IF NOT EXISTS provenance (
                id TEXT PRIMARY KEY,
                entity_id TEXT NOT NULL,
                entity_kind TEXT NOT NULL,
                source_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                snippet TEXT NOT NULL,
                recorded_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_provenance_entity
                ON provenance(entity_id, recorded_at);

            CREATE TABLE IF NOT EXISTS dead_letters (
                id TEXT PRIMARY KEY,
                candidate_json TEXT NOT NULL,
                reason TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                last_attempt_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS duplicate_flags (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL,
                existing_node_id TEXT NOT NULL,
                similarity REAL NOT NULL,
                created_at TEXT NOT NULL
            );

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(())
    }

    fn open_at(path: PathBuf, scratch: Option<ScratchFile>) -> StorageResult<Self> {
        let conn = Connection::open(&path)?;
        Self::init_schema(&conn)?;

        let reader = Connection::open(&path)?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self {
            shared: Arc::new(Connections {
                writer: Mutex::new(conn),
                reader: Mutex::new(reader),
                idle: Mutex::new(Vec::new()),
                path,
                _scratch: scratch,
            }),
            pinned: None,
        })
    }

    fn writer(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        if self.pinned.is_some() {
            return Err(StorageError::ReadOnlySnapshot);
        }
        self.shared.writer.lock().map_err(|_| StorageError::Poisoned)
    }

    fn reader(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        let lock = match &self.pinned {
            Some(pinned) => pinned.conn.as_ref().ok_or(StorageError::Poisoned)?,
            None => &self.shared.reader,
        };
        lock.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Matching rows of one searchable table, keyset-paged by id
    fn text_page<R: StoredRow>(
        &self,
        table: &str,
        terms: &[String],
        after: Option<String>,
        limit: usize,
    ) -> StorageResult<Vec<R::Entity>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.reader()?;
        let mut params_vec: Vec<Box<dyn ToSql>> = term_patterns(terms)
            .into_iter()
            .map(|p| Box::new(p) as Box<dyn ToSql>)
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {} WHERE {}",
            R::COLUMNS,
            table,
            any_term(terms.len(), 1)
        );
        if let Some(after) = after {
            params_vec.push(Box::new(after));
            sql.push_str(&format!(" AND id > ?{}", params_vec.len()));
        }
        sql.push_str(&format!(" ORDER BY id LIMIT {}", limit));

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        query_all::<R, _>(&conn, &sql, params_refs.as_slice())
    }

    fn insert_node_row(conn: &Connection, node: &Node, replace: bool) -> StorageResult<usize> {
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO nodes (id, name, normalized_name, name_length, search_text, node_type, description,
                            attributes_json, source_type, source_id, confidence, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            verb
        );
        let normalized = normalize_name(&node.name);
        Ok(conn.execute(
            &sql,
            params![
                node.id.to_string(),
                node.name,
                normalized,
                sql_len(similarity_length(&normalized)),
                search_text(&[&node.name, &node.description]),
                node.node_type,
                node.description,
                serde_json::to_string(&node.attributes)?,
                node.source.as_ref().map(|s| s.source_type.clone()),
                node.source.as_ref().map(|s| s.source_id.clone()),
                node.confidence as f64,
                ts(&node.created_at),
                ts(&node.updated_at),
            ],
        )?)
    }

    fn insert_insight_row(conn: &Connection, insight: &Insight, replace: bool) -> StorageResult<usize> {
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO insights (id, title, normalized_title, search_text, description, is_validated,
                               created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            verb
        );
        Ok(conn.execute(
            &sql,
            params![
                insight.id.to_string(),
                insight.title,
                normalize_name(&insight.title),
                search_text(&[&insight.title, &insight.description]),
                insight.description,
                insight.is_validated,
                insight.created_by,
                ts(&insight.created_at),
                ts(&insight.updated_at),
            ],
        )?)
    }

    fn insert_gap_row(conn: &Connection, gap: &KnowledgeGap, replace: bool) -> StorageResult<usize> {
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO knowledge_gaps (id, description, search_text, status, priority, created_by,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            verb
        );
        Ok(conn.execute(
            &sql,
            params![
                gap.id.to_string(),
                gap.description,
                search_text(&[&gap.description]),
                gap.status.as_str(),
                gap.priority.as_str(),
                gap.created_by,
                ts(&gap.created_at),
                ts(&gap.updated_at),
            ],
        )?)
    }

    fn insert_provenance_row(
        conn: &Connection,
        record: &ProvenanceRecord,
        replace: bool,
    ) -> StorageResult<usize> {
        let verb = if replace { "INSERT OR REPLACE" } else { "INSERT" };
        let sql = format!(
            "{} INTO provenance (id, entity_id, entity_kind, source_type, source_id, snippet, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            verb
        );
        Ok(conn.execute(
            &sql,
            params![
                record.id.to_string(),
                record.entity_id.to_string(),
                record.entity_kind.as_str(),
                record.source_type,
                record.source_id,
                record.snippet,
                ts(&record.recorded_at),
            ],
        )?)
    }

    fn endpoint_exists(conn: &Connection, endpoint: &Endpoint) -> StorageResult<bool> {
        let sql = match endpoint.kind() {
            EntityKind::Node => "SELECT EXISTS(SELECT 1 FROM nodes WHERE id = ?1)",
            EntityKind::Insight => "SELECT EXISTS(SELECT 1 FROM insights WHERE id = ?1)",
        };
        Ok(conn.query_row(sql, params![endpoint.uuid().to_string()], |row| row.get(0))?)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open_at(path.as_ref().to_path_buf(), None)
    }

    /// A throwaway store, removed when the last handle drops.
    ///
    /// Backed by a scratch WAL file in the temp directory rather than a
    /// `:memory:` database, so reads and snapshots get their own
    /// connections exactly as with `open`.
    fn open_in_memory() -> StorageResult<Self> {
        let path = std::env::temp_dir().join(format!("ideagraph-{}.db", Uuid::new_v4()));
        Self::open_at(path.clone(), Some(ScratchFile(path)))
    }
}

impl GraphStore for SqliteStore {
    // === Taxonomy ===

    fn insert_node_type(&self, node_type: &NodeType) -> StorageResult<()> {
        let conn = self.writer()?;
        let rows = conn.execute(
            r#"
            INSERT INTO node_types (name, color, definition, example, attribute_schema_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(name) DO NOTHING
            "#,
            params![
                node_type.name,
                node_type.color,
                node_type.definition,
                node_type.example,
                serde_json::to_string(&node_type.attribute_schema)?,
                ts(&node_type.created_at),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::DuplicateType(node_type.name.clone()));
        }
        Ok(())
    }

    fn insert_edge_type(&self, edge_type: &EdgeType) -> StorageResult<()> {
        let conn = self.writer()?;
        let rows = conn.execute(
            r#"
            INSERT INTO edge_types (name, color, definition, example, attribute_schema_json,
                                    directionality, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(name) DO NOTHING
            "#,
            params![
                edge_type.name,
                edge_type.color,
                edge_type.definition,
                edge_type.example,
                serde_json::to_string(&edge_type.attribute_schema)?,
                edge_type.directionality.as_str(),
                ts(&edge_type.created_at),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::DuplicateType(edge_type.name.clone()));
        }
        Ok(())
    }

    fn list_node_types(&self) -> StorageResult<Vec<NodeType>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM node_types ORDER BY name", NodeTypeRow::COLUMNS);
        query_all::<NodeTypeRow, _>(&conn, &sql, [])
    }

    fn list_edge_types(&self) -> StorageResult<Vec<EdgeType>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM edge_types ORDER BY name", EdgeTypeRow::COLUMNS);
        query_all::<EdgeTypeRow, _>(&conn, &sql, [])
    }

    fn get_node_type(&self, name: &str) -> StorageResult<Option<NodeType>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM node_types WHERE name = ?1", NodeTypeRow::COLUMNS);
        query_one::<NodeTypeRow, _>(&conn, &sql, params![name])
    }

    fn get_edge_type(&self, name: &str) -> StorageResult<Option<EdgeType>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM edge_types WHERE name = ?1", EdgeTypeRow::COLUMNS);
        query_one::<EdgeTypeRow, _>(&conn, &sql, params![name])
    }

    // === Nodes ===

    fn create_node(&self, node: &Node) -> StorageResult<()> {
        let conn = self.writer()?;
        Self::insert_node_row(&conn, node, false)?;
        Ok(())
    }

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NodeRow::COLUMNS);
        query_one::<NodeRow, _>(&conn, &sql, params![id.to_string()])
    }

    fn update_node(&self, id: &NodeId, update: &NodeUpdate) -> StorageResult<Node> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let sql = format!("SELECT {} FROM nodes WHERE id = ?1", NodeRow::COLUMNS);
        let mut node = query_one::<NodeRow, _>(&tx, &sql, params![id.to_string()])?
            .ok_or_else(|| StorageError::not_found("node", id))?;

        if let Some(node_type) = &update.node_type {
            if node_type != &node.node_type {
                if !update.admin_override {
                    return Err(StorageError::Immutable("node_type"));
                }
                tracing::info!(node_id = %id, from = %node.node_type, to = %node_type, "node type overridden");
                node.node_type = node_type.clone();
            }
        }
        if let Some(name) = &update.name {
            node.name = name.clone();
        }
        if let Some(description) = &update.description {
            node.description = description.clone();
        }
        if let Some(attributes) = &update.attributes {
            node.attributes = attributes.clone();
        }
        if let Some(confidence) = update.confidence {
            node.confidence = confidence.clamp(0.0, 1.0);
        }
        node.updated_at = Utc::now();

        let normalized = normalize_name(&node.name);
        tx.execute(
            r#"
            UPDATE nodes SET
                name = ?2, normalized_name = ?3, node_type = ?4, description = ?5,
                attributes_json = ?6, confidence = ?7, updated_at = ?8,
                name_length = ?9, search_text = ?10
            WHERE id = ?1
            "#,
            params![
                id.to_string(),
                node.name,
                normalized,
                node.node_type,
                node.description,
                serde_json::to_string(&node.attributes)?,
                node.confidence as f64,
                ts(&node.updated_at),
                sql_len(similarity_length(&normalized)),
                search_text(&[&node.name, &node.description]),
            ],
        )?;
        tx.commit()?;
        Ok(node)
    }

    fn delete_node(&self, id: &NodeId) -> StorageResult<CascadeReport> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = id.to_string();

        let edge_ids: Vec<String> = {
            let mut stmt =
                tx.prepare("SELECT id FROM edges WHERE source_id = ?1 OR target_id = ?1 ORDER BY id")?;
            let ids = stmt
                .query_map(params![key], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            ids
        };
        tx.execute("DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1", params![key])?;
        let provenance_removed =
            tx.execute("DELETE FROM provenance WHERE entity_id = ?1", params![key])?;
        tx.execute(
            "DELETE FROM duplicate_flags WHERE node_id = ?1 OR existing_node_id = ?1",
            params![key],
        )?;
        let rows = tx.execute("DELETE FROM nodes WHERE id = ?1", params![key])?;
        if rows == 0 {
            // Dropping the transaction rolls back
            return Err(StorageError::not_found("node", id));
        }
        tx.commit()?;

        let report = CascadeReport {
            edges_removed: edge_ids
                .iter()
                .map(|s| parse_uuid(s).map(EdgeId::from_uuid))
                .collect::<StorageResult<_>>()?,
            provenance_removed,
        };
        tracing::info!(
            node_id = %id,
            edges = report.edges_removed.len(),
            provenance = report.provenance_removed,
            "deleted node with cascade"
        );
        Ok(report)
    }

    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let conn = self.reader()?;

        let mut sql = format!("SELECT {} FROM nodes WHERE 1 = 1", NodeRow::COLUMNS);
        let mut params_vec: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(ref node_type) = filter.node_type {
            params_vec.push(Box::new(node_type.clone()));
            sql.push_str(&format!(" AND node_type = ?{}", params_vec.len()));
        }
        if let Some(ref normalized) = filter.normalized_name {
            params_vec.push(Box::new(normalized.clone()));
            sql.push_str(&format!(" AND normalized_name = ?{}", params_vec.len()));
        }
        if let Some(since) = filter.updated_since {
            params_vec.push(Box::new(ts(&since)));
            sql.push_str(&format!(" AND updated_at >= ?{}", params_vec.len()));
        }
        sql.push_str(" ORDER BY created_at, id");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        query_all::<NodeRow, _>(&conn, &sql, params_refs.as_slice())
    }

    fn fuzzy_candidates(
        &self,
        window: &FuzzyWindow,
        after: Option<&NodeId>,
        limit: usize,
    ) -> StorageResult<Vec<Node>> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {} FROM nodes
             WHERE node_type = ?1 AND name_length BETWEEN ?2 AND ?3 AND id > ?4
             ORDER BY id LIMIT {}",
            NodeRow::COLUMNS,
            limit
        );
        query_all::<NodeRow, _>(
            &conn,
            &sql,
            params![
                window.node_type,
                sql_len(window.min_length),
                sql_len(window.max_length),
                after.map(|id| id.to_string()).unwrap_or_default(),
            ],
        )
    }

    // === Text search ===

    fn text_stats(&self, terms: &[String]) -> StorageResult<TextStats> {
        let conn = self.reader()?;
        let documents: i64 = conn.query_row(
            "SELECT (SELECT count(*) FROM nodes)
                  + (SELECT count(*) FROM insights)
                  + (SELECT count(*) FROM knowledge_gaps)",
            [],
            |row| row.get(0),
        )?;
        let mut frequencies = Vec::with_capacity(terms.len());
        for pattern in term_patterns(terms) {
            let df: i64 = conn.query_row(
                "SELECT (SELECT count(*) FROM nodes WHERE search_text LIKE ?1)
                      + (SELECT count(*) FROM insights WHERE search_text LIKE ?1)
                      + (SELECT count(*) FROM knowledge_gaps WHERE search_text LIKE ?1)",
                params![pattern],
                |row| row.get(0),
            )?;
            frequencies.push(df.max(0) as usize);
        }
        Ok(TextStats {
            documents: documents.max(0) as usize,
            frequencies,
        })
    }

    fn nodes_matching_text(
        &self,
        terms: &[String],
        after: Option<&NodeId>,
        limit: usize,
    ) -> StorageResult<Vec<Node>> {
        self.text_page::<NodeRow>("nodes", terms, after.map(|id| id.to_string()), limit)
    }

    fn insights_matching_text(
        &self,
        terms: &[String],
        after: Option<&InsightId>,
        limit: usize,
    ) -> StorageResult<Vec<Insight>> {
        self.text_page::<InsightRow>("insights", terms, after.map(|id| id.to_string()), limit)
    }

    fn gaps_matching_text(
        &self,
        terms: &[String],
        after: Option<&GapId>,
        limit: usize,
    ) -> StorageResult<Vec<KnowledgeGap>> {
        self.text_page::<GapRow>("knowledge_gaps", terms, after.map(|id| id.to_string()), limit)
    }

    // === Edges ===

    fn upsert_edge(&self, upsert: &EdgeUpsert) -> StorageResult<EdgeUpsertOutcome> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for endpoint in [&upsert.source, &upsert.target] {
            if !Self::endpoint_exists(&tx, endpoint)? {
                return Err(StorageError::not_found(endpoint.kind().as_str(), endpoint.uuid()));
            }
        }

        let new_id = EdgeId::new();
        let now = ts(&Utc::now());
        let sql = format!(
            r#"
            INSERT INTO edges (id, source_kind, source_id, target_kind, target_id, edge_type,
                               weight, context, source_type, source_ref_id, confidence,
                               created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
            ON CONFLICT(source_id, target_id, edge_type) DO UPDATE SET
                weight = excluded.weight,
                confidence = excluded.confidence,
                context = CASE WHEN excluded.context = '' THEN edges.context ELSE excluded.context END,
                source_type = COALESCE(excluded.source_type, edges.source_type),
                source_ref_id = COALESCE(excluded.source_ref_id, edges.source_ref_id),
                updated_at = excluded.updated_at
            RETURNING {}
            "#,
            EdgeRow::COLUMNS
        );
        let row = tx.query_row(
            &sql,
            params![
                new_id.to_string(),
                upsert.source.kind().as_str(),
                upsert.source.uuid().to_string(),
                upsert.target.kind().as_str(),
                upsert.target.uuid().to_string(),
                upsert.edge_type,
                upsert.weight as f64,
                upsert.context,
                upsert.source_ref.as_ref().map(|s| s.source_type.clone()),
                upsert.source_ref.as_ref().map(|s| s.source_id.clone()),
                upsert.confidence as f64,
                now,
            ],
            EdgeRow::read,
        )?;
        tx.commit()?;

        let edge = row.into_entity()?;
        let created = edge.id == new_id;
        tracing::debug!(edge_id = %edge.id, edge_type = %edge.edge_type, created, "upserted edge");
        Ok(EdgeUpsertOutcome { edge, created })
    }

    fn load_edge(&self, id: &EdgeId) -> StorageResult<Option<Edge>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM edges WHERE id = ?1", EdgeRow::COLUMNS);
        query_one::<EdgeRow, _>(&conn, &sql, params![id.to_string()])
    }

    fn delete_edge(&self, id: &EdgeId) -> StorageResult<()> {
        let conn = self.writer()?;
        let rows = conn.execute("DELETE FROM edges WHERE id = ?1", params![id.to_string()])?;
        if rows == 0 {
            return Err(StorageError::not_found("edge", id));
        }
        Ok(())
    }

    fn edges_page(
        &self,
        selector: &EdgeSelector,
        after: Option<&EdgeId>,
        limit: usize,
    ) -> StorageResult<Vec<Edge>> {
        let conn = self.reader()?;

        let mut params_vec: Vec<Box<dyn ToSql>> = vec![Box::new(selector.endpoint.uuid().to_string())];
        let undirected = "edge_type IN (SELECT name FROM edge_types WHERE directionality = 'undirected')";
        let direction = match selector.direction {
            Direction::Outgoing => format!("(source_id = ?1 OR (target_id = ?1 AND {}))", undirected),
            Direction::Incoming => format!("(target_id = ?1 OR (source_id = ?1 AND {}))", undirected),
            Direction::Both => "(source_id = ?1 OR target_id = ?1)".to_string(),
        };

        let mut sql = format!("SELECT {} FROM edges WHERE {}", EdgeRow::COLUMNS, direction);
        if let Some(after) = after {
            params_vec.push(Box::new(after.to_string()));
            sql.push_str(&format!(" AND id > ?{}", params_vec.len()));
        }
        if !selector.edge_types.is_empty() {
            let mut placeholders = Vec::new();
            for edge_type in &selector.edge_types {
                params_vec.push(Box::new(edge_type.clone()));
                placeholders.push(format!("?{}", params_vec.len()));
            }
            sql.push_str(&format!(" AND edge_type IN ({})", placeholders.join(", ")));
        }
        sql.push_str(&format!(" ORDER BY id LIMIT {}", limit));

        let params_refs: Vec<&dyn ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        query_all::<EdgeRow, _>(&conn, &sql, params_refs.as_slice())
    }

    fn list_edges(&self, edge_types: &[String]) -> StorageResult<Vec<Edge>> {
        let conn = self.reader()?;
        let mut sql = format!("SELECT {} FROM edges", EdgeRow::COLUMNS);
        if !edge_types.is_empty() {
            let placeholders: Vec<String> = (1..=edge_types.len()).map(|i| format!("?{}", i)).collect();
            sql.push_str(&format!(" WHERE edge_type IN ({})", placeholders.join(", ")));
        }
        sql.push_str(" ORDER BY created_at, id");
        let params_refs: Vec<&dyn ToSql> = edge_types.iter().map(|t| t as &dyn ToSql).collect();
        query_all::<EdgeRow, _>(&conn, &sql, params_refs.as_slice())
    }

    // === Insights ===

    fn create_insight(&self, insight: &Insight) -> StorageResult<()> {
        let conn = self.writer()?;
        Self::insert_insight_row(&conn, insight, false)?;
        Ok(())
    }

    fn load_insight(&self, id: &InsightId) -> StorageResult<Option<Insight>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM insights WHERE id = ?1", InsightRow::COLUMNS);
        query_one::<InsightRow, _>(&conn, &sql, params![id.to_string()])
    }

    fn list_insights(&self, validated: Option<bool>) -> StorageResult<Vec<Insight>> {
        let conn = self.reader()?;
        match validated {
            Some(flag) => {
                let sql = format!(
                    "SELECT {} FROM insights WHERE is_validated = ?1 ORDER BY created_at, id",
                    InsightRow::COLUMNS
                );
                query_all::<InsightRow, _>(&conn, &sql, params![flag])
            }
            None => {
                let sql = format!("SELECT {} FROM insights ORDER BY created_at, id", InsightRow::COLUMNS);
                query_all::<InsightRow, _>(&conn, &sql, [])
            }
        }
    }

    fn find_insights_by_title(&self, normalized_title: &str) -> StorageResult<Vec<Insight>> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {} FROM insights WHERE normalized_title = ?1 ORDER BY created_at, id",
            InsightRow::COLUMNS
        );
        query_all::<InsightRow, _>(&conn, &sql, params![normalized_title])
    }

    fn validate_insight(&self, id: &InsightId) -> StorageResult<(Insight, bool)> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let rows = tx.execute(
            "UPDATE insights SET is_validated = 1, updated_at = ?2 WHERE id = ?1 AND is_validated = 0",
            params![id.to_string(), ts(&Utc::now())],
        )?;
        let sql = format!("SELECT {} FROM insights WHERE id = ?1", InsightRow::COLUMNS);
        let insight = query_one::<InsightRow, _>(&tx, &sql, params![id.to_string()])?
            .ok_or_else(|| StorageError::not_found("insight", id))?;
        tx.commit()?;
        Ok((insight, rows == 1))
    }

    // === Knowledge gaps ===

    fn create_gap(&self, gap: &KnowledgeGap) -> StorageResult<()> {
        let conn = self.writer()?;
        Self::insert_gap_row(&conn, gap, false)?;
        Ok(())
    }

    fn load_gap(&self, id: &GapId) -> StorageResult<Option<KnowledgeGap>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM knowledge_gaps WHERE id = ?1", GapRow::COLUMNS);
        query_one::<GapRow, _>(&conn, &sql, params![id.to_string()])
    }

    fn list_gaps(&self, status: Option<GapStatus>) -> StorageResult<Vec<KnowledgeGap>> {
        let conn = self.reader()?;
        match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {} FROM knowledge_gaps WHERE status = ?1 ORDER BY created_at, id",
                    GapRow::COLUMNS
                );
                query_all::<GapRow, _>(&conn, &sql, params![status.as_str()])
            }
            None => {
                let sql = format!("SELECT {} FROM knowledge_gaps ORDER BY created_at, id", GapRow::COLUMNS);
                query_all::<GapRow, _>(&conn, &sql, [])
            }
        }
    }

    fn transition_gap(&self, id: &GapId, to: GapStatus) -> StorageResult<KnowledgeGap> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let key = id.to_string();

        // The status guard lives in the WHERE clause so the check and the
        // write are one statement.
        let predecessors = to.allowed_predecessors();
        let rows = if predecessors.is_empty() {
            0
        } else {
            let placeholders: Vec<String> =
                (0..predecessors.len()).map(|i| format!("?{}", i + 4)).collect();
            let sql = format!(
                "UPDATE knowledge_gaps SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status IN ({})",
                placeholders.join(", ")
            );
            let updated_at = ts(&Utc::now());
            let to_str = to.as_str();
            let names: Vec<&'static str> = predecessors.iter().map(|s| s.as_str()).collect();
            let mut params_vec: Vec<&dyn ToSql> = vec![&to_str, &updated_at, &key];
            params_vec.extend(names.iter().map(|n| n as &dyn ToSql));
            tx.execute(&sql, params_vec.as_slice())?
        };

        let sql = format!("SELECT {} FROM knowledge_gaps WHERE id = ?1", GapRow::COLUMNS);
        let gap = query_one::<GapRow, _>(&tx, &sql, params![key])?
            .ok_or_else(|| StorageError::not_found("gap", id))?;
        if rows == 0 {
            return Err(StorageError::InvalidTransition {
                id: key,
                from: gap.status,
                to,
            });
        }
        tx.commit()?;
        tracing::debug!(gap_id = %id, status = %to, "gap transitioned");
        Ok(gap)
    }

    // === Provenance ===

    fn append_provenance(&self, record: &ProvenanceRecord) -> StorageResult<()> {
        let conn = self.writer()?;
        Self::insert_provenance_row(&conn, record, false)?;
        Ok(())
    }

    fn list_provenance(&self, entity_id: &Uuid) -> StorageResult<Vec<ProvenanceRecord>> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {} FROM provenance WHERE entity_id = ?1 ORDER BY recorded_at DESC, rowid DESC",
            ProvenanceRow::COLUMNS
        );
        query_all::<ProvenanceRow, _>(&conn, &sql, params![entity_id.to_string()])
    }

    fn list_all_provenance(&self) -> StorageResult<Vec<ProvenanceRecord>> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {} FROM provenance ORDER BY recorded_at, rowid",
            ProvenanceRow::COLUMNS
        );
        query_all::<ProvenanceRow, _>(&conn, &sql, [])
    }

    // === Review queues ===

    fn insert_dead_letter(&self, letter: &DeadLetter) -> StorageResult<()> {
        let conn = self.writer()?;
        conn.execute(
            r#"
            INSERT INTO dead_letters (id, candidate_json, reason, attempts, created_at, last_attempt_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                letter.id.to_string(),
                serde_json::to_string(&letter.candidate)?,
                letter.reason,
                letter.attempts,
                ts(&letter.created_at),
                ts(&letter.last_attempt_at),
            ],
        )?;
        Ok(())
    }

    fn update_dead_letter(&self, letter: &DeadLetter) -> StorageResult<()> {
        let conn = self.writer()?;
        let rows = conn.execute(
            r#"
            UPDATE dead_letters SET candidate_json = ?2, reason = ?3, attempts = ?4, last_attempt_at = ?5
            WHERE id = ?1
            "#,
            params![
                letter.id.to_string(),
                serde_json::to_string(&letter.candidate)?,
                letter.reason,
                letter.attempts,
                ts(&letter.last_attempt_at),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::not_found("dead letter", letter.id));
        }
        Ok(())
    }

    fn delete_dead_letter(&self, id: &Uuid) -> StorageResult<bool> {
        let conn = self.writer()?;
        let rows = conn.execute("DELETE FROM dead_letters WHERE id = ?1", params![id.to_string()])?;
        Ok(rows > 0)
    }

    fn list_dead_letters(&self) -> StorageResult<Vec<DeadLetter>> {
        let conn = self.reader()?;
        let sql = format!("SELECT {} FROM dead_letters ORDER BY created_at, id", DeadLetterRow::COLUMNS);
        query_all::<DeadLetterRow, _>(&conn, &sql, [])
    }

    fn insert_duplicate_flag(&self, flag: &DuplicateFlag) -> StorageResult<()> {
        let conn = self.writer()?;
        conn.execute(
            r#"
            INSERT INTO duplicate_flags (id, node_id, existing_node_id, similarity, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                flag.id.to_string(),
                flag.node_id.to_string(),
                flag.existing_node_id.to_string(),
                flag.similarity as f64,
                ts(&flag.created_at),
            ],
        )?;
        Ok(())
    }

    fn list_duplicate_flags(&self) -> StorageResult<Vec<DuplicateFlag>> {
        let conn = self.reader()?;
        let sql = format!(
            "SELECT {} FROM duplicate_flags ORDER BY created_at, id",
            DuplicateFlagRow::COLUMNS
        );
        query_all::<DuplicateFlagRow, _>(&conn, &sql, [])
    }

    // === Bulk ===

    fn restore(&self, dump: &GraphExport) -> StorageResult<RestoreCounts> {
        let mut conn = self.writer()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut counts = RestoreCounts::default();

        for t in &dump.node_types {
            counts.node_types += tx.execute(
                r#"
                INSERT OR REPLACE INTO node_types (name, color, definition, example, attribute_schema_json, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    t.name,
                    t.color,
                    t.definition,
                    t.example,
                    serde_json::to_string(&t.attribute_schema)?,
                    ts(&t.created_at),
                ],
            )?;
        }
        for t in &dump.edge_types {
            counts.edge_types += tx.execute(
                r#"
                INSERT OR REPLACE INTO edge_types (name, color, definition, example, attribute_schema_json,
                                                   directionality, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    t.name,
                    t.color,
                    t.definition,
                    t.example,
                    serde_json::to_string(&t.attribute_schema)?,
                    t.directionality.as_str(),
                    ts(&t.created_at),
                ],
            )?;
        }
        for node in &dump.nodes {
            counts.nodes += Self::insert_node_row(&tx, node, true)?;
        }
        for insight in &dump.insights {
            counts.insights += Self::insert_insight_row(&tx, insight, true)?;
        }
        for gap in &dump.gaps {
            counts.gaps += Self::insert_gap_row(&tx, gap, true)?;
        }
        for edge in &dump.edges {
            for endpoint in [&edge.source, &edge.target] {
                if !Self::endpoint_exists(&tx, endpoint)? {
                    return Err(StorageError::not_found(endpoint.kind().as_str(), endpoint.uuid()));
                }
            }
            counts.edges += tx.execute(
                r#"
                INSERT OR REPLACE INTO edges (id, source_kind, source_id, target_kind, target_id, edge_type,
                                              weight, context, source_type, source_ref_id, confidence,
                                              created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                "#,
                params![
                    edge.id.to_string(),
                    edge.source.kind().as_str(),
                    edge.source.uuid().to_string(),
                    edge.target.kind().as_str(),
                    edge.target.uuid().to_string(),
                    edge.edge_type,
                    edge.weight as f64,
                    edge.context,
                    edge.source_ref.as_ref().map(|s| s.source_type.clone()),
                    edge.source_ref.as_ref().map(|s| s.source_id.clone()),
                    edge.confidence as f64,
                    ts(&edge.created_at),
                    ts(&edge.updated_at),
                ],
            )?;
        }
        for record in &dump.provenance {
            counts.provenance += Self::insert_provenance_row(&tx, record, true)?;
        }

        tx.commit()?;
        Ok(counts)
    }

    // === Snapshots ===

    fn snapshot(&self) -> StorageResult<Arc<dyn GraphStore>> {
        if let Some(pinned) = &self.pinned {
            return Ok(Arc::new(Self {
                shared: self.shared.clone(),
                pinned: Some(pinned.clone()),
            }));
        }
        let idle = self
            .shared
            .idle
            .lock()
            .map_err(|_| StorageError::Poisoned)?
            .pop();
        let conn = match idle {
            Some(conn) => conn,
            None => self.shared.connect()?,
        };
        conn.execute_batch("BEGIN DEFERRED")?;
        // A deferred transaction fixes its view at the first read
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;

        Ok(Arc::new(Self {
            shared: self.shared.clone(),
            pinned: Some(Arc::new(PinnedReader {
                conn: Some(Mutex::new(conn)),
                shared: self.shared.clone(),
            })),
        }))
    }
}

// === Row mapping ===
//
// Rows are read into plain column structs inside the rusqlite closure and
// converted to domain types afterwards, so parse failures surface as
// `StorageError` rather than being squeezed into `rusqlite::Error`.

trait StoredRow: Sized {
    type Entity;
    const COLUMNS: &'static str;

    fn read(row: &Row<'_>) -> rusqlite::Result<Self>;

    fn into_entity(self) -> StorageResult<Self::Entity>;
}

fn query_all<R: StoredRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Vec<R::Entity>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, R::read)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(R::into_entity).collect()
}

fn query_one<R: StoredRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> StorageResult<Option<R::Entity>> {
    conn.query_row(sql, params, R::read)
        .optional()?
        .map(R::into_entity)
        .transpose()
}

/// Fixed-width UTC timestamps so text ordering matches time ordering
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_time(s: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", s, e)))
}

fn parse_uuid(s: &str) -> StorageResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| StorageError::Corrupt(format!("bad id {}: {}", s, e)))
}

fn parse_enum<T: FromStr<Err = String>>(s: &str) -> StorageResult<T> {
    s.parse().map_err(StorageError::Corrupt)
}

fn source_ref(source_type: Option<String>, source_id: Option<String>) -> Option<SourceRef> {
    match (source_type, source_id) {
        (Some(t), Some(id)) => Some(SourceRef::new(t, id)),
        _ => None,
    }
}

struct NodeTypeRow {
    name: String,
    color: String,
    definition: String,
    example: String,
    attribute_schema_json: String,
    created_at: String,
}

impl StoredRow for NodeTypeRow {
    type Entity = NodeType;
    const COLUMNS: &'static str = "name, color, definition, example, attribute_schema_json, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            name: row.get(0)?,
            color: row.get(1)?,
            definition: row.get(2)?,
            example: row.get(3)?,
            attribute_schema_json: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_entity(self) -> StorageResult<NodeType> {
        Ok(NodeType {
            name: self.name,
            color: self.color,
            definition: self.definition,
            example: self.example,
            attribute_schema: serde_json::from_str(&self.attribute_schema_json)?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

struct EdgeTypeRow {
    base: NodeTypeRow,
    directionality: String,
}

impl StoredRow for EdgeTypeRow {
    type Entity = EdgeType;
    const COLUMNS: &'static str =
        "name, color, definition, example, attribute_schema_json, created_at, directionality";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            base: NodeTypeRow::read(row)?,
            directionality: row.get(6)?,
        })
    }

    fn into_entity(self) -> StorageResult<EdgeType> {
        let directionality = parse_enum(&self.directionality)?;
        let base = self.base.into_entity()?;
        Ok(EdgeType {
            name: base.name,
            color: base.color,
            definition: base.definition,
            example: base.example,
            attribute_schema: base.attribute_schema,
            directionality,
            created_at: base.created_at,
        })
    }
}

struct NodeRow {
    id: String,
    name: String,
    node_type: String,
    description: String,
    attributes_json: String,
    source_type: Option<String>,
    source_id: Option<String>,
    confidence: f64,
    created_at: String,
    updated_at: String,
}

impl StoredRow for NodeRow {
    type Entity = Node;
    const COLUMNS: &'static str = "id, name, node_type, description, attributes_json, source_type, \
                                   source_id, confidence, created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            node_type: row.get(2)?,
            description: row.get(3)?,
            attributes_json: row.get(4)?,
            source_type: row.get(5)?,
            source_id: row.get(6)?,
            confidence: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_entity(self) -> StorageResult<Node> {
        Ok(Node {
            id: NodeId::from_uuid(parse_uuid(&self.id)?),
            name: self.name,
            node_type: self.node_type,
            description: self.description,
            attributes: serde_json::from_str(&self.attributes_json)?,
            source: source_ref(self.source_type, self.source_id),
            confidence: self.confidence as f32,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

struct EdgeRow {
    id: String,
    source_kind: String,
    source_id: String,
    target_kind: String,
    target_id: String,
    edge_type: String,
    weight: f64,
    context: String,
    source_type: Option<String>,
    source_ref_id: Option<String>,
    confidence: f64,
    created_at: String,
    updated_at: String,
}

impl StoredRow for EdgeRow {
    type Entity = Edge;
    const COLUMNS: &'static str = "id, source_kind, source_id, target_kind, target_id, edge_type, \
                                   weight, context, source_type, source_ref_id, confidence, \
                                   created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            source_kind: row.get(1)?,
            source_id: row.get(2)?,
            target_kind: row.get(3)?,
            target_id: row.get(4)?,
            edge_type: row.get(5)?,
            weight: row.get(6)?,
            context: row.get(7)?,
            source_type: row.get(8)?,
            source_ref_id: row.get(9)?,
            confidence: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_entity(self) -> StorageResult<Edge> {
        Ok(Edge {
            id: EdgeId::from_uuid(parse_uuid(&self.id)?),
            source: Endpoint::from_parts(parse_enum(&self.source_kind)?, parse_uuid(&self.source_id)?),
            target: Endpoint::from_parts(parse_enum(&self.target_kind)?, parse_uuid(&self.target_id)?),
            edge_type: self.edge_type,
            weight: self.weight as f32,
            context: self.context,
            source_ref: source_ref(self.source_type, self.source_ref_id),
            confidence: self.confidence as f32,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

struct InsightRow {
    id: String,
    title: String,
    description: String,
    is_validated: bool,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow for InsightRow {
    type Entity = Insight;
    const COLUMNS: &'static str =
        "id, title, description, is_validated, created_by, created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            is_validated: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_entity(self) -> StorageResult<Insight> {
        Ok(Insight {
            id: InsightId::from_uuid(parse_uuid(&self.id)?),
            title: self.title,
            description: self.description,
            is_validated: self.is_validated,
            created_by: self.created_by,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

struct GapRow {
    id: String,
    description: String,
    status: String,
    priority: String,
    created_by: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow for GapRow {
    type Entity = KnowledgeGap;
    const COLUMNS: &'static str =
        "id, description, status, priority, created_by, created_at, updated_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            status: row.get(2)?,
            priority: row.get(3)?,
            created_by: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_entity(self) -> StorageResult<KnowledgeGap> {
        Ok(KnowledgeGap {
            id: GapId::from_uuid(parse_uuid(&self.id)?),
            description: self.description,
            status: parse_enum(&self.status)?,
            priority: parse_enum(&self.priority)?,
            created_by: self.created_by,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

struct ProvenanceRow {
    id: String,
    entity_id: String,
    entity_kind: String,
    source_type: String,
    source_id: String,
    snippet: String,
    recorded_at: String,
}

impl StoredRow for ProvenanceRow {
    type Entity = ProvenanceRecord;
    const COLUMNS: &'static str =
        "id, entity_id, entity_kind, source_type, source_id, snippet, recorded_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            entity_id: row.get(1)?,
            entity_kind: row.get(2)?,
            source_type: row.get(3)?,
            source_id: row.get(4)?,
            snippet: row.get(5)?,
            recorded_at: row.get(6)?,
        })
    }

    fn into_entity(self) -> StorageResult<ProvenanceRecord> {
        Ok(ProvenanceRecord {
            id: parse_uuid(&self.id)?,
            entity_id: parse_uuid(&self.entity_id)?,
            entity_kind: parse_enum(&self.entity_kind)?,
            source_type: self.source_type,
            source_id: self.source_id,
            snippet: self.snippet,
            recorded_at: parse_time(&self.recorded_at)?,
        })
    }
}

struct DeadLetterRow {
    id: String,
    candidate_json: String,
    reason: String,
    attempts: u32,
    created_at: String,
    last_attempt_at: String,
}

impl StoredRow for DeadLetterRow {
    type Entity = DeadLetter;
    const COLUMNS: &'static str = "id, candidate_json, reason, attempts, created_at, last_attempt_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            candidate_json: row.get(1)?,
            reason: row.get(2)?,
            attempts: row.get(3)?,
            created_at: row.get(4)?,
            last_attempt_at: row.get(5)?,
        })
    }

    fn into_entity(self) -> StorageResult<DeadLetter> {
        Ok(DeadLetter {
            id: parse_uuid(&self.id)?,
            candidate: serde_json::from_str(&self.candidate_json)?,
            reason: self.reason,
            attempts: self.attempts,
            created_at: parse_time(&self.created_at)?,
            last_attempt_at: parse_time(&self.last_attempt_at)?,
        })
    }
}

struct DuplicateFlagRow {
    id: String,
    node_id: String,
    existing_node_id: String,
    similarity: f64,
    created_at: String,
}

impl StoredRow for DuplicateFlagRow {
    type Entity = DuplicateFlag;
    const COLUMNS: &'static str = "id, node_id, existing_node_id, similarity, created_at";

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            node_id: row.get(1)?,
            existing_node_id: row.get(2)?,
            similarity: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_entity(self) -> StorageResult<DuplicateFlag> {
        Ok(DuplicateFlag {
            id: parse_uuid(&self.id)?,
            node_id: NodeId::from_uuid(parse_uuid(&self.node_id)?),
            existing_node_id: NodeId::from_uuid(parse_uuid(&self.existing_node_id)?),
            similarity: self.similarity as f32,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GapPriority, SourceRef};
    use crate::resolver::RelationCandidate;
    use std::sync::Arc;

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn create_node(store: &SqliteStore, name: &str, node_type: &str) -> Node {
        let node = Node::new(name, node_type);
        store.create_node(&node).unwrap();
        node
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    #[test]
    fn test_save_and_load_node() {
        let store = create_test_store();
        let node = Node::new("LangGraph", "idea")
            .with_description("graph-based agent orchestration")
            .with_attribute("url", "https://example.org".into())
            .with_source(SourceRef::new("email", "42"))
            .with_confidence(0.9);
        store.create_node(&node).unwrap();

        let loaded = store.load_node(&node.id).unwrap().unwrap();
        assert_eq!(loaded, node);
    }

    #[test]
    fn test_find_nodes_by_normalized_name() {
        let store = create_test_store();
        create_node(&store, "Lang-Graph", "idea");
        create_node(&store, "LangGraph", "technology");
        create_node(&store, "Other", "idea");

        let found = store
            .find_nodes(&NodeFilter::new().with_type("idea").with_normalized_name("langgraph"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Lang-Graph");

        let any_type = store
            .find_nodes(&NodeFilter::new().with_normalized_name("langgraph"))
            .unwrap();
        assert_eq!(any_type.len(), 2);
    }

    #[test]
    fn test_node_type_change_needs_override() {
        let store = create_test_store();
        let node = create_node(&store, "Rust", "idea");

        let err = store
            .update_node(&node.id, &NodeUpdate::new().retype("technology", false))
            .unwrap_err();
        assert!(matches!(err, StorageError::Immutable("node_type")));
        assert_eq!(store.load_node(&node.id).unwrap().unwrap().node_type, "idea");

        let updated = store
            .update_node(&node.id, &NodeUpdate::new().retype("technology", true))
            .unwrap();
        assert_eq!(updated.node_type, "technology");
    }

    #[test]
    fn test_update_missing_node_is_not_found() {
        let store = create_test_store();
        let err = store
            .update_node(&NodeId::new(), &NodeUpdate::new().description("x"))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "node", .. }));
    }

    #[test]
    fn test_delete_node_cascades() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");
        let c = create_node(&store, "C", "idea");
        store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports")).unwrap();
        store.upsert_edge(&EdgeUpsert::new(c.id, a.id, "mentions")).unwrap();
        store.upsert_edge(&EdgeUpsert::new(b.id, c.id, "supports")).unwrap();
        store
            .append_provenance(&ProvenanceRecord::new(
                *a.id.as_uuid(),
                EntityKind::Node,
                &SourceRef::new("email", "1"),
                "A",
            ))
            .unwrap();

        let report = store.delete_node(&a.id).unwrap();
        assert_eq!(report.edges_removed.len(), 2);
        assert_eq!(report.provenance_removed, 1);

        assert!(store.load_node(&a.id).unwrap().is_none());
        assert_eq!(store.list_edges(&[]).unwrap().len(), 1);
        assert!(store.list_provenance(a.id.as_uuid()).unwrap().is_empty());
        assert!(matches!(
            store.delete_node(&a.id).unwrap_err(),
            StorageError::NotFound { .. }
        ));
    }

    // ========================================================================
    // Edges
    // ========================================================================

    #[test]
    fn test_upsert_same_triple_updates_in_place() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");

        let first = store
            .upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports").weight(0.6).context("first"))
            .unwrap();
        assert!(first.created);

        let second = store
            .upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports").weight(0.9))
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.edge.id, first.edge.id);
        assert_eq!(second.edge.weight, 0.9);
        assert_eq!(second.edge.context, "first");

        let edges = store.list_edges(&[]).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].weight, 0.9);
    }

    #[test]
    fn test_reverse_direction_is_a_different_triple() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");
        store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports")).unwrap();
        store.upsert_edge(&EdgeUpsert::new(b.id, a.id, "supports")).unwrap();
        store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "mentions")).unwrap();
        assert_eq!(store.list_edges(&[]).unwrap().len(), 3);
        assert_eq!(store.list_edges(&["supports".into()]).unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_with_missing_endpoint_fails() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let err = store
            .upsert_edge(&EdgeUpsert::new(a.id, NodeId::new(), "supports"))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { kind: "node", .. }));
        assert!(store.list_edges(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_insight_can_be_an_endpoint() {
        let store = create_test_store();
        let node = create_node(&store, "A", "idea");
        let insight = Insight::new("A matters", "because", "ada");
        store.create_insight(&insight).unwrap();

        let out = store
            .upsert_edge(&EdgeUpsert::new(insight.id, node.id, "derived_from"))
            .unwrap();
        assert_eq!(out.edge.source, Endpoint::Insight(insight.id));

        let loaded = store.load_edge(&out.edge.id).unwrap().unwrap();
        assert_eq!(loaded, out.edge);
    }

    #[test]
    fn test_edges_page_follows_undirected_types_backwards() {
        let store = create_test_store();
        store
            .insert_edge_type(&EdgeType::new("related_to", "#fff", "loose").undirected())
            .unwrap();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");
        let c = create_node(&store, "C", "idea");
        store.upsert_edge(&EdgeUpsert::new(b.id, a.id, "related_to")).unwrap();
        store.upsert_edge(&EdgeUpsert::new(c.id, a.id, "supports")).unwrap();

        let outgoing = store
            .edges_page(
                &EdgeSelector {
                    endpoint: a.id.into(),
                    direction: Direction::Outgoing,
                    edge_types: vec![],
                },
                None,
                10,
            )
            .unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].edge_type, "related_to");
    }

    #[test]
    fn test_edges_page_is_keyset_paged() {
        let store = create_test_store();
        let hub = create_node(&store, "hub", "idea");
        for i in 0..5 {
            let n = create_node(&store, &format!("n{}", i), "idea");
            store.upsert_edge(&EdgeUpsert::new(hub.id, n.id, "mentions")).unwrap();
        }
        let selector = EdgeSelector {
            endpoint: hub.id.into(),
            direction: Direction::Outgoing,
            edge_types: vec!["mentions".into()],
        };

        let mut seen = Vec::new();
        let mut after: Option<EdgeId> = None;
        loop {
            let page = store.edges_page(&selector, after.as_ref(), 2).unwrap();
            if page.is_empty() {
                break;
            }
            after = page.last().map(|e| e.id);
            seen.extend(page.into_iter().map(|e| e.id));
        }
        assert_eq!(seen.len(), 5);
        let mut sorted = seen.clone();
        sorted.sort();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn test_delete_edge() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");
        let out = store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports")).unwrap();
        store.delete_edge(&out.edge.id).unwrap();
        assert!(store.load_edge(&out.edge.id).unwrap().is_none());
        assert!(matches!(
            store.delete_edge(&out.edge.id).unwrap_err(),
            StorageError::NotFound { kind: "edge", .. }
        ));
    }

    // ========================================================================
    // Insights and gaps
    // ========================================================================

    #[test]
    fn test_validate_insight_is_idempotent() {
        let store = create_test_store();
        let insight = Insight::new("t", "d", "ada");
        store.create_insight(&insight).unwrap();

        let (first, changed) = store.validate_insight(&insight.id).unwrap();
        assert!(first.is_validated);
        assert!(changed);

        let (second, changed) = store.validate_insight(&insight.id).unwrap();
        assert!(second.is_validated);
        assert!(!changed);

        assert_eq!(store.list_insights(Some(true)).unwrap().len(), 1);
        assert!(store.list_insights(Some(false)).unwrap().is_empty());
    }

    #[test]
    fn test_gap_transitions_are_guarded() {
        let store = create_test_store();
        let gap = KnowledgeGap::new("why?", GapPriority::High, "ada");
        store.create_gap(&gap).unwrap();

        let resolved = store.transition_gap(&gap.id, GapStatus::Resolved).unwrap();
        assert_eq!(resolved.status, GapStatus::Resolved);

        let err = store.transition_gap(&gap.id, GapStatus::Open).unwrap_err();
        assert!(matches!(
            err,
            StorageError::InvalidTransition {
                from: GapStatus::Resolved,
                to: GapStatus::Open,
                ..
            }
        ));
        assert_eq!(store.load_gap(&gap.id).unwrap().unwrap().status, GapStatus::Resolved);

        assert!(matches!(
            store.transition_gap(&GapId::new(), GapStatus::Resolved).unwrap_err(),
            StorageError::NotFound { kind: "gap", .. }
        ));
    }

    // ========================================================================
    // Review queues
    // ========================================================================

    #[test]
    fn test_dead_letter_lifecycle() {
        let store = create_test_store();
        let candidate =
            RelationCandidate::new("A", "B", "supports", 0.8, SourceRef::new("email", "9"));
        let mut letter = DeadLetter::new(candidate, "no entity named 'A'", 3);
        store.insert_dead_letter(&letter).unwrap();

        letter.attempts = 4;
        store.update_dead_letter(&letter).unwrap();
        let listed = store.list_dead_letters().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].attempts, 4);
        assert_eq!(listed[0].candidate.source_name, "A");

        assert!(store.delete_dead_letter(&letter.id).unwrap());
        assert!(!store.delete_dead_letter(&letter.id).unwrap());
    }

    // ========================================================================
    // Concurrency (file-backed)
    // ========================================================================

    #[test]
    fn test_wal_mode_enabled_at_connection() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("wal.db")).unwrap();

        let journal_mode: String = store
            .shared
            .writer
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");
    }

    #[test]
    fn test_read_does_not_wait_for_open_write() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("read.db")).unwrap();
        let existing = create_node(&store, "Existing", "idea");

        {
            let conn = store.shared.writer.lock().unwrap();
            conn.execute("BEGIN IMMEDIATE", []).unwrap();
            conn.execute("DELETE FROM nodes WHERE id = ?1", params![existing.id.to_string()])
                .unwrap();

            // Uncommitted delete is invisible to the reader connection
            let loaded = store.load_node(&existing.id).unwrap();
            assert!(loaded.is_some());

            conn.execute("ROLLBACK", []).unwrap();
        }
    }

    #[test]
    fn test_in_memory_read_does_not_wait_for_open_write() {
        let store = create_test_store();
        let existing = create_node(&store, "Existing", "idea");

        let conn = store.shared.writer.lock().unwrap();
        conn.execute("BEGIN IMMEDIATE", []).unwrap();
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![existing.id.to_string()])
            .unwrap();
        assert!(store.load_node(&existing.id).unwrap().is_some());
        conn.execute("ROLLBACK", []).unwrap();
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    #[test]
    fn test_snapshot_keeps_its_view_across_commits() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let b = create_node(&store, "B", "idea");
        store.upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports")).unwrap();

        let snapshot = store.snapshot().unwrap();
        store.delete_node(&b.id).unwrap();
        let late = create_node(&store, "Late", "idea");

        assert!(store.load_node(&b.id).unwrap().is_none());
        assert!(snapshot.load_node(&b.id).unwrap().is_some());
        assert!(snapshot.load_node(&late.id).unwrap().is_none());
        let selector = EdgeSelector {
            endpoint: a.id.into(),
            direction: Direction::Outgoing,
            edge_types: vec![],
        };
        assert_eq!(snapshot.edges_page(&selector, None, 10).unwrap().len(), 1);
        assert!(store.edges_page(&selector, None, 10).unwrap().is_empty());

        // Nested snapshots share the pin
        let nested = snapshot.snapshot().unwrap();
        assert!(nested.load_node(&b.id).unwrap().is_some());
    }

    #[test]
    fn test_snapshot_rejects_writes() {
        let store = create_test_store();
        let a = create_node(&store, "A", "idea");
        let snapshot = store.snapshot().unwrap();

        assert!(matches!(
            snapshot.create_node(&Node::new("B", "idea")),
            Err(StorageError::ReadOnlySnapshot)
        ));
        assert!(matches!(snapshot.delete_node(&a.id), Err(StorageError::ReadOnlySnapshot)));
        assert!(store.load_node(&a.id).unwrap().is_some());
    }

    #[test]
    fn test_released_snapshot_sees_new_commits_when_reused() {
        let store = create_test_store();
        drop(store.snapshot().unwrap());
        let node = create_node(&store, "After", "idea");
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.load_node(&node.id).unwrap().is_some());
    }

    #[test]
    fn test_concurrent_upserts_to_one_triple() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let first = Arc::new(SqliteStore::open(&path).unwrap());
        let second = Arc::new(SqliteStore::open(&path).unwrap());
        let a = create_node(&first, "A", "idea");
        let b = create_node(&first, "B", "idea");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = if i % 2 == 0 { first.clone() } else { second.clone() };
                std::thread::spawn(move || {
                    store
                        .upsert_edge(&EdgeUpsert::new(a.id, b.id, "supports").weight(i as f32 / 10.0))
                        .unwrap()
                })
            })
            .collect();
        let created = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.created)
            .count();

        assert_eq!(created, 1);
        assert_eq!(first.list_edges(&[]).unwrap().len(), 1);
    }
}
