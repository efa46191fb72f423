//! SqliteVecStore: persistent vector storage via sqlite-vec
//!
//! Vectors live in a vec0 virtual table keyed by rowid; a plain side table
//! maps entity keys (`node:<uuid>` / `insight:<uuid>`) to rowids.
//!
//! Vectors are L2-normalized on insert so that L2 distance from vec0 can be
//! converted to cosine similarity: `sim = 1 - dist² / 2`.

#[cfg(feature = "embeddings")]
mod inner {
    use crate::graph::{Endpoint, EntityKind};
    use crate::index::embedder::l2_normalize;
    use crate::index::{IndexError, VectorStore};
    use rusqlite::{params, Connection, OptionalExtension};
    use sqlite_vec::sqlite3_vec_init;
    use std::path::Path;
    use std::sync::{Mutex, MutexGuard};
    use uuid::Uuid;

    /// Persistent vector store backed by sqlite-vec.
    ///
    /// Uses its own connection so vector writes never contend with the
    /// graph store's writer.
    pub struct SqliteVecStore {
        conn: Mutex<Connection>,
        dimensions: usize,
    }

    /// Register the sqlite-vec extension globally (safe under parallel test execution).
    fn register_vec_extension() {
        use std::sync::Once;
        static INIT: Once = Once::new();
        INIT.call_once(|| unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        });
    }

    fn db_err(e: rusqlite::Error) -> IndexError {
        IndexError::Store(e.to_string())
    }

    impl SqliteVecStore {
        pub fn open(path: &Path, dimensions: usize) -> Result<Self, IndexError> {
            register_vec_extension();
            let conn = Connection::open(path).map_err(db_err)?;
            Self::init_connection(conn, dimensions)
        }

        pub fn open_in_memory(dimensions: usize) -> Result<Self, IndexError> {
            register_vec_extension();
            let conn = Connection::open_in_memory().map_err(db_err)?;
            Self::init_connection(conn, dimensions)
        }

        fn init_connection(conn: Connection, dimensions: usize) -> Result<Self, IndexError> {
            conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(db_err)?;
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS vec_keys (
                     rowid INTEGER PRIMARY KEY,
                     entity_key TEXT NOT NULL UNIQUE
                 );
                 CREATE VIRTUAL TABLE IF NOT EXISTS vec_embeddings USING vec0(
                     embedding float[{}]
                 );",
                dimensions
            ))
            .map_err(db_err)?;

            Ok(Self {
                conn: Mutex::new(conn),
                dimensions,
            })
        }

        pub fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn lock(&self) -> Result<MutexGuard<'_, Connection>, IndexError> {
            self.conn
                .lock()
                .map_err(|_| IndexError::Unavailable("vector connection lock poisoned".into()))
        }
    }

    /// Reinterpret a `&[f32]` slice as raw bytes for sqlite-vec blob parameters.
    ///
    /// # Safety
    /// f32 has no padding and a fixed layout; this is a trivial reinterpretation.
    fn f32_slice_as_bytes(slice: &[f32]) -> &[u8] {
        unsafe { std::slice::from_raw_parts(slice.as_ptr() as *const u8, slice.len() * 4) }
    }

    fn parse_key(key: &str) -> Option<Endpoint> {
        let (kind, id) = key.split_once(':')?;
        let kind: EntityKind = kind.parse().ok()?;
        Some(Endpoint::from_parts(kind, Uuid::parse_str(id).ok()?))
    }

    impl VectorStore for SqliteVecStore {
        fn upsert(&self, key: &Endpoint, vector: Vec<f32>) -> Result<(), IndexError> {
            if vector.len() != self.dimensions {
                return Err(IndexError::Store(format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    vector.len()
                )));
            }
            let mut normalized = vector;
            l2_normalize(&mut normalized);

            let mut conn = self.lock()?;
            let tx = conn.transaction().map_err(db_err)?;
            tx.execute(
                "INSERT OR IGNORE INTO vec_keys (entity_key) VALUES (?1)",
                params![key.to_string()],
            )
            .map_err(db_err)?;
            let rowid: i64 = tx
                .query_row(
                    "SELECT rowid FROM vec_keys WHERE entity_key = ?1",
                    params![key.to_string()],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            tx.execute("DELETE FROM vec_embeddings WHERE rowid = ?1", params![rowid])
                .map_err(db_err)?;
            tx.execute(
                "INSERT INTO vec_embeddings (rowid, embedding) VALUES (?1, ?2)",
                params![rowid, f32_slice_as_bytes(&normalized)],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)
        }

        fn remove(&self, key: &Endpoint) -> Result<(), IndexError> {
            let mut conn = self.lock()?;
            let tx = conn.transaction().map_err(db_err)?;
            let rowid: Option<i64> = tx
                .query_row(
                    "SELECT rowid FROM vec_keys WHERE entity_key = ?1",
                    params![key.to_string()],
                    |row| row.get(0),
                )
                .optional()
                .map_err(db_err)?;
            if let Some(rowid) = rowid {
                tx.execute("DELETE FROM vec_embeddings WHERE rowid = ?1", params![rowid])
                    .map_err(db_err)?;
                tx.execute("DELETE FROM vec_keys WHERE rowid = ?1", params![rowid])
                    .map_err(db_err)?;
            }
            tx.commit().map_err(db_err)
        }

        fn search(&self, query: &[f32], k: usize) -> Result<Vec<(Endpoint, f32)>, IndexError> {
            let mut normalized = query.to_vec();
            l2_normalize(&mut normalized);
            let conn = self.lock()?;

            // For unit vectors: L2_dist² = 2(1 - cos_sim)
            let mut stmt = conn
                .prepare(
                    "WITH knn AS (
                         SELECT rowid, distance FROM vec_embeddings
                         WHERE embedding MATCH ?1 AND k = ?2
                     )
                     SELECT keys.entity_key, knn.distance
                     FROM knn JOIN vec_keys keys ON keys.rowid = knn.rowid
                     ORDER BY knn.distance",
                )
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params![f32_slice_as_bytes(&normalized), k as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, f32>(1)?))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;

            Ok(rows
                .into_iter()
                .filter_map(|(key, distance)| {
                    parse_key(&key).map(|e| (e, 1.0 - (distance * distance) / 2.0))
                })
                .filter(|(_, sim)| *sim > 0.0)
                .collect())
        }

        fn len(&self) -> Result<usize, IndexError> {
            let conn = self.lock()?;
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM vec_keys", [], |row| row.get(0))
                .map_err(db_err)?;
            Ok(n as usize)
        }
    }

}

#[cfg(feature = "embeddings")]
pub use inner::SqliteVecStore;
