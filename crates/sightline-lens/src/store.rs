//! SQLite persistence for file hashes, chunks, the embedding cache and the
//! FTS5 keyword index.
//!
//! The embedding cache is keyed by chunk content hash, so a record stays
//! valid exactly as long as the chunk it was computed for is unchanged.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sightline_core::{ChunkId, ExtractedChunk, SightlineError};

/// A cached embedding for one chunk content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingRecord {
    /// Chunk the vector was first computed for.
    pub chunk_id: ChunkId,
    pub content_hash: String,
    pub vector: Vec<f32>,
    pub provider: String,
    pub dimensions: usize,
    /// The embedded text was cut to fit the provider's token budget.
    pub truncated: bool,
    pub created_at: DateTime<Utc>,
}

/// Persistent content-hash → embedding lookup.
pub trait EmbeddingCache: Send + Sync {
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on storage failure.
    fn get(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>, SightlineError>;

    /// Insert or replace the record for its content hash.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on storage failure.
    fn put(&self, record: &EmbeddingRecord) -> Result<(), SightlineError>;

    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on storage failure.
    fn len(&self) -> Result<usize, SightlineError>;
}

/// A full-text match; `score` is normalized BM25 in `[0, 1)`, higher is better.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordHit {
    pub chunk_id: ChunkId,
    pub score: f64,
}

/// Full-text lookup over chunk names and bodies.
pub trait KeywordIndex: Send + Sync {
    /// Up to `limit` chunks matching any term of `query`, best first, ties
    /// by ascending chunk id. A query with no searchable terms matches nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on query failure.
    fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, SightlineError>;
}

/// Counts for `sightline stats`-style reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total_files: usize,
    pub total_chunks: usize,
    pub cached_embeddings: usize,
    pub index_size_bytes: u64,
}

/// SQLite-backed project store.
///
/// # Examples
///
/// ```
/// use sightline_lens::{EmbeddingCache, SqliteStore};
///
/// let store = SqliteStore::in_memory().unwrap();
/// assert_eq!(store.len().unwrap(), 0);
/// assert!(store.file_hashes().unwrap().is_empty());
/// ```
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

fn db_error(context: &'static str) -> impl Fn(rusqlite::Error) -> SightlineError {
    move |e| SightlineError::Database(format!("{context}: {e}"))
}

impl SqliteStore {
    /// Open or create the store at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] if the database cannot be opened.
    pub fn open(path: &Path) -> Result<Self, SightlineError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SightlineError::Database(format!("failed to create index directory: {e}"))
            })?;
        }
        let conn = Connection::open(path).map_err(db_error("failed to open database"))?;
        Self::init(conn)
    }

    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self, SightlineError> {
        let conn = Connection::open_in_memory().map_err(db_error("failed to create in-memory database"))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, SightlineError> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS files (
                path TEXT PRIMARY KEY,
                content_hash TEXT NOT NULL,
                indexed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS chunks_by_file ON chunks(file_path);

            CREATE TABLE IF NOT EXISTS embeddings (
                content_hash TEXT PRIMARY KEY,
                chunk_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                dimensions INTEGER NOT NULL,
                truncated INTEGER NOT NULL,
                vector BLOB NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                file_path UNINDEXED,
                name,
                symbol_path,
                text,
                tokenize = 'porter unicode61'
            );
            ",
        )
        .map_err(db_error("failed to create schema"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record the embedding provider and dimensions of this index.
    ///
    /// A no-op when they match what is stored.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::DimensionMismatch`] if the index was built
    /// with different dimensions; re-index from scratch to switch.
    pub fn ensure_dimensions(&self, provider: &str, dimensions: usize) -> Result<(), SightlineError> {
        if let Some(stored) = self.dimensions()? {
            if stored != dimensions {
                return Err(SightlineError::DimensionMismatch {
                    expected: stored,
                    actual: dimensions,
                });
            }
        } else {
            self.set_metadata("embedding_dimensions", &dimensions.to_string())?;
        }
        self.set_metadata("embedding_provider", provider)
    }

    /// Dimensions the index was created with, if any.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on query failure or corrupted metadata.
    pub fn dimensions(&self) -> Result<Option<usize>, SightlineError> {
        self.metadata("embedding_dimensions")?
            .map(|v| {
                v.parse().map_err(|_| {
                    SightlineError::Database(format!("corrupted dimension metadata in index: '{v}'"))
                })
            })
            .transpose()
    }

    fn metadata(&self, key: &str) -> Result<Option<String>, SightlineError> {
        self.conn
            .lock()
            .query_row("SELECT value FROM metadata WHERE key = ?1", params![key], |row| row.get(0))
            .optional()
            .map_err(db_error("failed to read metadata"))
    }

    fn set_metadata(&self, key: &str, value: &str) -> Result<(), SightlineError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
                params![key, value],
            )
            .map_err(db_error("failed to write metadata"))?;
        Ok(())
    }

    /// Indexed files with their content hashes.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on query failure.
    pub fn file_hashes(&self) -> Result<HashMap<PathBuf, String>, SightlineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT path, content_hash FROM files")
            .map_err(db_error("failed to prepare query"))?;
        let rows = stmt
            .query_map([], |row| {
                let path: String = row.get(0)?;
                let hash: String = row.get(1)?;
                Ok((PathBuf::from(path), hash))
            })
            .map_err(db_error("failed to query files"))?;
        let hashes = rows
            .collect::<Result<HashMap<_, _>, _>>()
            .map_err(db_error("failed to read row"))?;
        Ok(hashes)
    }

    /// Replace every chunk of `path` and record its new file hash, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] or [`SightlineError::Serialization`].
    pub fn replace_file(
        &self,
        path: &Path,
        file_hash: &str,
        chunks: &[ExtractedChunk],
    ) -> Result<(), SightlineError> {
        let path_str = path.to_string_lossy().to_string();
        let rows = chunks
            .iter()
            .map(|c| -> Result<_, SightlineError> { Ok((c, serde_json::to_string(c)?)) })
            .collect::<Result<Vec<_>, SightlineError>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(db_error("failed to begin transaction"))?;
        tx.execute("DELETE FROM chunks WHERE file_path = ?1", params![path_str])
            .map_err(db_error("failed to delete chunks"))?;
        tx.execute("DELETE FROM chunks_fts WHERE file_path = ?1", params![path_str])
            .map_err(db_error("failed to delete keyword rows"))?;
        for (extracted, data) in rows {
            let chunk = &extracted.chunk;
            tx.execute(
                "INSERT OR REPLACE INTO chunks (id, file_path, content_hash, data) VALUES (?1, ?2, ?3, ?4)",
                params![chunk.id.as_str(), path_str, chunk.content_hash, data],
            )
            .map_err(db_error("failed to insert chunk"))?;
            tx.execute(
                "INSERT INTO chunks_fts (chunk_id, file_path, name, symbol_path, text) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![chunk.id.as_str(), path_str, chunk.name, chunk.symbol_path, chunk.text],
            )
            .map_err(db_error("failed to index chunk keywords"))?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO files (path, content_hash, indexed_at) VALUES (?1, ?2, ?3)",
            params![path_str, file_hash, Utc::now().to_rfc3339()],
        )
        .map_err(db_error("failed to record file"))?;
        tx.commit().map_err(db_error("failed to commit"))?;
        Ok(())
    }

    /// Drop a file and its chunks. Cached embeddings are kept.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on delete failure.
    pub fn remove_file(&self, path: &Path) -> Result<(), SightlineError> {
        let path_str = path.to_string_lossy().to_string();
        let conn = self.conn.lock();
        conn.execute("DELETE FROM chunks WHERE file_path = ?1", params![path_str])
            .map_err(db_error("failed to delete chunks"))?;
        conn.execute("DELETE FROM chunks_fts WHERE file_path = ?1", params![path_str])
            .map_err(db_error("failed to delete keyword rows"))?;
        conn.execute("DELETE FROM files WHERE path = ?1", params![path_str])
            .map_err(db_error("failed to delete file record"))?;
        Ok(())
    }

    /// Every stored chunk, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] or [`SightlineError::Serialization`].
    pub fn load_chunks(&self) -> Result<Vec<ExtractedChunk>, SightlineError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT data FROM chunks ORDER BY id")
            .map_err(db_error("failed to prepare query"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_error("failed to query chunks"))?;

        let mut chunks = Vec::new();
        for row in rows {
            let data = row.map_err(db_error("failed to read row"))?;
            chunks.push(serde_json::from_str(&data)?);
        }
        Ok(chunks)
    }

    /// # Errors
    ///
    /// Returns [`SightlineError::Database`] on query failure.
    pub fn stats(&self) -> Result<StoreStats, SightlineError> {
        let conn = self.conn.lock();
        let count = |sql: &str| -> Result<usize, SightlineError> {
            let n: i64 = conn
                .query_row(sql, [], |row| row.get(0))
                .map_err(db_error("failed to count rows"))?;
            Ok(n as usize)
        };
        let total_files = count("SELECT COUNT(*) FROM files")?;
        let total_chunks = count("SELECT COUNT(*) FROM chunks")?;
        let cached_embeddings = count("SELECT COUNT(*) FROM embeddings")?;

        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(StoreStats {
            total_files,
            total_chunks,
            cached_embeddings,
            index_size_bytes: (page_count * page_size) as u64,
        })
    }
}

impl EmbeddingCache for SqliteStore {
    fn get(&self, content_hash: &str) -> Result<Option<EmbeddingRecord>, SightlineError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT chunk_id, provider, dimensions, truncated, vector, created_at
                 FROM embeddings WHERE content_hash = ?1",
                params![content_hash],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, bool>(3)?,
                        row.get::<_, Vec<u8>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error("failed to read embedding"))?;

        let Some((chunk_id, provider, dimensions, truncated, vector, created_at)) = row else {
            return Ok(None);
        };
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| SightlineError::Database(format!("corrupted embedding timestamp: {e}")))?;
        Ok(Some(EmbeddingRecord {
            chunk_id: ChunkId::from(chunk_id.as_str()),
            content_hash: content_hash.to_string(),
            vector: bytes_to_floats(&vector),
            provider,
            dimensions: dimensions as usize,
            truncated,
            created_at,
        }))
    }

    fn put(&self, record: &EmbeddingRecord) -> Result<(), SightlineError> {
        self.conn
            .lock()
            .execute(
                "INSERT OR REPLACE INTO embeddings
                 (content_hash, chunk_id, provider, dimensions, truncated, vector, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.content_hash,
                    record.chunk_id.as_str(),
                    record.provider,
                    record.dimensions as i64,
                    record.truncated,
                    floats_to_bytes(&record.vector),
                    record.created_at.to_rfc3339(),
                ],
            )
            .map_err(db_error("failed to write embedding"))?;
        Ok(())
    }

    fn len(&self) -> Result<usize, SightlineError> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(db_error("failed to count embeddings"))?;
        Ok(n as usize)
    }
}

impl KeywordIndex for SqliteStore {
    fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<KeywordHit>, SightlineError> {
        let fts_query = sanitize_fts_query(query);
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        // Column weights favour the chunk name over its body.
        let mut stmt = conn
            .prepare(
                "SELECT chunk_id, bm25(chunks_fts, 0.0, 0.0, 4.0, 2.0, 1.0) AS rank
                 FROM chunks_fts
                 WHERE chunks_fts MATCH ?1
                 ORDER BY rank, chunk_id
                 LIMIT ?2",
            )
            .map_err(db_error("failed to prepare keyword query"))?;
        let rows = stmt
            .query_map(params![fts_query, limit as i64], |row| {
                let id: String = row.get(0)?;
                let rank: f64 = row.get(1)?;
                Ok((id, rank))
            })
            .map_err(db_error("keyword query failed"))?;

        let mut hits = Vec::new();
        for row in rows {
            let (id, rank) = row.map_err(db_error("failed to read keyword row"))?;
            // FTS5 ranks are negated BM25: more negative is more relevant.
            let bm25 = (-rank).max(0.0);
            hits.push(KeywordHit {
                chunk_id: ChunkId::from(id.as_str()),
                score: bm25 / (1.0 + bm25),
            });
        }
        Ok(hits)
    }
}

/// Quote each word so FTS5 operators in user input are matched literally,
/// and accept a chunk matching any of them.
fn sanitize_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric() || *c == '_').collect::<String>())
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{w}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        bytes.extend_from_slice(&f.to_le_bytes());
    }
    bytes
}

fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sightline_core::{Chunk, ChunkKind, Span};

    fn chunk(file: &str, name: &str) -> ExtractedChunk {
        let span = Span {
            start_byte: 0,
            end_byte: 10,
            start_line: 1,
            end_line: 2,
        };
        ExtractedChunk::new(Chunk::new(
            Path::new(file),
            "rust",
            name,
            ChunkKind::Function,
            span,
            format!("fn {name}() {{}}"),
        ))
    }

    fn record(hash: &str, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            chunk_id: ChunkId::from("src/a.rs#a@rust"),
            content_hash: hash.to_string(),
            dimensions: vector.len(),
            vector,
            provider: "fake".into(),
            truncated: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn replace_file_swaps_chunks() {
        let store = SqliteStore::in_memory().unwrap();
        let path = Path::new("src/a.rs");
        store.replace_file(path, "h1", &[chunk("src/a.rs", "a"), chunk("src/a.rs", "b")]).unwrap();
        assert_eq!(store.load_chunks().unwrap().len(), 2);

        store.replace_file(path, "h2", &[chunk("src/a.rs", "c")]).unwrap();
        let chunks = store.load_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.name, "c");
        assert_eq!(store.file_hashes().unwrap()[path], "h2");
    }

    #[test]
    fn remove_file_keeps_other_files() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_file(Path::new("a.rs"), "h", &[chunk("a.rs", "a")]).unwrap();
        store.replace_file(Path::new("b.rs"), "h", &[chunk("b.rs", "b")]).unwrap();
        store.remove_file(Path::new("a.rs")).unwrap();

        let chunks = store.load_chunks().unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk.name, "b");
        assert_eq!(store.stats().unwrap().total_files, 1);
    }

    #[test]
    fn keyword_search_finds_by_name_and_body() {
        let store = SqliteStore::in_memory().unwrap();
        let mut payment = chunk("src/pay.rs", "process_payment");
        payment.chunk.text = "fn process_payment(amount: f64) { charge(amount) }".into();
        store
            .replace_file(Path::new("src/pay.rs"), "h", &[payment, chunk("src/pay.rs", "refund")])
            .unwrap();

        let hits = store.keyword_search("process_payment", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id.as_str(), "src/pay.rs#process_payment@rust");
        assert!(hits[0].score > 0.0 && hits[0].score < 1.0);

        let hits = store.keyword_search("charge", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(store.keyword_search("nothing_here", 5).unwrap().is_empty());
    }

    #[test]
    fn keyword_search_ranks_more_matching_terms_first() {
        let store = SqliteStore::in_memory().unwrap();
        let mut both = chunk("a.rs", "load_config");
        both.chunk.text = "fn load_config() { read config file }".into();
        let mut one = chunk("a.rs", "read_bytes");
        one.chunk.text = "fn read_bytes() { read }".into();
        store.replace_file(Path::new("a.rs"), "h", &[one, both]).unwrap();

        let hits = store.keyword_search("load config", 5).unwrap();
        assert_eq!(hits[0].chunk_id.as_str(), "a.rs#load_config@rust");
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn keyword_rows_follow_file_changes() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_file(Path::new("a.rs"), "h1", &[chunk("a.rs", "alpha")]).unwrap();
        store.replace_file(Path::new("b.rs"), "h1", &[chunk("b.rs", "beta")]).unwrap();

        store.replace_file(Path::new("a.rs"), "h2", &[chunk("a.rs", "gamma")]).unwrap();
        assert!(store.keyword_search("alpha", 5).unwrap().is_empty());
        assert_eq!(store.keyword_search("gamma", 5).unwrap().len(), 1);

        store.remove_file(Path::new("b.rs")).unwrap();
        assert!(store.keyword_search("beta", 5).unwrap().is_empty());
    }

    #[test]
    fn keyword_operators_in_queries_are_literal() {
        let store = SqliteStore::in_memory().unwrap();
        store.replace_file(Path::new("a.rs"), "h", &[chunk("a.rs", "near")]).unwrap();
        assert_eq!(sanitize_fts_query("foo( AND \"bar\" *"), "\"foo\" OR \"AND\" OR \"bar\"");
        assert!(store.keyword_search("( * \"", 5).unwrap().is_empty());
        assert_eq!(store.keyword_search("NEAR(", 5).unwrap().len(), 1);
    }

    #[test]
    fn embedding_cache_round_trips_vectors() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.get("abc").unwrap().is_none());

        let rec = record("abc", vec![0.1, -0.2, 3.5]);
        store.put(&rec).unwrap();
        let loaded = store.get("abc").unwrap().unwrap();
        assert_eq!(loaded.vector, rec.vector);
        assert_eq!(loaded.provider, "fake");
        assert_eq!(store.len().unwrap(), 1);

        // idempotent overwrite
        store.put(&rec).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn dimensions_are_fixed_once_set() {
        let store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.dimensions().unwrap(), None);
        store.ensure_dimensions("voyage", 1536).unwrap();
        store.ensure_dimensions("voyage", 1536).unwrap();
        assert_eq!(store.dimensions().unwrap(), Some(1536));

        let err = store.ensure_dimensions("voyage", 768).unwrap_err();
        assert!(matches!(
            err,
            SightlineError::DimensionMismatch {
                expected: 1536,
                actual: 768
            }
        ));
    }

    #[test]
    fn store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".sightline/index.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.put(&record("h", vec![1.0, 2.0])).unwrap();
            store.replace_file(Path::new("a.rs"), "fh", &[chunk("a.rs", "a")]).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("h").unwrap().unwrap().vector, vec![1.0, 2.0]);
        assert_eq!(store.load_chunks().unwrap().len(), 1);
    }
}
