//! `SQLite` storage implementation.
//!
//! Documents, chunks, embeddings, the FTS5 index and the knowledge graph
//! share one database file, so deleting a document cascades through
//! everything derived from it in a single statement.

// SQLite stores all integers as i64. These casts are intentional and safe
// because we only store non-negative values that fit in usize.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::core::{Chunk, ChunkMetadata, Document, DocumentMetadata, Session, current_timestamp};
use crate::error::{Result, StorageError};
use crate::graph::{Entity, Extraction, KnowledgeGraph, RelationKind, normalize_entity};
use crate::storage::schema::{
    CHECK_SCHEMA_SQL, CURRENT_SCHEMA_VERSION, DATA_TABLES, GET_VERSION_SQL, SCHEMA_SQL,
    SET_VERSION_SQL,
};
use crate::storage::traits::{Storage, StorageStats};

const DOCUMENT_COLUMNS: &str = "id, name, source_path, content, content_type, content_hash, \
     size, line_count, chunk_count, created_at, updated_at";

const CHUNK_COLUMNS: &str = "id, document_id, content, byte_start, byte_end, chunk_index, \
     strategy, token_count, line_start, line_end, has_overlap, content_hash, custom_metadata, \
     created_at";

/// Entity columns plus the total mention count, for a query aliasing
/// `entities` as `e`.
const ENTITY_SELECT: &str = "SELECT e.id, e.name, e.normalized, e.kind, \
     (SELECT COALESCE(SUM(m.count), 0) FROM entity_mentions m WHERE m.entity_id = e.id) \
     AS mentions FROM entities e";

/// SQLite-based storage implementation.
///
/// # Examples
///
/// ```
/// use ardharag::storage::{SqliteStorage, Storage};
///
/// let mut storage = SqliteStorage::in_memory().unwrap();
/// storage.init().unwrap();
/// assert!(storage.is_initialized().unwrap());
/// ```
pub struct SqliteStorage {
    conn: Connection,
    /// Path to the database file (None for in-memory).
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteStorage {
    /// Opens or creates a database at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Database(e.to_string()))?;
        }

        let conn = Connection::open(&path).map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        // journal_mode returns a row
        let _: String = conn
            .query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))
            .map_err(StorageError::from)?;

        tracing::debug!(path = %path.display(), "opened database");
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Creates an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        conn.execute("PRAGMA foreign_keys = ON;", [])
            .map_err(StorageError::from)?;
        Ok(Self { conn, path: None })
    }

    /// Returns the database path (None for in-memory).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn get_schema_version(&self) -> Result<Option<u32>> {
        let version: Option<String> = self
            .conn
            .query_row(GET_VERSION_SQL, [], |row| row.get(0))
            .optional()
            .map_err(StorageError::from)?;
        Ok(version.and_then(|v| v.parse().ok()))
    }

    fn set_schema_version(&self, version: u32) -> Result<()> {
        self.conn
            .execute(SET_VERSION_SQL, params![version.to_string()])
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn count(&self, sql: &str) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(sql, [], |row| row.get(0))
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    fn query_documents(&self, filter: &str, param: Option<&dyn rusqlite::ToSql>) -> Result<Vec<Document>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents {filter}");
        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let rows = match param {
            Some(p) => stmt.query_map([p], document_from_row),
            None => stmt.query_map([], document_from_row),
        }
        .map_err(StorageError::from)?;
        let documents = rows
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(documents)
    }
}

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: Some(row.get::<_, i64>(0)?),
        name: row.get(1)?,
        source: row.get::<_, Option<String>>(2)?.map(PathBuf::from),
        content: row.get(3)?,
        metadata: DocumentMetadata {
            content_type: row.get(4)?,
            content_hash: row.get(5)?,
            size: row.get::<_, i64>(6)? as usize,
            line_count: row.get::<_, Option<i64>>(7)?.map(|c| c as usize),
            chunk_count: row.get::<_, Option<i64>>(8)?.map(|c| c as usize),
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        },
    })
}

fn chunk_from_row(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let line_start: Option<i64> = row.get(8)?;
    let line_end: Option<i64> = row.get(9)?;
    let line_range = match (line_start, line_end) {
        (Some(s), Some(e)) => Some((s as usize)..(e as usize)),
        _ => None,
    };

    Ok(Chunk {
        id: Some(row.get::<_, i64>(0)?),
        document_id: row.get(1)?,
        content: row.get(2)?,
        byte_range: (row.get::<_, i64>(3)? as usize)..(row.get::<_, i64>(4)? as usize),
        index: row.get::<_, i64>(5)? as usize,
        metadata: ChunkMetadata {
            strategy: row.get(6)?,
            token_count: row.get::<_, Option<i64>>(7)?.map(|c| c as usize),
            line_range,
            has_overlap: row.get::<_, i64>(10)? != 0,
            content_hash: row.get(11)?,
            custom: row.get(12)?,
            created_at: row.get(13)?,
        },
    })
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<Entity> {
    Ok(Entity {
        id: row.get(0)?,
        name: row.get(1)?,
        normalized: row.get(2)?,
        kind: parse_column(row, 3)?,
        mention_count: row.get::<_, i64>(4)? as usize,
    })
}

/// Parses a TEXT column through `FromStr`.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

impl Storage for SqliteStorage {
    fn init(&mut self) -> Result<()> {
        let is_init: i64 = self
            .conn
            .query_row(CHECK_SCHEMA_SQL, [], |row| row.get(0))
            .map_err(StorageError::from)?;

        if is_init == 0 {
            self.conn
                .execute_batch(SCHEMA_SQL)
                .map_err(StorageError::from)?;
            self.set_schema_version(CURRENT_SCHEMA_VERSION)?;
            tracing::info!(version = CURRENT_SCHEMA_VERSION, "created database schema");
        } else if let Some(current) = self.get_schema_version()?
            && current != CURRENT_SCHEMA_VERSION
        {
            return Err(StorageError::Migration(format!(
                "database schema version {current} is not supported (expected {CURRENT_SCHEMA_VERSION})"
            ))
            .into());
        }

        Ok(())
    }

    fn is_initialized(&self) -> Result<bool> {
        Ok(self.count(CHECK_SCHEMA_SQL)? > 0)
    }

    fn reset(&mut self) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        for table in DATA_TABLES {
            tx.execute(&format!("DELETE FROM {table}"), [])
                .map_err(StorageError::from)?;
        }
        tx.commit().map_err(StorageError::from)?;
        tracing::info!("storage reset");
        Ok(())
    }

    // ==================== Session Operations ====================

    fn save_session(&mut self, session: &Session) -> Result<()> {
        let data = serde_json::to_string(session).map_err(StorageError::from)?;
        let now = current_timestamp();

        self.conn
            .execute(
                r"
            INSERT OR REPLACE INTO session (id, data, created_at, updated_at)
            VALUES (1, ?, COALESCE((SELECT created_at FROM session WHERE id = 1), ?), ?)
        ",
                params![data, now, now],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn load_session(&self) -> Result<Option<Session>> {
        let data: Option<String> = self
            .conn
            .query_row("SELECT data FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StorageError::from)?;

        data.map(|json| serde_json::from_str(&json).map_err(|e| StorageError::from(e).into()))
            .transpose()
    }

    fn delete_session(&mut self) -> Result<()> {
        self.conn
            .execute("DELETE FROM session WHERE id = 1", [])
            .map_err(StorageError::from)?;
        Ok(())
    }

    // ==================== Document Operations ====================

    fn add_document(&mut self, document: &Document) -> Result<i64> {
        let now = current_timestamp();

        self.conn
            .execute(
                r"
            INSERT INTO documents (
                name, source_path, content, content_type, content_hash,
                size, line_count, chunk_count, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
                params![
                    document.name,
                    document
                        .source
                        .as_ref()
                        .map(|p| p.to_string_lossy().to_string()),
                    document.content,
                    document.metadata.content_type,
                    document.metadata.content_hash,
                    document.metadata.size as i64,
                    document.metadata.line_count.map(|c| c as i64),
                    document.metadata.chunk_count.map(|c| c as i64),
                    now,
                    now,
                ],
            )
            .map_err(StorageError::from)?;

        Ok(self.conn.last_insert_rowid())
    }

    fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self
            .query_documents("WHERE id = ?", Some(&id))?
            .into_iter()
            .next())
    }

    fn get_document_by_name(&self, name: &str) -> Result<Option<Document>> {
        Ok(self
            .query_documents("WHERE name = ?", Some(&name))?
            .into_iter()
            .next())
    }

    fn find_document_by_hash(&self, hash: &str) -> Result<Option<Document>> {
        Ok(self
            .query_documents("WHERE content_hash = ? ORDER BY id LIMIT 1", Some(&hash))?
            .into_iter()
            .next())
    }

    fn list_documents(&self) -> Result<Vec<Document>> {
        self.query_documents("ORDER BY id", None)
    }

    fn update_document(&mut self, document: &Document) -> Result<()> {
        let id = document.id.ok_or_else(|| StorageError::DocumentNotFound {
            identifier: "no ID".to_string(),
        })?;

        let updated = self
            .conn
            .execute(
                r"
            UPDATE documents SET
                name = ?, source_path = ?, content = ?, content_type = ?,
                content_hash = ?, size = ?, line_count = ?, chunk_count = ?,
                updated_at = ?
            WHERE id = ?
        ",
                params![
                    document.name,
                    document
                        .source
                        .as_ref()
                        .map(|p| p.to_string_lossy().to_string()),
                    document.content,
                    document.metadata.content_type,
                    document.metadata.content_hash,
                    document.metadata.size as i64,
                    document.metadata.line_count.map(|c| c as i64),
                    document.metadata.chunk_count.map(|c| c as i64),
                    current_timestamp(),
                    id,
                ],
            )
            .map_err(StorageError::from)?;

        if updated == 0 {
            return Err(StorageError::DocumentNotFound {
                identifier: id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn delete_document(&mut self, id: i64) -> Result<()> {
        // Chunks, embeddings, mentions and relations go via CASCADE
        self.conn
            .execute("DELETE FROM documents WHERE id = ?", params![id])
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn document_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM documents")
    }

    // ==================== Chunk Operations ====================

    fn add_chunks(&mut self, document_id: i64, chunks: &[Chunk]) -> Result<Vec<i64>> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let now = current_timestamp();
        let mut ids = Vec::with_capacity(chunks.len());

        {
            let mut stmt = tx
                .prepare(
                    r"
                INSERT INTO chunks (
                    document_id, content, byte_start, byte_end, chunk_index,
                    strategy, token_count, line_start, line_end, has_overlap,
                    content_hash, custom_metadata, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
                )
                .map_err(StorageError::from)?;

            for chunk in chunks {
                let (line_start, line_end) = chunk
                    .metadata
                    .line_range
                    .as_ref()
                    .map_or((None, None), |r| (Some(r.start as i64), Some(r.end as i64)));

                stmt.execute(params![
                    document_id,
                    chunk.content,
                    chunk.byte_range.start as i64,
                    chunk.byte_range.end as i64,
                    chunk.index as i64,
                    chunk.metadata.strategy,
                    chunk.metadata.token_count.map(|c| c as i64),
                    line_start,
                    line_end,
                    i64::from(chunk.metadata.has_overlap),
                    chunk.metadata.content_hash,
                    chunk.metadata.custom,
                    now,
                ])
                .map_err(StorageError::from)?;
                ids.push(tx.last_insert_rowid());
            }

            tx.execute(
                "UPDATE documents SET chunk_count = ? WHERE id = ?",
                params![chunks.len() as i64, document_id],
            )
            .map_err(StorageError::from)?;
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(ids)
    }

    fn get_chunks(&self, document_id: i64) -> Result<Vec<Chunk>> {
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ? ORDER BY chunk_index"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let chunks = stmt
            .query_map(params![document_id], chunk_from_row)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(chunks)
    }

    fn get_chunk(&self, id: i64) -> Result<Option<Chunk>> {
        let sql = format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE id = ?");
        let chunk = self
            .conn
            .query_row(&sql, params![id], chunk_from_row)
            .optional()
            .map_err(StorageError::from)?;
        Ok(chunk)
    }

    fn get_chunk_by_index(&self, document_id: i64, index: usize) -> Result<Option<Chunk>> {
        let sql =
            format!("SELECT {CHUNK_COLUMNS} FROM chunks WHERE document_id = ? AND chunk_index = ?");
        let chunk = self
            .conn
            .query_row(&sql, params![document_id, index as i64], chunk_from_row)
            .optional()
            .map_err(StorageError::from)?;
        Ok(chunk)
    }

    fn delete_chunks(&mut self, document_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM chunks WHERE document_id = ?",
                params![document_id],
            )
            .map_err(StorageError::from)?;
        self.conn
            .execute(
                "UPDATE documents SET chunk_count = 0 WHERE id = ?",
                params![document_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn chunk_count(&self, document_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunks WHERE document_id = ?",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    // ==================== Utility Operations ====================

    fn stats(&self) -> Result<StorageStats> {
        let total_size: i64 = self
            .conn
            .query_row("SELECT COALESCE(SUM(size), 0) FROM documents", [], |row| {
                row.get(0)
            })
            .map_err(StorageError::from)?;

        let session = self.load_session()?;
        let db_size = self
            .path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok().map(|m| m.len()));

        Ok(StorageStats {
            document_count: self.document_count()?,
            chunk_count: self.count("SELECT COUNT(*) FROM chunks")?,
            embedded_chunk_count: self.embedding_count()?,
            entity_count: self.entity_count()?,
            relation_count: self.relation_count()?,
            total_content_size: total_size as usize,
            has_session: session.is_some(),
            turn_count: session.map_or(0, |s| s.turn_count()),
            schema_version: self.get_schema_version()?.unwrap_or(0),
            db_size,
        })
    }
}

// ==================== Metadata ====================

impl SqliteStorage {
    /// Reads a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(value)
    }

    /// Writes a metadata value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn set_metadata(&mut self, key: &str, value: &str) -> Result<()> {
        let now = current_timestamp();
        self.conn
            .execute(
                r"
            INSERT INTO metadata (key, value, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        ",
                params![key, value, now],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }
}

// ==================== Embedding & Search Operations ====================

impl SqliteStorage {
    /// Stores an embedding for a chunk, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedding cannot be stored.
    pub fn store_embedding(&mut self, chunk_id: i64, embedding: &[f32]) -> Result<()> {
        self.conn
            .execute(
                r"
                INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dimensions, created_at)
                VALUES (?, ?, ?, ?)
            ",
                params![
                    chunk_id,
                    encode_embedding(embedding),
                    embedding.len() as i64,
                    current_timestamp()
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Stores embeddings for multiple chunks in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if any embedding cannot be stored.
    pub fn store_embeddings_batch(&mut self, embeddings: &[(i64, Vec<f32>)]) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let now = current_timestamp();

        {
            let mut stmt = tx
                .prepare(
                    r"
                    INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding, dimensions, created_at)
                    VALUES (?, ?, ?, ?)
                ",
                )
                .map_err(StorageError::from)?;

            for (chunk_id, embedding) in embeddings {
                stmt.execute(params![
                    chunk_id,
                    encode_embedding(embedding),
                    embedding.len() as i64,
                    now
                ])
                .map_err(StorageError::from)?;
            }
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Retrieves the embedding for a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_embedding(&self, chunk_id: i64) -> Result<Option<Vec<f32>>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT embedding FROM chunk_embeddings WHERE chunk_id = ?",
                params![chunk_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(bytes.as_deref().map(decode_embedding))
    }

    /// Returns chunk embeddings, optionally limited to one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_embeddings(&self, document_id: Option<i64>) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT e.chunk_id, e.embedding
                FROM chunk_embeddings e JOIN chunks c ON c.id = e.chunk_id
                WHERE ?1 IS NULL OR c.document_id = ?1
                ORDER BY e.chunk_id
            ",
            )
            .map_err(StorageError::from)?;

        let results = stmt
            .query_map(params![document_id], |row| {
                let chunk_id: i64 = row.get(0)?;
                let bytes: Vec<u8> = row.get(1)?;
                Ok((chunk_id, decode_embedding(&bytes)))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(results)
    }

    /// Returns every stored chunk embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        self.get_embeddings(None)
    }

    /// Deletes the embedding for a chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub fn delete_embedding(&mut self, chunk_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM chunk_embeddings WHERE chunk_id = ?",
                params![chunk_id],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// Counts chunks with embeddings.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn embedding_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM chunk_embeddings")
    }

    /// Counts embedded chunks of one document.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn document_embedding_count(&self, document_id: i64) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row(
                r"
                SELECT COUNT(*) FROM chunk_embeddings e JOIN chunks c ON c.id = e.chunk_id
                WHERE c.document_id = ?
            ",
                params![document_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(count as usize)
    }

    /// Checks if a chunk has an embedding.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn has_embedding(&self, chunk_id: i64) -> Result<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM chunk_embeddings WHERE chunk_id = ?",
                params![chunk_id],
                |row| row.get(0),
            )
            .map_err(StorageError::from)?;
        Ok(count > 0)
    }

    /// Performs FTS5 BM25 full-text search.
    ///
    /// Each whitespace-separated term is quoted (so FTS5 operators are
    /// literals) and the terms are OR-ed. Scores are `-bm25`, higher is
    /// better.
    ///
    /// # Errors
    ///
    /// Returns an error if the search fails.
    pub fn search_fts(
        &self,
        query: &str,
        limit: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<(i64, f64)>> {
        let fts_query = query
            .split_whitespace()
            .filter(|term| term.chars().any(char::is_alphanumeric))
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" OR ");
        if fts_query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT chunks_fts.rowid, -bm25(chunks_fts) AS score
                FROM chunks_fts JOIN chunks ON chunks.id = chunks_fts.rowid
                WHERE chunks_fts MATCH ?1 AND (?2 IS NULL OR chunks.document_id = ?2)
                ORDER BY score DESC, chunks_fts.rowid
                LIMIT ?3
            ",
            )
            .map_err(StorageError::from)?;

        let results = stmt
            .query_map(params![fts_query, document_id, limit as i64], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(results)
    }
}

// ==================== Knowledge Graph Operations ====================

impl SqliteStorage {
    /// Persists the entities, mentions and relations extracted from one chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing is written in that case.
    pub fn store_chunk_graph(&mut self, chunk_id: i64, extraction: &Extraction) -> Result<()> {
        self.store_chunk_graphs(&[(chunk_id, extraction.clone())])
    }

    /// Persists extractions for many chunks in one transaction.
    ///
    /// Entities are shared across chunks by normalized name; relations are
    /// stored per chunk so that deleting a chunk removes its contribution.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; nothing is written in that case.
    pub fn store_chunk_graphs(&mut self, graphs: &[(i64, Extraction)]) -> Result<()> {
        let tx = self.conn.transaction().map_err(StorageError::from)?;
        let now = current_timestamp();

        {
            let mut insert_entity = tx
                .prepare(
                    r"
                INSERT INTO entities (name, normalized, kind, created_at) VALUES (?, ?, ?, ?)
                ON CONFLICT(normalized) DO NOTHING
            ",
                )
                .map_err(StorageError::from)?;
            let mut entity_id = tx
                .prepare("SELECT id FROM entities WHERE normalized = ?")
                .map_err(StorageError::from)?;
            let mut insert_mention = tx
                .prepare(
                    r"
                INSERT INTO entity_mentions (entity_id, chunk_id, count) VALUES (?, ?, ?)
                ON CONFLICT(entity_id, chunk_id) DO UPDATE SET count = excluded.count
            ",
                )
                .map_err(StorageError::from)?;
            let mut insert_relation = tx
                .prepare(
                    r"
                INSERT INTO relations (source_id, target_id, kind, weight, chunk_id)
                VALUES (?, ?, ?, ?, ?)
            ",
                )
                .map_err(StorageError::from)?;

            for (chunk_id, extraction) in graphs {
                let mut ids: HashMap<&str, i64> = HashMap::new();

                for entity in &extraction.entities {
                    insert_entity
                        .execute(params![
                            entity.name,
                            entity.normalized,
                            entity.kind.as_str(),
                            now
                        ])
                        .map_err(StorageError::from)?;
                    let id: i64 = entity_id
                        .query_row(params![entity.normalized], |row| row.get(0))
                        .map_err(StorageError::from)?;
                    insert_mention
                        .execute(params![id, chunk_id, entity.count as i64])
                        .map_err(StorageError::from)?;
                    ids.insert(entity.normalized.as_str(), id);
                }

                for relation in &extraction.relations {
                    let (Some(&a), Some(&b)) = (
                        ids.get(relation.source.as_str()),
                        ids.get(relation.target.as_str()),
                    ) else {
                        continue;
                    };
                    if a == b {
                        continue;
                    }
                    insert_relation
                        .execute(params![
                            a.min(b),
                            a.max(b),
                            relation.kind.as_str(),
                            relation.weight,
                            chunk_id
                        ])
                        .map_err(StorageError::from)?;
                }
            }
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }

    /// Loads the whole knowledge graph, summing relation weights per
    /// (pair, kind) across chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn load_graph(&self) -> Result<KnowledgeGraph> {
        let mut graph = KnowledgeGraph::new();
        for entity in self.list_entities(None)? {
            graph.add_entity(entity);
        }

        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT source_id, target_id, kind, SUM(weight)
                FROM relations
                GROUP BY source_id, target_id, kind
                ORDER BY source_id, target_id, kind
            ",
            )
            .map_err(StorageError::from)?;

        let edges = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    parse_column::<RelationKind>(row, 2)?,
                    row.get::<_, f64>(3)?,
                ))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;

        for (source, target, kind, weight) in edges {
            graph.add_edge(source, target, kind, weight);
        }

        tracing::debug!(
            entities = graph.node_count(),
            edges = graph.edge_count(),
            "loaded knowledge graph"
        );
        Ok(graph)
    }

    /// Retrieves an entity by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_entity(&self, id: i64) -> Result<Option<Entity>> {
        let sql = format!("{ENTITY_SELECT} WHERE e.id = ?");
        let entity = self
            .conn
            .query_row(&sql, params![id], entity_from_row)
            .optional()
            .map_err(StorageError::from)?;
        Ok(entity)
    }

    /// Retrieves an entity by (un-normalized) name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_entity_by_name(&self, name: &str) -> Result<Option<Entity>> {
        let sql = format!("{ENTITY_SELECT} WHERE e.normalized = ?");
        let entity = self
            .conn
            .query_row(&sql, params![normalize_entity(name)], entity_from_row)
            .optional()
            .map_err(StorageError::from)?;
        Ok(entity)
    }

    /// Finds entities whose normalized name contains `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_entities(&self, pattern: &str, limit: usize) -> Result<Vec<Entity>> {
        let escaped = normalize_entity(pattern)
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let sql = format!(
            "{ENTITY_SELECT} WHERE e.normalized LIKE ? ESCAPE '\\' \
             ORDER BY mentions DESC, e.id LIMIT ?"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let entities = stmt
            .query_map(params![format!("%{escaped}%"), limit as i64], entity_from_row)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(entities)
    }

    /// Lists entities by mention count, most mentioned first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_entities(&self, limit: Option<usize>) -> Result<Vec<Entity>> {
        let sql = format!("{ENTITY_SELECT} ORDER BY mentions DESC, e.id LIMIT ?");
        let mut stmt = self.conn.prepare(&sql).map_err(StorageError::from)?;
        let entities = stmt
            .query_map(params![limit.map_or(-1, |l| l as i64)], entity_from_row)
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(entities)
    }

    /// Returns `(chunk_id, count)` for every chunk mentioning an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn chunks_mentioning(&self, entity_id: i64) -> Result<Vec<(i64, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT chunk_id, count FROM entity_mentions WHERE entity_id = ? ORDER BY chunk_id",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![entity_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Returns the entities mentioned in a chunk with their in-chunk counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn entities_for_chunk(&self, chunk_id: i64) -> Result<Vec<(Entity, usize)>> {
        let mut stmt = self
            .conn
            .prepare(
                r"
                SELECT e.id, e.name, e.normalized, e.kind,
                    (SELECT SUM(m.count) FROM entity_mentions m WHERE m.entity_id = e.id),
                    cm.count
                FROM entities e JOIN entity_mentions cm ON cm.entity_id = e.id
                WHERE cm.chunk_id = ?
                ORDER BY cm.count DESC, e.id
            ",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![chunk_id], |row| {
                Ok((entity_from_row(row)?, row.get::<_, i64>(5)? as usize))
            })
            .map_err(StorageError::from)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StorageError::from)?;
        Ok(rows)
    }

    /// Counts entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn entity_count(&self) -> Result<usize> {
        self.count("SELECT COUNT(*) FROM entities")
    }

    /// Counts distinct (pair, kind) relations.
    ///
    /// # Errors
    ///
    /// Returns an error if the count fails.
    pub fn relation_count(&self) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM (SELECT 1 FROM relations GROUP BY source_id, target_id, kind)",
        )
    }

    /// Deletes entities no longer mentioned by any chunk.
    ///
    /// Returns the number of entities removed.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    pub fn prune_orphan_entities(&mut self) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM entities WHERE id NOT IN (SELECT DISTINCT entity_id FROM entity_mentions)",
                [],
            )
            .map_err(StorageError::from)?;
        if removed > 0 {
            tracing::debug!(removed, "pruned orphan entities");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EntityExtractor, PatternExtractor};

    fn setup() -> SqliteStorage {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage
    }

    fn add_doc(storage: &mut SqliteStorage, name: &str, parts: &[&str]) -> (i64, Vec<i64>) {
        let content = parts.concat();
        let mut doc = Document::from_named(name.to_string(), content);
        doc.compute_hash();
        let doc_id = storage.add_document(&doc).unwrap();

        let mut offset = 0;
        let chunks: Vec<Chunk> = parts
            .iter()
            .enumerate()
            .map(|(i, part)| {
                let chunk = Chunk::new(doc_id, (*part).to_string(), offset..offset + part.len(), i);
                offset += part.len();
                chunk
            })
            .collect();
        let ids = storage.add_chunks(doc_id, &chunks).unwrap();
        (doc_id, ids)
    }

    fn row_count(storage: &SqliteStorage, table: &str) -> usize {
        storage
            .count(&format!("SELECT COUNT(*) FROM {table}"))
            .unwrap()
    }

    #[test]
    fn test_init_idempotent() {
        let mut storage = SqliteStorage::in_memory().unwrap();
        assert!(!storage.is_initialized().unwrap());
        storage.init().unwrap();
        storage.init().unwrap();
        assert!(storage.is_initialized().unwrap());
    }

    #[test]
    fn test_init_rejects_unknown_version() {
        let mut storage = setup();
        storage.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();
        let err = storage.init().unwrap_err();
        assert!(err.to_string().contains("migration"));
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested/dir/ardharag.db");
        let mut storage = SqliteStorage::open(&path).unwrap();
        storage.init().unwrap();
        assert!(path.exists());
        assert_eq!(storage.path(), Some(path.as_path()));
        assert!(storage.stats().unwrap().db_size.is_some());
    }

    #[test]
    fn test_session_crud() {
        let mut storage = setup();
        assert!(storage.load_session().unwrap().is_none());

        let mut session = Session::new();
        session.record_turn("q", vec![1], vec![2], 4);
        storage.save_session(&session).unwrap();
        assert_eq!(storage.load_session().unwrap(), Some(session));

        storage.delete_session().unwrap();
        assert!(storage.load_session().unwrap().is_none());
    }

    #[test]
    fn test_document_crud() {
        let mut storage = setup();
        let mut doc = Document::from_named("guide".to_string(), "Hello, world!".to_string());
        doc.compute_hash();
        let id = storage.add_document(&doc).unwrap();

        let loaded = storage.get_document(id).unwrap().unwrap();
        assert_eq!(loaded.name.as_deref(), Some("guide"));
        assert_eq!(loaded.content, "Hello, world!");

        let by_name = storage.get_document_by_name("guide").unwrap().unwrap();
        assert_eq!(by_name.id, Some(id));

        let hash = doc.metadata.content_hash.clone().unwrap();
        let by_hash = storage.find_document_by_hash(&hash).unwrap().unwrap();
        assert_eq!(by_hash.id, Some(id));
        assert!(storage.find_document_by_hash("0000").unwrap().is_none());

        let mut updated = loaded;
        updated.content = "Updated".to_string();
        storage.update_document(&updated).unwrap();
        assert_eq!(storage.get_document(id).unwrap().unwrap().content, "Updated");

        assert_eq!(storage.list_documents().unwrap().len(), 1);
        storage.delete_document(id).unwrap();
        assert!(storage.get_document(id).unwrap().is_none());
        assert_eq!(storage.document_count().unwrap(), 0);
    }

    #[test]
    fn test_document_names_unique() {
        let mut storage = setup();
        let doc = Document::from_named("same".to_string(), "a".to_string());
        storage.add_document(&doc).unwrap();
        assert!(storage.add_document(&doc).is_err());
    }

    #[test]
    fn test_update_missing_document() {
        let mut storage = setup();
        let mut doc = Document::from_content("x".to_string());
        assert!(storage.update_document(&doc).is_err());
        doc.id = Some(99);
        assert!(storage.update_document(&doc).is_err());
    }

    #[test]
    fn test_chunk_crud() {
        let mut storage = setup();
        let (doc_id, ids) = add_doc(&mut storage, "doc", &["Hello, ", "world!"]);
        assert_eq!(ids.len(), 2);

        let chunks = storage.get_chunks(doc_id).unwrap();
        assert_eq!(chunks[0].content, "Hello, ");
        assert_eq!(chunks[1].id, Some(ids[1]));
        assert_eq!(storage.chunk_count(doc_id).unwrap(), 2);
        assert_eq!(
            storage.get_document(doc_id).unwrap().unwrap().metadata.chunk_count,
            Some(2)
        );

        let second = storage.get_chunk_by_index(doc_id, 1).unwrap().unwrap();
        assert_eq!(second.content, "world!");
        assert!(storage.get_chunk_by_index(doc_id, 5).unwrap().is_none());
        assert_eq!(storage.get_chunk(ids[0]).unwrap().unwrap().byte_range, 0..7);

        storage.delete_chunks(doc_id).unwrap();
        assert_eq!(storage.chunk_count(doc_id).unwrap(), 0);
    }

    #[test]
    fn test_embeddings() {
        let mut storage = setup();
        let (doc_a, a) = add_doc(&mut storage, "a", &["one", "two"]);
        let (_, b) = add_doc(&mut storage, "b", &["three"]);

        storage.store_embedding(a[0], &[1.0, 0.5]).unwrap();
        storage
            .store_embeddings_batch(&[(a[1], vec![0.0, 1.0]), (b[0], vec![0.25, 0.25])])
            .unwrap();

        assert_eq!(storage.get_embedding(a[0]).unwrap(), Some(vec![1.0, 0.5]));
        assert!(storage.has_embedding(b[0]).unwrap());
        assert_eq!(storage.embedding_count().unwrap(), 3);
        assert_eq!(storage.document_embedding_count(doc_a).unwrap(), 2);
        assert_eq!(storage.get_embeddings(Some(doc_a)).unwrap().len(), 2);
        assert_eq!(storage.get_all_embeddings().unwrap().len(), 3);

        storage.delete_embedding(a[0]).unwrap();
        assert!(storage.get_embedding(a[0]).unwrap().is_none());
    }

    #[test]
    fn test_search_fts() {
        let mut storage = setup();
        let (doc_a, a) = add_doc(
            &mut storage,
            "a",
            &["Rust ownership rules", "Unrelated gardening notes"],
        );
        add_doc(&mut storage, "b", &["Borrowing and ownership in Rust"]);

        let hits = storage.search_fts("ownership", 10, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|(_, score)| *score > 0.0));

        let scoped = storage.search_fts("ownership", 10, Some(doc_a)).unwrap();
        assert_eq!(scoped, vec![(a[0], scoped[0].1)]);

        // Operators and punctuation are literals
        assert!(storage.search_fts("rust? AND \"ownership", 10, None).is_ok());
        assert!(storage.search_fts("  ?? ", 10, None).unwrap().is_empty());
    }

    #[test]
    fn test_store_and_load_graph() {
        let mut storage = setup();
        let (_, ids) = add_doc(
            &mut storage,
            "doc",
            &["Alpha met Beta. Alpha met Beta again.", "Beta visited Gamma."],
        );

        let extractor = PatternExtractor::new().unwrap();
        let graphs: Vec<(i64, Extraction)> = [
            (ids[0], "Alpha met Beta. Alpha met Beta again."),
            (ids[1], "Beta visited Gamma."),
        ]
        .iter()
        .map(|(id, text)| (*id, extractor.extract(text).unwrap()))
        .collect();
        storage.store_chunk_graphs(&graphs).unwrap();

        assert_eq!(storage.entity_count().unwrap(), 3);
        assert_eq!(storage.relation_count().unwrap(), 2);

        let beta = storage.get_entity_by_name("BETA").unwrap().unwrap();
        assert_eq!(beta.mention_count, 3);
        assert_eq!(storage.get_entity(beta.id).unwrap(), Some(beta.clone()));

        let graph = storage.load_graph().unwrap();
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 2);
        let alpha = graph.find("alpha").unwrap().id;
        assert!((graph.weighted_degree(alpha) - 2.0).abs() < 1e-9);

        assert_eq!(storage.chunks_mentioning(beta.id).unwrap().len(), 2);
        let in_first = storage.entities_for_chunk(ids[0]).unwrap();
        assert_eq!(in_first.len(), 2);
        assert_eq!(in_first[0].1, 2);

        assert_eq!(storage.list_entities(Some(1)).unwrap()[0].id, beta.id);
        assert_eq!(storage.find_entities("amm", 10).unwrap().len(), 1);
        assert!(storage.find_entities("%", 10).unwrap().is_empty());
    }

    #[test]
    fn test_delete_document_cascades_and_prunes() {
        let mut storage = setup();
        let extractor = PatternExtractor::new().unwrap();

        let (doc_a, a) = add_doc(&mut storage, "a", &["Alpha met Beta."]);
        let (_, b) = add_doc(&mut storage, "b", &["Beta met Gamma."]);
        storage
            .store_chunk_graph(a[0], &extractor.extract("Alpha met Beta.").unwrap())
            .unwrap();
        storage
            .store_chunk_graph(b[0], &extractor.extract("Beta met Gamma.").unwrap())
            .unwrap();
        storage.store_embedding(a[0], &[1.0]).unwrap();

        storage.delete_document(doc_a).unwrap();
        assert_eq!(row_count(&storage, "chunks"), 1);
        assert_eq!(row_count(&storage, "chunk_embeddings"), 0);
        assert_eq!(storage.relation_count().unwrap(), 1);
        assert!(storage.search_fts("alpha", 10, None).unwrap().is_empty());

        assert_eq!(storage.prune_orphan_entities().unwrap(), 1);
        assert!(storage.get_entity_by_name("alpha").unwrap().is_none());
        assert!(storage.get_entity_by_name("beta").unwrap().is_some());
    }

    #[test]
    fn test_metadata() {
        let mut storage = setup();
        assert!(storage.get_metadata("k").unwrap().is_none());
        storage.set_metadata("k", "1").unwrap();
        storage.set_metadata("k", "2").unwrap();
        assert_eq!(storage.get_metadata("k").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_reset_and_stats() {
        let mut storage = setup();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert!(!stats.has_session);
        assert_eq!(stats.schema_version, CURRENT_SCHEMA_VERSION);
        assert!(stats.db_size.is_none());

        let mut session = Session::new();
        session.record_turn("q", vec![], vec![], 4);
        storage.save_session(&session).unwrap();
        let (_, ids) = add_doc(&mut storage, "doc", &["Hello ", "World"]);
        storage.store_embedding(ids[0], &[1.0]).unwrap();

        let stats = storage.stats().unwrap();
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.embedded_chunk_count, 1);
        assert_eq!(stats.total_content_size, 11);
        assert!(stats.has_session);
        assert_eq!(stats.turn_count, 1);

        storage.reset().unwrap();
        let stats = storage.stats().unwrap();
        assert_eq!(stats.document_count, 0);
        assert_eq!(stats.chunk_count, 0);
        assert!(!stats.has_session);
        assert!(storage.is_initialized().unwrap());
    }
}
