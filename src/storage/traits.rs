//! Storage trait definition.
//!
//! Defines the interface for persistent storage backends, enabling
//! pluggable storage implementations.

use crate::core::{Chunk, Document, Session};
use crate::error::Result;
use serde::Serialize;

/// Trait for persistent storage backends.
///
/// Implementations persist the session, documents and chunks. Embeddings,
/// full-text search and the knowledge graph are backend-specific and live
/// on the concrete type.
pub trait Storage: Send {
    /// Initializes storage (creates schema, checks version).
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if schema creation fails or the stored schema is
    /// from an unsupported version.
    fn init(&mut self) -> Result<()>;

    /// Checks if storage is initialized.
    ///
    /// # Errors
    ///
    /// Returns an error if the check cannot be performed.
    fn is_initialized(&self) -> Result<bool>;

    /// Deletes all data but preserves the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn reset(&mut self) -> Result<()>;

    // ==================== Session Operations ====================

    /// Creates or replaces the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the database write fails.
    fn save_session(&mut self, session: &Session) -> Result<()>;

    /// Loads the session, `None` if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the read or deserialization fails.
    fn load_session(&self) -> Result<Option<Session>>;

    /// Deletes the stored session.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_session(&mut self) -> Result<()>;

    // ==================== Document Operations ====================

    /// Adds a document and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (e.g. the name is taken).
    fn add_document(&mut self, document: &Document) -> Result<i64>;

    /// Retrieves a document by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document(&self, id: i64) -> Result<Option<Document>>;

    /// Retrieves a document by name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_document_by_name(&self, name: &str) -> Result<Option<Document>>;

    /// Finds the document whose content hash equals `hash`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn find_document_by_hash(&self, hash: &str) -> Result<Option<Document>>;

    /// Lists all documents in ID order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn list_documents(&self) -> Result<Vec<Document>>;

    /// Updates an existing document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document has no ID or the update fails.
    fn update_document(&mut self, document: &Document) -> Result<()>;

    /// Deletes a document and everything derived from it.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_document(&mut self, id: i64) -> Result<()>;

    /// Returns the number of documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    fn document_count(&self) -> Result<usize>;

    // ==================== Chunk Operations ====================

    /// Adds chunks for a document, returning their IDs in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk insertion fails.
    fn add_chunks(&mut self, document_id: i64, chunks: &[Chunk]) -> Result<Vec<i64>>;

    /// Retrieves all chunks for a document, by index.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_chunks(&self, document_id: i64) -> Result<Vec<Chunk>>;

    /// Retrieves a chunk by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_chunk(&self, id: i64) -> Result<Option<Chunk>>;

    /// Retrieves a chunk by its position within a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn get_chunk_by_index(&self, document_id: i64, index: usize) -> Result<Option<Chunk>>;

    /// Deletes all chunks for a document.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_chunks(&mut self, document_id: i64) -> Result<()>;

    /// Returns the number of chunks of a document.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    fn chunk_count(&self, document_id: i64) -> Result<usize>;

    // ==================== Utility Operations ====================

    /// Gets storage statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if statistics cannot be gathered.
    fn stats(&self) -> Result<StorageStats>;
}

/// Storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StorageStats {
    /// Number of documents stored.
    pub document_count: usize,
    /// Total number of chunks across all documents.
    pub chunk_count: usize,
    /// Chunks that have an embedding.
    pub embedded_chunk_count: usize,
    /// Knowledge graph entities.
    pub entity_count: usize,
    /// Distinct knowledge graph relations.
    pub relation_count: usize,
    /// Total size of all document content in bytes.
    pub total_content_size: usize,
    /// Whether a session is stored.
    pub has_session: bool,
    /// Turns recorded in the stored session.
    pub turn_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes (if applicable).
    pub db_size: Option<u64>,
}
