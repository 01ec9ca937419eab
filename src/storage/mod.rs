//! Storage layer for ArdhaRAG.
//!
//! Persists documents, chunks, embeddings, the full-text index, the
//! knowledge graph and the conversation session in a single `SQLite` file.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use schema::{CURRENT_SCHEMA_VERSION, SCHEMA_SQL};
pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageStats};

/// Default database file name.
pub const DEFAULT_DB_NAME: &str = "ardharag.db";

/// Default database path relative to project root.
pub const DEFAULT_DB_PATH: &str = ".ardharag/ardharag.db";
