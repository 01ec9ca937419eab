//! # ArdhaRAG
//!
//! Context-aware retrieval for Retrieval-Augmented Generation.
//!
//! ArdhaRAG indexes documents into a local `SQLite` database and answers
//! queries with a token-budgeted context window instead of a flat list of
//! chunks.
//!
//! ## Features
//!
//! - **Hybrid search**: vector similarity, FTS5 BM25 and knowledge-graph
//!   expansion fused with Reciprocal Rank Fusion
//! - **Knowledge graph**: entities and co-occurrence relations extracted on
//!   ingest, with traversal and `PageRank` centrality
//! - **Context windows**: deduplicated, budgeted passages with adjacent chunks
//!   merged and numbered for citation
//! - **Sessions**: recent query turns boost documents the conversation is
//!   already about
//!
//! ## Quick start
//!
//! ```
//! use ardharag::{ArdhaRag, Config};
//!
//! let mut rag = ArdhaRag::in_memory(Config::default())?;
//! rag.ingest_text("tea", "Green tea comes from Camellia sinensis leaves.")?;
//!
//! let response = rag.query("Where does green tea come from?")?;
//! for source in response.window.sources() {
//!     assert_eq!(source.document_name, "tea");
//! }
//! # Ok::<(), ardharag::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod io;
pub mod logging;
pub mod rag;
pub mod search;
pub mod storage;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export the pipeline and its configuration
pub use config::Config;
pub use rag::{Answer, ArdhaRag, Generator, IngestOptions, IngestReport, QueryResponse};

// Re-export core domain types
pub use core::{Chunk, ChunkMetadata, Document, DocumentMetadata, Session};

// Re-export context assembly types
pub use context::{ContextConfig, ContextManager, ContextWindow, TokenBudget};

// Re-export knowledge graph types
pub use graph::{Entity, EntityExtractor, KnowledgeGraph, PageRank, PatternExtractor};

// Re-export storage types
pub use storage::{DEFAULT_DB_PATH, SqliteStorage, Storage};

// Re-export chunking types
pub use chunking::{Chunker, FixedChunker, SemanticChunker, available_strategies, create_chunker};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};

// Re-export embedding types
pub use embedding::{
    DEFAULT_DIMENSIONS, Embedder, FallbackEmbedder, cosine_similarity, create_embedder,
};

// Re-export search types
pub use search::{
    DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K, RrfConfig, SearchConfig, SearchResult,
    hybrid_search, reciprocal_rank_fusion, search_bm25, search_graph, search_semantic,
    weighted_rrf,
};
