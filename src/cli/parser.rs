//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ArdhaRAG: context-aware retrieval for RAG.
///
/// Ingests documents into a local index, then answers queries with hybrid
/// search over embeddings, full-text and a knowledge graph, packed into a
/// token-budgeted context window.
#[derive(Parser, Debug)]
#[command(name = "ardharag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the index database.
    ///
    /// Overrides `storage.db_path` from the configuration, which defaults
    /// to `.ardharag/ardharag.db` in the current directory.
    #[arg(long, env = "ARDHA_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// Path to a TOML configuration file.
    #[arg(long, env = "ARDHA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose (debug) logging on stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the index database.
    ///
    /// Creates the database file and schema if they don't exist.
    Init {
        /// Force re-initialization (destroys existing data).
        #[arg(short, long)]
        force: bool,
    },

    /// Show index status.
    Status,

    /// Delete all documents, chunks, graph data and session history.
    Reset {
        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Ingest a file: chunk, embed and extract entities.
    Ingest {
        /// Path to the file.
        file: PathBuf,

        /// Document name (defaults to the file name).
        #[arg(short, long)]
        name: Option<String>,

        /// Chunking strategy (fixed, semantic).
        #[arg(short, long)]
        chunker: Option<String>,

        /// Chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Overlap between chunks in bytes.
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Ingest text given inline or on stdin.
    AddText {
        /// Document name.
        name: String,

        /// Content to add (reads from stdin if not provided).
        content: Option<String>,
    },

    /// List all documents.
    #[command(alias = "ls")]
    List,

    /// Show document details.
    Show {
        /// Document ID or name.
        document: String,

        /// Show chunks as well.
        #[arg(short, long)]
        chunks: bool,
    },

    /// Delete a document and everything derived from it.
    #[command(alias = "rm")]
    Delete {
        /// Document ID or name.
        document: String,

        /// Skip confirmation prompt.
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Show a byte range of a document.
    Peek {
        /// Document ID or name.
        document: String,

        /// Start offset in bytes.
        #[arg(long, default_value = "0")]
        start: usize,

        /// End offset in bytes (default: start + 3000).
        #[arg(long)]
        end: Option<usize>,
    },

    /// Search document content with a regex.
    Grep {
        /// Document ID or name.
        document: String,

        /// Search pattern (regex).
        pattern: String,

        /// Maximum number of matches.
        #[arg(short = 'n', long, default_value = "20")]
        max_matches: usize,

        /// Bytes of context around each match.
        #[arg(short, long, default_value = "120")]
        window: usize,

        /// Case-insensitive search.
        #[arg(short, long)]
        ignore_case: bool,
    },

    /// Hybrid search over indexed chunks.
    Search {
        /// Search query text.
        query: String,

        /// Maximum number of results.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum cosine similarity for semantic candidates.
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Search mode: hybrid, semantic, bm25, graph.
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// RRF k parameter for rank fusion.
        #[arg(long)]
        rrf_k: Option<u32>,

        /// Restrict results to one document (ID or name).
        #[arg(short, long)]
        document: Option<String>,
    },

    /// Retrieve and assemble a context window for a query.
    Query {
        /// Query text.
        query: String,

        /// Token budget of the context window.
        #[arg(short = 't', long)]
        max_tokens: Option<usize>,

        /// Print the full grounded prompt instead of the passages.
        #[arg(short, long)]
        prompt: bool,
    },

    /// Chunk operations.
    #[command(subcommand)]
    Chunk(ChunkCommands),

    /// Knowledge graph operations.
    #[command(subcommand)]
    Graph(GraphCommands),

    /// Conversation session operations.
    #[command(subcommand)]
    Session(SessionCommands),
}

/// Chunk subcommands.
#[derive(Subcommand, Debug)]
pub enum ChunkCommands {
    /// Get a chunk by ID.
    Get {
        /// Chunk ID.
        id: i64,

        /// Include metadata and mentioned entities.
        #[arg(short, long)]
        metadata: bool,
    },

    /// List chunks of a document.
    List {
        /// Document ID or name.
        document: String,

        /// Show a content preview per chunk.
        #[arg(short, long)]
        preview: bool,

        /// Preview length in bytes.
        #[arg(long, default_value = "80")]
        preview_len: usize,
    },

    /// Generate embeddings for a document's chunks.
    Embed {
        /// Document ID or name.
        document: String,

        /// Re-embed even if every chunk already has an embedding.
        #[arg(short, long)]
        force: bool,
    },

    /// Show embedding coverage per document.
    Status,
}

/// Knowledge graph subcommands.
#[derive(Subcommand, Debug)]
pub enum GraphCommands {
    /// List entities, most mentioned first.
    Entities {
        /// Only entities whose name contains this text.
        #[arg(short, long)]
        pattern: Option<String>,

        /// Maximum number of entities.
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Show entities related to an entity.
    Neighbors {
        /// Entity ID or name.
        entity: String,

        /// Hops to follow.
        #[arg(long, default_value = "1")]
        depth: usize,
    },

    /// Rank entities by PageRank centrality.
    Top {
        /// Maximum number of entities.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Show graph size.
    Stats,
}

/// Session subcommands.
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Show recorded query turns.
    Show,

    /// Forget query history.
    Clear,
}
