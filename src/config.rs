//! Configuration management for ArdhaRAG.
//!
//! Configuration is layered, later sources overriding earlier ones:
//! - Built-in defaults
//! - An optional TOML file (`--config` / `ARDHA_CONFIG`)
//! - Environment variables prefixed with `ARDHA_`, sections separated by
//!   `__` (e.g. `ARDHA_CONTEXT__MAX_TOKENS=4000`)

use std::path::{Path, PathBuf};

use ::config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, MAX_CHUNK_SIZE};
use crate::error::{Error, Result};
use crate::search::SearchConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "ARDHA";

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Database location.
    pub storage: StorageConfig,

    /// Chunking defaults for ingestion.
    pub chunking: ChunkingConfig,

    /// Retrieval signals and fusion.
    pub retrieval: RetrievalConfig,

    /// Context window assembly.
    pub context: ContextSettings,

    /// Entity extraction.
    pub graph: GraphConfig,

    /// Conversation session.
    pub session: SessionConfig,

    /// Log output.
    pub logging: LoggingConfig,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Chunking settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChunkingConfig {
    /// Strategy name: fixed or semantic.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Target chunk size in bytes.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap between consecutive chunks in bytes.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

/// Retrieval settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of results to return.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum cosine similarity for semantic hits.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// RRF constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Enable vector similarity search.
    #[serde(default = "default_true")]
    pub use_semantic: bool,

    /// Enable full-text search.
    #[serde(default = "default_true")]
    pub use_bm25: bool,

    /// Enable knowledge graph search.
    #[serde(default = "default_true")]
    pub use_graph: bool,

    /// Fusion weights per signal.
    #[serde(default = "default_signal_weight")]
    pub semantic_weight: f64,

    #[allow(missing_docs)]
    #[serde(default = "default_signal_weight")]
    pub bm25_weight: f64,

    #[allow(missing_docs)]
    #[serde(default = "default_graph_weight")]
    pub graph_weight: f64,

    /// Hops to expand from entities matched in the query.
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
}

/// Context window settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ContextSettings {
    /// Token budget of the context window.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Candidates scoring below this fraction of the best are dropped.
    #[serde(default = "default_min_relative_score")]
    pub min_relative_score: f64,

    /// How many top chunks pull in their neighbours.
    #[serde(default = "default_neighbor_prefetch")]
    pub neighbor_prefetch: usize,

    /// Multiplicative boost for documents used in recent turns.
    #[serde(default = "default_session_boost")]
    pub session_boost: f64,

    /// Skip generation when nothing was retrieved.
    #[serde(default = "default_true")]
    pub refuse_without_context: bool,
}

/// Knowledge graph settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Cap on entities kept per chunk.
    #[serde(default = "default_max_entities_per_chunk")]
    pub max_entities_per_chunk: usize,

    /// Shortest accepted entity name, in characters.
    #[serde(default = "default_min_entity_len")]
    pub min_entity_len: usize,
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Turns kept in the session history.
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or an `EnvFilter` directive.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

// Default value functions
fn default_db_path() -> PathBuf {
    PathBuf::from(".ardharag/ardharag.db")
}
fn default_strategy() -> String {
    "semantic".to_string()
}
const fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
const fn default_overlap() -> usize {
    DEFAULT_OVERLAP
}
const fn default_top_k() -> usize {
    10
}
const fn default_similarity_threshold() -> f32 {
    0.3
}
const fn default_rrf_k() -> u32 {
    60
}
const fn default_true() -> bool {
    true
}
const fn default_signal_weight() -> f64 {
    1.0
}
const fn default_graph_weight() -> f64 {
    0.5
}
const fn default_graph_depth() -> usize {
    1
}
const fn default_max_tokens() -> usize {
    2000
}
const fn default_min_relative_score() -> f64 {
    0.2
}
const fn default_neighbor_prefetch() -> usize {
    2
}
const fn default_session_boost() -> f64 {
    0.25
}
const fn default_max_entities_per_chunk() -> usize {
    24
}
const fn default_min_entity_len() -> usize {
    2
}
const fn default_max_turns() -> usize {
    16
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            rrf_k: default_rrf_k(),
            use_semantic: true,
            use_bm25: true,
            use_graph: true,
            semantic_weight: default_signal_weight(),
            bm25_weight: default_signal_weight(),
            graph_weight: default_graph_weight(),
            graph_depth: default_graph_depth(),
        }
    }
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_relative_score: default_min_relative_score(),
            neighbor_prefetch: default_neighbor_prefetch(),
            session_boost: default_session_boost(),
            refuse_without_context: true,
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_entities_per_chunk: default_max_entities_per_chunk(),
            min_entity_len: default_min_entity_len(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional TOML file, and the
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file is missing or malformed, a value
    /// cannot be parsed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            if !path.is_file() {
                return Err(Error::Config {
                    message: format!("config file not found: {}", path.display()),
                });
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }

        let config: Self = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        tracing::debug!(db_path = %config.storage.db_path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses configuration from a TOML string (no environment layer).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the TOML is malformed or invalid.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Self = ::config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges across all sections.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be > 0");
        }
        if chunking.chunk_size > MAX_CHUNK_SIZE {
            return invalid(&format!(
                "chunking.chunk_size must be <= {MAX_CHUNK_SIZE}"
            ));
        }
        if chunking.overlap >= chunking.chunk_size {
            return invalid("chunking.overlap must be smaller than chunking.chunk_size");
        }

        let retrieval = &self.retrieval;
        if retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be > 0");
        }
        if !(-1.0..=1.0).contains(&retrieval.similarity_threshold) {
            return invalid("retrieval.similarity_threshold must be within [-1, 1]");
        }
        for (name, weight) in [
            ("semantic_weight", retrieval.semantic_weight),
            ("bm25_weight", retrieval.bm25_weight),
            ("graph_weight", retrieval.graph_weight),
        ] {
            if !(weight >= 0.0 && weight.is_finite()) {
                return invalid(&format!("retrieval.{name} must be a non-negative number"));
            }
        }

        let context = &self.context;
        if context.max_tokens == 0 {
            return invalid("context.max_tokens must be > 0");
        }
        if !(0.0..=1.0).contains(&context.min_relative_score) {
            return invalid("context.min_relative_score must be within [0, 1]");
        }
        if !(context.session_boost >= 0.0 && context.session_boost.is_finite()) {
            return invalid("context.session_boost must be a non-negative number");
        }

        if self.session.max_turns == 0 {
            return invalid("session.max_turns must be > 0");
        }

        Ok(())
    }

    /// Builds the search configuration from the retrieval section.
    #[must_use]
    pub const fn search_config(&self) -> SearchConfig {
        let r = &self.retrieval;
        SearchConfig {
            top_k: r.top_k,
            similarity_threshold: r.similarity_threshold,
            rrf_k: r.rrf_k,
            use_semantic: r.use_semantic,
            use_bm25: r.use_bm25,
            use_graph: r.use_graph,
            semantic_weight: r.semantic_weight,
            bm25_weight: r.bm25_weight,
            graph_weight: r.graph_weight,
            graph_depth: r.graph_depth,
            document_id: None,
        }
    }
}

fn invalid(message: &str) -> Result<()> {
    Err(Error::Config {
        message: message.to_string(),
    })
}
