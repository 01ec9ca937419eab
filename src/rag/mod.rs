//! The retrieval-augmented generation pipeline.
//!
//! [`ArdhaRag`] ties the pieces together: documents are chunked, embedded
//! and mined for entities on ingest; queries are answered by hybrid search,
//! context assembly and a grounded prompt handed to a [`Generator`].

mod prompt;

pub use prompt::{GROUNDED_SYSTEM_PROMPT, NO_CONTEXT_ANSWER, render_prompt};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::chunking::{ChunkerMetadata, create_chunker};
use crate::config::{ChunkingConfig, Config};
use crate::context::{ContextConfig, ContextManager, ContextWindow, Source};
use crate::core::{Document, Session};
use crate::embedding::{DEFAULT_DIMENSIONS, Embedder, FallbackEmbedder};
use crate::error::{Error, Result, StorageError};
use crate::graph::{EntityExtractor, Extraction, KnowledgeGraph, PatternExtractor};
use crate::io::read_file;
use crate::search::{SearchConfig, SearchResult, embed_document_chunks, hybrid_search};
use crate::storage::{SqliteStorage, Storage};

/// Produces text from a grounded prompt.
///
/// No model backend ships with the crate; callers plug in their own.
pub trait Generator {
    /// Generates a completion for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    fn generate(&self, prompt: &str) -> Result<String>;
}

/// Chunking parameters for one ingest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    /// Chunking strategy name.
    pub strategy: String,
    /// Target chunk size in bytes.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in bytes.
    pub overlap: usize,
}

impl From<&ChunkingConfig> for IngestOptions {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            strategy: config.strategy.clone(),
            chunk_size: config.chunk_size,
            overlap: config.overlap,
        }
    }
}

/// Outcome of ingesting a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Stored document.
    pub document_id: i64,
    /// Document name.
    pub name: String,
    /// Content size in bytes.
    pub size: usize,
    /// Chunks stored.
    pub chunk_count: usize,
    /// Chunks embedded.
    pub embedded_count: usize,
    /// Distinct entities extracted.
    pub entity_count: usize,
    /// Distinct relations extracted.
    pub relation_count: usize,
    /// The content was already stored; nothing new was written.
    pub deduplicated: bool,
}

/// Result of [`ArdhaRag::query`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    /// The query text.
    pub query: String,
    /// Ranked search results.
    pub results: Vec<SearchResult>,
    /// Assembled context.
    pub window: ContextWindow,
    /// Grounded prompt over `window`.
    pub prompt: String,
}

/// Result of [`ArdhaRag::answer`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// Generated or fixed answer text.
    pub text: String,
    /// Whether the answer was generated from retrieved passages.
    pub grounded: bool,
    /// Passages the answer may cite.
    pub sources: Vec<Source>,
    /// Context the answer was generated from.
    pub window: ContextWindow,
}

/// Retrieval engine over one database.
///
/// # Examples
///
/// ```
/// use ardharag::{ArdhaRag, Config};
///
/// let mut rag = ArdhaRag::in_memory(Config::default()).unwrap();
/// rag.ingest_text("rust", "Rust was started at Mozilla. Mozilla later built Servo.")
///     .unwrap();
///
/// let response = rag.query("What did Mozilla build?").unwrap();
/// assert!(!response.window.is_empty());
/// assert!(response.prompt.contains("[1] rust"));
/// ```
pub struct ArdhaRag {
    config: Config,
    storage: SqliteStorage,
    embedder: Box<dyn Embedder>,
    extractor: Box<dyn EntityExtractor>,
    session: Session,
}

impl std::fmt::Debug for ArdhaRag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArdhaRag")
            .field("storage", &self.storage)
            .field("extractor", &self.extractor.name())
            .field("turns", &self.session.turn_count())
            .finish_non_exhaustive()
    }
}

impl ArdhaRag {
    /// Opens (creating if needed) the database at `config.storage.db_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened or initialized.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = SqliteStorage::open(&config.storage.db_path)?;
        Self::with_storage(config, storage)
    }

    /// Creates an engine backed by an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn in_memory(config: Config) -> Result<Self> {
        config.validate()?;
        Self::with_storage(config, SqliteStorage::in_memory()?)
    }

    fn with_storage(config: Config, mut storage: SqliteStorage) -> Result<Self> {
        storage.init()?;

        let session = if let Some(session) = storage.load_session()? {
            session
        } else {
            let session = Session::new();
            storage.save_session(&session)?;
            session
        };

        let extractor = PatternExtractor::with_limits(
            config.graph.min_entity_len,
            config.graph.max_entities_per_chunk,
        )?;

        Ok(Self {
            config,
            storage,
            embedder: Box::new(FallbackEmbedder::new(DEFAULT_DIMENSIONS)),
            extractor: Box::new(extractor),
            session,
        })
    }

    /// Replaces the embedder.
    ///
    /// Chunks embedded earlier keep their old vectors; re-embed them with
    /// [`ArdhaRag::embed_document`] when switching models.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = embedder;
        self
    }

    /// Replaces the entity extractor.
    #[must_use]
    pub fn with_extractor(mut self, extractor: Box<dyn EntityExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Default ingest options from the configuration.
    #[must_use]
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions::from(&self.config.chunking)
    }

    /// Ingests a file. `name` defaults to the file name.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or ingest fails.
    pub fn ingest_file(&mut self, path: &Path, name: Option<&str>) -> Result<IngestReport> {
        let options = self.ingest_options();
        self.ingest_file_with(path, name, &options)
    }

    /// Ingests a file with explicit chunking options.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or ingest fails.
    pub fn ingest_file_with(
        &mut self,
        path: &Path,
        name: Option<&str>,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let content = read_file(path)?;
        let mut document = Document::from_file(PathBuf::from(path), content);
        if let Some(name) = name {
            document.name = Some(name.to_string());
        }
        self.ingest_document(document, options)
    }

    /// Ingests text under `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken by different content or any
    /// pipeline stage fails.
    pub fn ingest_text(&mut self, name: &str, content: &str) -> Result<IngestReport> {
        let options = self.ingest_options();
        let document = Document::from_named(name.to_string(), content.to_string());
        self.ingest_document(document, &options)
    }

    /// Runs the ingest pipeline for a prepared document.
    ///
    /// Identical content already stored is not ingested again; the report
    /// then describes the existing document with `deduplicated` set.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken by different content or any
    /// pipeline stage fails. A failed ingest leaves no partial document.
    pub fn ingest_document(
        &mut self,
        mut document: Document,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        document.compute_hash();
        document.line_count();
        let name = document.display_name();

        if let Some(hash) = document.metadata.content_hash.as_deref()
            && let Some(existing) = self.storage.find_document_by_hash(hash)?
            && let Some(id) = existing.id
        {
            tracing::info!(document_id = id, name = %existing.display_name(), "content already ingested");
            return Ok(IngestReport {
                document_id: id,
                name: existing.display_name(),
                size: existing.size(),
                chunk_count: self.storage.chunk_count(id)?,
                embedded_count: self.storage.document_embedding_count(id)?,
                entity_count: 0,
                relation_count: 0,
                deduplicated: true,
            });
        }

        if self.storage.get_document_by_name(&name)?.is_some() {
            return Err(Error::InvalidState {
                message: format!("a document named '{name}' already exists"),
            });
        }

        document.name = Some(name.clone());
        let document_id = self.storage.add_document(&document)?;

        match self.index_document(document_id, &document.content, options) {
            Ok((chunk_count, embedded_count, entity_count, relation_count)) => {
                self.session.add_document(document_id);
                self.storage.save_session(&self.session)?;

                tracing::info!(
                    document_id,
                    name = %name,
                    chunks = chunk_count,
                    entities = entity_count,
                    "ingested document"
                );
                Ok(IngestReport {
                    document_id,
                    name,
                    size: document.size(),
                    chunk_count,
                    embedded_count,
                    entity_count,
                    relation_count,
                    deduplicated: false,
                })
            }
            Err(e) => {
                tracing::warn!(document_id, error = %e, "ingest failed, rolling back");
                self.storage.delete_document(document_id)?;
                self.storage.prune_orphan_entities()?;
                Err(e)
            }
        }
    }

    /// Chunks, embeds and extracts a stored document.
    ///
    /// Returns `(chunks, embedded, entities, relations)`.
    fn index_document(
        &mut self,
        document_id: i64,
        content: &str,
        options: &IngestOptions,
    ) -> Result<(usize, usize, usize, usize)> {
        let chunker = create_chunker(&options.strategy)?;
        let meta = ChunkerMetadata::with_size_and_overlap(options.chunk_size, options.overlap);
        chunker.validate(Some(&meta))?;

        let mut chunks = chunker.chunk(document_id, content, Some(&meta))?;
        for chunk in &mut chunks {
            chunk.compute_hash();
        }
        let chunk_ids = self.storage.add_chunks(document_id, &chunks)?;

        let embedded = embed_document_chunks(&mut self.storage, self.embedder.as_ref(), document_id)?;

        let extractor = self.extractor.as_ref();
        let graphs: Vec<(i64, Extraction)> = chunks
            .par_iter()
            .zip(chunk_ids.par_iter())
            .map(|(chunk, &id)| extractor.extract(&chunk.content).map(|e| (id, e)))
            .collect::<Result<_>>()?;

        let entities: HashSet<&str> = graphs
            .iter()
            .flat_map(|(_, e)| e.entities.iter().map(|entity| entity.normalized.as_str()))
            .collect();
        let relations: HashSet<(&str, &str, &str)> = graphs
            .iter()
            .flat_map(|(_, e)| {
                e.relations
                    .iter()
                    .map(|r| (r.source.as_str(), r.target.as_str(), r.kind.as_str()))
            })
            .collect();
        let counts = (chunks.len(), embedded, entities.len(), relations.len());

        self.storage.store_chunk_graphs(&graphs)?;
        Ok(counts)
    }

    /// Finds a document by numeric id or by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DocumentNotFound`] if nothing matches.
    pub fn resolve_document(&self, identifier: &str) -> Result<Document> {
        let by_id = match identifier.parse::<i64>() {
            Ok(id) => self.storage.get_document(id)?,
            Err(_) => None,
        };
        let found = match by_id {
            Some(document) => Some(document),
            None => self.storage.get_document_by_name(identifier)?,
        };
        found.ok_or_else(|| {
            StorageError::DocumentNotFound {
                identifier: identifier.to_string(),
            }
            .into()
        })
    }

    /// Deletes a document with its chunks, embeddings and graph data.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DocumentNotFound`] for an unknown id.
    pub fn delete_document(&mut self, id: i64) -> Result<()> {
        if self.storage.get_document(id)?.is_none() {
            return Err(StorageError::DocumentNotFound {
                identifier: id.to_string(),
            }
            .into());
        }

        self.storage.delete_document(id)?;
        let pruned = self.storage.prune_orphan_entities()?;
        if self.session.remove_document(id) {
            self.storage.save_session(&self.session)?;
        }
        tracing::info!(document_id = id, pruned_entities = pruned, "deleted document");
        Ok(())
    }

    /// (Re-)embeds every chunk of a document, returning the count.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or storage fails.
    pub fn embed_document(&mut self, id: i64) -> Result<usize> {
        embed_document_chunks(&mut self.storage, self.embedder.as_ref(), id)
    }

    /// Searches with the configured retrieval settings.
    ///
    /// # Errors
    ///
    /// Returns an error if search fails.
    pub fn retrieve(&self, query: &str) -> Result<Vec<SearchResult>> {
        self.retrieve_with(query, &self.config.search_config())
    }

    /// Searches with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns an error if search fails.
    pub fn retrieve_with(&self, query: &str, config: &SearchConfig) -> Result<Vec<SearchResult>> {
        hybrid_search(&self.storage, self.embedder.as_ref(), query, config)
    }

    /// Context settings from the configuration.
    #[must_use]
    pub fn context_config(&self) -> ContextConfig {
        ContextConfig::from(&self.config.context)
    }

    /// Retrieves, assembles context, renders the prompt and records the
    /// turn in the session.
    ///
    /// # Errors
    ///
    /// Returns an error if search, context assembly or saving the session
    /// fails.
    pub fn query(&mut self, query: &str) -> Result<QueryResponse> {
        let search = self.config.search_config();
        let context = self.context_config();
        self.query_with(query, &search, context)
    }

    /// [`ArdhaRag::query`] with explicit search and context settings.
    ///
    /// # Errors
    ///
    /// Returns an error if search, context assembly or saving the session
    /// fails.
    pub fn query_with(
        &mut self,
        query: &str,
        search: &SearchConfig,
        context: ContextConfig,
    ) -> Result<QueryResponse> {
        let manager = ContextManager::new(context)?;
        let results = self.retrieve_with(query, search)?;
        let window = manager.build(&self.storage, &results, Some(&self.session))?;
        let prompt = render_prompt(query, &window);

        self.session.record_turn(
            query,
            window.chunk_ids(),
            window.document_ids(),
            self.config.session.max_turns,
        );
        self.storage.save_session(&self.session)?;

        tracing::debug!(
            results = results.len(),
            used_tokens = window.used_tokens,
            saved_tokens = window.savings(),
            "query answered from context"
        );
        Ok(QueryResponse {
            query: query.to_string(),
            results,
            window,
            prompt,
        })
    }

    /// Answers `query` with `generator` over the retrieved context.
    ///
    /// With no retrievable context and `refuse_without_context` set, the
    /// generator is not called and [`NO_CONTEXT_ANSWER`] is returned.
    ///
    /// # Errors
    ///
    /// Returns an error if querying or generation fails.
    pub fn answer(&mut self, query: &str, generator: &dyn Generator) -> Result<Answer> {
        let response = self.query(query)?;
        let window = response.window;

        if window.is_empty() && self.config.context.refuse_without_context {
            tracing::info!("no context retrieved, refusing to generate");
            return Ok(Answer {
                text: NO_CONTEXT_ANSWER.to_string(),
                grounded: false,
                sources: Vec::new(),
                window,
            });
        }

        let text = generator.generate(&response.prompt)?;
        Ok(Answer {
            text,
            grounded: !window.is_empty(),
            sources: window.sources(),
            window,
        })
    }

    /// Loads the knowledge graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be read.
    pub fn graph(&self) -> Result<KnowledgeGraph> {
        self.storage.load_graph()
    }

    /// Returns the storage backend.
    #[must_use]
    pub const fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Returns the storage backend mutably.
    pub const fn storage_mut(&mut self) -> &mut SqliteStorage {
        &mut self.storage
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the embedder.
    #[must_use]
    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Returns the conversation session.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Forgets conversation history.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub fn clear_session(&mut self) -> Result<()> {
        self.session.clear_history();
        self.storage.save_session(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const RUST_DOC: &str = "Rust is a systems programming language. Mozilla sponsored Rust \
        in its early years.\n\nThe Rust compiler is written in Rust. Cargo is the Rust package \
        manager and ships with every Rust toolchain.";

    const GARDEN_DOC: &str = "Tomatoes need full sun. Basil grows well next to Tomatoes and \
        keeps pests away.";

    struct EchoGenerator {
        calls: Cell<usize>,
    }

    impl Generator for EchoGenerator {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            Ok(format!("echo: {} bytes [1]", prompt.len()))
        }
    }

    fn rag() -> ArdhaRag {
        let mut config = Config::default();
        config.chunking.chunk_size = 80;
        config.chunking.overlap = 10;
        ArdhaRag::in_memory(config).unwrap()
    }

    #[test]
    fn test_ingest_text_report() {
        let mut rag = rag();
        let report = rag.ingest_text("rust", RUST_DOC).unwrap();

        assert!(!report.deduplicated);
        assert_eq!(report.name, "rust");
        assert_eq!(report.size, RUST_DOC.len());
        assert!(report.chunk_count > 1);
        assert_eq!(report.embedded_count, report.chunk_count);
        assert!(report.entity_count >= 2);
        assert!(report.relation_count >= 1);

        let chunks = rag.storage().get_chunks(report.document_id).unwrap();
        let document = rag.storage().get_document(report.document_id).unwrap().unwrap();
        for chunk in &chunks {
            assert_eq!(chunk.content, document.content[chunk.byte_range.clone()]);
        }
        assert_eq!(rag.session().document_ids, vec![report.document_id]);
    }

    #[test]
    fn test_ingest_deduplicates_content() {
        let mut rag = rag();
        let first = rag.ingest_text("rust", RUST_DOC).unwrap();
        let stats = rag.storage().stats().unwrap();

        let second = rag.ingest_text("rust-copy", RUST_DOC).unwrap();
        assert!(second.deduplicated);
        assert_eq!(second.document_id, first.document_id);
        assert_eq!(second.name, "rust");
        assert_eq!(rag.storage().stats().unwrap(), stats);
    }

    #[test]
    fn test_ingest_name_conflict() {
        let mut rag = rag();
        rag.ingest_text("notes", RUST_DOC).unwrap();
        let err = rag.ingest_text("notes", GARDEN_DOC).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(rag.storage().document_count().unwrap(), 1);
    }

    #[test]
    fn test_failed_ingest_rolls_back() {
        let mut rag = rag();
        let options = IngestOptions {
            strategy: "nonexistent".to_string(),
            chunk_size: 100,
            overlap: 0,
        };
        let document = Document::from_named("bad".to_string(), RUST_DOC.to_string());
        assert!(rag.ingest_document(document, &options).is_err());
        assert_eq!(rag.storage().document_count().unwrap(), 0);
    }

    #[test]
    fn test_ingest_file_uses_file_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("garden.txt");
        std::fs::write(&path, GARDEN_DOC).unwrap();

        let mut rag = rag();
        let report = rag.ingest_file(&path, None).unwrap();
        assert_eq!(report.name, "garden.txt");

        let named = rag.ingest_file(&path, Some("other")).unwrap();
        assert!(named.deduplicated);
    }

    #[test]
    fn test_query_records_turn() {
        let mut rag = rag();
        rag.ingest_text("rust", RUST_DOC).unwrap();
        rag.ingest_text("garden", GARDEN_DOC).unwrap();

        let response = rag.query("What is Cargo?").unwrap();
        assert!(!response.results.is_empty());
        assert!(!response.window.is_empty());
        assert!(response.window.used_tokens <= response.window.max_tokens);
        assert!(response.prompt.contains("<question>What is Cargo?</question>"));
        assert!(response.window.render().contains("Cargo"));

        let turn = rag.session().last_turn().unwrap();
        assert_eq!(turn.query, "What is Cargo?");
        assert_eq!(turn.chunk_ids, response.window.chunk_ids());

        let reopened = rag.storage().load_session().unwrap().unwrap();
        assert_eq!(reopened.turn_count(), 1);
    }

    #[test]
    fn test_answer_refuses_without_context() {
        let mut rag = rag();
        let generator = EchoGenerator {
            calls: Cell::new(0),
        };

        let answer = rag.answer("Anything at all?", &generator).unwrap();
        assert_eq!(answer.text, NO_CONTEXT_ANSWER);
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
        assert_eq!(generator.calls.get(), 0);
    }

    #[test]
    fn test_answer_grounded() {
        let mut rag = rag();
        rag.ingest_text("garden", GARDEN_DOC).unwrap();
        let generator = EchoGenerator {
            calls: Cell::new(0),
        };

        let answer = rag.answer("Where do Tomatoes grow?", &generator).unwrap();
        assert!(answer.grounded);
        assert!(answer.text.starts_with("echo:"));
        assert_eq!(answer.sources[0].document_name, "garden");
        assert_eq!(generator.calls.get(), 1);
    }

    #[test]
    fn test_delete_document_cleans_up() {
        let mut rag = rag();
        let rust = rag.ingest_text("rust", RUST_DOC).unwrap();
        let garden = rag.ingest_text("garden", GARDEN_DOC).unwrap();

        rag.delete_document(rust.document_id).unwrap();
        assert!(rag.storage().get_entity_by_name("cargo").unwrap().is_none());
        assert!(rag.storage().get_entity_by_name("tomatoes").unwrap().is_some());
        assert_eq!(rag.session().document_ids, vec![garden.document_id]);
        assert!(rag.delete_document(rust.document_id).is_err());
    }

    #[test]
    fn test_resolve_document() {
        let mut rag = rag();
        let report = rag.ingest_text("rust", RUST_DOC).unwrap();

        let by_name = rag.resolve_document("rust").unwrap();
        let by_id = rag.resolve_document(&report.document_id.to_string()).unwrap();
        assert_eq!(by_name, by_id);
        assert!(rag.resolve_document("missing").is_err());
    }

    #[test]
    fn test_clear_session_keeps_documents() {
        let mut rag = rag();
        rag.ingest_text("garden", GARDEN_DOC).unwrap();
        rag.query("Basil").unwrap();
        rag.clear_session().unwrap();

        assert_eq!(rag.session().turn_count(), 0);
        assert_eq!(rag.session().document_ids.len(), 1);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.context.max_tokens = 0;
        assert!(ArdhaRag::in_memory(config).is_err());
    }

    #[test]
    fn test_graph_accessor() {
        let mut rag = rag();
        rag.ingest_text("rust", RUST_DOC).unwrap();
        let graph = rag.graph().unwrap();
        assert!(graph.find("mozilla").is_some());
        assert!(graph.edge_count() >= 1);
    }
}
