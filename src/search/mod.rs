//! Hybrid search over semantic, lexical and graph signals.
//!
//! Vector similarity, FTS5 BM25 and knowledge-graph expansion each produce a
//! ranked candidate list; the lists are combined with weighted Reciprocal
//! Rank Fusion (RRF).

mod rrf;

pub use rrf::{RrfConfig, reciprocal_rank_fusion, weighted_rrf};

use std::collections::HashMap;

use serde::Serialize;

use crate::embedding::{Embedder, cosine_similarity};
use crate::error::Result;
use crate::graph::KnowledgeGraph;
use crate::storage::{SqliteStorage, Storage};

/// Default similarity threshold for semantic search.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.3;

/// Default number of results to return.
pub const DEFAULT_TOP_K: usize = 10;

/// Default RRF k parameter.
pub const DEFAULT_RRF_K: u32 = 60;

/// Default graph expansion depth in hops.
pub const DEFAULT_GRAPH_DEPTH: usize = 1;

/// Search result with chunk ID and combined score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Chunk ID.
    pub chunk_id: i64,
    /// Document this chunk belongs to.
    pub document_id: i64,
    /// Sequential index within the document (0-based).
    pub index: usize,
    /// Combined score (higher is better).
    pub score: f64,
    /// Cosine similarity (if the chunk was a semantic candidate).
    pub semantic_score: Option<f32>,
    /// BM25 score (if the chunk was a lexical candidate).
    pub bm25_score: Option<f64>,
    /// Graph relevance (if the chunk mentions an expanded entity).
    pub graph_score: Option<f64>,
}

/// Per-signal scores of one candidate chunk.
#[derive(Debug, Clone, Copy, Default)]
struct Signals {
    semantic: Option<f32>,
    bm25: Option<f64>,
    graph: Option<f64>,
}

impl SearchResult {
    /// Builds a result, looking up chunk placement from storage.
    ///
    /// Returns `None` if the chunk no longer exists.
    fn from_chunk_id(
        storage: &SqliteStorage,
        chunk_id: i64,
        score: f64,
        signals: Signals,
    ) -> Result<Option<Self>> {
        Ok(storage.get_chunk(chunk_id)?.map(|chunk| Self {
            chunk_id,
            document_id: chunk.document_id,
            index: chunk.index,
            score,
            semantic_score: signals.semantic,
            bm25_score: signals.bm25,
            graph_score: signals.graph,
        }))
    }
}

/// Configuration for hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    /// Maximum number of results to return.
    pub top_k: usize,
    /// Minimum cosine similarity for semantic candidates.
    pub similarity_threshold: f32,
    /// RRF k parameter.
    pub rrf_k: u32,
    /// Whether to include semantic search.
    pub use_semantic: bool,
    /// Whether to include BM25 search.
    pub use_bm25: bool,
    /// Whether to include knowledge-graph search.
    pub use_graph: bool,
    /// RRF weight of the semantic list.
    pub semantic_weight: f64,
    /// RRF weight of the BM25 list.
    pub bm25_weight: f64,
    /// RRF weight of the graph list.
    pub graph_weight: f64,
    /// Hops followed when expanding query entities.
    pub graph_depth: usize,
    /// Restrict results to one document.
    pub document_id: Option<i64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            rrf_k: DEFAULT_RRF_K,
            use_semantic: true,
            use_bm25: true,
            use_graph: true,
            semantic_weight: 1.0,
            bm25_weight: 1.0,
            graph_weight: 0.5,
            graph_depth: DEFAULT_GRAPH_DEPTH,
            document_id: None,
        }
    }
}

impl SearchConfig {
    /// Creates a new search config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the top-k limit.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the similarity threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    /// Sets the RRF k parameter.
    #[must_use]
    pub const fn with_rrf_k(mut self, k: u32) -> Self {
        self.rrf_k = k;
        self
    }

    /// Enables or disables semantic search.
    #[must_use]
    pub const fn with_semantic(mut self, enabled: bool) -> Self {
        self.use_semantic = enabled;
        self
    }

    /// Enables or disables BM25 search.
    #[must_use]
    pub const fn with_bm25(mut self, enabled: bool) -> Self {
        self.use_bm25 = enabled;
        self
    }

    /// Enables or disables graph search.
    #[must_use]
    pub const fn with_graph(mut self, enabled: bool) -> Self {
        self.use_graph = enabled;
        self
    }

    /// Sets the semantic, BM25 and graph fusion weights.
    #[must_use]
    pub const fn with_weights(mut self, semantic: f64, bm25: f64, graph: f64) -> Self {
        self.semantic_weight = semantic;
        self.bm25_weight = bm25;
        self.graph_weight = graph;
        self
    }

    /// Sets the graph expansion depth.
    #[must_use]
    pub const fn with_graph_depth(mut self, depth: usize) -> Self {
        self.graph_depth = depth;
        self
    }

    /// Restricts results to one document.
    #[must_use]
    pub const fn with_document(mut self, document_id: Option<i64>) -> Self {
        self.document_id = document_id;
        self
    }

    /// Candidates fetched per signal before fusion.
    const fn candidate_limit(&self) -> usize {
        self.top_k.saturating_mul(2)
    }

    fn enabled_signals(&self) -> usize {
        [self.use_semantic, self.use_bm25, self.use_graph]
            .into_iter()
            .filter(|&enabled| enabled)
            .count()
    }
}

/// Performs hybrid search combining the enabled signals.
///
/// Each signal yields up to `2 * top_k` candidates. With a single signal
/// enabled its own ranking and score are returned; otherwise the lists are
/// fused with weighted RRF and the fused score is reported.
///
/// # Errors
///
/// Returns an error if embedding the query or a storage query fails.
pub fn hybrid_search(
    storage: &SqliteStorage,
    embedder: &dyn Embedder,
    query: &str,
    config: &SearchConfig,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || config.top_k == 0 || config.enabled_signals() == 0 {
        return Ok(Vec::new());
    }

    let semantic = if config.use_semantic {
        semantic_candidates(storage, embedder, query, config)?
    } else {
        Vec::new()
    };
    let bm25 = if config.use_bm25 {
        storage.search_fts(query, config.candidate_limit(), config.document_id)?
    } else {
        Vec::new()
    };
    let graph = if config.use_graph {
        let kg = storage.load_graph()?;
        graph_candidates(storage, &kg, query, config)?
    } else {
        Vec::new()
    };

    tracing::debug!(
        semantic = semantic.len(),
        bm25 = bm25.len(),
        graph = graph.len(),
        "search candidates"
    );

    let mut signals: HashMap<i64, Signals> = HashMap::new();
    for &(id, score) in &semantic {
        signals.entry(id).or_default().semantic = Some(score);
    }
    for &(id, score) in &bm25 {
        signals.entry(id).or_default().bm25 = Some(score);
    }
    for &(id, score) in &graph {
        signals.entry(id).or_default().graph = Some(score);
    }

    let ranked: Vec<(i64, f64)> = if config.enabled_signals() == 1 {
        if config.use_semantic {
            semantic
                .into_iter()
                .map(|(id, score)| (id, f64::from(score)))
                .collect()
        } else if config.use_bm25 {
            bm25
        } else {
            graph
        }
    } else {
        let semantic_ids: Vec<i64> = semantic.iter().map(|(id, _)| *id).collect();
        let bm25_ids: Vec<i64> = bm25.iter().map(|(id, _)| *id).collect();
        let graph_ids: Vec<i64> = graph.iter().map(|(id, _)| *id).collect();

        weighted_rrf(
            &[
                (&semantic_ids, config.semantic_weight),
                (&bm25_ids, config.bm25_weight),
                (&graph_ids, config.graph_weight),
            ],
            &RrfConfig::new(config.rrf_k),
        )
    };

    let mut results = Vec::with_capacity(config.top_k.min(ranked.len()));
    for (chunk_id, score) in ranked.into_iter().take(config.top_k) {
        let chunk_signals = signals.get(&chunk_id).copied().unwrap_or_default();
        if let Some(result) = SearchResult::from_chunk_id(storage, chunk_id, score, chunk_signals)? {
            results.push(result);
        }
    }
    Ok(results)
}

/// Cosine similarity of the query against stored chunk embeddings.
fn semantic_candidates(
    storage: &SqliteStorage,
    embedder: &dyn Embedder,
    query: &str,
    config: &SearchConfig,
) -> Result<Vec<(i64, f32)>> {
    let embeddings = storage.get_embeddings(config.document_id)?;
    if embeddings.is_empty() {
        return Ok(Vec::new());
    }

    let query_embedding = embedder.embed(query)?;

    let mut similarities: Vec<(i64, f32)> = embeddings
        .iter()
        .map(|(chunk_id, embedding)| (*chunk_id, cosine_similarity(&query_embedding, embedding)))
        .filter(|(_, sim)| *sim >= config.similarity_threshold)
        .collect();

    similarities.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    similarities.truncate(config.candidate_limit());
    Ok(similarities)
}

/// Scores chunks by the graph relevance of the entities they mention.
///
/// Query entities are expanded `graph_depth` hops; a chunk scores the sum
/// of the expanded scores of every entity it mentions.
fn graph_candidates(
    storage: &SqliteStorage,
    graph: &KnowledgeGraph,
    query: &str,
    config: &SearchConfig,
) -> Result<Vec<(i64, f64)>> {
    let seeds = graph.match_query(query);
    if seeds.is_empty() {
        return Ok(Vec::new());
    }

    let mut chunk_scores: HashMap<i64, f64> = HashMap::new();
    for (entity_id, score) in graph.expand(&seeds, config.graph_depth) {
        for (chunk_id, _) in storage.chunks_mentioning(entity_id)? {
            *chunk_scores.entry(chunk_id).or_insert(0.0) += score;
        }
    }

    let mut scored: Vec<(i64, f64)> = chunk_scores.into_iter().collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let limit = config.candidate_limit();
    let Some(document_id) = config.document_id else {
        scored.truncate(limit);
        return Ok(scored);
    };

    let mut filtered = Vec::new();
    for (chunk_id, score) in scored {
        if filtered.len() == limit {
            break;
        }
        if storage
            .get_chunk(chunk_id)?
            .is_some_and(|chunk| chunk.document_id == document_id)
        {
            filtered.push((chunk_id, score));
        }
    }
    Ok(filtered)
}

/// Performs semantic-only search.
///
/// # Errors
///
/// Returns an error if search fails.
pub fn search_semantic(
    storage: &SqliteStorage,
    embedder: &dyn Embedder,
    query: &str,
    top_k: usize,
    threshold: f32,
) -> Result<Vec<SearchResult>> {
    let config = SearchConfig::new()
        .with_top_k(top_k)
        .with_threshold(threshold)
        .with_semantic(true)
        .with_bm25(false)
        .with_graph(false);

    hybrid_search(storage, embedder, query, &config)
}

/// Performs BM25-only search.
///
/// # Errors
///
/// Returns an error if search fails.
pub fn search_bm25(
    storage: &SqliteStorage,
    query: &str,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut results = Vec::new();
    for (chunk_id, score) in storage.search_fts(query, top_k, None)? {
        let signals = Signals {
            bm25: Some(score),
            ..Signals::default()
        };
        if let Some(result) = SearchResult::from_chunk_id(storage, chunk_id, score, signals)? {
            results.push(result);
        }
    }
    Ok(results)
}

/// Performs graph-only search.
///
/// # Errors
///
/// Returns an error if the graph cannot be loaded or queried.
pub fn search_graph(
    storage: &SqliteStorage,
    query: &str,
    depth: usize,
    top_k: usize,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }

    let config = SearchConfig::new().with_top_k(top_k).with_graph_depth(depth);
    let graph = storage.load_graph()?;

    let mut results = Vec::new();
    for (chunk_id, score) in graph_candidates(storage, &graph, query, &config)?
        .into_iter()
        .take(top_k)
    {
        let signals = Signals {
            graph: Some(score),
            ..Signals::default()
        };
        if let Some(result) = SearchResult::from_chunk_id(storage, chunk_id, score, signals)? {
            results.push(result);
        }
    }
    Ok(results)
}

/// Generates and stores embeddings for all chunks of a document.
///
/// Returns the number of chunks embedded.
///
/// # Errors
///
/// Returns an error if embedding generation or storage fails.
pub fn embed_document_chunks(
    storage: &mut SqliteStorage,
    embedder: &dyn Embedder,
    document_id: i64,
) -> Result<usize> {
    let chunks = storage.get_chunks(document_id)?;
    if chunks.is_empty() {
        return Ok(0);
    }

    let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let embeddings = embedder.embed_batch(&texts)?;

    let batch: Vec<(i64, Vec<f32>)> = chunks
        .iter()
        .zip(embeddings)
        .filter_map(|(chunk, embedding)| chunk.id.map(|id| (id, embedding)))
        .collect();

    storage.store_embeddings_batch(&batch)?;
    tracing::debug!(document_id, count = batch.len(), "embedded chunks");
    Ok(batch.len())
}

/// Checks whether every chunk of a document has an embedding.
///
/// # Errors
///
/// Returns an error if the check fails.
pub fn document_fully_embedded(storage: &SqliteStorage, document_id: i64) -> Result<bool> {
    let chunk_count = storage.chunk_count(document_id)?;
    Ok(storage.document_embedding_count(document_id)? >= chunk_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Chunk, Document};
    use crate::embedding::{DEFAULT_DIMENSIONS, FallbackEmbedder};
    use crate::graph::{EntityExtractor, PatternExtractor};

    const TEXTS: [&str; 4] = [
        "The quick brown fox jumps over the lazy dog",
        "Machine learning is a subset of artificial intelligence",
        "Rust is a systems programming language built by Mozilla",
        "Mozilla also maintains Firefox for desktop users",
    ];

    fn setup_storage() -> SqliteStorage {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage
    }

    fn add_document(storage: &mut SqliteStorage, name: &str, texts: &[&str]) -> i64 {
        let document = Document::from_named(name.to_string(), texts.join(" "));
        let doc_id = storage.add_document(&document).unwrap();

        let mut offset = 0;
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let chunk = Chunk::new(doc_id, (*text).to_string(), offset..offset + text.len(), i);
                offset += text.len() + 1;
                chunk
            })
            .collect();
        let ids = storage.add_chunks(doc_id, &chunks).unwrap();

        let extractor = PatternExtractor::new().unwrap();
        let graphs: Vec<_> = ids
            .iter()
            .zip(texts)
            .map(|(id, text)| (*id, extractor.extract(text).unwrap()))
            .collect();
        storage.store_chunk_graphs(&graphs).unwrap();
        doc_id
    }

    fn setup_storage_with_chunks() -> (SqliteStorage, i64) {
        let mut storage = setup_storage();
        let doc_id = add_document(&mut storage, "corpus", &TEXTS);
        (storage, doc_id)
    }

    #[test]
    fn test_search_config_default() {
        let config = SearchConfig::default();
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!((config.similarity_threshold - DEFAULT_SIMILARITY_THRESHOLD).abs() < f32::EPSILON);
        assert_eq!(config.rrf_k, 60);
        assert!(config.use_semantic && config.use_bm25 && config.use_graph);
        assert_eq!(config.graph_depth, 1);
        assert!(config.document_id.is_none());
    }

    #[test]
    fn test_search_config_builder() {
        let config = SearchConfig::new()
            .with_top_k(20)
            .with_threshold(0.5)
            .with_rrf_k(30)
            .with_semantic(false)
            .with_graph(false)
            .with_weights(0.5, 2.0, 0.0)
            .with_document(Some(3));

        assert_eq!(config.top_k, 20);
        assert_eq!(config.rrf_k, 30);
        assert!(!config.use_semantic);
        assert!(config.use_bm25);
        assert!(!config.use_graph);
        assert!((config.bm25_weight - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.document_id, Some(3));
        assert_eq!(config.enabled_signals(), 1);
    }

    #[test]
    fn test_search_bm25() {
        let (storage, _) = setup_storage_with_chunks();

        let results = search_bm25(&storage, "fox", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].index, 0);
        assert!(results[0].bm25_score.is_some());
        assert!(results[0].semantic_score.is_none());

        assert!(search_bm25(&storage, "xyz123nonexistent", 10).unwrap().is_empty());
    }

    #[test]
    fn test_search_graph_follows_relations() {
        let (storage, _) = setup_storage_with_chunks();

        // "Firefox" co-occurs with "Mozilla", which links back to "Rust"
        let results = search_graph(&storage, "tell me about Firefox", 1, 10).unwrap();
        let indices: Vec<usize> = results.iter().map(|r| r.index).collect();
        assert_eq!(indices[0], 3);
        assert!(indices.contains(&2));
        assert!(results.iter().all(|r| r.graph_score.is_some()));

        assert!(search_graph(&storage, "nothing known here", 1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_embed_document_chunks() {
        let (mut storage, doc_id) = setup_storage_with_chunks();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);

        assert!(!document_fully_embedded(&storage, doc_id).unwrap());
        let count = embed_document_chunks(&mut storage, &embedder, doc_id).unwrap();
        assert_eq!(count, TEXTS.len());
        assert!(document_fully_embedded(&storage, doc_id).unwrap());
    }

    #[test]
    fn test_embed_empty_document() {
        let mut storage = setup_storage();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let document = Document::from_named("empty".to_string(), String::new());
        let doc_id = storage.add_document(&document).unwrap();

        assert_eq!(embed_document_chunks(&mut storage, &embedder, doc_id).unwrap(), 0);
        assert!(document_fully_embedded(&storage, doc_id).unwrap());
    }

    #[test]
    fn test_hybrid_search_single_signal_keeps_own_score() {
        let (mut storage, doc_id) = setup_storage_with_chunks();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        embed_document_chunks(&mut storage, &embedder, doc_id).unwrap();

        let config = SearchConfig::new()
            .with_semantic(false)
            .with_graph(false);
        let results = hybrid_search(&storage, &embedder, "programming", &config).unwrap();
        assert_eq!(results[0].index, 2);
        assert_eq!(results[0].bm25_score, Some(results[0].score));

        let config = SearchConfig::new()
            .with_bm25(false)
            .with_graph(false)
            .with_threshold(0.0);
        let results = hybrid_search(&storage, &embedder, "programming language", &config).unwrap();
        assert!(!results.is_empty());
        let semantic = results[0].semantic_score.unwrap();
        assert!((f64::from(semantic) - results[0].score).abs() < 1e-9);
        assert!(results[0].bm25_score.is_none());
    }

    #[test]
    fn test_hybrid_search_fuses_signals() {
        let (mut storage, doc_id) = setup_storage_with_chunks();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        embed_document_chunks(&mut storage, &embedder, doc_id).unwrap();

        let config = SearchConfig::new().with_threshold(0.0);
        let results = hybrid_search(&storage, &embedder, "Mozilla programming", &config).unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].index, 2);
        assert!(results[0].bm25_score.is_some());
        assert!(results[0].graph_score.is_some());
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_hybrid_search_document_filter() {
        let (mut storage, doc_id) = setup_storage_with_chunks();
        let other = add_document(&mut storage, "other", &["Rust programming guide"]);
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        embed_document_chunks(&mut storage, &embedder, doc_id).unwrap();
        embed_document_chunks(&mut storage, &embedder, other).unwrap();

        let config = SearchConfig::new()
            .with_threshold(0.0)
            .with_document(Some(other));
        let results = hybrid_search(&storage, &embedder, "Rust programming", &config).unwrap();
        assert!(!results.is_empty());
        assert!(results.iter().all(|r| r.document_id == other));
    }

    #[test]
    fn test_hybrid_search_empty_query() {
        let (storage, _) = setup_storage_with_chunks();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);

        assert!(hybrid_search(&storage, &embedder, "   ", &SearchConfig::default())
            .unwrap()
            .is_empty());
        let none = SearchConfig::new()
            .with_semantic(false)
            .with_bm25(false)
            .with_graph(false);
        assert!(hybrid_search(&storage, &embedder, "fox", &none).unwrap().is_empty());
    }

    #[test]
    fn test_search_semantic_without_embeddings() {
        let (storage, _) = setup_storage_with_chunks();
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);

        let results = search_semantic(&storage, &embedder, "test query", 10, 0.5).unwrap();
        assert!(results.is_empty());
    }
}
