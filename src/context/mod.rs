//! Context window management.
//!
//! Turns ranked search results into a token-bounded set of passages:
//! scores are normalized and boosted by session history, weak and duplicate
//! candidates are discarded, the rest are packed greedily, neighbours of the
//! strongest chunks are prefetched, and adjacent chunks are merged back
//! into contiguous passages.

mod budget;
mod window;

pub use budget::{BYTES_PER_TOKEN, TokenBudget, estimate_tokens};
pub use window::{ContextSegment, ContextWindow, Source};

use std::collections::{HashMap, HashSet};

use crate::config::ContextSettings;
use crate::core::{Chunk, Session, content_hash};
use crate::error::Result;
use crate::io::truncate_at_word;
use crate::search::SearchResult;
use crate::storage::Storage;

/// Default context budget in tokens.
pub const DEFAULT_MAX_TOKENS: usize = 2_000;

/// Session turns whose documents receive the boost.
pub const SESSION_BOOST_TURNS: usize = 2;

/// Score factor applied to prefetched neighbours.
pub const NEIGHBOR_SCORE_FACTOR: f64 = 0.5;

/// Context assembly parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextConfig {
    /// Token budget.
    pub max_tokens: usize,
    /// Minimum normalized score to keep a candidate.
    pub min_relative_score: f64,
    /// Selected chunks whose neighbours are prefetched.
    pub neighbor_prefetch: usize,
    /// Boost for documents used in recent turns.
    pub session_boost: f64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            min_relative_score: 0.2,
            neighbor_prefetch: 2,
            session_boost: 0.25,
        }
    }
}

impl From<&ContextSettings> for ContextConfig {
    fn from(settings: &ContextSettings) -> Self {
        Self {
            max_tokens: settings.max_tokens,
            min_relative_score: settings.min_relative_score,
            neighbor_prefetch: settings.neighbor_prefetch,
            session_boost: settings.session_boost,
        }
    }
}

impl ContextConfig {
    /// Sets the token budget.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A chunk competing for a place in the window.
#[derive(Debug, Clone)]
struct Candidate {
    chunk: Chunk,
    score: f64,
    tokens: usize,
    truncated: bool,
}

impl Candidate {
    fn new(chunk: Chunk, score: f64) -> Self {
        let tokens = estimate_tokens(&chunk.content);
        Self {
            chunk,
            score,
            tokens,
            truncated: false,
        }
    }

    fn id(&self) -> i64 {
        self.chunk.id.unwrap_or_default()
    }
}

/// Builds [`ContextWindow`]s from search results.
///
/// # Examples
///
/// ```
/// use ardharag::context::{ContextConfig, ContextManager};
/// use ardharag::storage::{SqliteStorage, Storage};
///
/// let mut storage = SqliteStorage::in_memory().unwrap();
/// storage.init().unwrap();
///
/// let manager = ContextManager::new(ContextConfig::default()).unwrap();
/// let window = manager.build(&storage, &[], None).unwrap();
/// assert!(window.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct ContextManager {
    config: ContextConfig,
}

impl ContextManager {
    /// Creates a manager.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ContextError::InvalidBudget`] for a zero
    /// token budget.
    pub fn new(config: ContextConfig) -> Result<Self> {
        TokenBudget::new(config.max_tokens)?;
        Ok(Self { config })
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Assembles a context window from ranked `results`.
    ///
    /// Results whose chunk no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a storage lookup fails.
    pub fn build(
        &self,
        storage: &dyn Storage,
        results: &[SearchResult],
        session: Option<&Session>,
    ) -> Result<ContextWindow> {
        let mut budget = TokenBudget::new(self.config.max_tokens)?;
        let mut window = ContextWindow::empty(self.config.max_tokens);

        let mut candidates = self.load_candidates(storage, results, session)?;
        window.candidate_tokens = candidates.iter().map(|c| c.tokens).sum();

        candidates.retain(|c| c.score >= self.config.min_relative_score);
        sort_by_score(&mut candidates);

        let mut seen_content: HashSet<String> = HashSet::new();
        candidates.retain(|c| seen_content.insert(content_key(&c.chunk)));

        let mut selected: Vec<Candidate> = Vec::new();
        for (rank, mut candidate) in candidates.into_iter().enumerate() {
            if budget.try_consume(candidate.tokens) {
                selected.push(candidate);
            } else if rank == 0 {
                truncate_to(&mut candidate, budget.remaining_bytes());
                budget.try_consume(candidate.tokens);
                selected.push(candidate);
            } else {
                window.dropped += 1;
            }
        }

        self.prefetch_neighbors(storage, &mut selected, &mut seen_content, &mut budget)?;

        window.segments = merge_segments(storage, selected)?;
        window.used_tokens = window.segments.iter().map(|s| s.tokens).sum();

        tracing::debug!(
            segments = window.segments.len(),
            used_tokens = window.used_tokens,
            candidate_tokens = window.candidate_tokens,
            dropped = window.dropped,
            "built context window"
        );
        Ok(window)
    }

    /// Loads chunks and scores them relative to the best loaded result.
    ///
    /// Repeated chunk ids keep their highest score.
    fn load_candidates(
        &self,
        storage: &dyn Storage,
        results: &[SearchResult],
        session: Option<&Session>,
    ) -> Result<Vec<Candidate>> {
        let mut order = Vec::with_capacity(results.len());
        let mut scores: HashMap<i64, f64> = HashMap::with_capacity(results.len());
        for result in results {
            scores
                .entry(result.chunk_id)
                .and_modify(|s| *s = s.max(result.score))
                .or_insert_with(|| {
                    order.push(result.chunk_id);
                    result.score
                });
        }

        let mut loaded = Vec::with_capacity(order.len());
        for chunk_id in order {
            let Some(chunk) = storage.get_chunk(chunk_id)? else {
                tracing::debug!(chunk_id, "skipping missing chunk");
                continue;
            };
            loaded.push((chunk, scores.get(&chunk_id).copied().unwrap_or_default()));
        }

        let best = loaded.iter().map(|(_, s)| *s).fold(0.0_f64, f64::max);
        let recent = session.map_or_else(Vec::new, |s| s.recent_documents(SESSION_BOOST_TURNS));

        Ok(loaded
            .into_iter()
            .map(|(chunk, raw)| {
                let mut score = if best > 0.0 { raw / best } else { 1.0 };
                if recent.contains(&chunk.document_id) {
                    score *= 1.0 + self.config.session_boost;
                }
                Candidate::new(chunk, score)
            })
            .collect())
    }

    /// Adds the previous and next chunk of the strongest selections.
    fn prefetch_neighbors(
        &self,
        storage: &dyn Storage,
        selected: &mut Vec<Candidate>,
        seen_content: &mut HashSet<String>,
        budget: &mut TokenBudget,
    ) -> Result<()> {
        let mut chosen: HashSet<i64> = selected.iter().map(Candidate::id).collect();
        let parents: Vec<(i64, usize, f64)> = selected
            .iter()
            .take(self.config.neighbor_prefetch)
            .filter(|c| !c.truncated)
            .map(|c| (c.chunk.document_id, c.chunk.index, c.score))
            .collect();

        for (document_id, index, score) in parents {
            let neighbors = [index.checked_sub(1), index.checked_add(1)];
            for neighbor_index in neighbors.into_iter().flatten() {
                let Some(chunk) = storage.get_chunk_by_index(document_id, neighbor_index)? else {
                    continue;
                };
                let candidate = Candidate::new(chunk, score * NEIGHBOR_SCORE_FACTOR);
                if chosen.contains(&candidate.id()) || !budget.fits(candidate.tokens) {
                    continue;
                }
                if !seen_content.insert(content_key(&candidate.chunk)) {
                    continue;
                }
                budget.try_consume(candidate.tokens);
                chosen.insert(candidate.id());
                selected.push(candidate);
            }
        }
        Ok(())
    }
}

fn sort_by_score(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.id().cmp(&b.id()))
    });
}

fn content_key(chunk: &Chunk) -> String {
    chunk
        .metadata
        .content_hash
        .clone()
        .unwrap_or_else(|| content_hash(&chunk.content))
}

fn truncate_to(candidate: &mut Candidate, max_bytes: usize) {
    let kept = truncate_at_word(&candidate.chunk.content, max_bytes).len();
    candidate.chunk.content.truncate(kept);
    candidate.chunk.byte_range.end = candidate.chunk.byte_range.start + kept;
    candidate.tokens = estimate_tokens(&candidate.chunk.content);
    candidate.truncated = true;
}

/// Orders selections by document and index and joins adjacent chunks.
///
/// Documents appear best score first. Consecutive chunks whose byte ranges
/// touch or overlap become one segment with the overlap removed.
fn merge_segments(storage: &dyn Storage, selected: Vec<Candidate>) -> Result<Vec<ContextSegment>> {
    let mut by_document: HashMap<i64, Vec<Candidate>> = HashMap::new();
    for candidate in selected {
        by_document
            .entry(candidate.chunk.document_id)
            .or_default()
            .push(candidate);
    }

    let mut documents: Vec<(i64, f64)> = by_document
        .iter()
        .map(|(&id, chunks)| (id, chunks.iter().map(|c| c.score).fold(f64::MIN, f64::max)))
        .collect();
    documents.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut segments = Vec::new();
    for (document_id, _) in documents {
        let document_name = storage
            .get_document(document_id)?
            .map_or_else(|| format!("document-{document_id}"), |d| d.display_name());

        let Some(mut chunks) = by_document.remove(&document_id) else {
            continue;
        };
        chunks.sort_by_key(|c| c.chunk.index);

        let mut current: Option<ContextSegment> = None;
        for candidate in chunks {
            if let Some(segment) = current.as_mut()
                && can_append(segment, &candidate)
            {
                append(segment, &candidate);
                continue;
            }
            if let Some(done) = current.take() {
                segments.push(done);
            }
            current = Some(start_segment(&document_name, &candidate));
        }
        segments.extend(current);
    }
    Ok(segments)
}

fn start_segment(document_name: &str, candidate: &Candidate) -> ContextSegment {
    ContextSegment {
        document_id: candidate.chunk.document_id,
        document_name: document_name.to_string(),
        chunk_ids: vec![candidate.id()],
        first_index: candidate.chunk.index,
        last_index: candidate.chunk.index,
        byte_range: candidate.chunk.byte_range.clone(),
        content: candidate.chunk.content.clone(),
        score: candidate.score,
        tokens: candidate.tokens,
        truncated: candidate.truncated,
    }
}

fn can_append(segment: &ContextSegment, candidate: &Candidate) -> bool {
    !segment.truncated
        && !candidate.truncated
        && candidate.chunk.index == segment.last_index + 1
        && candidate.chunk.byte_range.start <= segment.byte_range.end
}

fn append(segment: &mut ContextSegment, candidate: &Candidate) {
    let chunk = &candidate.chunk;
    let overlap = segment.byte_range.end - chunk.byte_range.start;
    if let Some(rest) = chunk.content.get(overlap..) {
        segment.content.push_str(rest);
    }
    segment.byte_range.end = segment.byte_range.end.max(chunk.byte_range.end);
    segment.chunk_ids.push(candidate.id());
    segment.last_index = chunk.index;
    segment.score = segment.score.max(candidate.score);
    segment.tokens = estimate_tokens(&segment.content);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Document;
    use crate::storage::SqliteStorage;

    /// Stores `parts` as consecutive chunks overlapping by `overlap` bytes.
    fn store(storage: &mut SqliteStorage, name: &str, parts: &[&str], overlap: usize) -> Vec<i64> {
        let mut content = String::new();
        let mut chunks = Vec::new();
        for (i, part) in parts.iter().enumerate() {
            let start = content.len().saturating_sub(if i == 0 { 0 } else { overlap });
            content.push_str(&part[if i == 0 { 0 } else { overlap }..]);
            chunks.push((start, content.len()));
        }

        let mut document = Document::from_named(name.to_string(), content.clone());
        document.compute_hash();
        let doc_id = storage.add_document(&document).unwrap();
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, (start, end))| {
                let mut chunk = Chunk::new(doc_id, content[start..end].to_string(), start..end, i);
                chunk.compute_hash();
                chunk
            })
            .collect();
        storage.add_chunks(doc_id, &chunks).unwrap()
    }

    fn result(storage: &SqliteStorage, chunk_id: i64, score: f64) -> SearchResult {
        let chunk = storage.get_chunk(chunk_id).unwrap().unwrap();
        SearchResult {
            chunk_id,
            document_id: chunk.document_id,
            index: chunk.index,
            score,
            semantic_score: None,
            bm25_score: None,
            graph_score: None,
        }
    }

    fn setup() -> SqliteStorage {
        let mut storage = SqliteStorage::in_memory().unwrap();
        storage.init().unwrap();
        storage
    }

    fn manager(max_tokens: usize, prefetch: usize) -> ContextManager {
        ContextManager::new(ContextConfig {
            max_tokens,
            neighbor_prefetch: prefetch,
            ..ContextConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_zero_budget_rejected() {
        let config = ContextConfig::default().with_max_tokens(0);
        assert!(ContextManager::new(config).is_err());
    }

    #[test]
    fn test_config_from_settings() {
        let settings = crate::config::Config::default().context;
        let config = ContextConfig::from(&settings);
        assert_eq!(config, ContextConfig::default());
    }

    #[test]
    fn test_packs_by_score_within_budget() {
        let mut storage = setup();
        // Each part is 40 bytes = 10 tokens
        let ids = store(
            &mut storage,
            "doc",
            &[
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa ",
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb ",
                "ccccccccccccccccccccccccccccccccccccccc ",
            ],
            0,
        );
        let results = vec![
            result(&storage, ids[2], 3.0),
            result(&storage, ids[0], 2.0),
            result(&storage, ids[1], 1.0),
        ];

        let window = manager(20, 0).build(&storage, &results, None).unwrap();
        assert_eq!(window.used_tokens, 20);
        assert_eq!(window.candidate_tokens, 30);
        assert_eq!(window.dropped, 1);
        assert_eq!(window.savings(), 10);
        // Document order, not score order; chunks 0 and 2 are not adjacent
        assert_eq!(window.segments.len(), 2);
        assert_eq!(window.segments[0].first_index, 0);
        assert_eq!(window.segments[1].first_index, 2);
        assert!(window.used_tokens <= window.max_tokens);
    }

    #[test]
    fn test_min_relative_score_filters() {
        let mut storage = setup();
        let ids = store(&mut storage, "doc", &["alpha ", "beta "], 0);
        let results = vec![result(&storage, ids[0], 10.0), result(&storage, ids[1], 1.0)];

        let window = manager(100, 0).build(&storage, &results, None).unwrap();
        assert_eq!(window.chunk_ids(), vec![ids[0]]);
        assert_eq!(window.dropped, 0);
    }

    #[test]
    fn test_duplicate_content_kept_once() {
        let mut storage = setup();
        let a = store(&mut storage, "a", &["same text"], 0);
        let b = store(&mut storage, "b", &["same text"], 0);
        let results = vec![result(&storage, b[0], 1.0), result(&storage, a[0], 1.0)];

        let window = manager(100, 0).build(&storage, &results, None).unwrap();
        // Tie broken by lower chunk id
        assert_eq!(window.chunk_ids(), vec![a[0]]);
    }

    #[test]
    fn test_best_candidate_truncated_when_oversized() {
        let mut storage = setup();
        let long = "word ".repeat(100);
        let ids = store(&mut storage, "doc", &[long.as_str()], 0);
        let results = vec![result(&storage, ids[0], 1.0)];

        let window = manager(10, 0).build(&storage, &results, None).unwrap();
        let segment = &window.segments[0];
        assert!(segment.truncated);
        assert!(segment.tokens <= 10);
        assert!(segment.content.ends_with("word"));
        assert_eq!(segment.byte_range.end - segment.byte_range.start, segment.content.len());
    }

    #[test]
    fn test_neighbors_prefetched_and_overlap_merged() {
        let mut storage = setup();
        let ids = store(
            &mut storage,
            "guide",
            &["The first part. ", "part. The second part. ", "part. The third part."],
            6,
        );
        let results = vec![result(&storage, ids[1], 1.0)];

        let window = manager(100, 1).build(&storage, &results, None).unwrap();
        assert_eq!(window.segments.len(), 1);
        let segment = &window.segments[0];
        assert_eq!(segment.chunk_ids, ids);
        assert_eq!(segment.content, "The first part. The second part. The third part.");
        assert_eq!(segment.first_index, 0);
        assert_eq!(segment.last_index, 2);
        assert!((segment.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_session_boost_reorders_documents() {
        let mut storage = setup();
        let a = store(&mut storage, "a", &["alpha text"], 0);
        let b = store(&mut storage, "b", &["beta text"], 0);
        let results = vec![result(&storage, a[0], 1.0), result(&storage, b[0], 0.9)];

        let mut session = Session::new();
        let doc_b = storage.get_chunk(b[0]).unwrap().unwrap().document_id;
        session.record_turn("earlier", vec![b[0]], vec![doc_b], 8);

        let window = manager(100, 0)
            .build(&storage, &results, Some(&session))
            .unwrap();
        assert_eq!(window.document_ids()[0], doc_b);
        assert!(window.segments[0].score > 1.0);
    }

    #[test]
    fn test_missing_chunks_do_not_set_the_scale() {
        let mut storage = setup();
        let ids = store(&mut storage, "doc", &["present"], 0);
        let mut missing = result(&storage, ids[0], 10.0);
        missing.chunk_id = 9_999;
        let results = vec![missing, result(&storage, ids[0], 1.0)];

        let window = manager(100, 0).build(&storage, &results, None).unwrap();
        assert_eq!(window.chunk_ids(), vec![ids[0]]);
        assert_eq!(window.segments[0].document_name, "doc");
        assert!((window.segments[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_chunk_keeps_best_score() {
        let mut storage = setup();
        let ids = store(&mut storage, "doc", &["alpha ", "beta "], 0);
        let results = vec![
            result(&storage, ids[0], 0.1),
            result(&storage, ids[1], 0.5),
            result(&storage, ids[0], 1.0),
        ];

        let window = manager(100, 0).build(&storage, &results, None).unwrap();
        assert_eq!(window.chunk_ids(), vec![ids[0], ids[1]]);
        assert!((window.segments[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_neighbor_skipped_when_budget_is_spent() {
        let mut storage = setup();
        // 40 bytes = 10 tokens each
        let ids = store(
            &mut storage,
            "doc",
            &[
                "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa ",
                "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb ",
                "ccccccccccccccccccccccccccccccccccccccc ",
            ],
            0,
        );
        let results = vec![result(&storage, ids[1], 1.0)];

        let window = manager(15, 1).build(&storage, &results, None).unwrap();
        assert_eq!(window.chunk_ids(), vec![ids[1]]);
        assert_eq!(window.used_tokens, 10);

        let window = manager(20, 1).build(&storage, &results, None).unwrap();
        assert_eq!(window.chunk_ids(), vec![ids[0], ids[1]]);
        assert!(window.used_tokens <= 20);
    }

    #[test]
    fn test_session_boost_ignores_older_turns() {
        let mut storage = setup();
        let a = store(&mut storage, "a", &["alpha text"], 0);
        let b = store(&mut storage, "b", &["beta text"], 0);
        let results = vec![result(&storage, a[0], 1.0), result(&storage, b[0], 0.9)];

        let doc_b = storage.get_chunk(b[0]).unwrap().unwrap().document_id;
        let mut session = Session::new();
        session.record_turn("first", vec![b[0]], vec![doc_b], 8);
        session.record_turn("second", vec![], vec![], 8);
        session.record_turn("third", vec![], vec![], 8);

        let window = manager(100, 0)
            .build(&storage, &results, Some(&session))
            .unwrap();
        let doc_a = storage.get_chunk(a[0]).unwrap().unwrap().document_id;
        assert_eq!(window.document_ids()[0], doc_a);
        assert!(window.segments.iter().all(|s| s.score <= 1.0));
    }
}
