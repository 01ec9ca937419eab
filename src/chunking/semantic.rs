//! Semantic chunking strategy.
//!
//! Cuts are placed at the most natural break inside a look-back window:
//! paragraph, then line, then sentence, then word. A tiny trailing chunk is
//! folded into its predecessor.

use crate::chunking::traits::{ChunkMetadata, Chunker, annotate_chunks, validate_sizes};
use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::core::Chunk;
use crate::error::Result;
use crate::io::{find_char_boundary, find_char_boundary_forward};

/// Default size below which a trailing chunk is merged into the previous one.
const DEFAULT_MIN_CHUNK_SIZE: usize = 100;

/// Semantic chunker that respects paragraph and sentence boundaries.
///
/// # Examples
///
/// ```
/// use ardharag::chunking::{Chunker, SemanticChunker};
///
/// let chunker = SemanticChunker::with_size(40).min_chunk_size(10);
/// let text = "First paragraph here.\n\nSecond paragraph follows it.";
/// let chunks = chunker.chunk(1, text, None).unwrap();
/// assert_eq!(chunks[0].content, "First paragraph here.\n\n");
/// ```
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    chunk_size: usize,
    overlap: usize,
    min_chunk_size: usize,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Break kinds, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Break {
    Paragraph,
    Line,
    Sentence,
    Word,
}

impl SemanticChunker {
    /// Creates a semantic chunker with the default size and overlap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
        }
    }

    /// Creates a semantic chunker with a custom size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self::with_size_and_overlap(chunk_size, 0)
    }

    /// Creates a semantic chunker with a custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            min_chunk_size: DEFAULT_MIN_CHUNK_SIZE,
        }
    }

    /// Sets the minimum size of a trailing chunk.
    #[must_use]
    pub const fn min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    /// Finds the strongest break in the look-back window before `target`.
    ///
    /// The window spans half a chunk and never reaches back past `floor`.
    /// Falls back to `target` snapped to a character boundary.
    fn find_best_boundary(text: &str, floor: usize, target: usize, chunk_size: usize) -> usize {
        let target = find_char_boundary(text, target);
        let lookback = target.saturating_sub(chunk_size / 2).max(floor);
        let window_start = find_char_boundary(text, lookback);
        if window_start >= target {
            return target;
        }
        let window = &text[window_start..target];

        [Break::Paragraph, Break::Line, Break::Sentence, Break::Word]
            .into_iter()
            .find_map(|kind| Self::last_break(text, window, window_start, kind))
            .map_or(target, |offset| window_start + offset)
    }

    /// Offset just past the last break of `kind` inside `window`.
    fn last_break(text: &str, window: &str, window_start: usize, kind: Break) -> Option<usize> {
        match kind {
            Break::Paragraph => window.rfind("\n\n").map(|pos| pos + 2),
            Break::Line => window.rfind('\n').map(|pos| pos + 1),
            Break::Sentence => window.char_indices().rev().find_map(|(i, c)| {
                if !matches!(c, '.' | '!' | '?') {
                    return None;
                }
                let after = i + c.len_utf8();
                let rest = &text[window_start + after..];
                (rest.is_empty() || rest.starts_with(char::is_whitespace)).then_some(after)
            }),
            Break::Word => window.rfind(' ').map(|pos| pos + 1),
        }
    }
}

impl Chunker for SemanticChunker {
    fn chunk(
        &self,
        document_id: i64,
        text: &str,
        metadata: Option<&ChunkMetadata>,
    ) -> Result<Vec<Chunk>> {
        let (chunk_size, overlap, max_chunks) = metadata.map_or(
            (self.chunk_size, self.overlap, 0),
            |meta| (meta.chunk_size, meta.overlap, meta.max_chunks),
        );
        validate_sizes(chunk_size, overlap)?;

        if text.is_empty() {
            return Ok(vec![]);
        }

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut start = 0;

        loop {
            let target = start + chunk_size;
            let mut end = if target >= text.len() {
                text.len()
            } else {
                Self::find_best_boundary(text, start, target, chunk_size)
            };
            if end <= start {
                end = find_char_boundary_forward(text, start + 1);
            }

            let mut chunk = Chunk::with_strategy(
                document_id,
                text[start..end].to_string(),
                start..end,
                chunks.len(),
                self.name(),
            );
            chunk.set_has_overlap(!chunks.is_empty() && overlap > 0);
            chunks.push(chunk);

            if end >= text.len() || (max_chunks > 0 && chunks.len() >= max_chunks) {
                break;
            }

            let next = if overlap > 0 {
                Self::find_best_boundary(text, start, end - overlap, chunk_size)
            } else {
                end
            };
            start = if next > start && next <= end { next } else { end };
        }

        // Fold a tiny tail into its predecessor
        if chunks.len() > 1
            && chunks.last().is_some_and(|last| last.size() < self.min_chunk_size)
            && chunks.last().is_some_and(|last| last.end() == text.len())
        {
            chunks.pop();
            if let Some(prev) = chunks.last_mut() {
                let range = prev.start()..text.len();
                prev.content = text[range.clone()].to_string();
                prev.byte_range = range;
            }
        }

        annotate_chunks(text, &mut chunks);
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "semantic"
    }

    fn description(&self) -> &'static str {
        "Semantic chunking respecting paragraph, line and sentence boundaries"
    }
}
