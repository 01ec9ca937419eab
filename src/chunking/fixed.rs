//! Fixed-size chunking strategy.
//!
//! Splits text into segments of a target size with configurable overlap,
//! optionally pulling each cut back to the nearest preceding newline.

use crate::chunking::traits::{ChunkMetadata, Chunker, annotate_chunks, validate_sizes};
use crate::chunking::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use crate::core::Chunk;
use crate::error::Result;
use crate::io::find_char_boundary;

/// Fixed-size chunker that never splits a UTF-8 character.
///
/// # Examples
///
/// ```
/// use ardharag::chunking::{Chunker, FixedChunker};
///
/// let chunker = FixedChunker::with_size(100);
/// let text = "Hello, world! ".repeat(20);
/// let chunks = chunker.chunk(1, &text, None).unwrap();
/// for chunk in &chunks {
///     assert!(chunk.size() <= 100);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct FixedChunker {
    chunk_size: usize,
    overlap: usize,
    line_aware: bool,
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedChunker {
    /// Creates a fixed chunker with the default size and overlap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            line_aware: true,
        }
    }

    /// Creates a fixed chunker with a custom size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self::with_size_and_overlap(chunk_size, 0)
    }

    /// Creates a fixed chunker with a custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            line_aware: true,
        }
    }

    /// Sets whether cuts snap back to a newline found within the last 10%
    /// of the chunk.
    #[must_use]
    pub const fn line_aware(mut self, enabled: bool) -> Self {
        self.line_aware = enabled;
        self
    }

    fn find_boundary(
        text: &str,
        start: usize,
        target: usize,
        chunk_size: usize,
        line_aware: bool,
    ) -> usize {
        let pos = find_char_boundary(text, target);

        if line_aware {
            let lookback = pos.saturating_sub(chunk_size / 10).max(start);
            let window_start = find_char_boundary(text, lookback);
            if let Some(newline) = text[window_start..pos].rfind('\n') {
                let after = window_start + newline + 1;
                if after > start {
                    return after;
                }
            }
        }

        pos
    }
}

impl Chunker for FixedChunker {
    fn chunk(
        &self,
        document_id: i64,
        text: &str,
        metadata: Option<&ChunkMetadata>,
    ) -> Result<Vec<Chunk>> {
        let (chunk_size, overlap, line_aware, max_chunks) = metadata.map_or(
            (self.chunk_size, self.overlap, self.line_aware, 0),
            |meta| {
                (
                    meta.chunk_size,
                    meta.overlap,
                    self.line_aware && meta.preserve_lines,
                    meta.max_chunks,
                )
            },
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
                Self::find_boundary(text, start, target, chunk_size, line_aware)
            };
            if end <= start {
                // Chunk smaller than one character; take the whole character
                end = crate::io::find_char_boundary_forward(text, start + 1);
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

            let next = find_char_boundary(text, end.saturating_sub(overlap));
            start = if next > start { next } else { end };
        }

        annotate_chunks(text, &mut chunks);
        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }

    fn description(&self) -> &'static str {
        "Fixed-size chunking with optional line boundary alignment"
    }
}
