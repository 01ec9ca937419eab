//! Chunk representation.
//!
//! Chunks are segments of document content created by chunking strategies.
//! Each chunk keeps its byte range within the source document, which the
//! context manager relies on to merge neighbouring chunks without repeating
//! overlapped text.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::{content_hash, current_timestamp, estimate_tokens};
use crate::io::find_char_boundary;

/// A chunk of text from a document.
///
/// # Examples
///
/// ```
/// use ardharag::core::Chunk;
///
/// let chunk = Chunk::new(1, "Hello, world!".to_string(), 0..13, 0);
/// assert_eq!(chunk.size(), 13);
/// assert_eq!(chunk.estimate_tokens(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique identifier (assigned by storage layer).
    pub id: Option<i64>,

    /// ID of the document this chunk belongs to.
    pub document_id: i64,

    /// Chunk content.
    pub content: String,

    /// Byte range in the source document.
    pub byte_range: Range<usize>,

    /// Sequential index within the document (0-based).
    pub index: usize,

    /// Chunk metadata.
    pub metadata: ChunkMetadata,
}

/// Metadata associated with a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Chunking strategy that created this chunk.
    pub strategy: Option<String>,

    /// Token count estimate (if available).
    pub token_count: Option<usize>,

    /// Line range in the source document (if computed).
    pub line_range: Option<Range<usize>>,

    /// Unix timestamp when chunk was created.
    pub created_at: i64,

    /// Content hash for deduplication.
    pub content_hash: Option<String>,

    /// Whether this chunk overlaps with the previous chunk.
    pub has_overlap: bool,

    /// Custom metadata as JSON string.
    pub custom: Option<String>,
}

impl Chunk {
    /// Creates a new chunk.
    #[must_use]
    pub fn new(document_id: i64, content: String, byte_range: Range<usize>, index: usize) -> Self {
        Self {
            id: None,
            document_id,
            content,
            byte_range,
            index,
            metadata: ChunkMetadata {
                created_at: current_timestamp(),
                ..Default::default()
            },
        }
    }

    /// Creates a chunk tagged with the strategy that produced it.
    #[must_use]
    pub fn with_strategy(
        document_id: i64,
        content: String,
        byte_range: Range<usize>,
        index: usize,
        strategy: &str,
    ) -> Self {
        let mut chunk = Self::new(document_id, content, byte_range, index);
        chunk.metadata.strategy = Some(strategy.to_string());
        chunk
    }

    /// Returns the size of the chunk in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.content.len()
    }

    /// Checks if the chunk is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Returns the start byte offset in the source document.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.byte_range.start
    }

    /// Returns the end byte offset in the source document.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.byte_range.end
    }

    /// Returns the stored token count, or estimates it from the content.
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        self.metadata
            .token_count
            .unwrap_or_else(|| estimate_tokens(&self.content))
    }

    /// Sets the line range in the source document.
    pub const fn set_line_range(&mut self, start_line: usize, end_line: usize) {
        self.metadata.line_range = Some(start_line..end_line);
    }

    /// Marks this chunk as overlapping the previous chunk.
    pub const fn set_has_overlap(&mut self, has_overlap: bool) {
        self.metadata.has_overlap = has_overlap;
    }

    /// Computes and sets the content hash.
    pub fn compute_hash(&mut self) {
        self.metadata.content_hash = Some(content_hash(&self.content));
    }

    /// Returns the content hash, computing it if not yet set.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.metadata
            .content_hash
            .clone()
            .unwrap_or_else(|| content_hash(&self.content))
    }

    /// Returns at most `max_len` bytes of content, on a character boundary.
    #[must_use]
    pub fn preview(&self, max_len: usize) -> &str {
        let end = find_char_boundary(&self.content, max_len);
        &self.content[..end]
    }

    /// Checks if this chunk's byte range overlaps with another range.
    #[must_use]
    pub const fn overlaps_with(&self, other_range: &Range<usize>) -> bool {
        self.byte_range.start < other_range.end && other_range.start < self.byte_range.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_new() {
        let chunk = Chunk::new(1, "Hello".to_string(), 0..5, 0);
        assert_eq!(chunk.document_id, 1);
        assert_eq!(chunk.content, "Hello");
        assert_eq!(chunk.byte_range, 0..5);
        assert_eq!(chunk.index, 0);
        assert!(chunk.id.is_none());
        assert!(chunk.metadata.created_at > 0);
    }

    #[test]
    fn test_chunk_with_strategy() {
        let chunk = Chunk::with_strategy(1, "content".to_string(), 0..7, 0, "semantic");
        assert_eq!(chunk.metadata.strategy, Some("semantic".to_string()));
    }

    #[test]
    fn test_chunk_offsets() {
        let chunk = Chunk::new(1, "world".to_string(), 7..12, 1);
        assert_eq!(chunk.start(), 7);
        assert_eq!(chunk.end(), 12);
    }

    #[test]
    fn test_chunk_estimate_tokens_prefers_stored_count() {
        let mut chunk = Chunk::new(1, "Hello, world!".to_string(), 0..13, 0);
        assert_eq!(chunk.estimate_tokens(), 4);
        chunk.metadata.token_count = Some(9);
        assert_eq!(chunk.estimate_tokens(), 9);
    }

    #[test]
    fn test_chunk_preview_respects_utf8() {
        let chunk = Chunk::new(1, "ab世界".to_string(), 0..8, 0);
        assert_eq!(chunk.preview(3), "ab");
        assert_eq!(chunk.preview(100), "ab世界");
    }

    #[test]
    fn test_chunk_overlaps_with() {
        let chunk = Chunk::new(1, "test".to_string(), 10..20, 0);
        assert!(chunk.overlaps_with(&(15..25)));
        assert!(chunk.overlaps_with(&(5..15)));
        assert!(!chunk.overlaps_with(&(20..30)));
        assert!(!chunk.overlaps_with(&(0..10)));
    }

    #[test]
    fn test_chunk_hash_matches_across_documents() {
        let mut chunk1 = Chunk::new(1, "Hello".to_string(), 0..5, 0);
        let chunk2 = Chunk::new(2, "Hello".to_string(), 0..5, 3);
        chunk1.compute_hash();
        assert_eq!(chunk1.metadata.content_hash, Some(chunk2.fingerprint()));
    }
}
