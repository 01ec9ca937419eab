//! Chunker trait definition.
//!
//! Defines the interface for all chunking strategies, plus the validation
//! and post-processing they share.

use crate::core::Chunk;
use crate::error::{ChunkingError, Result};

use super::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, MAX_CHUNK_SIZE};

/// Trait for chunking text into retrievable segments.
///
/// Implementations must be `Send + Sync` and deterministic: the same input
/// always yields the same chunks. Produced chunks satisfy
/// `chunk.content == text[chunk.byte_range]` and carry indices `0..n`.
///
/// # Examples
///
/// ```
/// use ardharag::chunking::{Chunker, FixedChunker};
///
/// let chunker = FixedChunker::with_size(100);
/// let text = "Hello, world! ".repeat(20);
/// let chunks = chunker.chunk(1, &text, None).unwrap();
/// assert!(chunks.len() > 1);
/// ```
pub trait Chunker: Send + Sync {
    /// Chunks the input text into segments.
    ///
    /// `metadata`, when given, overrides the chunker's own size and overlap.
    ///
    /// # Errors
    ///
    /// Returns an error if the effective configuration is invalid.
    fn chunk(
        &self,
        document_id: i64,
        text: &str,
        metadata: Option<&ChunkMetadata>,
    ) -> Result<Vec<Chunk>>;

    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;

    /// Returns a description of the chunking strategy.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Validates caller-supplied configuration before chunking.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk size is zero or too large, or the overlap
    /// is not smaller than the chunk size.
    fn validate(&self, metadata: Option<&ChunkMetadata>) -> Result<()> {
        if let Some(meta) = metadata {
            validate_sizes(meta.chunk_size, meta.overlap)?;
        }
        Ok(())
    }
}

/// Per-call chunking options.
#[derive(Debug, Clone, Default)]
pub struct ChunkMetadata {
    /// Source file path.
    pub source: Option<String>,

    /// File extension or content type (e.g., "md", "txt").
    pub content_type: Option<String>,

    /// Target chunk size in characters.
    pub chunk_size: usize,

    /// Overlap between consecutive chunks.
    pub overlap: usize,

    /// Whether to prefer line boundaries.
    pub preserve_lines: bool,

    /// Maximum chunks to produce (0 = unlimited).
    pub max_chunks: usize,
}

impl ChunkMetadata {
    /// Creates options with the default size and overlap.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            preserve_lines: true,
            ..Default::default()
        }
    }

    /// Creates options with a custom size and overlap.
    #[must_use]
    pub fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            ..Self::new()
        }
    }

    /// Sets the source path.
    #[must_use]
    pub fn source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Sets the content type.
    #[must_use]
    pub fn content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Sets whether to prefer line boundaries.
    #[must_use]
    pub const fn preserve_lines(mut self, preserve: bool) -> Self {
        self.preserve_lines = preserve;
        self
    }

    /// Sets maximum chunks.
    #[must_use]
    pub const fn max_chunks(mut self, max: usize) -> Self {
        self.max_chunks = max;
        self
    }
}

/// Checks a size/overlap pair.
///
/// # Errors
///
/// Returns [`ChunkingError::InvalidConfig`] for a zero size,
/// [`ChunkingError::ChunkTooLarge`] above [`MAX_CHUNK_SIZE`], and
/// [`ChunkingError::OverlapTooLarge`] when `overlap >= chunk_size`.
pub fn validate_sizes(chunk_size: usize, overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidConfig {
            reason: "chunk_size must be > 0".to_string(),
        }
        .into());
    }
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(ChunkingError::ChunkTooLarge {
            size: chunk_size,
            max: MAX_CHUNK_SIZE,
        }
        .into());
    }
    if overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            overlap,
            size: chunk_size,
        }
        .into());
    }
    Ok(())
}

/// Fills in token counts, content hashes and line ranges.
///
/// Chunks must be ordered by start offset; overlapping chunks are fine since
/// only the start of each chunk advances the line counter.
pub(crate) fn annotate_chunks(text: &str, chunks: &mut [Chunk]) {
    let bytes = text.as_bytes();
    let mut scanned = 0;
    let mut line = 0;

    for chunk in chunks {
        let start = chunk.start().min(bytes.len());
        if start > scanned {
            line += bytecount_newlines(&bytes[scanned..start]);
            scanned = start;
        }
        let body = chunk.content.strip_suffix('\n').unwrap_or(&chunk.content);
        let span = bytecount_newlines(body.as_bytes());
        chunk.set_line_range(line, line + span + 1);
        chunk.metadata.token_count = Some(crate::core::estimate_tokens(&chunk.content));
        chunk.compute_hash();
    }
}

fn bytecount_newlines(bytes: &[u8]) -> usize {
    bytes.iter().filter(|&&b| b == b'\n').count()
}
