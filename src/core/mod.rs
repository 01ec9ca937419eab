//! Core domain models for ArdhaRAG.
//!
//! This module contains the fundamental data structures used throughout the
//! retrieval pipeline: documents, chunks, and the conversation session. These
//! are pure domain models with no I/O dependencies.

pub mod chunk;
pub mod document;
pub mod session;

pub use chunk::{Chunk, ChunkMetadata};
pub use document::{Document, DocumentMetadata};
pub use session::{Session, SessionMetadata, Turn};

/// Estimates the token count of a text using ~4 bytes per token.
///
/// # Examples
///
/// ```
/// use ardharag::core::estimate_tokens;
///
/// assert_eq!(estimate_tokens(""), 0);
/// assert_eq!(estimate_tokens("abcde"), 2);
/// ```
#[must_use]
pub const fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

/// Computes a stable 64-bit FNV-1a hash of `text` as 16 hex digits.
///
/// The value is persisted for deduplication, so it must not depend on the
/// toolchain's `DefaultHasher`.
#[must_use]
pub fn content_hash(text: &str) -> String {
    format!("{:016x}", stable_hash(text.as_bytes()))
}

/// 64-bit FNV-1a over raw bytes.
pub(crate) fn stable_hash(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes
        .iter()
        .fold(OFFSET, |acc, &byte| (acc ^ u64::from(byte)).wrapping_mul(PRIME))
}

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefghi"), 3);
    }

    #[test]
    fn test_content_hash_known_values() {
        // FNV-1a reference vectors
        assert_eq!(content_hash(""), "cbf29ce484222325");
        assert_eq!(content_hash("a"), "af63dc4c8601ec8c");
    }

    #[test]
    fn test_content_hash_distinguishes_content() {
        assert_eq!(content_hash("same"), content_hash("same"));
        assert_ne!(content_hash("same"), content_hash("Same"));
        assert_eq!(content_hash("anything").len(), 16);
    }
}
