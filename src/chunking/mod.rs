//! Chunking strategies.
//!
//! Documents are split into overlapping chunks before embedding and entity
//! extraction. Two strategies are available:
//!
//! - **Fixed**: size-based chunking with optional line alignment
//! - **Semantic**: prefers paragraph, line, sentence and word boundaries

pub mod fixed;
pub mod semantic;
pub mod traits;

pub use fixed::FixedChunker;
pub use semantic::SemanticChunker;
pub use traits::{ChunkMetadata as ChunkerMetadata, Chunker};

/// Default chunk size in characters (~300 tokens at 4 chars/token).
pub const DEFAULT_CHUNK_SIZE: usize = 1_200;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_OVERLAP: usize = 200;

/// Maximum allowed chunk size (250k chars).
pub const MAX_CHUNK_SIZE: usize = 250_000;

/// Creates the default chunker (semantic).
#[must_use]
pub const fn default_chunker() -> SemanticChunker {
    SemanticChunker::new()
}

/// Creates a chunker by name (case-insensitive).
///
/// # Errors
///
/// Returns [`crate::error::ChunkingError::UnknownStrategy`] if the strategy
/// name is not recognized.
pub fn create_chunker(name: &str) -> crate::error::Result<Box<dyn Chunker>> {
    match name.to_lowercase().as_str() {
        "fixed" => Ok(Box::new(FixedChunker::new())),
        "semantic" => Ok(Box::new(SemanticChunker::new())),
        _ => Err(crate::error::ChunkingError::UnknownStrategy {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Lists available chunking strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec!["fixed", "semantic"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_default_chunker() {
        assert_eq!(default_chunker().name(), "semantic");
    }

    #[test_case("fixed", "fixed" ; "fixed lowercase")]
    #[test_case("semantic", "semantic" ; "semantic lowercase")]
    #[test_case("FIXED", "fixed" ; "fixed uppercase")]
    #[test_case("Semantic", "semantic" ; "semantic mixed case")]
    fn test_create_chunker(name: &str, expected: &str) {
        let chunker = create_chunker(name).unwrap();
        assert_eq!(chunker.name(), expected);
    }

    #[test]
    fn test_create_chunker_unknown() {
        let err = create_chunker("parallel").err().unwrap();
        assert!(err.to_string().contains("unknown chunking strategy: parallel"));
    }

    #[test]
    fn test_available_strategies() {
        let strategies = available_strategies();
        assert_eq!(strategies, vec!["fixed", "semantic"]);
        for name in strategies {
            assert!(create_chunker(name).is_ok());
        }
    }
}
