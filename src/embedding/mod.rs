//! Embedding generation for semantic search.
//!
//! Model backends plug in through the [`Embedder`] trait. The crate ships a
//! deterministic hash-based [`FallbackEmbedder`] so that ingestion and
//! vector search work offline and reproducibly.

mod fallback;

pub use fallback::FallbackEmbedder;

use crate::Result;
use crate::error::Error;

/// Default embedding dimensions.
///
/// Stored vectors and query vectors must agree on this value.
pub const DEFAULT_DIMENSIONS: usize = 384;

/// Trait for embedding generators.
///
/// Implementations must be thread-safe (`Send + Sync`) so chunks can be
/// embedded in parallel during ingestion.
///
/// # Examples
///
/// ```
/// use ardharag::embedding::{Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
/// let embedding = embedder.embed("Hello, world!").unwrap();
/// assert_eq!(embedding.len(), DEFAULT_DIMENSIONS);
/// ```
pub trait Embedder: Send + Sync {
    /// Returns the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Generates an embedding for the given text.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generates embeddings for multiple texts, in input order.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding generation fails for any text.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Creates the built-in embedder with the given dimensions.
///
/// # Errors
///
/// Returns [`Error::Config`] when `dimensions` is zero.
pub fn create_embedder(dimensions: usize) -> Result<Box<dyn Embedder>> {
    if dimensions == 0 {
        return Err(Error::Config {
            message: "embedding dimensions must be > 0".to_string(),
        });
    }
    Ok(Box::new(FallbackEmbedder::new(dimensions)))
}

/// Computes cosine similarity between two vectors.
///
/// Returns 0.0 when lengths differ or either vector has zero magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
