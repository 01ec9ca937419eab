//! Hash-based embedder.
//!
//! Produces deterministic pseudo-embeddings from hashed word and character
//! trigram features. Similarity reflects lexical overlap, not meaning.

use rayon::prelude::*;

use crate::Result;
use crate::core::stable_hash;
use crate::embedding::Embedder;

/// Weight of a whole-word feature relative to a trigram feature.
const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Deterministic hash-based embedder.
///
/// Features are hashed with a fixed FNV-1a function, so vectors stored in
/// one run remain comparable with queries embedded in a later run.
///
/// # Examples
///
/// ```
/// use ardharag::embedding::{Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};
///
/// let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
/// let emb1 = embedder.embed("hello world").unwrap();
/// let emb2 = embedder.embed("hello world").unwrap();
/// assert_eq!(emb1, emb2);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct FallbackEmbedder {
    dimensions: usize,
}

impl FallbackEmbedder {
    /// Creates an embedder producing vectors of `dimensions` (at least 1).
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            dimensions: if dimensions == 0 { 1 } else { dimensions },
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn add_feature(&self, embedding: &mut [f32], feature: &str, weight: f32) {
        let hash = stable_hash(feature.as_bytes());
        let idx = (hash % self.dimensions as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        // Spread magnitudes a little so colliding features rarely cancel
        let jitter = 1.0 + ((hash >> 40) & 0xFF) as f32 / 255.0;
        embedding[idx] += sign * weight * jitter;
    }

    fn generate_embedding(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimensions];

        let normalized: String = text
            .chars()
            .map(|c| {
                if c.is_alphanumeric() {
                    c.to_lowercase().next().unwrap_or(c)
                } else {
                    ' '
                }
            })
            .collect();

        for word in normalized.split_whitespace() {
            self.add_feature(&mut embedding, word, WORD_WEIGHT);

            let chars: Vec<char> = format!(" {word} ").chars().collect();
            for window in chars.windows(3) {
                let trigram: String = window.iter().collect();
                self.add_feature(&mut embedding, &trigram, TRIGRAM_WEIGHT);
            }
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }

        embedding
    }
}

impl Embedder for FallbackEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.generate_embedding(text))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .par_iter()
            .map(|text| self.generate_embedding(text))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{DEFAULT_DIMENSIONS, cosine_similarity};

    #[test]
    fn test_deterministic() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        assert_eq!(
            embedder.embed("hello world").unwrap(),
            embedder.embed("hello world").unwrap()
        );
    }

    #[test]
    fn test_dimensions() {
        let embedder = FallbackEmbedder::new(128);
        assert_eq!(embedder.dimensions(), 128);
        assert_eq!(embedder.embed("test").unwrap().len(), 128);
        assert_eq!(FallbackEmbedder::new(0).dimensions(), 1);
    }

    #[test]
    fn test_normalized() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let emb = embedder.embed("hello world").unwrap();
        let magnitude: f32 = emb.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        assert_eq!(
            embedder.embed("Hello, World!").unwrap(),
            embedder.embed("hello world").unwrap()
        );
    }

    #[test]
    fn test_similar_text_higher_similarity() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let base = embedder.embed("the quick brown fox").unwrap();
        let similar = embedder.embed("the quick brown dog").unwrap();
        let different = embedder.embed("completely unrelated text").unwrap();

        let sim_similar = cosine_similarity(&base, &similar);
        let sim_different = cosine_similarity(&base, &different);
        assert!(
            sim_similar > sim_different,
            "similar text should score higher: {sim_similar} vs {sim_different}"
        );
    }

    #[test]
    fn test_batch_matches_single() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let texts = ["hello", "world", "graph retrieval"];
        let batch = embedder.embed_batch(&texts).unwrap();
        for (text, emb) in texts.iter().zip(batch) {
            assert_eq!(emb, embedder.embed(text).unwrap());
        }
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = FallbackEmbedder::new(DEFAULT_DIMENSIONS);
        let emb = embedder.embed("").unwrap();
        assert_eq!(emb.len(), DEFAULT_DIMENSIONS);
        assert!(emb.iter().all(|&x| x == 0.0));
    }
}
