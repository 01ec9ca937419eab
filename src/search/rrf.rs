//! Reciprocal Rank Fusion (RRF).
//!
//! Combines multiple ranked lists into a single fused ranking.
//! Based on: Cormack, Clarke, Buettcher (2009) - "Reciprocal Rank Fusion
//! outperforms Condorcet and individual Rank Learning Methods"

use std::collections::HashMap;

/// Configuration for RRF.
#[derive(Debug, Clone, Copy)]
pub struct RrfConfig {
    /// Dampens the advantage of top ranks; larger values flatten the
    /// contribution curve. 60 is the value recommended in the paper.
    pub k: u32,
}

impl Default for RrfConfig {
    fn default() -> Self {
        Self { k: 60 }
    }
}

impl RrfConfig {
    /// Creates a new RRF config with the specified k value.
    #[must_use]
    pub const fn new(k: u32) -> Self {
        Self { k }
    }

    /// Contribution of an item at 0-based `rank`.
    #[allow(clippy::cast_precision_loss)]
    fn contribution(self, rank: usize) -> f64 {
        1.0 / (f64::from(self.k) + rank as f64 + 1.0)
    }
}

/// Performs Reciprocal Rank Fusion on multiple ranked lists.
///
/// `score(d) = Σ 1 / (k + rank(d))` over every list containing `d`, with
/// 1-based ranks. Results are sorted by score descending, ties broken by
/// ascending ID so the output is deterministic.
///
/// # Examples
///
/// ```
/// use ardharag::search::{RrfConfig, reciprocal_rank_fusion};
///
/// let semantic = vec![1, 2, 3];
/// let lexical = vec![3, 1, 5];
///
/// let fused = reciprocal_rank_fusion(&[&semantic, &lexical], &RrfConfig::new(60));
/// assert_eq!(fused[0].0, 1);
/// assert_eq!(fused.len(), 4);
/// ```
#[must_use]
pub fn reciprocal_rank_fusion(ranked_lists: &[&[i64]], config: &RrfConfig) -> Vec<(i64, f64)> {
    let weighted: Vec<(&[i64], f64)> = ranked_lists.iter().map(|list| (*list, 1.0)).collect();
    weighted_rrf(&weighted, config)
}

/// Performs weighted RRF where each list carries a weight.
///
/// Lists with a non-positive weight contribute nothing.
#[must_use]
pub fn weighted_rrf(ranked_lists: &[(&[i64], f64)], config: &RrfConfig) -> Vec<(i64, f64)> {
    let mut scores: HashMap<i64, f64> = HashMap::new();

    for &(list, weight) in ranked_lists {
        if weight <= 0.0 {
            continue;
        }
        for (rank, &item_id) in list.iter().enumerate() {
            *scores.entry(item_id).or_insert(0.0) += weight * config.contribution(rank);
        }
    }

    let mut results: Vec<(i64, f64)> = scores.into_iter().collect();
    results.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    results
}
