//! Token budget accounting.

use crate::error::{ContextError, Result};

pub use crate::core::estimate_tokens;

/// Bytes per estimated token.
pub const BYTES_PER_TOKEN: usize = 4;

/// A fixed token allowance consumed as passages are selected.
///
/// # Examples
///
/// ```
/// use ardharag::context::TokenBudget;
///
/// let mut budget = TokenBudget::new(10).unwrap();
/// assert!(budget.try_consume(6));
/// assert!(!budget.try_consume(6));
/// assert_eq!(budget.remaining(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    max_tokens: usize,
    used: usize,
}

impl TokenBudget {
    /// Creates a budget of `max_tokens`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::InvalidBudget`] for a zero budget.
    pub fn new(max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(ContextError::InvalidBudget { max_tokens }.into());
        }
        Ok(Self {
            max_tokens,
            used: 0,
        })
    }

    /// Total allowance.
    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Tokens consumed so far.
    #[must_use]
    pub const fn used(&self) -> usize {
        self.used
    }

    /// Tokens still available.
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.max_tokens.saturating_sub(self.used)
    }

    /// Whether `tokens` more would fit.
    #[must_use]
    pub const fn fits(&self, tokens: usize) -> bool {
        tokens <= self.remaining()
    }

    /// Consumes `tokens` if they fit, returning whether they did.
    pub const fn try_consume(&mut self, tokens: usize) -> bool {
        if self.fits(tokens) {
            self.used += tokens;
            true
        } else {
            false
        }
    }

    /// Largest byte length whose token estimate fits the remaining budget.
    #[must_use]
    pub const fn remaining_bytes(&self) -> usize {
        self.remaining().saturating_mul(BYTES_PER_TOKEN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zero_budget_rejected() {
        let err = TokenBudget::new(0).unwrap_err();
        assert!(err.to_string().contains("invalid token budget"));
    }

    #[test]
    fn test_consume_until_full() {
        let mut budget = TokenBudget::new(5).unwrap();
        assert!(budget.try_consume(5));
        assert_eq!(budget.remaining(), 0);
        assert!(budget.try_consume(0));
        assert!(!budget.try_consume(1));
        assert_eq!(budget.used(), 5);
        assert_eq!(budget.max_tokens(), 5);
    }

    proptest! {
        #[test]
        fn remaining_bytes_fit_estimate(max in 1usize..10_000, used in 0usize..10_000) {
            let mut budget = TokenBudget::new(max).unwrap();
            budget.try_consume(used);
            let text = "x".repeat(budget.remaining_bytes());
            prop_assert!(budget.fits(estimate_tokens(&text)));
        }
    }
}
