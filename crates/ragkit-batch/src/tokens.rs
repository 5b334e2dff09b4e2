//! Token estimation for batch sizing.
//!
//! The default [`CharEstimator`] uses the coarse chars/4 heuristic the
//! toolkit has always shipped with; [`TiktokenEstimator`] swaps in a real
//! BPE tokenizer when batch budgets need to track an actual model.

use crate::error::{BatchError, Result};
use tiktoken_rs::CoreBPE;

/// Estimates the token cost of one item's text.
pub trait TokenEstimator: Send + Sync {
    /// Estimated token count for `text`.
    fn estimate(&self, text: &str) -> usize;
}

/// Chars-divided-by-four heuristic: `ceil(len / 4)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharEstimator;

impl TokenEstimator for CharEstimator {
    fn estimate(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }
}

/// Real BPE token counts via tiktoken.
pub struct TiktokenEstimator {
    bpe: CoreBPE,
}

impl TiktokenEstimator {
    /// cl100k_base, the encoding shared by current OpenAI embedding models.
    pub fn cl100k() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| BatchError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }

    /// The encoding registered for a specific model name.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model)
            .map_err(|e| BatchError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenEstimator for TiktokenEstimator {
    fn estimate(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }
}

/// An item the processor can batch: anything exposing the text its token
/// cost derives from.
pub trait BatchItem: Clone + Send + Sync + 'static {
    /// The text used for token estimation.
    fn text(&self) -> &str;
}

impl BatchItem for String {
    fn text(&self) -> &str {
        self
    }
}

impl BatchItem for ragkit::core::Document {
    fn text(&self) -> &str {
        &self.page_content
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_estimator_rounds_up() {
        let estimator = CharEstimator;
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 1);
        assert_eq!(estimator.estimate("abcd"), 1);
        assert_eq!(estimator.estimate("abcde"), 2);
        assert_eq!(estimator.estimate(&"x".repeat(40)), 10);
    }

    #[test]
    fn test_tiktoken_estimator_counts_real_tokens() {
        let estimator = TiktokenEstimator::cl100k().unwrap();
        let count = estimator.estimate("The quick brown fox jumps over the lazy dog.");
        assert!(count > 0);
        assert!(count < 20);
    }

    #[test]
    fn test_document_exposes_page_content() {
        let doc = ragkit::core::Document::new("hello world");
        assert_eq!(doc.text(), "hello world");
    }
}
