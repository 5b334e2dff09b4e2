//! Error types for batch processing.

use thiserror::Error;

/// Batch processing result type.
pub type Result<T> = std::result::Result<T, BatchError>;

/// Errors that can occur while processing batches.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BatchError {
    /// A caller-supplied argument was invalid (e.g. empty item list).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A batch kept failing until its retry budget ran out.
    #[error("Batch {batch_index} failed after {attempts} attempt(s): {reason}")]
    BatchFailed {
        /// Zero-based index of the failed batch.
        batch_index: usize,
        /// Attempts made before giving up.
        attempts: u32,
        /// The final failure reason.
        reason: String,
    },

    /// The process function returned the wrong number of results. Never
    /// retried: the implementation is broken, not flaky.
    #[error("Batch {batch_index} returned {actual} results for {expected} items")]
    ResultLengthMismatch {
        /// Zero-based index of the offending batch.
        batch_index: usize,
        /// Items handed to the process function.
        expected: usize,
        /// Results it returned.
        actual: usize,
    },

    /// Processing was cancelled through `cancel()` or the abort signal.
    #[error("Batch processing cancelled")]
    Cancelled,

    /// Another `process_batches` call is already running on this processor.
    #[error("Batch processor is already processing")]
    Busy,

    /// The tokenizer backing a token estimator failed to initialize.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failed_display() {
        let err = BatchError::BatchFailed {
            batch_index: 2,
            attempts: 3,
            reason: "upstream 503".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Batch 2 failed after 3 attempt(s): upstream 503"
        );
    }
}
