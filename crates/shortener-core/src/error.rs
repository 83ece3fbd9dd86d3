// ABOUTME: Error taxonomy shared by every storage backend and the deletion pipeline.
// ABOUTME: Contract outcomes (NotFound, Gone, Conflict) are distinct from backend faults.

use thiserror::Error;

/// Errors returned by `Storage` operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("record {0} has been deleted")]
    Gone(u64),

    /// A live record already holds this URL. Carries the existing id so the
    /// caller can resolve it with `get_by_url`.
    #[error("url already shortened as {0}")]
    Conflict(u64),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Nothing from the batch was committed.
    #[error("batch aborted at item {index}: {reason}")]
    BatchAborted { index: usize, reason: String },

    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Wrap a single-row failure as the abort reason for a whole batch.
    pub fn abort_batch(index: usize, cause: &StoreError) -> Self {
        StoreError::BatchAborted {
            index,
            reason: cause.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
